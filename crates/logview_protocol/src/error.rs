//! Gateway error types

use std::io;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, GatewayError>;

#[derive(Error, Debug)]
pub enum GatewayError {
    /// Untrusted or unresolvable peer. The only variant reported to the
    /// caller with detail.
    #[error("(pid: {pid})[{path}] is not allowed to access the log viewer service")]
    AuthorizationDenied { pid: u32, path: String },

    #[error("Request rejected by path policy: {0}")]
    PolicyRejected(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Subprocess {program} failed: {reason}")]
    Subprocess { program: String, reason: String },

    #[error("Subprocess {program} exceeded {secs}s and was killed")]
    Timeout { program: String, secs: u64 },

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

impl GatewayError {
    pub fn policy(reason: impl Into<String>) -> Self {
        Self::PolicyRejected(reason.into())
    }

    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound(what.into())
    }

    pub fn is_authorization(&self) -> bool {
        matches!(self, Self::AuthorizationDenied { .. })
    }
}
