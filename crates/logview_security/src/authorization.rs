//! AuthorizationGate: only the paired client may talk to the service.
//!
//! The check runs on every request. The caller is identified by pid and the
//! canonical path of its executable; uid/gid are deliberately ignored, the
//! boundary is "my own client", not "a privileged user".
//!
//! Identity is never cached: pids are recycled and a pid that was the client
//! a moment ago may be something else now.

use logview_protocol::{GatewayError, Result};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Peer identity resolved for a single request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallerIdentity {
    pub pid: u32,
    pub executable: PathBuf,
}

/// Maps a process id to the canonical path of its executable.
///
/// One implementation per platform mechanism; the gate does not care how
/// the path was obtained.
pub trait IdentityResolver: Send + Sync {
    /// `None` when the process is gone or its executable cannot be read.
    fn executable_of(&self, pid: u32) -> Option<PathBuf>;
}

/// Linux: canonicalize `/proc/<pid>/exe`.
#[derive(Debug, Clone)]
pub struct ProcfsResolver {
    proc_root: PathBuf,
}

impl Default for ProcfsResolver {
    fn default() -> Self {
        Self {
            proc_root: PathBuf::from("/proc"),
        }
    }
}

impl ProcfsResolver {
    /// Resolver rooted somewhere other than `/proc` (tests, containers).
    pub fn with_root(proc_root: impl Into<PathBuf>) -> Self {
        Self {
            proc_root: proc_root.into(),
        }
    }
}

impl IdentityResolver for ProcfsResolver {
    fn executable_of(&self, pid: u32) -> Option<PathBuf> {
        let link = self.proc_root.join(pid.to_string()).join("exe");
        // A deleted binary reads back as "<path> (deleted)" and fails here.
        std::fs::canonicalize(link).ok()
    }
}

/// The single trusted client binary, looked up by name in fixed directories.
#[derive(Debug, Clone)]
pub struct TrustedClient {
    name: String,
    dirs: Vec<PathBuf>,
}

impl TrustedClient {
    pub fn new(name: impl Into<String>, dirs: Vec<PathBuf>) -> Self {
        Self {
            name: name.into(),
            dirs,
        }
    }

    /// Canonical path of the trusted binary, if it is installed.
    ///
    /// Resolved on demand so a package upgrade that moves the binary is
    /// picked up without restarting the service.
    pub fn canonical_path(&self) -> Option<PathBuf> {
        let search = std::env::join_paths(&self.dirs).ok()?;
        let found = which::which_in(&self.name, Some(search), "/").ok()?;
        std::fs::canonicalize(found).ok()
    }
}

/// Decides whether a peer may proceed.
pub struct AuthorizationGate {
    trusted: TrustedClient,
    resolver: Box<dyn IdentityResolver>,
}

impl AuthorizationGate {
    pub fn new(trusted: TrustedClient, resolver: Box<dyn IdentityResolver>) -> Self {
        Self { trusted, resolver }
    }

    /// Authorize the process `pid`, resolving its executable first.
    pub fn authorize(&self, pid: u32) -> Result<CallerIdentity> {
        let executable = self.resolver.executable_of(pid);
        self.authorize_identity(pid, executable.as_deref())
    }

    /// Authorize an already-resolved `(pid, executable)` pair.
    pub fn authorize_identity(&self, pid: u32, executable: Option<&Path>) -> Result<CallerIdentity> {
        let Some(executable) = executable else {
            warn!(pid, "Rejected caller: executable path unresolvable");
            return Err(GatewayError::AuthorizationDenied {
                pid,
                path: String::new(),
            });
        };

        let trusted = self.trusted.canonical_path();
        if trusted.as_deref() != Some(executable) {
            warn!(
                pid,
                executable = %executable.display(),
                trusted = ?trusted,
                "Rejected caller: not the trusted client"
            );
            return Err(GatewayError::AuthorizationDenied {
                pid,
                path: executable.display().to_string(),
            });
        }

        debug!(pid, "Caller authorized");
        Ok(CallerIdentity {
            pid,
            executable: executable.to_path_buf(),
        })
    }
}
