//! Privileged log access gateway.
//!
//! [`Gateway`] holds the authorization gate and every access component;
//! [`service`] exposes it on the system bus.

pub mod gateway;
pub mod service;

pub use gateway::{Gateway, GatewayParts};
pub use service::{serve, LogViewerService, ServiceError};
