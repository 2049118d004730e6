//! Shared vocabulary for the log viewer service.
//!
//! Everything the privileged service and its paired client must agree on
//! lives here: bus coordinates, size ceilings, the on-disk config format and
//! the error taxonomy every operation reports through.

pub mod config;
pub mod defaults;
pub mod error;
pub mod paths;

pub use config::{BusKind, ServiceConfig};
pub use error::{GatewayError, Result};
