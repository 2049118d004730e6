//! Log Viewer Service Security Module
//!
//! Provides:
//! - **AuthorizationGate**: only the paired client binary may call the service
//! - **PathPolicy**: which paths and pseudo-commands may be read or exported
//! - **Token**: deterministic stream tokens derived from source paths

pub mod authorization;
pub mod path_policy;
pub mod token;

pub use authorization::{AuthorizationGate, CallerIdentity, IdentityResolver, ProcfsResolver, TrustedClient};
pub use path_policy::{PathPolicy, PolicyClass};
pub use token::stream_token;
