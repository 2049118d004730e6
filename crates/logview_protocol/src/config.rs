//! Service configuration loaded from TOML at startup.

use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::defaults;
use crate::error::{GatewayError, Result};
use crate::paths;

/// Which message bus the service attaches to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BusKind {
    System,
    /// Development only; the session bus has no privilege boundary.
    Session,
}

/// Canonical configuration used by the service binary.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServiceConfig {
    /// Executable name of the paired client
    pub trusted_client: String,
    /// Directories searched for `trusted_client`
    pub trusted_dirs: Vec<PathBuf>,
    /// Per-subprocess time bound in seconds (0 = unbounded)
    pub command_timeout_secs: u64,
    /// Ceiling of one stream chunk in bytes
    pub stream_chunk_bytes: usize,
    /// Directory for the service's own rotated logs
    pub log_dir: PathBuf,
    pub bus: BusKind,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            trusted_client: defaults::TRUSTED_CLIENT_NAME.to_string(),
            trusted_dirs: defaults::TRUSTED_CLIENT_DIRS
                .iter()
                .map(PathBuf::from)
                .collect(),
            command_timeout_secs: defaults::COMMAND_TIMEOUT_SECS,
            stream_chunk_bytes: defaults::STREAM_CHUNK_BYTES,
            log_dir: paths::default_service_log_dir(),
            bus: BusKind::System,
        }
    }
}

impl ServiceConfig {
    /// Load from `path`. A missing file means "all defaults".
    pub fn load(path: &Path) -> Result<Self> {
        let text = match std::fs::read_to_string(path) {
            Ok(text) => text,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Self::default()),
            Err(err) => return Err(err.into()),
        };
        Self::from_toml(&text).map_err(|err| {
            GatewayError::Config(format!("{}: {}", path.display(), err))
        })
    }

    pub fn from_toml(text: &str) -> Result<Self> {
        let config: Self =
            toml::from_str(text).map_err(|err| GatewayError::Config(err.to_string()))?;
        if config.stream_chunk_bytes == 0 {
            return Err(GatewayError::Config(
                "stream_chunk_bytes must be positive".to_string(),
            ));
        }
        if config.trusted_client.is_empty() || config.trusted_client.contains('/') {
            return Err(GatewayError::Config(
                "trusted_client must be a bare executable name".to_string(),
            ));
        }
        Ok(config)
    }

    pub fn command_timeout(&self) -> Option<Duration> {
        (self.command_timeout_secs > 0).then(|| Duration::from_secs(self.command_timeout_secs))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_yields_defaults() {
        let config = ServiceConfig::from_toml("").unwrap();
        assert_eq!(config.trusted_client, "deepin-log-viewer");
        assert_eq!(config.trusted_dirs, vec![PathBuf::from("/usr/bin")]);
        assert_eq!(config.stream_chunk_bytes, 10 * 1024 * 1024);
        assert_eq!(config.bus, BusKind::System);
        assert_eq!(config.command_timeout(), Some(Duration::from_secs(300)));
    }

    #[test]
    fn zero_timeout_disables_bound() {
        let config = ServiceConfig::from_toml("command_timeout_secs = 0").unwrap();
        assert_eq!(config.command_timeout(), None);
    }

    #[test]
    fn overrides_are_applied() {
        let config = ServiceConfig::from_toml(
            r#"
trusted_client = "my-viewer"
trusted_dirs = ["/opt/viewer/bin", "/usr/bin"]
bus = "session"
"#,
        )
        .unwrap();
        assert_eq!(config.trusted_client, "my-viewer");
        assert_eq!(config.trusted_dirs.len(), 2);
        assert_eq!(config.bus, BusKind::Session);
    }

    #[test]
    fn rejects_unknown_keys_and_paths_as_client() {
        assert!(ServiceConfig::from_toml("surprise = 1").is_err());
        assert!(ServiceConfig::from_toml("trusted_client = \"/usr/bin/x\"").is_err());
        assert!(ServiceConfig::from_toml("stream_chunk_bytes = 0").is_err());
    }

    #[test]
    fn missing_file_is_default() {
        let dir = tempfile::tempdir().unwrap();
        let config = ServiceConfig::load(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(config.trusted_client, "deepin-log-viewer");
    }
}
