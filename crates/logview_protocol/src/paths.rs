use std::path::PathBuf;

/// Root of the system log tree.
pub const SYSTEM_LOG_DIR: &str = "/var/log";
/// Audit subsystem logs.
pub const AUDIT_LOG_DIR: &str = "/var/log/audit";
/// Where systemd-coredump stores captured cores.
pub const COREDUMP_STORE_DIR: &str = "/var/lib/systemd/coredump";
/// Parent of every regular user's home.
pub const HOME_ROOT: &str = "/home";
/// Superuser home; some installations log in as root directly.
pub const ROOT_HOME: &str = "/root";
/// Shared temp tree.
pub const TEMP_ROOT: &str = "/tmp";

/// Resolve the service config file.
///
/// Priority:
/// 1) LOGVIEW_CONFIG
/// 2) /etc/logview/service.toml
pub fn default_config_path() -> PathBuf {
    if let Ok(override_path) = std::env::var("LOGVIEW_CONFIG") {
        return PathBuf::from(override_path);
    }
    PathBuf::from("/etc/logview/service.toml")
}

/// Default directory for the service's own logs.
pub fn default_service_log_dir() -> PathBuf {
    PathBuf::from(SYSTEM_LOG_DIR).join("logview-service")
}
