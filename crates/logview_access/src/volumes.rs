//! Export destinations: user homes, writable removable media, SMB shares and
//! the temp dir.
//!
//! Mount enumeration sits behind [`VolumeMonitor`] so the whitelist can be
//! computed against a fixed mount table in tests.

use logview_protocol::paths;
use regex::Regex;
use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, LazyLock};
use tracing::{debug, warn};
use url::Url;

const PROC_MOUNTS: &str = "/proc/self/mounts";
const MEDIA_ROOT: &str = "/media/";
/// Schemes of removable devices whose default location may be written to.
const DEVICE_SCHEMES: &[&str] = &["file", "gphoto2", "mtp"];

// Network shares: CIFS mounted by the file manager, or gvfs FUSE roots.
static CIFS_SHARE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^file:///media/(.*)/smbmounts").unwrap()
});
static GVFS_SHARE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^file:///run/user/(.*)/gvfs|^file:///root/\.gvfs").unwrap()
});

/// One mounted volume as reported by the platform.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MountEntry {
    /// Root URI, e.g. `file:///media/alice/USB`
    pub root: Url,
    pub default_location: Option<PathBuf>,
}

impl MountEntry {
    pub fn new(root: Url, default_location: Option<PathBuf>) -> Self {
        Self {
            root,
            default_location,
        }
    }

    /// A plain local mount rooted at `path`; `None` unless `path` is absolute.
    pub fn local(path: impl Into<PathBuf>) -> Option<Self> {
        let path = path.into();
        let root = Url::from_file_path(&path).ok()?;
        Some(Self::new(root, Some(path)))
    }

    pub fn scheme(&self) -> &str {
        self.root.scheme()
    }
}

pub trait VolumeMonitor: Send + Sync {
    fn mounts(&self) -> Vec<MountEntry>;
}

/// Mount table read from procfs, limited to user-visible volumes.
pub struct ProcMountsMonitor {
    mounts_file: PathBuf,
}

impl ProcMountsMonitor {
    pub fn new() -> Self {
        Self {
            mounts_file: PathBuf::from(PROC_MOUNTS),
        }
    }

    pub fn with_mounts_file(path: impl Into<PathBuf>) -> Self {
        Self {
            mounts_file: path.into(),
        }
    }
}

impl Default for ProcMountsMonitor {
    fn default() -> Self {
        Self::new()
    }
}

impl VolumeMonitor for ProcMountsMonitor {
    fn mounts(&self) -> Vec<MountEntry> {
        let table = match fs::read_to_string(&self.mounts_file) {
            Ok(table) => table,
            Err(err) => {
                warn!(file = %self.mounts_file.display(), error = %err, "Cannot read mount table");
                return Vec::new();
            }
        };
        table
            .lines()
            .filter_map(|line| line.split_whitespace().nth(1))
            .map(unescape_mount_field)
            .filter(|mount_point| is_user_volume(mount_point))
            .filter_map(MountEntry::local)
            .collect()
    }
}

fn is_user_volume(mount_point: &str) -> bool {
    mount_point.starts_with(MEDIA_ROOT)
        || (mount_point.starts_with("/run/user/") && mount_point.ends_with("/gvfs"))
}

/// Undo the octal escapes procfs applies to mount fields (`\040` etc.).
fn unescape_mount_field(field: &str) -> String {
    let bytes = field.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'\\' && i + 3 < bytes.len() {
            if let Some(code) = parse_radix(&bytes[i + 1..i + 4], 8) {
                out.push(code);
                i += 4;
                continue;
            }
        }
        out.push(bytes[i]);
        i += 1;
    }
    String::from_utf8_lossy(&out).into_owned()
}

fn parse_radix(digits: &[u8], radix: u32) -> Option<u8> {
    std::str::from_utf8(digits)
        .ok()
        .and_then(|digits| u8::from_str_radix(digits, radix).ok())
}

/// Local path of a `file://` URI, percent-decoded.
fn local_path_of(uri: &str) -> Option<PathBuf> {
    Url::parse(uri).ok()?.to_file_path().ok()
}

/// Owner-writable, the way the file manager decides a volume is usable.
fn is_user_writable(path: &Path) -> bool {
    fs::metadata(path)
        .map(|m| m.permissions().mode() & 0o200 != 0)
        .unwrap_or(false)
}

/// Computes the export-destination whitelist on demand.
pub struct ExportWhitelist {
    monitor: Arc<dyn VolumeMonitor>,
    home_root: PathBuf,
    temp_root: PathBuf,
}

impl ExportWhitelist {
    pub fn new(monitor: Arc<dyn VolumeMonitor>) -> Self {
        Self {
            monitor,
            home_root: PathBuf::from(paths::HOME_ROOT),
            temp_root: PathBuf::from(paths::TEMP_ROOT),
        }
    }

    pub fn with_roots(mut self, home_root: impl Into<PathBuf>, temp_root: impl Into<PathBuf>) -> Self {
        self.home_root = home_root.into();
        self.temp_root = temp_root.into();
        self
    }

    /// Home directories, then external volumes, then the temp dir.
    pub fn paths(&self) -> Vec<PathBuf> {
        let mut paths = self.home_paths();
        paths.extend(self.external_paths());
        paths.push(self.temp_root.clone());
        debug!(count = paths.len(), "Export whitelist computed");
        paths
    }

    /// Every real directory directly under the home root.
    pub fn home_paths(&self) -> Vec<PathBuf> {
        let Ok(entries) = fs::read_dir(&self.home_root) else {
            return Vec::new();
        };
        let mut homes: Vec<PathBuf> = entries
            .flatten()
            .filter(|entry| entry.file_type().map(|t| t.is_dir()).unwrap_or(false))
            .map(|entry| entry.path())
            .collect();
        homes.sort();
        homes
    }

    /// Writable SMB shares and removable devices mounted under `/media`.
    pub fn external_paths(&self) -> Vec<PathBuf> {
        let mut paths = Vec::new();
        for mount in self.monitor.mounts() {
            let uri = mount.root.as_str();
            if CIFS_SHARE.is_match(uri) || GVFS_SHARE.is_match(uri) {
                if let Some(path) = local_path_of(uri).filter(|p| is_user_writable(p)) {
                    paths.push(path);
                }
            }

            if DEVICE_SCHEMES.contains(&mount.scheme()) {
                if let Some(location) = mount
                    .default_location
                    .as_ref()
                    .filter(|p| p.to_string_lossy().starts_with(MEDIA_ROOT))
                    .filter(|p| is_user_writable(p))
                {
                    if !paths.contains(location) {
                        paths.push(location.clone());
                    }
                }
            }
        }
        paths
    }
}
