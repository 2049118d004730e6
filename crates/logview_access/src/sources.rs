//! LogSourceResolver: from a logical log category to concrete files.
//!
//! Listings never follow symlinks and are ordered newest-modified first.
//! With `unzip`, `.gz` members are decompressed into the process temp
//! workspace and the extracted copy is returned in place of the archive. A
//! member that fails to decompress is dropped from the result; the rest of
//! the batch still comes back.

use glob::Pattern;
use logview_protocol::defaults::{EXTRACT_FILE_PREFIX, EXTRACT_FILE_SUFFIX};
use logview_protocol::{paths, Result};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::SystemTime;
use tempfile::TempDir;
use tracing::{debug, warn};

use crate::exec::{CommandLine, CommandRunner};

/// Category that lists the audit subsystem's logs.
pub const AUDIT_CATEGORY: &str = "audit";
/// Category that lists captured cores via coredumpctl.
pub const COREDUMP_CATEGORY: &str = "coredump";

/// Process-scoped directory for decompressed archives.
///
/// Created on first use, emptied before each decompression batch and
/// removed on [`TempWorkspace::close`] or drop. The lock is held for the
/// whole batch, so one batch never purges files another is still writing.
pub struct TempWorkspace {
    base: PathBuf,
    dir: Mutex<Option<TempDir>>,
}

impl TempWorkspace {
    pub fn new() -> Self {
        Self::in_dir(paths::TEMP_ROOT)
    }

    pub fn in_dir(base: impl Into<PathBuf>) -> Self {
        Self {
            base: base.into(),
            dir: Mutex::new(None),
        }
    }

    /// Run `batch` against the emptied workspace directory.
    pub fn with_fresh_dir<R>(&self, batch: impl FnOnce(&Path) -> R) -> Result<R> {
        let mut guard = self.dir.lock().unwrap_or_else(PoisonError::into_inner);
        if guard.is_none() {
            let dir = tempfile::Builder::new()
                .prefix("logview-")
                .tempdir_in(&self.base)?;
            debug!(dir = %dir.path().display(), "Temp workspace created");
            *guard = Some(dir);
        }
        let dir = guard
            .as_ref()
            .map(|dir| dir.path().to_path_buf())
            .ok_or_else(|| std::io::Error::new(std::io::ErrorKind::Other, "temp workspace unavailable"))?;
        purge_files(&dir);
        Ok(batch(&dir))
    }

    pub fn path(&self) -> Option<PathBuf> {
        self.dir
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .map(|dir| dir.path().to_path_buf())
    }

    /// Remove the workspace and everything in it.
    pub fn close(&self) {
        let dir = self.dir.lock().unwrap_or_else(PoisonError::into_inner).take();
        if let Some(dir) = dir {
            let path = dir.path().to_path_buf();
            if let Err(err) = dir.close() {
                warn!(dir = %path.display(), error = %err, "Failed to remove temp workspace");
            }
        }
    }
}

impl Default for TempWorkspace {
    fn default() -> Self {
        Self::new()
    }
}

/// Delete regular files directly inside `dir`; subdirectories are left alone.
pub fn purge_files(dir: &Path) {
    let Ok(entries) = fs::read_dir(dir) else {
        return;
    };
    for entry in entries.flatten() {
        if entry.file_type().map(|t| t.is_file()).unwrap_or(false) {
            if let Err(err) = fs::remove_file(entry.path()) {
                warn!(file = %entry.path().display(), error = %err, "Failed to remove temp file");
            }
        }
    }
}

/// Delete files in `dir` whose names end with `suffix`.
pub fn remove_files_with_suffix(dir: &Path, suffix: &str) -> usize {
    let Ok(entries) = fs::read_dir(dir) else {
        return 0;
    };
    entries
        .flatten()
        .filter(|entry| entry.file_type().map(|t| t.is_file()).unwrap_or(false))
        .filter(|entry| entry.file_name().to_string_lossy().ends_with(suffix))
        .filter(|entry| fs::remove_file(entry.path()).is_ok())
        .count()
}

/// Filters applied to a directory listing.
#[derive(Debug, Clone, Default)]
struct Listing {
    pattern: Option<Pattern>,
    include_hidden: bool,
}

impl Listing {
    fn named(prefix: &str, wildcard: &str) -> Self {
        let pattern = Pattern::new(&format!("{}{}", Pattern::escape(prefix), wildcard)).ok();
        Self {
            pattern,
            include_hidden: false,
        }
    }

    /// Regular files in `dir` that pass the filters, newest first.
    fn run(&self, dir: &Path) -> Vec<PathBuf> {
        let Ok(entries) = fs::read_dir(dir) else {
            return Vec::new();
        };
        let mut files: Vec<(SystemTime, PathBuf)> = entries
            .flatten()
            .filter(|entry| entry.file_type().map(|t| t.is_file()).unwrap_or(false))
            .filter(|entry| {
                let name = entry.file_name();
                let name = name.to_string_lossy();
                (self.include_hidden || !name.starts_with('.'))
                    && self.pattern.as_ref().map_or(true, |p| p.matches(&name))
            })
            .map(|entry| {
                let modified = entry
                    .metadata()
                    .and_then(|m| m.modified())
                    .unwrap_or(SystemTime::UNIX_EPOCH);
                (modified, entry.path())
            })
            .collect();
        files.sort_by(|a, b| b.0.cmp(&a.0).then_with(|| a.1.cmp(&b.1)));
        files.into_iter().map(|(_, path)| path).collect()
    }
}

pub struct LogSourceResolver {
    runner: Arc<dyn CommandRunner>,
    workspace: Arc<TempWorkspace>,
    log_root: PathBuf,
    audit_dir: PathBuf,
}

impl LogSourceResolver {
    pub fn new(runner: Arc<dyn CommandRunner>, workspace: Arc<TempWorkspace>) -> Self {
        Self {
            runner,
            workspace,
            log_root: PathBuf::from(paths::SYSTEM_LOG_DIR),
            audit_dir: PathBuf::from(paths::AUDIT_LOG_DIR),
        }
    }

    /// Point the system and audit listings elsewhere (tests, chroots).
    pub fn with_roots(mut self, log_root: impl Into<PathBuf>, audit_dir: impl Into<PathBuf>) -> Self {
        self.log_root = log_root.into();
        self.audit_dir = audit_dir.into();
        self
    }

    /// Categories naming an application's own log file or directory.
    pub fn is_app_category(category: &str) -> bool {
        let lower = category.to_lowercase();
        lower.contains("deepin") || lower.contains("uos")
    }

    /// Files backing a log category.
    pub fn resolve(&self, category: &str, unzip: bool) -> Vec<PathBuf> {
        let files = if Self::is_app_category(category) {
            self.app_logs(Path::new(category))
        } else if category == AUDIT_CATEGORY {
            Listing::named(AUDIT_CATEGORY, ".*").run(&self.audit_dir)
        } else if category == COREDUMP_CATEGORY {
            return self.coredump_storage_paths();
        } else {
            Listing::named(category, ".*").run(&self.log_root)
        };
        self.maybe_unzip(files, unzip)
    }

    /// Files next to an arbitrary path: siblings sharing its name as prefix,
    /// or every file (hidden included) of a directory.
    pub fn resolve_other(&self, path: &str, unzip: bool) -> Vec<PathBuf> {
        let target = Path::new(path);
        let files = if target.is_file() {
            let (Some(dir), Some(name)) = (target.parent(), target.file_name()) else {
                return Vec::new();
            };
            let mut listing = Listing::named(&name.to_string_lossy(), "*");
            listing.include_hidden = true;
            listing.run(dir)
        } else if target.is_dir() {
            Listing {
                pattern: None,
                include_hidden: true,
            }
            .run(target)
        } else {
            debug!(path, "Other log source does not exist");
            return Vec::new();
        };
        self.maybe_unzip(files, unzip)
    }

    fn app_logs(&self, target: &Path) -> Vec<PathBuf> {
        let app_dir = if target.is_file() {
            match target.parent() {
                Some(dir) => dir.to_path_buf(),
                None => return Vec::new(),
            }
        } else if target.is_dir() {
            target.to_path_buf()
        } else {
            return Vec::new();
        };

        let dir_name = app_dir
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let files = Listing::named(&dir_name, ".*").run(&app_dir);
        if !files.is_empty() {
            return files;
        }
        // Directory named differently from the log: match by the file's own stem.
        Listing::named(&complete_base_name(target), ".*").run(&app_dir)
    }

    /// Storage paths of captured cores, most recent first.
    pub fn coredump_storage_paths(&self) -> Vec<PathBuf> {
        let listing = match self
            .runner
            .output(&CommandLine::new("coredumpctl").args(["list", "--no-pager"]))
        {
            Ok(output) => output.stdout_text(),
            Err(err) => {
                warn!(error = %err, "coredumpctl list failed");
                return Vec::new();
            }
        };
        let listing = listing.replace(['\0', '\u{1}'], "");

        let mut storage = Vec::new();
        for pid in listing.lines().rev().filter_map(present_core_pid) {
            let info = match self
                .runner
                .output(&CommandLine::new("coredumpctl").args(["info", pid, "--no-pager"]))
            {
                Ok(output) => output.stdout_text(),
                Err(err) => {
                    warn!(pid, error = %err, "coredumpctl info failed");
                    continue;
                }
            };
            if let Some(path) = storage_field(&info) {
                storage.push(PathBuf::from(path));
            }
        }
        storage
    }

    fn maybe_unzip(&self, files: Vec<PathBuf>, unzip: bool) -> Vec<PathBuf> {
        if !unzip {
            return files;
        }
        let batch = self.workspace.with_fresh_dir(|dir| {
            files
                .iter()
                .filter_map(|file| {
                    if is_gzip(file) {
                        self.decompress(file, dir)
                    } else {
                        Some(file.clone())
                    }
                })
                .collect::<Vec<_>>()
        });
        match batch {
            Ok(resolved) => resolved,
            Err(err) => {
                // No workspace: archives cannot be served, plain files still can.
                warn!(error = %err, "Temp workspace unavailable, skipping archives");
                files.into_iter().filter(|f| !is_gzip(f)).collect()
            }
        }
    }

    fn decompress(&self, source: &Path, dir: &Path) -> Option<PathBuf> {
        let temp = tempfile::Builder::new()
            .prefix(EXTRACT_FILE_PREFIX)
            .suffix(EXTRACT_FILE_SUFFIX)
            .rand_bytes(6)
            .tempfile_in(dir);
        let (file, target) = match temp.map(|t| t.keep()) {
            Ok(Ok(kept)) => kept,
            Ok(Err(err)) => {
                warn!(source = %source.display(), error = %err, "Failed to keep temp file");
                return None;
            }
            Err(err) => {
                warn!(source = %source.display(), error = %err, "Failed to create temp file");
                return None;
            }
        };

        let command = CommandLine::new("gunzip")
            .arg("-c")
            .arg(source.to_string_lossy());
        match self.runner.run_to_file(&command, file, false) {
            Ok(output) if output.success() => Some(target),
            Ok(output) => {
                warn!(source = %source.display(), code = ?output.code, "gunzip failed");
                let _ = fs::remove_file(&target);
                None
            }
            Err(err) => {
                warn!(source = %source.display(), error = %err, "gunzip could not run");
                let _ = fs::remove_file(&target);
                None
            }
        }
    }
}

/// PID of a `coredumpctl list` row whose core file is still present.
///
/// Rows look like
/// `Mon 2024-01-01 10:00:00 CST  1234  1000  1000 SIGSEGV present /usr/bin/app 1.2M`;
/// header and short rows are skipped.
fn present_core_pid(row: &str) -> Option<&str> {
    let columns: Vec<&str> = row.split_whitespace().collect();
    if columns.len() < 10 || columns[8] == "missing" {
        return None;
    }
    let pid = columns[4];
    pid.parse::<u32>().ok().map(|_| pid)
}

/// Value of the `Storage:` field in `coredumpctl info` output.
fn storage_field(info: &str) -> Option<&str> {
    let start = info.find("Storage: ")? + "Storage: ".len();
    let value = info[start..].split_whitespace().next()?;
    (value != "missing" && value != "none").then_some(value)
}

fn is_gzip(path: &Path) -> bool {
    path.extension()
        .map(|ext| ext.eq_ignore_ascii_case("gz"))
        .unwrap_or(false)
}

/// File name without its last extension (`a.b.log` -> `a.b`).
fn complete_base_name(path: &Path) -> String {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    match name.rfind('.') {
        Some(0) | None => name,
        Some(dot) => name[..dot].to_string(),
    }
}
