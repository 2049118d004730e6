//! Gateway: every externally reachable operation, authorize-then-dispatch.
//!
//! Each method takes the caller's pid and runs the authorization gate before
//! anything else. There is no session: a caller authorized for one call is
//! checked again on the next. All methods block and are meant to be called
//! from `spawn_blocking`.

use logview_access::sources::remove_files_with_suffix;
use logview_access::{
    CommandCatalog, CommandRunner, Diagnostic, ExportWhitelist, Exporter, LineIndexer,
    LogReader, LogSourceResolver, ProcMountsMonitor, ReadRequest, StreamRegistry, SystemRunner,
    TempWorkspace, VolumeMonitor,
};
use logview_protocol::defaults::CORE_DUMP_TEMP_SUFFIX;
use logview_protocol::{paths, GatewayError, Result, ServiceConfig};
use logview_security::{AuthorizationGate, IdentityResolver, PathPolicy, ProcfsResolver, TrustedClient};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

/// Platform collaborators the gateway is assembled from.
pub struct GatewayParts {
    pub identity: Box<dyn IdentityResolver>,
    pub runner: Arc<dyn CommandRunner>,
    pub volumes: Arc<dyn VolumeMonitor>,
    pub workspace: Arc<TempWorkspace>,
    /// Directory swept for stray core extracts on shutdown
    pub temp_root: PathBuf,
}

impl GatewayParts {
    /// Real procfs, subprocesses and mount table.
    pub fn system(config: &ServiceConfig) -> Self {
        Self {
            identity: Box::new(ProcfsResolver::default()),
            runner: Arc::new(SystemRunner::new(config.command_timeout())),
            volumes: Arc::new(ProcMountsMonitor::new()),
            workspace: Arc::new(TempWorkspace::new()),
            temp_root: PathBuf::from(paths::TEMP_ROOT),
        }
    }
}

pub struct Gateway {
    gate: AuthorizationGate,
    policy: PathPolicy,
    runner: Arc<dyn CommandRunner>,
    lines: LineIndexer,
    reader: LogReader,
    streams: StreamRegistry,
    sources: LogSourceResolver,
    exporter: Exporter,
    whitelist: ExportWhitelist,
    workspace: Arc<TempWorkspace>,
    temp_root: PathBuf,
}

impl Gateway {
    pub fn new(config: &ServiceConfig) -> Self {
        Self::from_parts(config, GatewayParts::system(config))
    }

    pub fn from_parts(config: &ServiceConfig, parts: GatewayParts) -> Self {
        let trusted = TrustedClient::new(config.trusted_client.clone(), config.trusted_dirs.clone());
        let policy = PathPolicy::default();
        let runner = parts.runner;
        Self {
            gate: AuthorizationGate::new(trusted, parts.identity),
            lines: LineIndexer::new(runner.clone()),
            reader: LogReader::new(runner.clone()),
            streams: StreamRegistry::new(config.stream_chunk_bytes),
            sources: LogSourceResolver::new(runner.clone(), parts.workspace.clone()),
            exporter: Exporter::new(policy.clone(), CommandCatalog::default(), runner.clone()),
            whitelist: ExportWhitelist::new(parts.volumes),
            workspace: parts.workspace,
            temp_root: parts.temp_root,
            policy,
            runner,
        }
    }

    /// Whole content of a file or the output of a pseudo-command.
    pub fn read_log(&self, pid: u32, request: &str) -> Result<String> {
        self.gate.authorize(pid)?;
        if !self.policy.can_read(request) {
            return Err(rejected("read", request));
        }
        self.reader.read(&ReadRequest::parse(request)?)
    }

    /// `count` lines from `start`; with `reverse`, `start` counts from the end.
    pub fn read_range(
        &self,
        pid: u32,
        path: &str,
        start: u64,
        count: u64,
        reverse: bool,
    ) -> Result<Vec<String>> {
        self.gate.authorize(pid)?;
        self.require_readable_file(path)?;
        self.lines.read_range(Path::new(path), start, count, reverse)
    }

    pub fn line_count(&self, pid: u32, path: &str) -> Result<u64> {
        self.gate.authorize(pid)?;
        self.require_readable_file(path)?;
        self.lines.line_count(Path::new(path))
    }

    pub fn file_size(&self, pid: u32, path: &str) -> Result<u64> {
        self.gate.authorize(pid)?;
        self.require_inspectable(path)?;
        let metadata = std::fs::metadata(path).map_err(|err| match err.kind() {
            std::io::ErrorKind::NotFound => GatewayError::not_found(path),
            _ => err.into(),
        })?;
        Ok(metadata.len())
    }

    pub fn file_exists(&self, pid: u32, path: &str) -> Result<bool> {
        self.gate.authorize(pid)?;
        self.require_inspectable(path)?;
        Ok(Path::new(path).exists())
    }

    /// Buffer what `read_log` would return for chunked reading; returns the
    /// stream token.
    pub fn open_stream(&self, pid: u32, request: &str) -> Result<String> {
        self.gate.authorize(pid)?;
        if !self.policy.can_read(request) {
            return Err(rejected("read", request));
        }
        let text = self.reader.read(&ReadRequest::parse(request)?)?;
        Ok(self.streams.open(request, text))
    }

    /// Next chunk of an open stream; empty once drained or unknown.
    pub fn read_stream_chunk(&self, pid: u32, token: &str) -> Result<String> {
        self.gate.authorize(pid)?;
        Ok(self.streams.read_chunk(token))
    }

    pub fn resolve_sources(&self, pid: u32, category: &str, unzip: bool) -> Result<Vec<PathBuf>> {
        self.gate.authorize(pid)?;
        if LogSourceResolver::is_app_category(category) {
            self.require_readable_file(category)?;
        }
        let files = self.sources.resolve(category, unzip);
        debug!(category, unzip, count = files.len(), "Resolved log sources");
        Ok(files)
    }

    pub fn resolve_other_sources(&self, pid: u32, path: &str, unzip: bool) -> Result<Vec<PathBuf>> {
        self.gate.authorize(pid)?;
        self.require_readable_file(path)?;
        Ok(self.sources.resolve_other(path, unzip))
    }

    pub fn export(&self, pid: u32, destination_dir: &str, source: &str, is_file: bool) -> Result<PathBuf> {
        self.gate.authorize(pid)?;
        let whitelist = self.whitelist.paths();
        self.exporter.export(destination_dir, source, is_file, &whitelist)
    }

    pub fn run_diagnostic(&self, pid: u32, key: &str) -> Result<String> {
        self.gate.authorize(pid)?;
        let diagnostic = Diagnostic::from_key(key).ok_or_else(|| rejected("diagnostic", key))?;
        self.reader.diagnostic(diagnostic)
    }

    pub fn whitelist_paths(&self, pid: u32) -> Result<Vec<PathBuf>> {
        self.gate.authorize(pid)?;
        Ok(self.whitelist.paths())
    }

    /// Exit status of the last subprocess the service ran.
    pub fn exit_code(&self, pid: u32) -> Result<i32> {
        self.gate.authorize(pid)?;
        Ok(self.runner.last_exit_code())
    }

    /// Gate for the `quit` call; the caller performs the actual shutdown.
    pub fn authorize_quit(&self, pid: u32) -> Result<()> {
        self.gate.authorize(pid)?;
        info!(pid, "Shutdown requested");
        Ok(())
    }

    /// Remove everything the service left in temp storage.
    pub fn cleanup(&self) {
        self.workspace.close();
        let removed = remove_files_with_suffix(&self.temp_root, CORE_DUMP_TEMP_SUFFIX);
        if removed > 0 {
            info!(removed, "Removed core dump extracts");
        }
    }

    fn require_readable_file(&self, path: &str) -> Result<()> {
        if self.policy.can_read_file(path) {
            Ok(())
        } else {
            Err(rejected("read", path))
        }
    }

    fn require_inspectable(&self, path: &str) -> Result<()> {
        if self.policy.can_inspect(path) {
            Ok(())
        } else {
            Err(rejected("inspect", path))
        }
    }
}

fn rejected(operation: &str, request: &str) -> GatewayError {
    debug!(operation, request, "Rejected by path policy");
    GatewayError::policy(format!("{} of {:?}", operation, request))
}
