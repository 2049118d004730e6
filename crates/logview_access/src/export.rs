//! Exporter: copy a log file, or capture a catalog command, into a
//! destination directory the caller may write to.

use logview_protocol::{GatewayError, Result};
use logview_security::PathPolicy;
use std::fs::{self, File};
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

use crate::catalog::CommandCatalog;
use crate::exec::CommandRunner;

/// Mode given to every exported file so the desktop user can open it.
pub const EXPORT_FILE_MODE: u32 = 0o666;

pub struct Exporter {
    policy: PathPolicy,
    catalog: CommandCatalog,
    runner: Arc<dyn CommandRunner>,
}

impl Exporter {
    pub fn new(policy: PathPolicy, catalog: CommandCatalog, runner: Arc<dyn CommandRunner>) -> Self {
        Self {
            policy,
            catalog,
            runner,
        }
    }

    /// Export `source` into `destination_dir`; returns the written file.
    ///
    /// With `is_file`, `source` is a path copied verbatim. Otherwise it is a
    /// catalog key or a JSON journal filter whose command output (stderr
    /// included) becomes `<name>.log`. A failing command leaves whatever it
    /// wrote in place.
    pub fn export(
        &self,
        destination_dir: &str,
        source: &str,
        is_file: bool,
        whitelist: &[impl AsRef<Path>],
    ) -> Result<PathBuf> {
        if source.is_empty() {
            return Err(GatewayError::policy("empty export source"));
        }
        let destination = Path::new(destination_dir);
        if !destination.is_dir() {
            return Err(GatewayError::not_found(destination_dir));
        }
        if !self.policy.can_export_to(destination_dir, whitelist) {
            return Err(GatewayError::policy(format!(
                "export destination {} is not whitelisted",
                destination_dir
            )));
        }

        let target = if is_file {
            self.copy_file(destination, source)?
        } else {
            self.capture_command(destination, source)?
        };
        info!(source, target = %target.display(), "Exported");
        Ok(target)
    }

    fn copy_file(&self, destination: &Path, source: &str) -> Result<PathBuf> {
        if !self.policy.can_export_source(source) {
            return Err(GatewayError::policy(format!("export source {} is not allowed", source)));
        }
        let source = Path::new(source);
        if !source.is_file() {
            warn!(source = %source.display(), "Export source is not a regular file");
            return Err(GatewayError::not_found(source.display().to_string()));
        }
        // can_export_source has already vetted the file name.
        let name = source
            .file_name()
            .ok_or_else(|| GatewayError::policy("export source has no file name"))?;
        let target = destination.join(name);
        fs::copy(source, &target)?;
        set_export_mode(&target)?;
        Ok(target)
    }

    fn capture_command(&self, destination: &Path, request: &str) -> Result<PathBuf> {
        let export = self.catalog.resolve_export(request)?;
        let target = destination.join(&export.output_name);
        let file = File::create(&target)?;
        let result = self.runner.run_to_file(&export.command, file, true);
        set_export_mode(&target)?;

        let output = result?;
        if !output.success() {
            return Err(GatewayError::Subprocess {
                program: export.command.program,
                reason: format!("exit code {:?}", output.code),
            });
        }
        Ok(target)
    }
}

fn set_export_mode(path: &Path) -> Result<()> {
    fs::set_permissions(path, fs::Permissions::from_mode(EXPORT_FILE_MODE))?;
    Ok(())
}
