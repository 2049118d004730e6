//! CommandCatalog: symbolic log sources and the commands that produce them.
//!
//! The table is fixed at construction and never mutated afterwards.

use logview_protocol::{GatewayError, Result};
use logview_security::path_policy::is_safe_file_name;
use serde::Deserialize;
use std::collections::HashMap;

use crate::exec::CommandLine;

/// Fixed diagnostics callable by key (`executeCmd`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Diagnostic {
    /// Raw `coredumpctl list` output
    CoredumpList,
    /// Number of lines of `coredumpctl list`
    CoredumpListCount,
}

impl Diagnostic {
    pub fn from_key(key: &str) -> Option<Self> {
        match key {
            "coredumpctl-list" => Some(Self::CoredumpList),
            "coredumpctl-list-count" => Some(Self::CoredumpListCount),
            _ => None,
        }
    }

    pub fn command(self) -> CommandLine {
        CommandLine::new("coredumpctl").args(["list", "--no-pager"])
    }
}

/// Structured journal filter sent by the client instead of a catalog key.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct JournalFilter {
    /// Module name; names the output file and is the identifier fallback
    pub name: String,
    /// `CODE_CATEGORY` match
    pub filter: String,
    /// `_EXE` match
    #[serde(rename = "execPath")]
    pub exec_path: String,
}

impl JournalFilter {
    /// Build the `journalctl` query.
    ///
    /// Executable and category filters compose; with neither present the
    /// module name is matched as syslog identifier.
    pub fn to_command(&self) -> Result<CommandLine> {
        if !is_safe_output_stem(&self.name) {
            return Err(GatewayError::policy(format!(
                "journal filter name {:?} cannot name an output file",
                self.name
            )));
        }
        let mut matches = Vec::new();
        if !self.exec_path.is_empty() {
            matches.push(format!("_EXE={}", self.exec_path));
        }
        if !self.filter.is_empty() {
            matches.push(format!("CODE_CATEGORY={}", self.filter));
        }
        if matches.is_empty() {
            matches.push(format!("SYSLOG_IDENTIFIER={}", self.name));
        }
        Ok(CommandLine::new("journalctl").args(matches).arg("-r"))
    }
}

/// A command to export plus the file name its output goes to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportCommand {
    pub command: CommandLine,
    pub output_name: String,
}

#[derive(Debug, Clone)]
pub struct CommandCatalog {
    entries: HashMap<&'static str, CommandLine>,
}

impl Default for CommandCatalog {
    fn default() -> Self {
        let entries = [
            ("dmesg", CommandLine::new("dmesg").arg("-r")),
            ("last", CommandLine::new("last").arg("-x")),
            ("journalctl_system", CommandLine::new("journalctl").arg("-r")),
            ("journalctl_boot", CommandLine::new("journalctl").args(["-b", "-r"])),
            ("journalctl_app", CommandLine::new("journalctl")),
        ]
        .into_iter()
        .collect();
        Self { entries }
    }
}

impl CommandCatalog {
    pub fn resolve(&self, key: &str) -> Option<&CommandLine> {
        self.entries.get(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.entries.keys().copied()
    }

    /// Interpret an export request: a JSON journal filter or a catalog key.
    ///
    /// A JSON object that does not describe a valid filter is rejected, it
    /// is never retried as a key.
    pub fn resolve_export(&self, request: &str) -> Result<ExportCommand> {
        if let Ok(serde_json::Value::Object(object)) = serde_json::from_str::<serde_json::Value>(request) {
            let filter: JournalFilter = serde_json::from_value(serde_json::Value::Object(object))
                .map_err(|err| GatewayError::policy(format!("unparsable journal filter: {}", err)))?;
            let command = filter.to_command()?;
            return Ok(ExportCommand {
                command,
                output_name: format!("{}.log", filter.name),
            });
        }

        let command = self
            .resolve(request)
            .cloned()
            .ok_or_else(|| GatewayError::policy(format!("unknown command key {:?}", request)))?;
        Ok(ExportCommand {
            command,
            output_name: format!("{}.log", request),
        })
    }
}

fn is_safe_output_stem(name: &str) -> bool {
    is_safe_file_name(name) && !name.contains('/') && !name.contains("..") && !name.starts_with('.')
}
