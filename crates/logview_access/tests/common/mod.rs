//! Shared fixtures: a command runner that replays canned output.

#![allow(dead_code)]

use logview_access::{CommandLine, CommandOutput, CommandRunner};
use logview_protocol::{GatewayError, Result};
use std::collections::HashMap;
use std::fs::File;
use std::io::Write;
use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::Mutex;

/// Replays scripted `(exit code, stdout)` pairs keyed by the full command line.
/// Unscripted commands fail as if the program were missing.
#[derive(Default)]
pub struct ScriptedRunner {
    responses: HashMap<String, (i32, Vec<u8>)>,
    calls: Mutex<Vec<String>>,
    last_code: AtomicI32,
}

impl ScriptedRunner {
    pub fn new() -> Self {
        Self {
            last_code: AtomicI32::new(-1),
            ..Default::default()
        }
    }

    pub fn respond(mut self, command: impl Into<String>, code: i32, stdout: impl AsRef<[u8]>) -> Self {
        self.responses
            .insert(command.into(), (code, stdout.as_ref().to_vec()));
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn lookup(&self, command: &CommandLine) -> Result<(i32, Vec<u8>)> {
        let key = command.to_string();
        self.calls.lock().unwrap().push(key.clone());
        let (code, stdout) = self
            .responses
            .get(&key)
            .cloned()
            .ok_or_else(|| GatewayError::Subprocess {
                program: command.program.clone(),
                reason: "not scripted".to_string(),
            })?;
        self.last_code.store(code, Ordering::Relaxed);
        Ok((code, stdout))
    }
}

impl CommandRunner for ScriptedRunner {
    fn output(&self, command: &CommandLine) -> Result<CommandOutput> {
        let (code, stdout) = self.lookup(command)?;
        Ok(CommandOutput {
            code: Some(code),
            stdout,
        })
    }

    fn run_to_file(&self, command: &CommandLine, mut file: File, _merge_stderr: bool) -> Result<CommandOutput> {
        let (code, stdout) = self.lookup(command)?;
        file.write_all(&stdout)?;
        Ok(CommandOutput {
            code: Some(code),
            stdout: Vec::new(),
        })
    }

    fn last_exit_code(&self) -> i32 {
        self.last_code.load(Ordering::Relaxed)
    }
}

/// Scratch directory under `/tmp`, inside the default read and export roots.
pub fn scratch_dir() -> tempfile::TempDir {
    tempfile::Builder::new()
        .prefix("logview-test-")
        .tempdir_in("/tmp")
        .expect("Failed to create scratch dir")
}

/// Write `content` to `path` and stamp it `age_secs` into the past.
pub fn write_aged(path: &std::path::Path, content: &str, age_secs: u64) {
    std::fs::write(path, content).expect("Failed to write fixture");
    let stamp = std::time::SystemTime::now() - std::time::Duration::from_secs(age_secs);
    File::options()
        .write(true)
        .open(path)
        .and_then(|f| f.set_modified(stamp))
        .expect("Failed to set mtime");
}
