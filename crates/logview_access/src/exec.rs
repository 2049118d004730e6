//! External command execution.
//!
//! Commands are always argument vectors handed straight to `execve`; nothing
//! goes through a shell, so arguments are never re-interpreted. Callers still
//! validate their inputs first (see `logview_security::PathPolicy`).
//!
//! All I/O here is synchronous. The service calls into it from
//! `spawn_blocking`.

use logview_protocol::{GatewayError, Result};
use std::fmt;
use std::fs::File;
use std::io::Read;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::atomic::{AtomicI32, Ordering};
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

const WAIT_POLL_INTERVAL: Duration = Duration::from_millis(20);

/// Program plus arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandLine {
    pub program: String,
    pub args: Vec<String>,
}

impl CommandLine {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Split a whitespace-separated request into a command line.
    pub fn split(request: &str) -> Option<Self> {
        let mut words = request.split_whitespace();
        let program = words.next()?;
        Some(Self::new(program).args(words))
    }
}

impl fmt::Display for CommandLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program)?;
        for arg in &self.args {
            write!(f, " {}", arg)?;
        }
        Ok(())
    }
}

/// Result of a finished command.
#[derive(Debug, Clone, Default)]
pub struct CommandOutput {
    /// Exit code; `None` when killed by a signal.
    pub code: Option<i32>,
    /// Captured stdout (empty for redirected runs).
    pub stdout: Vec<u8>,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }

    pub fn stdout_text(&self) -> String {
        String::from_utf8_lossy(&self.stdout).into_owned()
    }
}

/// Runs external tools on behalf of the gateway.
pub trait CommandRunner: Send + Sync {
    /// Run to completion and capture stdout. Stderr is discarded.
    fn output(&self, command: &CommandLine) -> Result<CommandOutput>;

    /// Run to completion with stdout (and optionally stderr) written to `file`.
    fn run_to_file(&self, command: &CommandLine, file: File, merge_stderr: bool) -> Result<CommandOutput>;

    /// Exit code of the most recent command, `-1` if none or killed.
    fn last_exit_code(&self) -> i32;
}

/// Real subprocesses, optionally bounded in time.
pub struct SystemRunner {
    timeout: Option<Duration>,
    last_code: AtomicI32,
}

impl SystemRunner {
    pub fn new(timeout: Option<Duration>) -> Self {
        Self {
            timeout,
            last_code: AtomicI32::new(-1),
        }
    }

    fn spawn(&self, command: &CommandLine, stdout: Stdio, stderr: Stdio) -> Result<Child> {
        debug!(command = %command, "Spawning");
        Command::new(&command.program)
            .args(&command.args)
            .stdin(Stdio::null())
            .stdout(stdout)
            .stderr(stderr)
            .spawn()
            .map_err(|err| GatewayError::Subprocess {
                program: command.program.clone(),
                reason: err.to_string(),
            })
    }

    /// Wait for `child`, killing it once the time bound is exceeded.
    fn wait(&self, child: &mut Child, program: &str) -> Result<ExitStatus> {
        let Some(limit) = self.timeout else {
            return Ok(child.wait()?);
        };
        let started = Instant::now();
        loop {
            if let Some(status) = child.try_wait()? {
                return Ok(status);
            }
            if started.elapsed() >= limit {
                let _ = child.kill();
                let _ = child.wait();
                self.last_code.store(-1, Ordering::Relaxed);
                warn!(program, secs = limit.as_secs(), "Command timed out, killed");
                return Err(GatewayError::Timeout {
                    program: program.to_string(),
                    secs: limit.as_secs(),
                });
            }
            thread::sleep(WAIT_POLL_INTERVAL);
        }
    }

    fn record(&self, status: ExitStatus) -> Option<i32> {
        let code = status.code();
        self.last_code.store(code.unwrap_or(-1), Ordering::Relaxed);
        code
    }
}

impl CommandRunner for SystemRunner {
    fn output(&self, command: &CommandLine) -> Result<CommandOutput> {
        let mut child = self.spawn(command, Stdio::piped(), Stdio::null())?;
        let mut pipe = child.stdout.take().ok_or_else(|| GatewayError::Subprocess {
            program: command.program.clone(),
            reason: "stdout not captured".to_string(),
        })?;
        // Drain on a separate thread so a chatty child cannot block on a full pipe.
        let reader = thread::spawn(move || {
            let mut buf = Vec::new();
            pipe.read_to_end(&mut buf).map(|_| buf)
        });

        let status = self.wait(&mut child, &command.program)?;
        let stdout = reader
            .join()
            .map_err(|_| GatewayError::Subprocess {
                program: command.program.clone(),
                reason: "stdout reader panicked".to_string(),
            })??;

        Ok(CommandOutput {
            code: self.record(status),
            stdout,
        })
    }

    fn run_to_file(&self, command: &CommandLine, file: File, merge_stderr: bool) -> Result<CommandOutput> {
        let stderr = if merge_stderr {
            Stdio::from(file.try_clone()?)
        } else {
            Stdio::null()
        };
        let mut child = self.spawn(command, Stdio::from(file), stderr)?;
        let status = self.wait(&mut child, &command.program)?;
        Ok(CommandOutput {
            code: self.record(status),
            stdout: Vec::new(),
        })
    }

    fn last_exit_code(&self) -> i32 {
        self.last_code.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_and_display() {
        let cmd = CommandLine::split("coredumpctl  info 1234").unwrap();
        assert_eq!(cmd.program, "coredumpctl");
        assert_eq!(cmd.args, vec!["info", "1234"]);
        assert_eq!(cmd.to_string(), "coredumpctl info 1234");
        assert!(CommandLine::split("   ").is_none());
    }

    #[test]
    fn captures_stdout_and_exit_code() {
        let runner = SystemRunner::new(Some(Duration::from_secs(10)));
        assert_eq!(runner.last_exit_code(), -1);
        let out = runner
            .output(&CommandLine::new("sh").arg("-c").arg("printf 'a\\nb\\n'; exit 3"))
            .unwrap();
        assert_eq!(out.stdout, b"a\nb\n");
        assert_eq!(out.code, Some(3));
        assert!(!out.success());
        assert_eq!(runner.last_exit_code(), 3);
    }

    #[test]
    fn arguments_are_not_shell_interpreted() {
        let runner = SystemRunner::new(None);
        let out = runner
            .output(&CommandLine::new("echo").arg("a; rm -rf /").arg("$HOME"))
            .unwrap();
        assert_eq!(out.stdout_text(), "a; rm -rf / $HOME\n");
    }

    #[test]
    fn missing_program_is_a_subprocess_error() {
        let runner = SystemRunner::new(None);
        let err = runner
            .output(&CommandLine::new("definitely-not-a-real-tool-xyz"))
            .unwrap_err();
        assert!(matches!(err, GatewayError::Subprocess { .. }));
    }

    #[test]
    fn hung_command_is_killed() {
        let runner = SystemRunner::new(Some(Duration::from_millis(200)));
        let started = Instant::now();
        let err = runner.output(&CommandLine::new("sleep").arg("30")).unwrap_err();
        assert!(matches!(err, GatewayError::Timeout { .. }));
        assert!(started.elapsed() < Duration::from_secs(10));
        assert_eq!(runner.last_exit_code(), -1);
    }

    #[test]
    fn run_to_file_merges_stderr() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.log");
        let file = File::create(&path).unwrap();
        let runner = SystemRunner::new(None);
        let out = runner
            .run_to_file(
                &CommandLine::new("sh").arg("-c").arg("echo out; echo err 1>&2"),
                file,
                true,
            )
            .unwrap();
        assert!(out.success());
        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.contains("out"));
        assert!(text.contains("err"));
    }
}
