//! Whole-content reads: plain files and diagnostic pseudo-commands.

use logview_protocol::defaults::ELF_DUMP_MAX_LINES;
use logview_protocol::{GatewayError, Result};
use logview_security::path_policy::COREDUMP_LISTING;
use std::path::Path;
use std::sync::Arc;
use tracing::debug;

use crate::catalog::Diagnostic;
use crate::exec::{CommandLine, CommandRunner};
use crate::line_index::replace_nul;

/// A `readLog` request after classification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadRequest {
    /// `coredump`: list every captured core
    CoredumpListing,
    /// `coredumpctl info|dump ...`
    Coredumpctl(CommandLine),
    /// `readelf ...`, output capped
    ElfDump(CommandLine),
    File(String),
}

impl ReadRequest {
    /// Classify an already policy-approved request string.
    pub fn parse(request: &str) -> Result<Self> {
        if request == COREDUMP_LISTING {
            return Ok(Self::CoredumpListing);
        }
        if request.starts_with("coredumpctl ") {
            let command = expect_program(request, "coredumpctl")?;
            return match command.args.first().map(String::as_str) {
                Some("info" | "dump") => Ok(Self::Coredumpctl(command)),
                _ => Err(GatewayError::policy("only coredumpctl info/dump may be read")),
            };
        }
        if request.starts_with("readelf") {
            return expect_program(request, "readelf").map(Self::ElfDump);
        }
        Ok(Self::File(request.to_string()))
    }
}

fn expect_program(request: &str, program: &str) -> Result<CommandLine> {
    CommandLine::split(request)
        .filter(|command| command.program == program)
        .ok_or_else(|| GatewayError::policy(format!("malformed {} request", program)))
}

pub struct LogReader {
    runner: Arc<dyn CommandRunner>,
}

impl LogReader {
    pub fn new(runner: Arc<dyn CommandRunner>) -> Self {
        Self { runner }
    }

    pub fn read(&self, request: &ReadRequest) -> Result<String> {
        match request {
            ReadRequest::CoredumpListing => self.capture(&Diagnostic::CoredumpList.command()),
            ReadRequest::Coredumpctl(command) => self.capture(command),
            ReadRequest::ElfDump(command) => {
                let text = self.capture(command)?;
                Ok(first_non_empty_lines(&text, ELF_DUMP_MAX_LINES))
            }
            ReadRequest::File(path) => read_text_file(Path::new(path)),
        }
    }

    /// Output of a fixed diagnostic.
    pub fn diagnostic(&self, diagnostic: Diagnostic) -> Result<String> {
        let text = self.capture(&diagnostic.command())?;
        Ok(match diagnostic {
            Diagnostic::CoredumpList => text,
            Diagnostic::CoredumpListCount => format!("{}\n", text.lines().count()),
        })
    }

    fn capture(&self, command: &CommandLine) -> Result<String> {
        let output = self.runner.output(command)?;
        debug!(command = %command, code = ?output.code, bytes = output.stdout.len(), "Captured");
        let mut stdout = output.stdout;
        replace_nul(&mut stdout);
        Ok(String::from_utf8_lossy(&stdout).into_owned())
    }
}

/// Read a text file; NUL bytes become spaces, invalid UTF-8 is replaced.
pub fn read_text_file(path: &Path) -> Result<String> {
    let mut bytes = std::fs::read(path).map_err(|err| match err.kind() {
        std::io::ErrorKind::NotFound => GatewayError::not_found(path.display().to_string()),
        _ => err.into(),
    })?;
    replace_nul(&mut bytes);
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

fn first_non_empty_lines(text: &str, max: usize) -> String {
    text.lines()
        .filter(|line| !line.is_empty())
        .take(max)
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exec::SystemRunner;

    #[test]
    fn classifies_requests() {
        assert_eq!(ReadRequest::parse("coredump").unwrap(), ReadRequest::CoredumpListing);
        assert_eq!(
            ReadRequest::parse("coredumpctl info 12").unwrap(),
            ReadRequest::Coredumpctl(CommandLine::new("coredumpctl").args(["info", "12"]))
        );
        assert!(matches!(
            ReadRequest::parse("readelf -l /tmp/core").unwrap(),
            ReadRequest::ElfDump(_)
        ));
        assert!(ReadRequest::parse("readelfx -l /tmp/core").is_err());
        assert!(ReadRequest::parse("coredumpctl debug 12").is_err());
        assert_eq!(
            ReadRequest::parse("/var/log/syslog").unwrap(),
            ReadRequest::File("/var/log/syslog".to_string())
        );
    }

    #[test]
    fn file_reads_replace_nul() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("x.log");
        std::fs::write(&path, b"a\0b\n").unwrap();
        assert_eq!(read_text_file(&path).unwrap(), "a b\n");
    }

    #[test]
    fn missing_file_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let err = read_text_file(&dir.path().join("gone")).unwrap_err();
        assert!(matches!(err, GatewayError::NotFound(_)));
    }

    #[test]
    fn elf_output_is_capped() {
        let text: String = (0..300).map(|i| format!("row {i}\n\n")).collect();
        let capped = first_non_empty_lines(&text, 200);
        assert_eq!(capped.lines().count(), 200);
        assert!(capped.starts_with("row 0\nrow 1"));
        assert!(capped.ends_with("row 199"));
    }

    #[test]
    fn reads_file_request() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("y.log");
        std::fs::write(&path, "hello\n").unwrap();
        let reader = LogReader::new(Arc::new(SystemRunner::new(None)));
        let text = reader
            .read(&ReadRequest::File(path.display().to_string()))
            .unwrap();
        assert_eq!(text, "hello\n");
    }
}
