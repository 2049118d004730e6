//! Random access into large text files by line number.
//!
//! Finding line `n` scans from the start of the file in fixed-size blocks and
//! stops as soon as the `n`-th newline has been seen, so paging near the top
//! of a multi-gigabyte log costs `O(n * average line length)`, not a full read.
//!
//! Lines are 0-based. A final line without a trailing newline is still a line
//! for offset purposes.

use logview_protocol::defaults::LINE_SCAN_BLOCK_BYTES;
use logview_protocol::{GatewayError, Result};
use std::fs::File;
use std::io::{BufRead, BufReader, Read, Seek, SeekFrom};
use std::path::Path;
use std::sync::Arc;

use crate::exec::{CommandLine, CommandRunner};

/// Byte offset at which 0-based line `target_line` begins.
///
/// `Ok(None)` when the file has fewer lines.
pub fn locate_line_offset(path: &Path, target_line: u64) -> Result<Option<u64>> {
    let mut file = File::open(path)?;
    let len = file.metadata()?.len();
    if target_line == 0 {
        return Ok((len > 0).then_some(0));
    }

    let mut block = [0u8; LINE_SCAN_BLOCK_BYTES];
    let mut offset = 0u64;
    let mut newlines = 0u64;
    loop {
        let n = file.read(&mut block)?;
        if n == 0 {
            return Ok(None);
        }
        for (i, _) in block[..n].iter().enumerate().filter(|(_, b)| **b == b'\n') {
            newlines += 1;
            if newlines == target_line {
                let start = offset + i as u64 + 1;
                // Line exists only if at least one byte follows the newline.
                return Ok((start < len).then_some(start));
            }
        }
        offset += n as u64;
    }
}

/// Map "`start` lines from the end, `count` lines" onto a forward window.
///
/// Returns `(forward_start, count)`, or `None` when `start` is past the end.
pub fn reverse_window(total_lines: u64, start: u64, count: u64) -> Option<(u64, u64)> {
    if start >= total_lines {
        return None;
    }
    let remaining = total_lines - start;
    let count = count.min(remaining);
    Some((remaining - count, count))
}

/// Decode one raw line: drop the terminator, NUL becomes a space.
pub fn decode_line(mut raw: Vec<u8>) -> String {
    if raw.last() == Some(&b'\n') {
        raw.pop();
        if raw.last() == Some(&b'\r') {
            raw.pop();
        }
    }
    replace_nul(&mut raw);
    String::from_utf8_lossy(&raw).into_owned()
}

/// NUL bytes would truncate the text on the client side; keep the column.
pub fn replace_nul(bytes: &mut [u8]) {
    for byte in bytes.iter_mut().filter(|b| **b == 0) {
        *byte = b' ';
    }
}

/// Ranged reads over text files.
pub struct LineIndexer {
    runner: Arc<dyn CommandRunner>,
}

impl LineIndexer {
    pub fn new(runner: Arc<dyn CommandRunner>) -> Self {
        Self { runner }
    }

    /// Number of newline-terminated lines, as reported by `wc -l`.
    pub fn line_count(&self, path: &Path) -> Result<u64> {
        // Open first: `wc` on a missing file still prints to stdout on some systems.
        File::open(path)?;
        let command = CommandLine::new("wc").arg("-l").arg(path.to_string_lossy());
        let output = self.runner.output(&command)?;
        if !output.success() {
            return Err(GatewayError::Subprocess {
                program: command.program,
                reason: format!("exit code {:?}", output.code),
            });
        }
        output
            .stdout_text()
            .split_whitespace()
            .next()
            .and_then(|count| count.parse().ok())
            .ok_or_else(|| GatewayError::Subprocess {
                program: command.program,
                reason: "unparsable line count".to_string(),
            })
    }

    /// Read up to `count` lines starting at `start`.
    ///
    /// With `reverse`, `start` counts from the end of the file: the window is
    /// the `count` lines that end `start` lines before the last one.
    pub fn read_range(&self, path: &Path, start: u64, count: u64, reverse: bool) -> Result<Vec<String>> {
        let (start, count) = if reverse {
            let total = self.line_count(path)?;
            match reverse_window(total, start, count) {
                Some(window) => window,
                None => return Ok(Vec::new()),
            }
        } else {
            (start, count)
        };
        read_forward(path, start, count)
    }
}

fn read_forward(path: &Path, start: u64, count: u64) -> Result<Vec<String>> {
    if count == 0 {
        return Ok(Vec::new());
    }
    let Some(offset) = locate_line_offset(path, start)? else {
        return Ok(Vec::new());
    };

    let mut file = File::open(path)?;
    file.seek(SeekFrom::Start(offset))?;
    let mut reader = BufReader::new(file);
    let mut lines = Vec::new();
    while (lines.len() as u64) < count {
        let mut raw = Vec::new();
        if reader.read_until(b'\n', &mut raw)? == 0 {
            break;
        }
        lines.push(decode_line(raw));
    }
    Ok(lines)
}
