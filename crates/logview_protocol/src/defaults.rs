//! Canonical default values shared by the service and its tests.

/// Well-known bus name the service claims.
pub const SERVICE_NAME: &str = "com.deepin.logviewer";
/// Object path the gateway interface is served at.
pub const OBJECT_PATH: &str = "/com/deepin/logviewer";

/// Executable name of the only client allowed to call the service.
pub const TRUSTED_CLIENT_NAME: &str = "deepin-log-viewer";
/// Directories searched for the trusted client binary.
pub const TRUSTED_CLIENT_DIRS: &[&str] = &["/usr/bin"];

/// Ceiling of text returned by one stream chunk read (10 MiB).
pub const STREAM_CHUNK_BYTES: usize = 10 * 1024 * 1024;
/// Block size used when scanning for line offsets.
pub const LINE_SCAN_BLOCK_BYTES: usize = 4096;
/// `readelf` output is cut to this many non-empty lines.
pub const ELF_DUMP_MAX_LINES: usize = 200;

/// Upper bound on a single external command. `0` in config disables it.
pub const COMMAND_TIMEOUT_SECS: u64 = 300;

/// Prefix/suffix of decompressed temp files, so they can be purged in bulk.
pub const EXTRACT_FILE_PREFIX: &str = "Log_extract_";
pub const EXTRACT_FILE_SUFFIX: &str = ".txt";
/// Stray coredump extractions left in the system temp dir.
pub const CORE_DUMP_TEMP_SUFFIX: &str = ".lz4.dump";

/// Reply of `readLog` when the request was refused.
pub const READ_REJECTED_REPLY: &str = " ";
