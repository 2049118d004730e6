//! Log access for the privileged viewer service.
//!
//! Everything here is synchronous and assumes the caller has already been
//! authorized; request strings are checked against `PathPolicy` by the
//! service layer before they reach these types.

pub mod catalog;
pub mod exec;
pub mod export;
pub mod line_index;
pub mod reader;
pub mod sources;
pub mod stream;
pub mod volumes;

pub use catalog::{CommandCatalog, Diagnostic, ExportCommand, JournalFilter};
pub use exec::{CommandLine, CommandOutput, CommandRunner, SystemRunner};
pub use export::Exporter;
pub use line_index::LineIndexer;
pub use reader::{LogReader, ReadRequest};
pub use sources::{LogSourceResolver, TempWorkspace};
pub use stream::StreamRegistry;
pub use volumes::{ExportWhitelist, MountEntry, ProcMountsMonitor, VolumeMonitor};
