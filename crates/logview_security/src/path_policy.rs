//! PathPolicy: string-level whitelist for reads and exports.
//!
//! This is a defense-in-depth check on the literal request string. It does
//! not canonicalize: any `..` anywhere in the string is refused outright,
//! but a symlink inside a whitelisted root that points elsewhere is not
//! detected. The same applies to `coredumpctl dump -o`, whose output file
//! must lie under the temp tree.

use logview_protocol::paths;
use std::path::Path;

/// Which whitelist entry a request matched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PolicyClass {
    SystemLog,
    Temp,
    Home,
    RootHome,
    CoredumpStore,
    /// A recognized diagnostic pseudo-command, not a path.
    PseudoCommand,
    ExportDestination,
}

/// Literal request that lists all captured cores.
pub const COREDUMP_LISTING: &str = "coredump";
/// Prefixes of pseudo-commands that are executed rather than read.
pub const PSEUDO_COMMAND_PREFIXES: &[&str] = &["coredumpctl info", "coredumpctl dump", "readelf"];

/// Pseudo-command that may write a file through `-o`/`--output`.
const DUMP_COMMAND: &str = "coredumpctl dump";

/// Characters that would split a command line; refused rather than escaped.
const COMMAND_SEPARATORS: &[char] = &[';', '|'];

#[derive(Debug, Clone)]
pub struct PathPolicy {
    read_roots: Vec<(&'static str, PolicyClass)>,
    export_source_roots: Vec<(&'static str, PolicyClass)>,
}

impl Default for PathPolicy {
    fn default() -> Self {
        Self {
            read_roots: vec![
                (paths::SYSTEM_LOG_DIR, PolicyClass::SystemLog),
                (paths::TEMP_ROOT, PolicyClass::Temp),
                (paths::HOME_ROOT, PolicyClass::Home),
                (paths::ROOT_HOME, PolicyClass::RootHome),
            ],
            export_source_roots: vec![
                (paths::SYSTEM_LOG_DIR, PolicyClass::SystemLog),
                (paths::TEMP_ROOT, PolicyClass::Temp),
                (paths::HOME_ROOT, PolicyClass::Home),
                (paths::COREDUMP_STORE_DIR, PolicyClass::CoredumpStore),
            ],
        }
    }
}

impl PathPolicy {
    /// Classify a `readLog` request: a whitelisted path or pseudo-command.
    pub fn classify_read(&self, request: &str) -> Option<PolicyClass> {
        if has_traversal(request) {
            return None;
        }
        if request == COREDUMP_LISTING {
            return Some(PolicyClass::PseudoCommand);
        }
        if PSEUDO_COMMAND_PREFIXES.iter().any(|p| request.starts_with(p)) {
            if request.contains(COMMAND_SEPARATORS) {
                return None;
            }
            if request.starts_with(DUMP_COMMAND)
                && !dump_outputs(request).iter().all(|output| is_temp_file(output))
            {
                return None;
            }
            return Some(PolicyClass::PseudoCommand);
        }
        self.classify_file(request)
    }

    /// `readLog` gate: whitelisted path or recognized pseudo-command.
    pub fn can_read(&self, request: &str) -> bool {
        self.classify_read(request).is_some()
    }

    /// Gate for operations that need a real file (ranges, line counts, streams).
    pub fn can_read_file(&self, path: &str) -> bool {
        self.classify_file(path).is_some()
    }

    /// Gate for metadata queries: readable or exportable location.
    pub fn can_inspect(&self, path: &str) -> bool {
        self.can_read_file(path) || self.can_export_source(path)
    }

    /// Source of a file-copy export. The final path segment must also be
    /// free of command separators.
    pub fn can_export_source(&self, path: &str) -> bool {
        if has_traversal(path) {
            return false;
        }
        if match_roots(&self.export_source_roots, path).is_none() {
            return false;
        }
        Path::new(path)
            .file_name()
            .and_then(|name| name.to_str())
            .is_some_and(is_safe_file_name)
    }

    /// Destination of an export: inside one of the `whitelist` roots.
    pub fn can_export_to(&self, destination: &str, whitelist: &[impl AsRef<Path>]) -> bool {
        self.classify_destination(destination, whitelist).is_some()
    }

    pub fn classify_destination(
        &self,
        destination: &str,
        whitelist: &[impl AsRef<Path>],
    ) -> Option<PolicyClass> {
        if has_traversal(destination) || !destination.starts_with('/') {
            return None;
        }
        let destination = Path::new(destination);
        whitelist
            .iter()
            .any(|root| destination.starts_with(root.as_ref()))
            .then_some(PolicyClass::ExportDestination)
    }

    fn classify_file(&self, path: &str) -> Option<PolicyClass> {
        if has_traversal(path) {
            return None;
        }
        match_roots(&self.read_roots, path)
    }
}

/// File names that can be placed on a command line unchanged.
pub fn is_safe_file_name(name: &str) -> bool {
    !name.is_empty() && !name.contains(COMMAND_SEPARATORS)
}

/// Files a `coredumpctl dump` request names as its output.
fn dump_outputs(request: &str) -> Vec<&str> {
    let mut outputs = Vec::new();
    let mut args = request.split_whitespace();
    while let Some(arg) = args.next() {
        if arg == "-o" || arg == "--output" {
            // A dangling flag names no file; record it so the request fails.
            outputs.push(args.next().unwrap_or(""));
        } else if let Some(path) = arg.strip_prefix("--output=") {
            outputs.push(path);
        } else if let Some(path) = arg.strip_prefix("-o") {
            outputs.push(path);
        }
    }
    outputs
}

fn is_temp_file(path: &str) -> bool {
    let path = Path::new(path);
    path.starts_with(paths::TEMP_ROOT) && path != Path::new(paths::TEMP_ROOT)
}

fn has_traversal(request: &str) -> bool {
    request.contains("..") || request.contains('\0')
}

fn match_roots(roots: &[(&'static str, PolicyClass)], path: &str) -> Option<PolicyClass> {
    let candidate = Path::new(path);
    roots
        .iter()
        .find(|(root, class)| {
            candidate.starts_with(root) && (candidate != Path::new(root) || root_is_listable(*class))
        })
        .map(|(_, class)| *class)
}

/// Roots that may themselves be named, not only their contents.
fn root_is_listable(class: PolicyClass) -> bool {
    matches!(class, PolicyClass::Temp | PolicyClass::Home | PolicyClass::RootHome)
}
