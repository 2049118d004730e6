//! Source resolution tests: category listings, archives and core dumps.

mod common;

use common::{scratch_dir, write_aged, ScriptedRunner};
use logview_access::{CommandLine, CommandOutput, CommandRunner, LogSourceResolver, TempWorkspace};
use logview_protocol::{GatewayError, Result};
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

const CORE_LIST: &str = "\
TIME                          PID  UID  GID SIG     COREFILE EXE                 SIZE
Mon 2024-01-01 10:00:00 CST  1111 1000 1000 SIGSEGV present  /usr/bin/old-app    1.0M
Mon 2024-01-01 11:00:00 CST  2222 1000 1000 SIGABRT missing  /usr/bin/gone       -
Mon 2024-01-01 12:00:00 CST  3333 1000 1000 SIGSEGV present  /usr/bin/new-app    2.0M
";

fn resolver(runner: ScriptedRunner, workspace_base: &Path) -> (LogSourceResolver, Arc<ScriptedRunner>, Arc<TempWorkspace>) {
    let runner = Arc::new(runner);
    let workspace = Arc::new(TempWorkspace::in_dir(workspace_base));
    let resolver = LogSourceResolver::new(runner.clone(), workspace.clone());
    (resolver, runner, workspace)
}

fn names(paths: &[PathBuf]) -> Vec<String> {
    paths
        .iter()
        .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
        .collect()
}

// =============================================================================
// CORE DUMPS
// =============================================================================

#[test]
fn test_coredump_storage_newest_first_skipping_missing() {
    let runner = ScriptedRunner::new()
        .respond("coredumpctl list --no-pager", 0, CORE_LIST)
        .respond(
            "coredumpctl info 3333 --no-pager",
            0,
            "           PID: 3333 (new-app)\n       Storage: /var/lib/systemd/coredump/core.new-app.3333.lz4 (present)\n",
        )
        .respond(
            "coredumpctl info 1111 --no-pager",
            0,
            "           PID: 1111 (old-app)\n       Storage: /var/lib/systemd/coredump/core.old-app.1111.lz4 (present)\n",
        );
    let scratch = scratch_dir();
    let (resolver, runner, _) = resolver(runner, scratch.path());

    let paths = resolver.resolve("coredump", true);
    assert_eq!(
        paths,
        vec![
            PathBuf::from("/var/lib/systemd/coredump/core.new-app.3333.lz4"),
            PathBuf::from("/var/lib/systemd/coredump/core.old-app.1111.lz4"),
        ]
    );
    assert!(
        !runner.calls().iter().any(|c| c.contains("2222")),
        "Missing cores should never be inspected"
    );
}

#[test]
fn test_coredump_listing_strips_control_bytes_and_skips_storage_none() {
    let list = CORE_LIST.replace("3333", "33\u{1}33").replace("1111", "11\u{0}11");
    let runner = ScriptedRunner::new()
        .respond("coredumpctl list --no-pager", 0, list)
        .respond("coredumpctl info 3333 --no-pager", 0, "Storage: none\n")
        .respond(
            "coredumpctl info 1111 --no-pager",
            0,
            "Storage: /var/lib/systemd/coredump/core.a.1111.lz4\n",
        );
    let scratch = scratch_dir();
    let (resolver, _, _) = resolver(runner, scratch.path());
    assert_eq!(
        resolver.coredump_storage_paths(),
        vec![PathBuf::from("/var/lib/systemd/coredump/core.a.1111.lz4")]
    );
}

#[test]
fn test_coredump_lister_failure_yields_nothing() {
    let scratch = scratch_dir();
    let (resolver, _, _) = resolver(ScriptedRunner::new(), scratch.path());
    assert!(resolver.resolve("coredump", false).is_empty());
}

// =============================================================================
// SYSTEM AND AUDIT CATEGORIES
// =============================================================================

#[test]
fn test_system_category_sorted_by_mtime() {
    let logs = scratch_dir();
    write_aged(&logs.path().join("kern.log"), "now\n", 0);
    write_aged(&logs.path().join("kern.log.1"), "older\n", 100);
    write_aged(&logs.path().join("kern.log.2"), "oldest\n", 200);
    write_aged(&logs.path().join("kernel"), "unrelated\n", 0);
    write_aged(&logs.path().join("syslog"), "unrelated\n", 0);

    let scratch = scratch_dir();
    let (resolver, _, _) = resolver(ScriptedRunner::new(), scratch.path());
    let resolver = resolver.with_roots(logs.path(), logs.path().join("audit"));

    let paths = resolver.resolve("kern", false);
    assert_eq!(names(&paths), vec!["kern.log", "kern.log.1", "kern.log.2"]);
}

#[test]
fn test_gz_members_are_decompressed_into_workspace() {
    let logs = scratch_dir();
    write_aged(&logs.path().join("syslog.1"), "plain\n", 10);
    let archive = logs.path().join("syslog.2.gz");
    write_aged(&archive, "gzip bytes", 20);

    let runner = ScriptedRunner::new().respond(
        format!("gunzip -c {}", archive.display()),
        0,
        "decompressed\n",
    );
    let scratch = scratch_dir();
    let (resolver, _, workspace) = resolver(runner, scratch.path());
    let resolver = resolver.with_roots(logs.path(), logs.path().join("audit"));

    let paths = resolver.resolve("syslog", true);
    assert_eq!(paths.len(), 2);
    assert_eq!(paths[0], logs.path().join("syslog.1"));

    let extracted = &paths[1];
    let workspace_dir = workspace.path().expect("Workspace should exist after unzip");
    assert!(extracted.starts_with(&workspace_dir));
    let name = extracted.file_name().unwrap().to_string_lossy().into_owned();
    assert!(name.starts_with("Log_extract_") && name.ends_with(".txt"), "{name}");
    assert_eq!(fs::read_to_string(extracted).unwrap(), "decompressed\n");

    // Archives are returned as-is without unzip.
    let raw = resolver.resolve("syslog", false);
    assert_eq!(raw[1], archive);

    workspace.close();
    assert!(!workspace_dir.exists());
}

#[test]
fn test_failed_decompression_is_omitted_and_batch_is_fresh() {
    let logs = scratch_dir();
    write_aged(&logs.path().join("daemon.log"), "ok\n", 10);
    let good = logs.path().join("daemon.log.1.gz");
    let bad = logs.path().join("daemon.log.2.GZ");
    write_aged(&good, "gz", 20);
    write_aged(&bad, "corrupt", 30);

    let runner = ScriptedRunner::new()
        .respond(format!("gunzip -c {}", good.display()), 0, "restored\n")
        .respond(format!("gunzip -c {}", bad.display()), 1, "");
    let scratch = scratch_dir();
    let (resolver, _, workspace) = resolver(runner, scratch.path());
    let resolver = resolver.with_roots(logs.path(), logs.path().join("audit"));

    let first = resolver.resolve("daemon", true);
    assert_eq!(first.len(), 2);
    let workspace_dir = workspace.path().unwrap();
    assert_eq!(fs::read_dir(&workspace_dir).unwrap().count(), 1);

    // A second batch purges the first batch's extractions.
    let second = resolver.resolve("daemon", true);
    assert_eq!(second.len(), 2);
    assert!(!first[1].exists());
    assert!(second[1].exists());
    assert_eq!(fs::read_dir(&workspace_dir).unwrap().count(), 1);
}

#[test]
fn test_audit_category_lists_audit_dir() {
    let logs = scratch_dir();
    let audit = logs.path().join("audit");
    fs::create_dir(&audit).unwrap();
    write_aged(&audit.join("audit.log"), "a\n", 0);
    write_aged(&audit.join("audit.log.1"), "b\n", 50);
    write_aged(&audit.join("other.log"), "c\n", 0);

    let scratch = scratch_dir();
    let (resolver, _, _) = resolver(ScriptedRunner::new(), scratch.path());
    let resolver = resolver.with_roots(logs.path(), &audit);
    assert_eq!(names(&resolver.resolve("audit", false)), vec!["audit.log", "audit.log.1"]);
}

#[test]
fn test_missing_directory_resolves_empty() {
    let scratch = scratch_dir();
    let (resolver, _, _) = resolver(ScriptedRunner::new(), scratch.path());
    let resolver = resolver.with_roots(scratch.path().join("nope"), scratch.path().join("nope2"));
    assert!(resolver.resolve("kern", true).is_empty());
}

// =============================================================================
// APPLICATION AND OTHER SOURCES
// =============================================================================

#[test]
fn test_app_category_by_directory_name() {
    let base = scratch_dir();
    let app = base.path().join("deepin-music");
    fs::create_dir(&app).unwrap();
    write_aged(&app.join("deepin-music.log"), "1\n", 0);
    write_aged(&app.join("deepin-music.log.1"), "2\n", 60);
    write_aged(&app.join("settings.conf"), "x\n", 0);

    let scratch = scratch_dir();
    let (resolver, _, _) = resolver(ScriptedRunner::new(), scratch.path());

    let by_dir = resolver.resolve(&app.display().to_string(), false);
    assert_eq!(names(&by_dir), vec!["deepin-music.log", "deepin-music.log.1"]);

    let by_file = resolver.resolve(&app.join("deepin-music.log").display().to_string(), false);
    assert_eq!(by_file, by_dir);
}

#[test]
fn test_app_category_falls_back_to_file_stem() {
    let base = scratch_dir();
    let app = base.path().join("deepin-tools");
    fs::create_dir(&app).unwrap();
    write_aged(&app.join("helper.log"), "1\n", 0);
    write_aged(&app.join("helper.log.1"), "2\n", 60);
    write_aged(&app.join("unrelated.log"), "3\n", 0);

    let scratch = scratch_dir();
    let (resolver, _, _) = resolver(ScriptedRunner::new(), scratch.path());
    let files = resolver.resolve(&app.join("helper.log").display().to_string(), false);
    assert_eq!(names(&files), vec!["helper.log", "helper.log.1"]);
}

#[test]
fn test_other_sources_for_file_and_directory() {
    let base = scratch_dir();
    write_aged(&base.path().join("x.log"), "1\n", 0);
    write_aged(&base.path().join("x.log.old"), "2\n", 30);
    write_aged(&base.path().join(".hidden"), "3\n", 60);
    write_aged(&base.path().join("y.log"), "4\n", 90);
    fs::create_dir(base.path().join("nested")).unwrap();
    std::os::unix::fs::symlink("/etc/passwd", base.path().join("link.log")).unwrap();

    let scratch = scratch_dir();
    let (resolver, _, _) = resolver(ScriptedRunner::new(), scratch.path());

    let siblings = resolver.resolve_other(&base.path().join("x.log").display().to_string(), false);
    assert_eq!(names(&siblings), vec!["x.log", "x.log.old"]);

    let all = resolver.resolve_other(&base.path().display().to_string(), false);
    assert_eq!(names(&all), vec!["x.log", "x.log.old", ".hidden", "y.log"]);

    assert!(resolver
        .resolve_other(&base.path().join("gone").display().to_string(), false)
        .is_empty());
}

// =============================================================================
// CONCURRENT DECOMPRESSION
// =============================================================================

const EXTRACT_BODY: &str = "first half\nsecond half\n";

/// `gunzip` that writes its output in two halves with a pause between, then
/// records the content of every extract present in the workspace.
struct SlowGunzip {
    workspace_base: PathBuf,
    snapshots: Mutex<Vec<Vec<String>>>,
}

impl SlowGunzip {
    fn extracts(&self) -> Vec<String> {
        fs::read_dir(&self.workspace_base)
            .unwrap()
            .flatten()
            .filter(|entry| entry.path().is_dir())
            .flat_map(|dir| fs::read_dir(dir.path()).unwrap().flatten())
            .filter(|entry| entry.file_name().to_string_lossy().starts_with("Log_extract_"))
            .map(|entry| fs::read_to_string(entry.path()).unwrap_or_default())
            .collect()
    }
}

impl CommandRunner for SlowGunzip {
    fn output(&self, command: &CommandLine) -> Result<CommandOutput> {
        Err(GatewayError::Subprocess {
            program: command.program.clone(),
            reason: "not scripted".to_string(),
        })
    }

    fn run_to_file(&self, _command: &CommandLine, mut file: File, _merge_stderr: bool) -> Result<CommandOutput> {
        let (head, tail) = EXTRACT_BODY.split_at(EXTRACT_BODY.find('\n').unwrap() + 1);
        file.write_all(head.as_bytes())?;
        thread::sleep(Duration::from_millis(30));
        file.write_all(tail.as_bytes())?;
        let snapshot = self.extracts();
        self.snapshots.lock().unwrap().push(snapshot);
        Ok(CommandOutput {
            code: Some(0),
            stdout: Vec::new(),
        })
    }

    fn last_exit_code(&self) -> i32 {
        0
    }
}

#[test]
fn test_concurrent_batches_never_purge_each_other() {
    let logs = scratch_dir();
    write_aged(&logs.path().join("daemon.log.1.gz"), "gz", 10);
    write_aged(&logs.path().join("daemon.log.2.gz"), "gz", 20);

    let scratch = scratch_dir();
    let runner = Arc::new(SlowGunzip {
        workspace_base: scratch.path().to_path_buf(),
        snapshots: Mutex::new(Vec::new()),
    });
    let workspace = Arc::new(TempWorkspace::in_dir(scratch.path()));
    let resolver = LogSourceResolver::new(runner.clone(), workspace.clone())
        .with_roots(logs.path(), logs.path().join("audit"));

    let resolver = &resolver;
    let results: Vec<Vec<PathBuf>> = thread::scope(|scope| {
        let batches: Vec<_> = (0..2)
            .map(|_| scope.spawn(move || resolver.resolve("daemon", true)))
            .collect();
        batches.into_iter().map(|batch| batch.join().unwrap()).collect()
    });

    for paths in &results {
        assert_eq!(paths.len(), 2);
    }
    // Each batch sees only its own extracts, all fully written: one after
    // its first member, two after its second.
    let snapshots = runner.snapshots.lock().unwrap().clone();
    let counts: Vec<usize> = snapshots.iter().map(Vec::len).collect();
    assert_eq!(counts, vec![1, 2, 1, 2]);
    for snapshot in &snapshots {
        assert!(snapshot.iter().all(|body| body == EXTRACT_BODY), "{snapshot:?}");
    }

    // The batch that ran last still owns a complete workspace.
    let survivors: Vec<&PathBuf> = results.iter().flatten().filter(|p| p.exists()).collect();
    assert_eq!(survivors.len(), 2);
    for path in survivors {
        assert_eq!(fs::read_to_string(path).unwrap(), EXTRACT_BODY);
    }
}
