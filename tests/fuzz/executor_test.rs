//! Tests for running a single fuzz target.

use std::time::Duration;

use continuous_fuzz::detector::failure_log_path;
use continuous_fuzz::fuzz::{FuzzError, FuzzTarget};
use tokio_util::sync::CancellationToken;

use crate::helpers::{recorded_lines, Workspace};

fn target(package: &str, name: &str) -> FuzzTarget {
    FuzzTarget {
        package: package.to_owned(),
        name: name.to_owned(),
    }
}

const FAILING_RUN: &str = "\
echo 'fuzz: elapsed: 0s, gathering baseline coverage: 0/4 completed'
echo '--- FAIL: FuzzFoo (0.02s)'
echo '    --- FAIL: FuzzFoo (0.00s)'
echo '        panic: boom'
echo '    Failing input written to testdata/fuzz/FuzzFoo/abc123'
echo 'FAIL'
echo 'exit status 2' >&2
exit 1
";

#[tokio::test]
async fn failing_run_writes_log_and_reports_exit() {
    let ws = Workspace::new();
    ws.add_package("parser", FAILING_RUN);
    ws.add_corpus_entry("parser", "FuzzFoo", "abc123", b"go test fuzz v1\nstring(\"x\")\n");

    let err = ws
        .runner()
        .execute_target(&target("parser", "FuzzFoo"), &CancellationToken::new())
        .await
        .expect_err("failing run should error");

    match err {
        FuzzError::Exit { target, status } => {
            assert_eq!(target, "FuzzFoo");
            assert!(!status.success());
        }
        other => panic!("expected Exit, got {other:?}"),
    }

    let log = std::fs::read_to_string(failure_log_path(&ws.results, "FuzzFoo"))
        .expect("failure log written");
    assert!(log.starts_with("    --- FAIL: FuzzFoo (0.00s)\n"), "{log:?}");
    assert!(log.contains("        panic: boom\n"));
    assert!(log.contains(
        "\n\n=== Failing testcase (FuzzFoo/abc123) ===\ngo test fuzz v1\nstring(\"x\")\n"
    ));
    assert!(!log.contains("exit status 2"));
}

#[tokio::test]
async fn passing_run_succeeds_without_log() {
    let ws = Workspace::new();
    ws.add_package("parser", "echo 'fuzz: elapsed: 5s, execs: 100'\necho PASS\n");

    ws.runner()
        .execute_target(&target("parser", "FuzzFoo"), &CancellationToken::new())
        .await
        .expect("passing run");

    assert!(!failure_log_path(&ws.results, "FuzzFoo").exists());
}

#[tokio::test]
async fn passes_fuzz_flags_to_toolchain() {
    let ws = Workspace::new();
    let record = ws.record_path("args.txt");
    let pkg_dir = ws.add_package(
        "parser",
        &format!(
            "printf '%s\\n' \"$@\" > '{}'\npwd -P >> '{}'\n",
            record.display(),
            record.display()
        ),
    );

    ws.runner()
        .execute_target(&target("parser", "FuzzFoo"), &CancellationToken::new())
        .await
        .expect("run");

    let corpus_root = ws.corpus.join("parser").join("testdata").join("fuzz");
    let lines = recorded_lines(&record);
    assert_eq!(
        lines[..5],
        [
            "-fuzz=^FuzzFoo$".to_owned(),
            format!("-test.fuzzcachedir={}", corpus_root.display()),
            "-fuzztime=5s".to_owned(),
            "-parallel=2".to_owned(),
            std::fs::canonicalize(&pkg_dir)
                .expect("canonical package dir")
                .display()
                .to_string(),
        ]
    );
}

#[tokio::test]
async fn cancellation_stops_run_without_error() {
    let ws = Workspace::new();
    ws.add_package("parser", "echo 'fuzz: elapsed: 0s'\nexec sleep 30\n");
    let cancel = CancellationToken::new();

    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(200)).await;
        trigger.cancel();
    });

    let runner = ws.runner();
    let tgt = target("parser", "FuzzFoo");
    let result = tokio::time::timeout(Duration::from_secs(10), runner.execute_target(&tgt, &cancel))
        .await
        .expect("run should stop promptly after cancellation");

    assert!(result.is_ok(), "{result:?}");
}

#[tokio::test]
async fn cancellation_reaches_grandchildren_holding_output() {
    let ws = Workspace::new();
    // The shell stays alive while `sleep` inherits its stdout, like the test
    // binary that `go test` starts.
    ws.add_package("parser", "echo 'fuzz: elapsed: 0s'\nsleep 30\necho done\n");
    let cancel = CancellationToken::new();

    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(300)).await;
        trigger.cancel();
    });

    let runner = ws.runner();
    let tgt = target("parser", "FuzzFoo");
    let started = std::time::Instant::now();
    let result = tokio::time::timeout(Duration::from_secs(20), runner.execute_target(&tgt, &cancel))
        .await
        .expect("run should stop after cancellation");

    assert!(result.is_ok(), "{result:?}");
    assert!(
        started.elapsed() < Duration::from_secs(10),
        "grandchild kept the run alive for {:?}",
        started.elapsed()
    );
}

#[tokio::test]
async fn failure_after_cancellation_is_not_an_error() {
    let ws = Workspace::new();
    ws.add_package("parser", FAILING_RUN);
    let cancel = CancellationToken::new();
    cancel.cancel();

    let result = ws
        .runner()
        .execute_target(&target("parser", "FuzzFoo"), &cancel)
        .await;

    assert!(result.is_ok(), "{result:?}");
}

#[tokio::test]
async fn missing_toolchain_fails_to_spawn() {
    let ws = Workspace::new();
    ws.add_package("parser", "");

    let err = ws
        .runner_with("/nonexistent/toolchain/go")
        .execute_target(&target("parser", "FuzzFoo"), &CancellationToken::new())
        .await
        .expect_err("spawn should fail");

    assert!(matches!(err, FuzzError::Spawn { .. }), "{err:?}");
}
