//! Tests for fuzz target discovery.

use continuous_fuzz::fuzz::FuzzError;
use tokio_util::sync::CancellationToken;

use crate::helpers::Workspace;

#[tokio::test]
async fn lists_targets_in_output_order() {
    let ws = Workspace::new();
    ws.add_package(
        "parser",
        "echo FuzzZeta\necho TestRoundTrip\necho '  FuzzAlpha'\necho 'ok  parser 0.01s'\n",
    );

    let targets = ws
        .runner()
        .list_targets("parser", &CancellationToken::new())
        .await
        .expect("list targets");

    assert_eq!(targets, vec!["FuzzZeta", "FuzzAlpha"]);
}

#[tokio::test]
async fn passes_list_flag_to_toolchain() {
    let ws = Workspace::new();
    let record = ws.record_path("args.txt");
    ws.add_package(
        "parser",
        &format!("printf '%s\\n' \"$@\" > '{}'\n", record.display()),
    );

    ws.runner()
        .list_targets("parser", &CancellationToken::new())
        .await
        .expect("list targets");

    assert_eq!(
        crate::helpers::recorded_lines(&record),
        vec!["-list=^Fuzz", "."]
    );
}

#[tokio::test]
async fn package_without_targets_is_empty_not_error() {
    let ws = Workspace::new();
    ws.add_package("plain", "echo TestOnly\necho 'ok  plain 0.01s'\n");

    let targets = ws
        .runner()
        .list_targets("plain", &CancellationToken::new())
        .await
        .expect("list targets");

    assert!(targets.is_empty());
}

#[tokio::test]
async fn failing_listing_reports_stderr() {
    let ws = Workspace::new();
    ws.add_package("broken", "echo 'no Go files in broken' >&2\nexit 1\n");

    let err = ws
        .runner()
        .list_targets("broken", &CancellationToken::new())
        .await
        .expect_err("listing should fail");

    match err {
        FuzzError::ListFailed {
            package,
            status,
            stderr,
        } => {
            assert_eq!(package, "broken");
            assert!(!status.success());
            assert_eq!(stderr, "no Go files in broken");
        }
        other => panic!("expected ListFailed, got {other:?}"),
    }
}

#[tokio::test]
async fn missing_package_directory_fails_to_spawn() {
    let ws = Workspace::new();

    let err = ws
        .runner()
        .list_targets("absent", &CancellationToken::new())
        .await
        .expect_err("spawn should fail");

    assert!(matches!(err, FuzzError::Spawn { .. }), "{err:?}");
}

#[tokio::test]
async fn canceled_listing_returns_canceled() {
    let ws = Workspace::new();
    ws.add_package("slow", "exec sleep 30\n");
    let cancel = CancellationToken::new();
    cancel.cancel();

    let err = tokio::time::timeout(
        std::time::Duration::from_secs(10),
        ws.runner().list_targets("slow", &cancel),
    )
    .await
    .expect("listing should stop promptly")
    .expect_err("listing should be canceled");

    assert!(matches!(err, FuzzError::Canceled));
}
