//! Tests for `src/logging.rs`.

use continuous_fuzz::logging::{
    is_console_target, LoggingGuard, DEFAULT_FILTER, FUZZER_OUTPUT_TARGET, LOG_FILE_PREFIX,
};

#[test]
fn logging_guard_is_send() {
    fn assert_send<T: Send>() {}
    assert_send::<LoggingGuard>();
}

#[test]
fn log_files_are_named_after_the_binary() {
    assert!(LOG_FILE_PREFIX.starts_with(env!("CARGO_PKG_NAME")));
}

#[test]
fn raw_fuzzer_output_stays_off_the_console() {
    assert!(!is_console_target(FUZZER_OUTPUT_TARGET));
    assert!(is_console_target("continuous_fuzz::scheduler"));
    assert!(is_console_target("continuous_fuzz::fuzz::executor"));
}

#[test]
fn default_filter_keeps_fuzzer_output() {
    let filter: tracing_subscriber::EnvFilter = DEFAULT_FILTER.parse().expect("valid directive");
    assert_eq!(filter.max_level_hint(), Some(tracing::level_filters::LevelFilter::INFO));
}

#[test]
fn init_production_creates_nested_logs_dir() {
    let tmp = tempfile::tempdir().expect("should create temp dir");
    let logs_dir = tmp.path().join("fuzz_results").join("logs");
    assert!(!logs_dir.exists());

    // The global subscriber can be installed once per test binary.
    let _guard = continuous_fuzz::logging::init_production(&logs_dir)
        .expect("init_production should succeed");
    assert!(logs_dir.is_dir(), "logs directory should be created");

    tracing::info!(target: FUZZER_OUTPUT_TARGET, stream = "stdout", "fuzzer output");
}
