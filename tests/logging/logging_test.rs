//! Tests for `src/logging.rs`.

use gastos::logging::{LoggingGuard, DEFAULT_DIRECTIVES, LOG_FILE_PREFIX};

#[test]
fn logging_guard_is_send() {
    fn assert_send<T: Send>() {}
    assert_send::<LoggingGuard>();
}

#[test]
fn default_directives_quiet_client_crates() {
    assert!(DEFAULT_DIRECTIVES.starts_with("info"));
    for noisy in ["sqlx=warn", "teloxide=warn", "reqwest=warn"] {
        assert!(DEFAULT_DIRECTIVES.contains(noisy), "missing {noisy}");
    }
    assert!(DEFAULT_DIRECTIVES.parse::<tracing_subscriber::EnvFilter>().is_ok());
}

#[test]
fn init_production_creates_logs_dir_and_rejects_a_second_install() {
    let tmp = tempfile::tempdir().expect("should create temp dir");
    let logs_dir = tmp.path().join("logs");
    assert!(!logs_dir.exists());

    let first = gastos::logging::init_production(&logs_dir);
    assert!(logs_dir.exists(), "logs directory should be created");
    assert_eq!(LOG_FILE_PREFIX, "gastos.log");

    if first.is_ok() {
        assert!(gastos::logging::init_production(&logs_dir).is_err());
        gastos::logging::init_cli();
    }
}
