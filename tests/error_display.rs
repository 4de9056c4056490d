use std::time::Duration;

use chrono::TimeZone;
use tpx_lib::{BrowserFailure, ErrorCode, ExportError};

#[test]
fn config_error_display_includes_message() {
    let err = ExportError::Config("unknown section 'sleeves'".to_string());

    assert_eq!(
        format!("{}", err),
        "Configuration error: unknown section 'sleeves'"
    );
}

#[test]
fn io_error_display_wraps_source() {
    let io_err = std::io::Error::other("disk full");
    let err: ExportError = io_err.into();
    let rendered = format!("{}", err);

    assert!(rendered.starts_with("IO error: "));
    assert!(rendered.contains("disk full"));
}

#[test]
fn browser_helper_names_the_failure_kind() {
    let err = ExportError::browser(BrowserFailure::Launch, "no chrome binary");
    let rendered = format!("{}", err);

    assert!(rendered.starts_with("Browser error ("));
    assert!(rendered.contains("no chrome binary"));
    assert_eq!(err.code(), ErrorCode::BrowserError);
    assert!(!err.is_retryable());
}

#[test]
fn lock_conflict_names_holder_and_is_retryable() {
    let err = ExportError::LockConflict {
        record_id: "R1".to_string(),
        job_id: "job-7".to_string(),
        started_at: chrono::Utc.with_ymd_and_hms(2026, 3, 1, 10, 0, 0).unwrap(),
    };

    let rendered = format!("{}", err);
    assert!(rendered.contains("record R1"));
    assert!(rendered.contains("job job-7"));
    assert!(err.is_retryable());

    let payload = err.to_payload();
    assert!(payload.retryable);
    assert!(payload.details.is_some());
}

#[test]
fn generation_timeout_mentions_the_limit() {
    let err = ExportError::GenerationTimeout(Duration::from_secs(90));

    assert_eq!(
        format!("{}", err),
        "Export generation timed out after 90s"
    );
    assert!(err.to_payload().remediation.is_some());
}

#[test]
fn template_helper_uses_message() {
    let err = ExportError::template("missing field");

    assert_eq!(format!("{}", err), "Template error: missing field");
}
