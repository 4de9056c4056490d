use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// What went wrong inside the browser automation layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BrowserFailure {
    Launch,
    Disconnected,
    Crashed,
    PageClosed,
    Protocol,
    Timeout,
}

impl fmt::Display for BrowserFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            BrowserFailure::Launch => "launch",
            BrowserFailure::Disconnected => "disconnected",
            BrowserFailure::Crashed => "crashed",
            BrowserFailure::PageClosed => "page closed",
            BrowserFailure::Protocol => "protocol",
            BrowserFailure::Timeout => "timeout",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, Error)]
pub enum ExportError {
    #[error("Template error: {0}")]
    Template(String),

    #[error("Browser error ({kind}): {message}")]
    Browser {
        kind: BrowserFailure,
        message: String,
    },

    #[error("Export generation timed out after {0:?}")]
    GenerationTimeout(Duration),

    #[error("Export already running for record {record_id} (job {job_id}, started {started_at})")]
    LockConflict {
        record_id: String,
        job_id: String,
        started_at: DateTime<Utc>,
    },

    #[error("Assembly error: {0}")]
    Assembly(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Invalid record: {0}")]
    Record(String),

    #[error("Unexpected error: {0}")]
    Internal(String),
}

impl ExportError {
    pub fn template(message: impl Into<String>) -> Self {
        ExportError::Template(message.into())
    }

    pub fn browser(kind: BrowserFailure, message: impl Into<String>) -> Self {
        ExportError::Browser {
            kind,
            message: message.into(),
        }
    }

    pub fn page_closed(step: &str) -> Self {
        ExportError::Browser {
            kind: BrowserFailure::PageClosed,
            message: format!("page was closed before {step}"),
        }
    }

    pub fn assembly(message: impl Into<String>) -> Self {
        ExportError::Assembly(message.into())
    }

    pub fn is_page_closed(&self) -> bool {
        matches!(
            self,
            ExportError::Browser {
                kind: BrowserFailure::PageClosed,
                ..
            }
        )
    }

    pub fn code(&self) -> ErrorCode {
        match self {
            ExportError::Template(_) => ErrorCode::TemplateError,
            ExportError::Browser { .. } => ErrorCode::BrowserError,
            ExportError::GenerationTimeout(_) => ErrorCode::GenerationTimeout,
            ExportError::LockConflict { .. } => ErrorCode::LockConflict,
            ExportError::Assembly(_) => ErrorCode::AssemblyError,
            ExportError::Config(_) => ErrorCode::ConfigError,
            ExportError::Io(_) => ErrorCode::IoError,
            ExportError::Serialization(_) | ExportError::Record(_) => ErrorCode::RecordError,
            ExportError::Internal(_) => ErrorCode::InternalError,
        }
    }

    /// Timeouts and lock conflicts clear up on their own; callers may retry.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ExportError::GenerationTimeout(_) | ExportError::LockConflict { .. }
        )
    }

    pub fn to_payload(&self) -> ErrorPayload {
        let message = self.to_string();
        match self {
            ExportError::Template(_) => ErrorPayload::new(
                self.code(),
                message,
                "Check the record fields referenced by the section templates.",
            ),
            ExportError::Browser { kind, .. } => {
                let remediation = match kind {
                    BrowserFailure::Launch => {
                        "Install Chrome/Chromium or set TPX_CHROME_PATH (browser.executable_path) to its binary."
                    }
                    BrowserFailure::Timeout => {
                        "Increase render.content_load_timeout / render.pdf_timeout, or reduce image count."
                    }
                    _ => "Retry the export; the browser is relaunched automatically for new jobs.",
                };
                ErrorPayload::new(self.code(), message, remediation)
            }
            ExportError::GenerationTimeout(_) => ErrorPayload::new(
                self.code(),
                message,
                "Try again shortly, or raise export.generation_timeout for very large records.",
            ),
            ExportError::LockConflict { started_at, .. } => {
                let mut payload = ErrorPayload::new(
                    self.code(),
                    message,
                    "Another export of this record is running; wait for it to finish and retry.",
                );
                payload.details = Some(serde_json::json!({
                    "startedAt": started_at.to_rfc3339(),
                }));
                payload
            }
            ExportError::Assembly(_) => ErrorPayload::new(
                self.code(),
                message,
                "Re-run with --verbose to see which section failed to merge.",
            ),
            ExportError::Config(msg) => {
                let lower = msg.to_ascii_lowercase();
                let remediation = if lower.contains("concurrency") {
                    "Set export.concurrency (TPX_WORKER_CONCURRENCY) to at least 1."
                } else if lower.contains("quality") {
                    "Use an image quality between 1 and 100."
                } else if lower.contains("section") {
                    "Use section names: cover, bom, measurements, fit, colorways, construction, care."
                } else {
                    "Check flags, environment variables and the config file."
                };
                ErrorPayload::new(self.code(), message, remediation)
            }
            ExportError::Io(_) => ErrorPayload::new(
                self.code(),
                message,
                "Check artifact/scratch directory paths and permissions.",
            ),
            ExportError::Serialization(_) | ExportError::Record(_) => ErrorPayload::new(
                self.code(),
                message,
                "Verify the record file is valid JSON or YAML with id, code, version and modifiedAt.",
            ),
            ExportError::Internal(_) => ErrorPayload::new(
                self.code(),
                message,
                "Re-run with --verbose; file an issue if persistent.",
            ),
        }
    }
}

impl From<std::io::Error> for ExportError {
    fn from(err: std::io::Error) -> Self {
        ExportError::Io(err.to_string())
    }
}

impl From<serde_json::Error> for ExportError {
    fn from(err: serde_json::Error) -> Self {
        ExportError::Serialization(err.to_string())
    }
}

impl From<serde_yaml::Error> for ExportError {
    fn from(err: serde_yaml::Error) -> Self {
        ExportError::Serialization(err.to_string())
    }
}

impl From<askama::Error> for ExportError {
    fn from(err: askama::Error) -> Self {
        ExportError::Template(err.to_string())
    }
}

impl From<crate::config::ConfigError> for ExportError {
    fn from(err: crate::config::ConfigError) -> Self {
        ExportError::Config(err.to_string())
    }
}

impl From<lopdf::Error> for ExportError {
    fn from(err: lopdf::Error) -> Self {
        ExportError::Assembly(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, ExportError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    TemplateError,
    BrowserError,
    GenerationTimeout,
    LockConflict,
    AssemblyError,
    ConfigError,
    IoError,
    RecordError,
    InternalError,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorPayload {
    pub code: ErrorCode,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remediation: Option<String>,
    pub retryable: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl ErrorPayload {
    pub fn new(code: ErrorCode, message: String, remediation: impl Into<String>) -> Self {
        Self {
            code,
            message,
            remediation: Some(remediation.into()),
            retryable: matches!(code, ErrorCode::GenerationTimeout | ErrorCode::LockConflict),
            details: None,
        }
    }
}
