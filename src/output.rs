use crate::error::ErrorPayload;
use crate::export::{ArtifactMetadata, ExportStats};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Schema version for output payloads.
pub const TPX_OUTPUT_VERSION: &str = "0.1.0";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "kebab-case")]
pub enum TpxOutput {
    Export(ExportOutput),
    Preview(PreviewOutput),
    Error(ErrorOutput),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportOutput {
    pub version: String,
    pub requester: String,
    pub artifact: ArtifactMetadata,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stats: Option<ExportStats>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PreviewOutput {
    pub version: String,
    pub record_id: String,
    pub sections: Vec<PreviewSection>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PreviewSection {
    pub name: String,
    /// Set when the markup was written to a file instead of inlined.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub html: Option<String>,
    pub bytes: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorOutput {
    pub version: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub error: ErrorPayload,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ExportError;
    use crate::export::CacheKey;
    use chrono::{TimeZone, Utc};

    #[test]
    fn export_output_serializes() {
        let output = TpxOutput::Export(ExportOutput {
            version: TPX_OUTPUT_VERSION.to_string(),
            requester: "jane".to_string(),
            artifact: ArtifactMetadata {
                record_id: "R1".to_string(),
                path: PathBuf::from("/tmp/tp-001-v3-multi-all.pdf"),
                size: 2048,
                page_count: 4,
                generated_at: Utc.with_ymd_and_hms(2026, 3, 1, 10, 0, 0).unwrap(),
                cached: true,
                cache_key: CacheKey::from_raw("export:R1:v3:0:multi-all"),
                sections: vec!["cover".to_string(), "bom".to_string()],
                skipped_sections: Vec::new(),
            },
            stats: None,
        });

        let json = serde_json::to_string(&output).expect("serialize export output");
        assert!(json.contains("\"mode\":\"export\""));
        assert!(json.contains("\"pageCount\":4"));
        assert!(json.contains("\"cacheKey\":\"export:R1:v3:0:multi-all\""));
        assert!(!json.contains("skippedSections"));
        assert!(!json.contains("stats"));
    }

    #[test]
    fn preview_output_serializes() {
        let output = TpxOutput::Preview(PreviewOutput {
            version: TPX_OUTPUT_VERSION.to_string(),
            record_id: "R1".to_string(),
            sections: vec![PreviewSection {
                name: "cover".to_string(),
                path: None,
                html: Some("<html></html>".to_string()),
                bytes: 13,
            }],
        });

        let json = serde_json::to_string(&output).expect("serialize preview output");
        assert!(json.contains("\"mode\":\"preview\""));
        assert!(json.contains("\"recordId\":\"R1\""));
        assert!(!json.contains("\"path\""));
    }

    #[test]
    fn error_output_carries_retryable_flag() {
        let payload = ExportError::GenerationTimeout(std::time::Duration::from_secs(5)).to_payload();
        let output = TpxOutput::Error(ErrorOutput {
            version: TPX_OUTPUT_VERSION.to_string(),
            message: Some(payload.message.clone()),
            error: payload,
        });

        let json = serde_json::to_string(&output).expect("serialize error output");
        assert!(json.contains("\"mode\":\"error\""));
        assert!(json.contains("\"retryable\":true"));
        assert!(json.contains("\"code\":\"GENERATION_TIMEOUT\""));
    }
}
