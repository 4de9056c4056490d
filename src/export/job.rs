use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::config::RenderMode;
use crate::types::DocumentRecord;

/// Identity of one cached artifact: record, version, modification time and
/// render variant.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CacheKey(String);

impl CacheKey {
    pub fn new(record: &DocumentRecord, variant: &str) -> Self {
        Self(format!(
            "export:{}:v{}:{}:{}",
            record.id,
            record.version,
            record.modified_at.timestamp_millis(),
            variant
        ))
    }

    #[cfg(test)]
    pub(crate) fn from_raw(raw: &str) -> Self {
        Self(raw.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Per-request knobs of an export.
#[derive(Debug, Clone, Default)]
pub struct ExportOptions {
    /// Explicit section filter; `None` renders every section with content.
    pub sections: Option<Vec<String>>,
    /// Skip the cache lookup and regenerate.
    pub force: bool,
    /// Overrides the configured render mode.
    pub mode: Option<RenderMode>,
}

/// Render variant string for a mode and a resolved section list. `all`
/// stands for the unfiltered list.
pub fn variant(mode: RenderMode, sections: &[String], filtered: bool) -> String {
    let mode = match mode {
        RenderMode::SingleDocument => "single",
        RenderMode::MultiSection => "multi",
    };
    if filtered {
        format!("{mode}-{}", sections.join("+"))
    } else {
        format!("{mode}-all")
    }
}

/// One request to produce an artifact.
#[derive(Debug, Clone)]
pub struct ExportJob {
    pub id: String,
    pub record_id: String,
    pub requester: String,
    pub key: CacheKey,
    pub variant: String,
    pub mode: RenderMode,
    /// Resolved section names, in descriptor order.
    pub sections: Vec<String>,
    pub force: bool,
    pub created_at: DateTime<Utc>,
}

/// Hands out `job-1`, `job-2`, ... for the lifetime of a coordinator.
#[derive(Debug, Default)]
pub struct JobIdGenerator {
    next: AtomicU64,
}

impl JobIdGenerator {
    pub fn next_id(&self) -> String {
        format!("job-{}", self.next.fetch_add(1, Ordering::SeqCst) + 1)
    }
}

/// What callers get back for a produced or cached artifact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArtifactMetadata {
    pub record_id: String,
    pub path: PathBuf,
    pub size: u64,
    pub page_count: usize,
    pub generated_at: DateTime<Utc>,
    pub cached: bool,
    pub cache_key: CacheKey,
    pub sections: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub skipped_sections: Vec<String>,
}

/// File name of an artifact. Carries every part of the [`CacheKey`] (code,
/// version, modification time, variant) so two keys never share a file.
pub fn artifact_file_name(record: &DocumentRecord, variant: &str) -> String {
    let code = slug::slugify(&record.code);
    let code = if code.is_empty() {
        slug::slugify(&record.id)
    } else {
        code
    };
    format!(
        "{code}-v{}-{}-{}.pdf",
        slug::slugify(&record.version),
        record.modified_at.timestamp_millis(),
        slug::slugify(variant)
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn record() -> DocumentRecord {
        serde_json::from_value(serde_json::json!({
            "id": "R1",
            "code": "TP 001/Jacket",
            "version": 3,
            "modifiedAt": "2026-03-01T10:00:00Z",
            "product": { "name": "Jacket" }
        }))
        .unwrap()
    }

    #[test]
    fn cache_key_changes_with_modification_time() {
        let mut rec = record();
        let before = CacheKey::new(&rec, "multi-all");
        rec.modified_at = Utc.with_ymd_and_hms(2026, 3, 2, 10, 0, 0).unwrap();
        let after = CacheKey::new(&rec, "multi-all");
        assert_ne!(before, after);
        assert!(before.as_str().starts_with("export:R1:v3:"));
        assert!(before.as_str().ends_with(":multi-all"));
    }

    #[test]
    fn variant_names_filters() {
        let sections = vec!["bom".to_string(), "care".to_string()];
        assert_eq!(variant(RenderMode::MultiSection, &sections, false), "multi-all");
        assert_eq!(
            variant(RenderMode::SingleDocument, &sections, true),
            "single-bom+care"
        );
    }

    #[test]
    fn job_ids_are_monotonic() {
        let ids = JobIdGenerator::default();
        assert_eq!(ids.next_id(), "job-1");
        assert_eq!(ids.next_id(), "job-2");
    }

    #[test]
    fn artifact_name_is_filesystem_safe() {
        let name = artifact_file_name(&record(), "multi-bom+care");
        assert_eq!(name, "tp-001-jacket-v3-1772359200000-multi-bom-care.pdf");
    }

    #[test]
    fn artifact_name_changes_with_modification_time() {
        let mut rec = record();
        let before = artifact_file_name(&rec, "multi-all");
        rec.modified_at = Utc.with_ymd_and_hms(2026, 3, 2, 10, 0, 0).unwrap();
        let after = artifact_file_name(&rec, "multi-all");
        assert_ne!(before, after);
    }
}
