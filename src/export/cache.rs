//! Artifact metadata cache.
//!
//! Entries only describe artifacts; the PDF bytes live in the artifact
//! directory. An entry is served only while its file is still there with the
//! recorded size.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, warn};

use super::job::{ArtifactMetadata, CacheKey};
use crate::error::Result;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheEntry {
    pub key: CacheKey,
    pub record_id: String,
    pub path: PathBuf,
    pub size: u64,
    pub page_count: usize,
    pub generated_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub sections: Vec<String>,
    #[serde(default)]
    pub skipped_sections: Vec<String>,
}

impl CacheEntry {
    pub fn from_metadata(metadata: &ArtifactMetadata, ttl: Duration) -> Self {
        let ttl = chrono::Duration::from_std(ttl).unwrap_or_else(|_| chrono::Duration::days(1));
        Self {
            key: metadata.cache_key.clone(),
            record_id: metadata.record_id.clone(),
            path: metadata.path.clone(),
            size: metadata.size,
            page_count: metadata.page_count,
            generated_at: metadata.generated_at,
            expires_at: metadata.generated_at + ttl,
            sections: metadata.sections.clone(),
            skipped_sections: metadata.skipped_sections.clone(),
        }
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    pub fn to_metadata(&self) -> ArtifactMetadata {
        ArtifactMetadata {
            record_id: self.record_id.clone(),
            path: self.path.clone(),
            size: self.size,
            page_count: self.page_count,
            generated_at: self.generated_at,
            cached: true,
            cache_key: self.key.clone(),
            sections: self.sections.clone(),
            skipped_sections: self.skipped_sections.clone(),
        }
    }
}

/// Key-value store for cache entries. Expired entries are never returned.
pub trait CacheStore: Send + Sync {
    fn get(&self, key: &CacheKey) -> Option<CacheEntry>;
    fn put(&self, entry: CacheEntry) -> Result<()>;
    fn remove(&self, key: &CacheKey);
}

/// Process-local store.
#[derive(Debug, Default)]
pub struct MemoryCacheStore {
    entries: DashMap<CacheKey, CacheEntry>,
}

impl MemoryCacheStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl CacheStore for MemoryCacheStore {
    fn get(&self, key: &CacheKey) -> Option<CacheEntry> {
        let entry = self.entries.get(key)?.clone();
        if entry.is_expired(Utc::now()) {
            self.entries.remove(key);
            return None;
        }
        Some(entry)
    }

    fn put(&self, entry: CacheEntry) -> Result<()> {
        self.entries.insert(entry.key.clone(), entry);
        Ok(())
    }

    fn remove(&self, key: &CacheKey) {
        self.entries.remove(key);
    }
}

/// One JSON file per entry, so separate processes share the cache.
#[derive(Debug, Clone)]
pub struct FileCacheStore {
    dir: PathBuf,
}

impl FileCacheStore {
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    fn entry_path(&self, key: &CacheKey) -> PathBuf {
        let name: String = key
            .as_str()
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '-' { c } else { '_' })
            .collect();
        self.dir.join(format!("{name}.json"))
    }
}

impl CacheStore for FileCacheStore {
    fn get(&self, key: &CacheKey) -> Option<CacheEntry> {
        let path = self.entry_path(key);
        let raw = fs::read(&path).ok()?;
        let entry: CacheEntry = match serde_json::from_slice(&raw) {
            Ok(entry) => entry,
            Err(err) => {
                warn!(path = %path.display(), error = %err, "dropping unreadable cache entry");
                let _ = fs::remove_file(&path);
                return None;
            }
        };
        if entry.key != *key || entry.is_expired(Utc::now()) {
            let _ = fs::remove_file(&path);
            return None;
        }
        Some(entry)
    }

    fn put(&self, entry: CacheEntry) -> Result<()> {
        let path = self.entry_path(&entry.key);
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, serde_json::to_vec_pretty(&entry)?)?;
        fs::rename(&tmp, &path)?;
        Ok(())
    }

    fn remove(&self, key: &CacheKey) {
        let _ = fs::remove_file(self.entry_path(key));
    }
}

/// Returns the entry for `key` if its artifact is intact. A missing file
/// evicts the entry; a size mismatch also deletes the file.
pub fn lookup_valid(store: &dyn CacheStore, key: &CacheKey) -> Option<CacheEntry> {
    let entry = store.get(key)?;
    match artifact_size(&entry.path) {
        Some(size) if size == entry.size => Some(entry),
        Some(size) => {
            warn!(
                cache_key = %key,
                expected = entry.size,
                actual = size,
                "artifact size mismatch, evicting"
            );
            store.remove(key);
            let _ = fs::remove_file(&entry.path);
            None
        }
        None => {
            debug!(cache_key = %key, path = %entry.path.display(), "artifact missing, evicting");
            store.remove(key);
            None
        }
    }
}

fn artifact_size(path: &Path) -> Option<u64> {
    fs::metadata(path).ok().filter(|m| m.is_file()).map(|m| m.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn entry(dir: &Path, key: &str, size: u64, ttl: Duration) -> CacheEntry {
        let metadata = ArtifactMetadata {
            record_id: "R1".into(),
            path: dir.join("a.pdf"),
            size,
            page_count: 2,
            generated_at: Utc::now(),
            cached: false,
            cache_key: CacheKey::from_raw(key),
            sections: vec!["cover".into()],
            skipped_sections: Vec::new(),
        };
        CacheEntry::from_metadata(&metadata, ttl)
    }

    #[test]
    fn memory_store_serves_intact_artifacts() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("a.pdf"), b"%PDF-1.7").unwrap();
        let store = MemoryCacheStore::new();
        let e = entry(dir.path(), "k", 8, Duration::from_secs(60));
        store.put(e.clone()).unwrap();

        let hit = lookup_valid(&store, &e.key).unwrap();
        assert!(hit.to_metadata().cached);
    }

    #[test]
    fn missing_artifact_evicts_entry() {
        let dir = TempDir::new().unwrap();
        let store = MemoryCacheStore::new();
        let e = entry(dir.path(), "k", 8, Duration::from_secs(60));
        store.put(e.clone()).unwrap();

        assert!(lookup_valid(&store, &e.key).is_none());
        assert!(store.is_empty());
    }

    #[test]
    fn size_mismatch_deletes_artifact() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("a.pdf"), b"%PDF-1.7 truncated?").unwrap();
        let store = MemoryCacheStore::new();
        let e = entry(dir.path(), "k", 8, Duration::from_secs(60));
        store.put(e.clone()).unwrap();

        assert!(lookup_valid(&store, &e.key).is_none());
        assert!(!dir.path().join("a.pdf").exists());
    }

    #[test]
    fn expired_entries_are_not_served() {
        let dir = TempDir::new().unwrap();
        let store = MemoryCacheStore::new();
        let e = entry(dir.path(), "k", 8, Duration::ZERO);
        store.put(e.clone()).unwrap();
        assert!(store.get(&e.key).is_none());
    }

    #[test]
    fn file_store_round_trips_across_instances() {
        let dir = TempDir::new().unwrap();
        let e = entry(dir.path(), "export:R1:v3:1:multi-all", 8, Duration::from_secs(60));
        FileCacheStore::new(dir.path().join("cache"))
            .unwrap()
            .put(e.clone())
            .unwrap();

        let reopened = FileCacheStore::new(dir.path().join("cache")).unwrap();
        assert_eq!(reopened.get(&e.key), Some(e.clone()));
        reopened.remove(&e.key);
        assert!(reopened.get(&e.key).is_none());
    }
}
