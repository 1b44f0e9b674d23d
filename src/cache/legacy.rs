//! Plain JSON cache written by earlier releases
//!
//! Read only: the first successful save rewrites it in the binary format
//! and removes the JSON file.

use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;

use super::snapshot::{CacheSnapshot, DirectoryManifest, FORMAT_VERSION, FileCacheEntry};
use crate::core::UsageRecord;
use crate::error::CacheError;

/// Highest format version a JSON cache was ever written with
const LAST_LEGACY_VERSION: u32 = 2;

#[derive(Debug, Deserialize)]
pub(crate) struct LegacySnapshot {
    #[serde(default)]
    version: u32,
    #[serde(default)]
    timezone: String,
    #[serde(default)]
    files: Option<HashMap<String, LegacyFileEntry>>,
    #[serde(default)]
    dirs: Option<HashMap<String, i64>>,
    #[serde(default)]
    last_full_walk: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
struct LegacyFileEntry {
    mtime: i64,
    size: i64,
    #[serde(default)]
    entries: Option<Vec<LegacyEntry>>,
}

#[derive(Debug, Deserialize)]
struct LegacyEntry {
    key: String,
    date: String,
    model: String,
    #[serde(default)]
    input_tokens: i64,
    #[serde(default)]
    output_tokens: i64,
    #[serde(default)]
    cache_creation_tokens: i64,
    #[serde(default)]
    cache_read_tokens: i64,
}

impl LegacySnapshot {
    pub(crate) fn from_json(bytes: &[u8]) -> Result<Self, CacheError> {
        Ok(serde_json::from_slice(bytes)?)
    }

    /// Convert into the current in-memory model. Versions newer than any
    /// JSON release keep their number so the compatibility check rejects them.
    fn upgrade(self) -> CacheSnapshot {
        let format_version = if (1..=LAST_LEGACY_VERSION).contains(&self.version) {
            FORMAT_VERSION
        } else {
            self.version
        };

        let files: BTreeMap<PathBuf, FileCacheEntry> = self
            .files
            .unwrap_or_default()
            .into_iter()
            .map(|(path, entry)| {
                let records = entry
                    .entries
                    .unwrap_or_default()
                    .into_iter()
                    .map(|e| UsageRecord {
                        key: e.key,
                        date: e.date,
                        model: e.model,
                        input_tokens: e.input_tokens,
                        output_tokens: e.output_tokens,
                        cache_creation: e.cache_creation_tokens,
                        cache_read: e.cache_read_tokens,
                    })
                    .collect();
                let cached = FileCacheEntry {
                    mtime: entry.mtime,
                    size: entry.size.max(0) as u64,
                    records,
                };
                (PathBuf::from(path), cached)
            })
            .collect();

        let manifest: DirectoryManifest = self
            .dirs
            .unwrap_or_default()
            .into_iter()
            .map(|(path, mtime)| (PathBuf::from(path), mtime))
            .collect();

        CacheSnapshot {
            format_version,
            timezone: self.timezone,
            // JSON caches never recorded their root
            root: None,
            files,
            manifest,
            last_full_walk_ms: self
                .last_full_walk
                .map(|t| t.timestamp_millis())
                .filter(|ms| *ms > 0),
        }
    }
}

/// A cache as found on disk, in either schema
#[derive(Debug)]
pub(crate) enum StoredCache {
    Current(CacheSnapshot),
    Legacy(LegacySnapshot),
}

impl StoredCache {
    pub(crate) fn is_legacy(&self) -> bool {
        matches!(self, StoredCache::Legacy(_))
    }

    pub(crate) fn upgrade(self) -> CacheSnapshot {
        match self {
            StoredCache::Current(snapshot) => snapshot,
            StoredCache::Legacy(legacy) => legacy.upgrade(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    const LEGACY_JSON: &str = r#"{
        "version": 2,
        "timezone": "CET",
        "files": {
            "/logs/p1/a.jsonl": {
                "mtime": 1700000000000000000,
                "size": 321,
                "entries": [
                    {"key": "m1:r1", "date": "2025-01-01", "model": "claude-sonnet-4-20250514",
                     "input_tokens": 10, "output_tokens": 20,
                     "cache_creation_tokens": 30, "cache_read_tokens": 40}
                ]
            },
            "/logs/p1/empty.jsonl": {"mtime": 5, "size": 0, "entries": null}
        },
        "dirs": {"/logs": 1, "/logs/p1": 2},
        "last_full_walk": "2025-01-01T00:00:00Z"
    }"#;

    #[test]
    fn upgrades_legacy_json() {
        let stored = StoredCache::Legacy(LegacySnapshot::from_json(LEGACY_JSON.as_bytes()).unwrap());
        assert!(stored.is_legacy());
        let snapshot = stored.upgrade();

        assert_eq!(snapshot.format_version, FORMAT_VERSION);
        assert!(snapshot.is_compatible("CET"));
        assert_eq!(snapshot.files.len(), 2);

        let entry = &snapshot.files[Path::new("/logs/p1/a.jsonl")];
        assert_eq!(entry.size, 321);
        assert_eq!(entry.records[0].cache_creation, 30);
        assert_eq!(entry.records[0].total_tokens(), 100);
        assert!(snapshot.files[Path::new("/logs/p1/empty.jsonl")].records.is_empty());

        assert_eq!(snapshot.manifest.get(Path::new("/logs/p1")), Some(2));
        assert_eq!(snapshot.last_full_walk_ms, Some(1_735_689_600_000));
    }

    #[test]
    fn zero_time_full_walk_is_treated_as_never() {
        let json = r#"{"version": 1, "timezone": "UTC", "files": {},
                       "last_full_walk": "0001-01-01T00:00:00Z"}"#;
        let snapshot = LegacySnapshot::from_json(json.as_bytes()).unwrap().upgrade();
        assert_eq!(snapshot.last_full_walk_ms, None);
        assert!(snapshot.manifest.is_empty());
    }

    #[test]
    fn unknown_legacy_version_stays_incompatible() {
        let json = r#"{"version": 7, "timezone": "UTC"}"#;
        let snapshot = LegacySnapshot::from_json(json.as_bytes()).unwrap().upgrade();
        assert!(!snapshot.is_compatible("UTC"));
    }

    #[test]
    fn malformed_json_is_an_error() {
        assert!(matches!(
            LegacySnapshot::from_json(b"{not json"),
            Err(CacheError::Legacy(_))
        ));
    }

    #[test]
    fn current_snapshot_passes_through() {
        let snapshot = CacheSnapshot::new("UTC");
        let stored = StoredCache::Current(snapshot.clone());
        assert!(!stored.is_legacy());
        assert_eq!(stored.upgrade(), snapshot);
    }
}
