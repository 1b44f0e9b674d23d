//! In-memory model of the persisted cache

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::Metadata;
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;

use crate::core::UsageRecord;

/// Current on-disk format version. Bump when the payload layout or the
/// parsing rules change; a mismatch discards the whole cache.
pub(crate) const FORMAT_VERSION: u32 = 3;

/// Modification time (ns since the Unix epoch) and size of a file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct FileMeta {
    pub(crate) mtime: i64,
    pub(crate) size: u64,
}

/// Modification time in nanoseconds; 0 when the platform cannot report it
pub(crate) fn mtime_nanos(meta: &Metadata) -> i64 {
    meta.modified()
        .ok()
        .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
        .map(|d| d.as_nanos() as i64)
        .unwrap_or(0)
}

/// Get file metadata (mtime, size)
pub(crate) fn file_meta(path: &Path) -> Option<FileMeta> {
    let meta = std::fs::metadata(path).ok()?;
    if !meta.is_file() {
        return None;
    }
    Some(FileMeta {
        mtime: mtime_nanos(&meta),
        size: meta.len(),
    })
}

/// Parsed records of one log file, valid while the file's metadata matches
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct FileCacheEntry {
    pub(crate) mtime: i64,
    pub(crate) size: u64,
    pub(crate) records: Vec<UsageRecord>,
}

impl FileCacheEntry {
    pub(crate) fn new(meta: FileMeta, records: Vec<UsageRecord>) -> Self {
        Self {
            mtime: meta.mtime,
            size: meta.size,
            records,
        }
    }

    pub(crate) fn matches(&self, meta: FileMeta) -> bool {
        self.mtime == meta.mtime && self.size == meta.size
    }
}

/// Directory path -> last observed modification time.
///
/// A directory's mtime moves when entries are added or removed, never on
/// in-place edits of the files inside, so it only answers "may this
/// directory have gained or lost files".
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub(crate) struct DirectoryManifest {
    dirs: BTreeMap<PathBuf, i64>,
}

impl DirectoryManifest {
    pub(crate) fn record(&mut self, dir: PathBuf, mtime: i64) {
        self.dirs.insert(dir, mtime);
    }

    #[cfg(test)]
    pub(crate) fn get(&self, dir: &Path) -> Option<i64> {
        self.dirs.get(dir).copied()
    }

    #[cfg(test)]
    pub(crate) fn contains(&self, dir: &Path) -> bool {
        self.dirs.contains_key(dir)
    }

    /// Drop `dir` and everything below it
    pub(crate) fn remove_subtree(&mut self, dir: &Path) {
        self.dirs.retain(|path, _| !path.starts_with(dir));
    }

    pub(crate) fn replace(&mut self, dirs: BTreeMap<PathBuf, i64>) {
        self.dirs = dirs;
    }

    pub(crate) fn iter(&self) -> impl Iterator<Item = (&PathBuf, i64)> {
        self.dirs.iter().map(|(path, mtime)| (path, *mtime))
    }

    pub(crate) fn len(&self) -> usize {
        self.dirs.len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.dirs.is_empty()
    }
}

impl FromIterator<(PathBuf, i64)> for DirectoryManifest {
    fn from_iter<I: IntoIterator<Item = (PathBuf, i64)>>(iter: I) -> Self {
        Self {
            dirs: iter.into_iter().collect(),
        }
    }
}

/// The whole persisted state: loaded once, mutated by discovery and
/// reconciliation, written back when dirty.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct CacheSnapshot {
    pub(crate) format_version: u32,
    /// Label of the timezone the record dates were bucketed in
    pub(crate) timezone: String,
    /// Log root the manifest was built from
    pub(crate) root: Option<PathBuf>,
    pub(crate) files: BTreeMap<PathBuf, FileCacheEntry>,
    pub(crate) manifest: DirectoryManifest,
    /// Unix milliseconds of the last confirmed full walk
    pub(crate) last_full_walk_ms: Option<i64>,
}

impl CacheSnapshot {
    pub(crate) fn new(timezone: &str) -> Self {
        Self {
            format_version: FORMAT_VERSION,
            timezone: timezone.to_string(),
            root: None,
            files: BTreeMap::new(),
            manifest: DirectoryManifest::default(),
            last_full_walk_ms: None,
        }
    }

    /// A snapshot built under another format or timezone is useless:
    /// its dates would be bucketed differently.
    pub(crate) fn is_compatible(&self, timezone: &str) -> bool {
        self.format_version == FORMAT_VERSION && self.timezone == timezone
    }

    pub(crate) fn record_count(&self) -> usize {
        self.files.values().map(|entry| entry.records.len()).sum()
    }
}
