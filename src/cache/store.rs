//! On-disk location and atomic persistence of the cache

use std::ffi::OsString;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use super::codec::{decode, encode};
use super::legacy::{LegacySnapshot, StoredCache};
use super::snapshot::CacheSnapshot;
use crate::consts::CACHE_DIR_ENV;
use crate::error::CacheError;

const CACHE_FILE: &str = "cache.bin";
const LEGACY_CACHE_FILE: &str = "cache.json";
const APP_DIR: &str = "cctally";

/// Pick the cache directory: explicit override, then XDG, then `~/.cache`
fn resolve_cache_dir(
    override_dir: Option<OsString>,
    xdg_cache_home: Option<OsString>,
    home: Option<PathBuf>,
) -> Option<PathBuf> {
    let non_empty = |v: OsString| (!v.is_empty()).then(|| PathBuf::from(v));
    if let Some(dir) = override_dir.and_then(non_empty) {
        return Some(dir);
    }
    if let Some(dir) = xdg_cache_home.and_then(non_empty) {
        return Some(dir.join(APP_DIR));
    }
    home.map(|h| h.join(".cache").join(APP_DIR))
}

fn io_error(path: &Path, source: std::io::Error) -> CacheError {
    CacheError::Io {
        path: path.to_path_buf(),
        source,
    }
}

/// Cache files of one installation
#[derive(Debug, Clone)]
pub(crate) struct CacheStore {
    dir: PathBuf,
}

impl CacheStore {
    pub(crate) fn new(dir: PathBuf) -> Self {
        Self { dir }
    }

    /// Locate the cache directory from the environment
    pub(crate) fn locate() -> Option<Self> {
        resolve_cache_dir(
            std::env::var_os(CACHE_DIR_ENV),
            std::env::var_os("XDG_CACHE_HOME"),
            dirs::home_dir(),
        )
        .map(Self::new)
    }

    pub(crate) fn path(&self) -> PathBuf {
        self.dir.join(CACHE_FILE)
    }

    pub(crate) fn legacy_path(&self) -> PathBuf {
        self.dir.join(LEGACY_CACHE_FILE)
    }

    /// Read the cache. A missing binary file falls back to the legacy JSON
    /// file; anything unreadable yields `None` so the caller rebuilds.
    pub(crate) fn load(&self) -> Option<StoredCache> {
        let path = self.path();
        let bytes = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == ErrorKind::NotFound => return self.load_legacy(),
            Err(err) => {
                tracing::info!(error = %io_error(&path, err), "cache unreadable, rebuilding");
                return None;
            }
        };
        match decode(&bytes) {
            Ok(snapshot) => Some(StoredCache::Current(snapshot)),
            Err(err) => {
                tracing::info!(path = %path.display(), error = %err, "cache rejected, rebuilding");
                None
            }
        }
    }

    fn load_legacy(&self) -> Option<StoredCache> {
        let path = self.legacy_path();
        let bytes = fs::read(&path).ok()?;
        match LegacySnapshot::from_json(&bytes) {
            Ok(legacy) => {
                tracing::debug!(path = %path.display(), "migrating legacy JSON cache");
                Some(StoredCache::Legacy(legacy))
            }
            Err(err) => {
                tracing::info!(path = %path.display(), error = %err, "legacy cache rejected");
                None
            }
        }
    }

    /// Write the snapshot via temp file + rename, then drop the legacy file
    pub(crate) fn save(&self, snapshot: &CacheSnapshot) -> Result<(), CacheError> {
        fs::create_dir_all(&self.dir).map_err(|e| io_error(&self.dir, e))?;

        let bytes = encode(snapshot)?;
        let path = self.path();
        let tmp_path = path.with_extension("bin.tmp");
        fs::write(&tmp_path, &bytes).map_err(|e| io_error(&tmp_path, e))?;
        if let Err(err) = fs::rename(&tmp_path, &path) {
            let _ = fs::remove_file(&tmp_path);
            return Err(io_error(&path, err));
        }

        let legacy = self.legacy_path();
        match fs::remove_file(&legacy) {
            Ok(()) => tracing::debug!(path = %legacy.display(), "removed legacy cache"),
            Err(err) if err.kind() == ErrorKind::NotFound => {}
            Err(err) => tracing::debug!(error = %err, "could not remove legacy cache"),
        }
        Ok(())
    }

    /// Delete both cache files
    pub(crate) fn clear(&self) {
        for path in [self.path(), self.legacy_path()] {
            if let Err(err) = fs::remove_file(&path)
                && err.kind() != ErrorKind::NotFound
            {
                tracing::warn!(path = %path.display(), error = %err, "failed to delete cache");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::snapshot::{FORMAT_VERSION, FileCacheEntry};
    use crate::core::UsageRecord;

    fn snapshot_with_record() -> CacheSnapshot {
        let mut snapshot = CacheSnapshot::new("UTC");
        snapshot.files.insert(
            PathBuf::from("/logs/a.jsonl"),
            FileCacheEntry {
                mtime: 42,
                size: 7,
                records: vec![UsageRecord {
                    key: "m:r".into(),
                    date: "2025-01-01".into(),
                    model: "sonnet".into(),
                    input_tokens: 1,
                    output_tokens: 2,
                    cache_creation: 3,
                    cache_read: 4,
                }],
            },
        );
        snapshot
    }

    #[test]
    fn resolve_prefers_override_then_xdg_then_home() {
        let home = Some(PathBuf::from("/home/u"));
        assert_eq!(
            resolve_cache_dir(Some("/custom".into()), Some("/xdg".into()), home.clone()),
            Some(PathBuf::from("/custom"))
        );
        assert_eq!(
            resolve_cache_dir(Some("".into()), Some("/xdg".into()), home.clone()),
            Some(PathBuf::from("/xdg/cctally"))
        );
        assert_eq!(
            resolve_cache_dir(None, None, home),
            Some(PathBuf::from("/home/u/.cache/cctally"))
        );
        assert_eq!(resolve_cache_dir(None, None, None), None);
    }

    #[test]
    fn save_then_load_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let store = CacheStore::new(dir.path().join("nested"));
        let snapshot = snapshot_with_record();

        store.save(&snapshot).unwrap();
        assert!(store.path().exists());
        assert!(!store.path().with_extension("bin.tmp").exists());

        let loaded = store.load().unwrap();
        assert!(!loaded.is_legacy());
        assert_eq!(loaded.upgrade(), snapshot);
    }

    #[test]
    fn missing_cache_loads_nothing() {
        let dir = tempfile::tempdir().unwrap();
        assert!(CacheStore::new(dir.path().to_path_buf()).load().is_none());
    }

    #[test]
    fn corrupt_cache_is_discarded() {
        let dir = tempfile::tempdir().unwrap();
        let store = CacheStore::new(dir.path().to_path_buf());
        fs::write(store.path(), b"garbage that is not a cache").unwrap();
        assert!(store.load().is_none());
    }

    #[test]
    fn legacy_cache_is_migrated_and_removed_on_save() {
        let dir = tempfile::tempdir().unwrap();
        let store = CacheStore::new(dir.path().to_path_buf());
        fs::write(
            store.legacy_path(),
            r#"{"version":2,"timezone":"UTC","files":{"/logs/a.jsonl":{"mtime":42,"size":7,
               "entries":[{"key":"m:r","date":"2025-01-01","model":"sonnet","input_tokens":1,
               "output_tokens":2,"cache_creation_tokens":3,"cache_read_tokens":4}]}}}"#,
        )
        .unwrap();

        let loaded = store.load().unwrap();
        assert!(loaded.is_legacy());
        let snapshot = loaded.upgrade();
        assert_eq!(snapshot.format_version, FORMAT_VERSION);
        assert_eq!(snapshot, snapshot_with_record());
        assert!(store.legacy_path().exists());

        store.save(&snapshot).unwrap();
        assert!(!store.legacy_path().exists());
        assert!(!store.load().unwrap().is_legacy());
    }

    #[test]
    fn clear_removes_both_files() {
        let dir = tempfile::tempdir().unwrap();
        let store = CacheStore::new(dir.path().to_path_buf());
        store.save(&snapshot_with_record()).unwrap();
        fs::write(store.legacy_path(), b"{}").unwrap();

        store.clear();
        assert!(!store.path().exists());
        assert!(!store.legacy_path().exists());
        store.clear();
    }

    #[test]
    fn save_failure_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("file");
        fs::write(&blocker, b"x").unwrap();
        let store = CacheStore::new(blocker.join("sub"));
        assert!(matches!(
            store.save(&CacheSnapshot::new("UTC")),
            Err(CacheError::Io { .. })
        ));
    }
}
