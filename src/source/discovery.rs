//! Log file discovery driven by the directory manifest
//!
//! A cold or stale cache triggers a full walk of the root. Otherwise every
//! manifested directory is stat'ed once: unchanged directories contribute
//! the files the cache already knows about, and only the changed subtrees
//! are walked again.

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};
use walkdir::WalkDir;

use crate::cache::{CacheSnapshot, mtime_nanos};
use crate::consts::{FULL_WALK_INTERVAL, LOG_EXTENSION};

/// Counters describing how discovery went
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub(crate) struct DiscoveryStats {
    pub(crate) full_walk: bool,
    pub(crate) dirs_checked: usize,
    pub(crate) dirs_changed: usize,
    pub(crate) subtrees_walked: usize,
    pub(crate) files_from_cache: usize,
}

impl DiscoveryStats {
    /// Whether the manifest was rewritten and needs persisting
    pub(crate) fn manifest_changed(&self) -> bool {
        self.full_walk || self.dirs_changed > 0
    }
}

fn now_ms(now: SystemTime) -> i64 {
    now.duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

fn is_log_file(path: &Path) -> bool {
    path.extension().is_some_and(|ext| ext == LOG_EXTENSION)
}

/// Files and directory mtimes found under one subtree
#[derive(Debug, Default)]
struct WalkResult {
    files: Vec<PathBuf>,
    dirs: BTreeMap<PathBuf, i64>,
}

/// Recursive walk collecting log files and directory mtimes.
/// Unreadable entries are skipped.
fn walk(root: &Path) -> WalkResult {
    let mut result = WalkResult::default();
    for entry in WalkDir::new(root).into_iter().filter_map(Result::ok) {
        if entry.file_type().is_dir() {
            if let Ok(meta) = entry.metadata() {
                result.dirs.insert(entry.into_path(), mtime_nanos(&meta));
            }
        } else if is_log_file(entry.path()) {
            result.files.push(entry.into_path());
        }
    }
    result
}

/// Reduce a set of directories to those not below another member
pub(crate) fn minimal_roots(dirs: &BTreeSet<PathBuf>) -> Vec<PathBuf> {
    let mut roots: Vec<PathBuf> = Vec::new();
    for dir in dirs {
        // Sorted component-wise, so an ancestor always precedes its descendants
        if !roots.iter().any(|root| dir.starts_with(root)) {
            roots.push(dir.clone());
        }
    }
    roots
}

fn needs_full_walk(snapshot: &CacheSnapshot, root: &Path, now: SystemTime) -> bool {
    if snapshot.manifest.is_empty() {
        return true;
    }
    // A manifest built from another root says nothing about this one
    if snapshot.root.as_deref() != Some(root) {
        tracing::debug!(
            cached_root = ?snapshot.root,
            root = %root.display(),
            "log root changed"
        );
        return true;
    }
    match snapshot.last_full_walk_ms {
        Some(last) => {
            let elapsed = now_ms(now).saturating_sub(last);
            elapsed < 0 || elapsed as u128 > FULL_WALK_INTERVAL.as_millis()
        }
        None => true,
    }
}

/// Find every log file under `root`, refreshing the snapshot's manifest.
///
/// Returns paths sorted and deduplicated.
pub(crate) fn discover(
    root: &Path,
    snapshot: &mut CacheSnapshot,
    now: SystemTime,
) -> (Vec<PathBuf>, DiscoveryStats) {
    let mut stats = DiscoveryStats::default();

    if needs_full_walk(snapshot, root, now) {
        let WalkResult { mut files, dirs } = walk(root);
        stats.full_walk = true;
        stats.dirs_checked = dirs.len();
        snapshot.root = Some(root.to_path_buf());
        snapshot.manifest.replace(dirs);
        snapshot.last_full_walk_ms = Some(now_ms(now));
        files.sort();
        files.dedup();
        tracing::debug!(files = files.len(), dirs = stats.dirs_checked, "full walk");
        return (files, stats);
    }

    stats.dirs_checked = snapshot.manifest.len();
    let mut unchanged: HashSet<PathBuf> = HashSet::new();
    let mut changed: BTreeSet<PathBuf> = BTreeSet::new();
    let mut missing: Vec<PathBuf> = Vec::new();

    for (dir, cached_mtime) in snapshot.manifest.iter() {
        match std::fs::metadata(dir) {
            Ok(meta) if meta.is_dir() && mtime_nanos(&meta) == cached_mtime => {
                unchanged.insert(dir.clone());
            }
            Ok(meta) if meta.is_dir() => {
                changed.insert(dir.clone());
            }
            _ => {
                changed.insert(dir.clone());
                missing.push(dir.clone());
            }
        }
    }
    stats.dirs_changed = changed.len();

    let mut files: BTreeSet<PathBuf> = BTreeSet::new();
    for path in snapshot.files.keys() {
        if path.parent().is_some_and(|parent| unchanged.contains(parent)) {
            files.insert(path.clone());
            stats.files_from_cache += 1;
        }
    }

    let mut refreshed: HashSet<PathBuf> = HashSet::new();
    for subtree in minimal_roots(&changed) {
        stats.subtrees_walked += 1;
        let WalkResult {
            files: found,
            dirs,
        } = walk(&subtree);
        files.extend(found);
        for (dir, mtime) in dirs {
            refreshed.insert(dir.clone());
            snapshot.manifest.record(dir, mtime);
        }
    }

    // Gone from disk and not re-created under a walked subtree
    for dir in missing {
        if !refreshed.contains(&dir) {
            snapshot.manifest.remove_subtree(&dir);
        }
    }

    tracing::debug!(
        checked = stats.dirs_checked,
        changed = stats.dirs_changed,
        subtrees = stats.subtrees_walked,
        from_cache = stats.files_from_cache,
        "incremental discovery"
    );
    (files.into_iter().collect(), stats)
}
