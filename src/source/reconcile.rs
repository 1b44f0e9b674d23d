//! Cache-aware reconciliation of discovered log files
//!
//! Three phases: a sequential scan that reuses cached records for unchanged
//! files, a parallel parse of the misses, and a sequential merge of the parse
//! results in submission order. Only the coordinating thread touches the
//! snapshot; workers return plain data.

use rayon::prelude::*;
use std::collections::HashSet;
use std::path::PathBuf;

use crate::cache::{CacheSnapshot, FileCacheEntry, FileMeta, file_meta};
use crate::core::{RecordSet, UsageRecord};
use crate::source::parser::{ParsedFile, parse_file};
use crate::utils::Timezone;

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub(crate) struct ReconcileStats {
    pub(crate) hits: usize,
    pub(crate) misses: usize,
    /// Lines read from re-parsed files, valid JSON or not
    pub(crate) lines_read: usize,
    pub(crate) unique: usize,
    pub(crate) conflicts: usize,
}

/// Deduplicated records of the whole tree
#[derive(Debug)]
pub(crate) struct Reconciled {
    /// Sorted by dedup key
    pub(crate) records: Vec<UsageRecord>,
    /// Snapshot differs from what is on disk
    pub(crate) dirty: bool,
    pub(crate) stats: ReconcileStats,
}

/// Merge every file's records into one set, refreshing the snapshot's file
/// entries along the way.
///
/// `cache_valid` is false when the snapshot was freshly created (no cache,
/// rejected cache, or a timezone/format mismatch); such a snapshot is always
/// written back.
pub(crate) fn reconcile(
    files: &[PathBuf],
    snapshot: &mut CacheSnapshot,
    cache_valid: bool,
    timezone: Timezone,
) -> Reconciled {
    let mut stats = ReconcileStats::default();
    let mut set = RecordSet::with_capacity(snapshot.record_count());
    let mut dirty = !cache_valid;

    // Phase 1: stat and reuse unchanged entries
    let mut misses: Vec<(&PathBuf, FileMeta)> = Vec::new();
    let mut present: HashSet<&PathBuf> = HashSet::with_capacity(files.len());
    for path in files {
        let Some(meta) = file_meta(path) else {
            // Vanished between discovery and now
            continue;
        };
        present.insert(path);
        match snapshot.files.get(path) {
            Some(entry) if entry.matches(meta) => {
                stats.hits += 1;
                set.extend(&entry.records);
            }
            _ => misses.push((path, meta)),
        }
    }

    // Phase 2: parse misses on the rayon pool; collect keeps input order
    let parsed: Vec<ParsedFile> = misses
        .par_iter()
        .map(|(path, _)| parse_file(path, timezone))
        .collect();

    // Phase 3: merge in submission order and refresh the cache
    stats.misses = misses.len();
    if !misses.is_empty() {
        dirty = true;
    }
    for ((path, meta), result) in misses.into_iter().zip(parsed) {
        tracing::debug!(
            path = %path.display(),
            lines = result.lines_read,
            parsed = result.lines_parsed,
            records = result.records.len(),
            "parsed log file"
        );
        stats.lines_read += result.lines_read;
        set.extend(&result.records);
        snapshot
            .files
            .insert(path.clone(), FileCacheEntry::new(meta, result.records));
    }

    let before = snapshot.files.len();
    snapshot.files.retain(|path, _| present.contains(path));
    if snapshot.files.len() != before {
        tracing::debug!(removed = before - snapshot.files.len(), "dropped vanished files");
        dirty = true;
    }

    stats.unique = set.len();
    stats.conflicts = set.conflicts();
    Reconciled {
        records: set.into_sorted_vec(),
        dirty,
        stats,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::path::Path;

    fn utc() -> Timezone {
        Timezone::parse(Some("UTC")).unwrap()
    }

    fn log_line(msg: &str, req: &str, input: i64, output: i64) -> String {
        format!(
            r#"{{"timestamp":"2025-01-01T12:00:00Z","requestId":"{req}","message":{{"id":"{msg}","model":"claude-sonnet-4","usage":{{"input_tokens":{input},"output_tokens":{output}}}}}}}"#
        )
    }

    fn write_lines(path: &Path, lines: &[String]) {
        fs::write(path, lines.join("\n") + "\n").unwrap();
    }

    fn record(key: &str, input: i64, output: i64) -> UsageRecord {
        UsageRecord {
            key: key.into(),
            date: "2025-01-01".into(),
            model: "claude-sonnet-4".into(),
            input_tokens: input,
            output_tokens: output,
            cache_creation: 0,
            cache_read: 0,
        }
    }

    #[test]
    fn larger_restatement_in_changed_file_wins() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a.jsonl");
        let b = dir.path().join("b.jsonl");
        write_lines(&a, &[log_line("K1", "X", 50, 50)]);
        write_lines(&b, &[log_line("K1", "X", 100, 50)]);

        // A is cached and unchanged, B is new
        let mut snapshot = CacheSnapshot::new("UTC");
        let meta = file_meta(&a).unwrap();
        snapshot
            .files
            .insert(a.clone(), FileCacheEntry::new(meta, vec![record("K1:X", 50, 50)]));

        let files = vec![a, b];
        let result = reconcile(&files, &mut snapshot, true, utc());

        assert_eq!(result.records.len(), 1);
        assert_eq!(result.records[0].key, "K1:X");
        assert_eq!(result.records[0].total_tokens(), 150);
        assert_eq!(result.stats.hits, 1);
        assert_eq!(result.stats.misses, 1);
        assert_eq!(result.stats.conflicts, 1);
        assert!(result.dirty);
        assert_eq!(snapshot.files.len(), 2);
    }

    #[test]
    fn second_run_is_all_hits() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a.jsonl");
        let b = dir.path().join("b.jsonl");
        write_lines(&a, &[log_line("m1", "r1", 10, 10), log_line("m2", "r2", 5, 5)]);
        write_lines(&b, &[log_line("m1", "r1", 30, 30)]);
        let files = vec![a, b];

        let mut snapshot = CacheSnapshot::new("UTC");
        let first = reconcile(&files, &mut snapshot, false, utc());
        assert!(first.dirty);
        assert_eq!(first.stats.misses, 2);
        assert_eq!(first.stats.lines_read, 3);

        let second = reconcile(&files, &mut snapshot, true, utc());
        assert!(!second.dirty);
        assert_eq!(second.stats.hits, 2);
        assert_eq!(second.stats.misses, 0);
        assert_eq!(second.stats.lines_read, 0);
        assert_eq!(second.records, first.records);
        assert_eq!(second.stats.unique, 2);
    }

    #[test]
    fn line_count_includes_unparsable_lines() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a.jsonl");
        write_lines(
            &a,
            &[log_line("m1", "r1", 10, 10), "not json".to_string(), String::new()],
        );

        let mut snapshot = CacheSnapshot::new("UTC");
        let result = reconcile(&[a], &mut snapshot, false, utc());
        assert_eq!(result.stats.lines_read, 3);
        assert_eq!(result.stats.unique, 1);
    }

    #[test]
    fn timezone_mismatch_rebuilds_everything() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a.jsonl");
        write_lines(&a, &[log_line("m1", "r1", 10, 10)]);
        let files = vec![a];

        let mut cached = CacheSnapshot::new("UTC");
        reconcile(&files, &mut cached, false, utc());

        // The caller discards an incompatible snapshot and starts fresh
        assert!(!cached.is_compatible("Asia/Tokyo"));
        let mut fresh = CacheSnapshot::new("Asia/Tokyo");
        let tokyo = Timezone::parse(Some("Asia/Tokyo")).unwrap();
        let result = reconcile(&files, &mut fresh, false, tokyo);
        assert_eq!(result.stats.hits, 0);
        assert_eq!(result.stats.misses, 1);
        assert!(result.dirty);
    }

    #[test]
    fn vanished_files_are_dropped_from_cache() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a.jsonl");
        let b = dir.path().join("b.jsonl");
        write_lines(&a, &[log_line("m1", "r1", 10, 10)]);
        write_lines(&b, &[log_line("m2", "r2", 10, 10)]);

        let mut snapshot = CacheSnapshot::new("UTC");
        reconcile(&[a.clone(), b.clone()], &mut snapshot, false, utc());

        fs::remove_file(&b).unwrap();
        // Discovery may still list it if the cached manifest vouched for it
        let result = reconcile(&[a.clone(), b.clone()], &mut snapshot, true, utc());
        assert!(result.dirty);
        assert_eq!(result.stats.hits, 1);
        assert_eq!(result.records.len(), 1);
        assert!(!snapshot.files.contains_key(&b));
    }

    #[test]
    fn modified_file_is_reparsed() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a.jsonl");
        write_lines(&a, &[log_line("m1", "r1", 10, 10)]);
        let files = vec![a.clone()];

        let mut snapshot = CacheSnapshot::new("UTC");
        reconcile(&files, &mut snapshot, false, utc());

        write_lines(&a, &[log_line("m1", "r1", 10, 10), log_line("m2", "r2", 1, 1)]);
        let result = reconcile(&files, &mut snapshot, true, utc());
        assert_eq!(result.stats.misses, 1);
        assert_eq!(result.records.len(), 2);
        assert_eq!(snapshot.files[&a].records.len(), 2);
    }

    #[test]
    fn result_does_not_depend_on_file_order() {
        let dir = tempfile::tempdir().unwrap();
        let paths: Vec<PathBuf> = (0..6)
            .map(|i| {
                let path = dir.path().join(format!("f{i}.jsonl"));
                write_lines(&path, &[log_line("shared", "req", 10 * (i + 1), 1)]);
                path
            })
            .collect();

        let mut forward = CacheSnapshot::new("UTC");
        let a = reconcile(&paths, &mut forward, false, utc());
        let reversed: Vec<PathBuf> = paths.iter().rev().cloned().collect();
        let mut backward = CacheSnapshot::new("UTC");
        let b = reconcile(&reversed, &mut backward, false, utc());

        assert_eq!(a.records, b.records);
        assert_eq!(a.records[0].input_tokens, 60);
    }
}
