//! Cross-file reconciliation of usage records
//!
//! The same request can be restated on several lines and in several files
//! (retries, streamed partial usage). Across files and runs the record with
//! the largest cumulative token count wins.

use crate::core::types::UsageRecord;
use std::collections::HashMap;

/// What happened when a record was offered to a [`RecordSet`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum MergeOutcome {
    /// First record seen for this key
    Inserted,
    /// Replaced an existing record with a smaller total
    Replaced,
    /// An existing record with a larger (or equal-ranked) total was kept
    Kept,
}

/// Ranking used when two records share a key: larger token sum first,
/// remaining fields only break ties so the result never depends on
/// arrival order.
fn outranks(candidate: &UsageRecord, existing: &UsageRecord) -> bool {
    let rank = |r: &UsageRecord| {
        (
            r.total_tokens(),
            r.input_tokens,
            r.output_tokens,
            r.cache_creation,
            r.cache_read,
        )
    };
    let (c, e) = (rank(candidate), rank(existing));
    if c != e {
        return c > e;
    }
    (&candidate.date, &candidate.model) > (&existing.date, &existing.model)
}

/// Deduplicated record set keyed by dedup key
#[derive(Debug, Default)]
pub(crate) struct RecordSet {
    records: HashMap<String, UsageRecord>,
    conflicts: usize,
}

impl RecordSet {
    pub(crate) fn with_capacity(capacity: usize) -> Self {
        Self {
            records: HashMap::with_capacity(capacity),
            conflicts: 0,
        }
    }

    pub(crate) fn insert(&mut self, record: UsageRecord) -> MergeOutcome {
        match self.records.get_mut(&record.key) {
            Some(existing) => {
                if outranks(&record, existing) {
                    *existing = record;
                    self.conflicts += 1;
                    MergeOutcome::Replaced
                } else {
                    MergeOutcome::Kept
                }
            }
            None => {
                self.records.insert(record.key.clone(), record);
                MergeOutcome::Inserted
            }
        }
    }

    pub(crate) fn extend<'a, I>(&mut self, records: I)
    where
        I: IntoIterator<Item = &'a UsageRecord>,
    {
        for record in records {
            if self.insert(record.clone()) == MergeOutcome::Replaced {
                tracing::trace!(key = %record.key, "larger restatement replaced record");
            }
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.records.len()
    }

    /// Number of times a stored record was replaced by a larger one
    pub(crate) fn conflicts(&self) -> usize {
        self.conflicts
    }

    /// Records ordered by key
    pub(crate) fn into_sorted_vec(self) -> Vec<UsageRecord> {
        let mut records: Vec<UsageRecord> = self.records.into_values().collect();
        records.sort_by(|a, b| a.key.cmp(&b.key));
        records
    }
}
