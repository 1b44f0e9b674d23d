//! Folds reconciled records into a date x model matrix

use chrono::NaiveDate;
use std::collections::HashMap;

use crate::consts::DATE_FORMAT;
use crate::core::types::{DateFilter, DayStats, UsageRecord};

/// Aggregate records by day, skipping days outside the filter
pub(crate) fn aggregate_daily(
    records: &[UsageRecord],
    filter: &DateFilter,
) -> HashMap<String, DayStats> {
    let mut day_stats: HashMap<String, DayStats> = HashMap::new();

    for record in records {
        if !filter.is_unbounded() {
            let in_range = NaiveDate::parse_from_str(&record.date, DATE_FORMAT)
                .map(|date| filter.contains(date))
                .unwrap_or(false);
            if !in_range {
                continue;
            }
        }
        let stats = record.to_stats();
        let day = match day_stats.get_mut(&record.date) {
            Some(day) => day,
            None => day_stats.entry(record.date.clone()).or_default(),
        };
        day.add_stats(&record.model, &stats);
    }

    day_stats
}
