//! Core module - record types, merge rule and aggregation

mod aggregator;
mod dedup;
mod types;

pub(crate) use aggregator::aggregate_daily;
pub(crate) use dedup::RecordSet;
pub(crate) use types::{DateFilter, DayStats, Stats, UsageRecord};
