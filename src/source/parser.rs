//! Streaming JSONL parser for one log file

use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::collections::HashSet;
use std::fs::File;
use std::io::{BufRead, BufReader, ErrorKind};
use std::path::Path;

use crate::consts::{DATE_FORMAT, UNKNOWN};
use crate::core::UsageRecord;
use crate::utils::Timezone;

// ============================================================================
// Internal types for JSONL parsing
// ============================================================================

#[derive(Debug, Deserialize)]
struct LogLine {
    timestamp: Option<String>,
    #[serde(rename = "requestId")]
    request_id: Option<String>,
    message: Option<Message>,
}

#[derive(Debug, Deserialize)]
struct Message {
    id: Option<String>,
    model: Option<String>,
    usage: Option<Usage>,
}

#[derive(Debug, Default, Deserialize)]
struct Usage {
    input_tokens: Option<i64>,
    output_tokens: Option<i64>,
    cache_creation_input_tokens: Option<i64>,
    cache_read_input_tokens: Option<i64>,
}

/// Records of one file plus line counters
#[derive(Debug, Default)]
pub(crate) struct ParsedFile {
    pub(crate) records: Vec<UsageRecord>,
    pub(crate) lines_read: usize,
    pub(crate) lines_parsed: usize,
}

/// Parse one log file.
///
/// Within a file only the first occurrence of a dedup key is kept; which
/// restatement wins across files is decided later by the record set.
/// An unreadable file yields no records.
pub(crate) fn parse_file(path: &Path, timezone: Timezone) -> ParsedFile {
    let mut parsed = ParsedFile::default();

    let file = match File::open(path) {
        Ok(f) => f,
        Err(err) => {
            tracing::debug!(path = %path.display(), error = %err, "failed to open log file");
            return parsed;
        }
    };
    let reader = BufReader::new(file);

    let mut seen: HashSet<String> = HashSet::new();
    for (line_no, line) in reader.lines().enumerate() {
        let line = match line {
            Ok(line) => line,
            // The offending bytes are consumed, so reading can go on
            Err(err) if err.kind() == ErrorKind::InvalidData => {
                parsed.lines_read += 1;
                tracing::debug!(
                    path = %path.display(),
                    line = line_no + 1,
                    "line is not valid UTF-8"
                );
                continue;
            }
            Err(err) => {
                tracing::debug!(
                    path = %path.display(),
                    line = line_no + 1,
                    error = %err,
                    "failed to read log file, keeping records so far"
                );
                break;
            }
        };
        parsed.lines_read += 1;

        if line.trim().is_empty() {
            continue;
        }

        let entry: LogLine = match serde_json::from_str(&line) {
            Ok(entry) => entry,
            Err(err) => {
                tracing::debug!(
                    path = %path.display(),
                    line = line_no + 1,
                    error = %err,
                    "invalid JSON"
                );
                continue;
            }
        };
        parsed.lines_parsed += 1;

        let Some(record) = parse_entry(entry, timezone) else {
            continue;
        };
        if seen.insert(record.key.clone()) {
            parsed.records.push(record);
        }
    }
    parsed
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.is_empty())
}

fn parse_entry(entry: LogLine, timezone: Timezone) -> Option<UsageRecord> {
    let timestamp = non_empty(entry.timestamp);
    let (message_id, model, usage) = match entry.message {
        Some(msg) => (
            non_empty(msg.id),
            non_empty(msg.model),
            msg.usage.unwrap_or_default(),
        ),
        None => (None, None, Usage::default()),
    };
    let input_tokens = usage.input_tokens.unwrap_or(0);
    let output_tokens = usage.output_tokens.unwrap_or(0);

    let timestamp = timestamp?;
    if input_tokens == 0 && output_tokens == 0 {
        return None;
    }
    // Without both ids the line cannot be matched against its restatements;
    // counting it could double-count.
    let message_id = message_id?;
    let request_id = non_empty(entry.request_id)?;

    let utc_dt = match timestamp.parse::<DateTime<Utc>>() {
        Ok(dt) => dt,
        Err(err) => {
            tracing::debug!(%timestamp, error = %err, "invalid timestamp");
            return None;
        }
    };
    let date = timezone.to_fixed_offset(utc_dt).date_naive();

    Some(UsageRecord {
        key: format!("{message_id}:{request_id}"),
        date: date.format(DATE_FORMAT).to_string(),
        model: model.unwrap_or_else(|| UNKNOWN.to_string()),
        input_tokens,
        output_tokens,
        cache_creation: usage.cache_creation_input_tokens.unwrap_or(0),
        cache_read: usage.cache_read_input_tokens.unwrap_or(0),
    })
}
