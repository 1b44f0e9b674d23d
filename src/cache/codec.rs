//! Binary cache format
//!
//! Layout: 4-byte magic, 4-byte little-endian format version, then a bincode
//! payload. Dates and model names repeat across millions of records, so the
//! payload stores every distinct value once in a string table and records
//! refer to it by index. Index 0 is reserved for the timezone label.

use bincode::config::{self, Configuration};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;

use super::snapshot::{CacheSnapshot, DirectoryManifest, FORMAT_VERSION, FileCacheEntry};
use crate::core::UsageRecord;
use crate::error::CacheError;

const MAGIC: [u8; 4] = *b"CTLY";
const HEADER_LEN: usize = 8;
const TIMEZONE_INDEX: u32 = 0;

fn payload_config() -> Configuration {
    config::standard()
}

#[derive(Debug, Serialize, Deserialize)]
struct EncodedSnapshot {
    strings: Vec<String>,
    root: Option<PathBuf>,
    files: Vec<EncodedFile>,
    manifest: DirectoryManifest,
    last_full_walk_ms: Option<i64>,
}

#[derive(Debug, Serialize, Deserialize)]
struct EncodedFile {
    path: PathBuf,
    mtime: i64,
    size: u64,
    records: Vec<EncodedRecord>,
}

#[derive(Debug, Serialize, Deserialize)]
struct EncodedRecord {
    key: String,
    date: u32,
    model: u32,
    input_tokens: i64,
    output_tokens: i64,
    cache_creation: i64,
    cache_read: i64,
}

/// Ordered table of distinct strings
#[derive(Debug, Default)]
struct StringTable {
    index: HashMap<String, u32>,
    strings: Vec<String>,
}

impl StringTable {
    fn intern(&mut self, value: &str) -> u32 {
        if let Some(&idx) = self.index.get(value) {
            return idx;
        }
        let idx = self.strings.len() as u32;
        self.strings.push(value.to_string());
        self.index.insert(value.to_string(), idx);
        idx
    }

    fn into_strings(self) -> Vec<String> {
        self.strings
    }
}

fn resolve(strings: &[String], index: u32) -> Result<&str, CacheError> {
    strings
        .get(index as usize)
        .map(String::as_str)
        .ok_or(CacheError::StringIndex {
            index,
            len: strings.len(),
        })
}

/// Serialize a snapshot into the versioned binary format
pub(crate) fn encode(snapshot: &CacheSnapshot) -> Result<Vec<u8>, CacheError> {
    let mut table = StringTable::default();
    let tz_index = table.intern(&snapshot.timezone);
    debug_assert_eq!(tz_index, TIMEZONE_INDEX);

    let files = snapshot
        .files
        .iter()
        .map(|(path, entry)| EncodedFile {
            path: path.clone(),
            mtime: entry.mtime,
            size: entry.size,
            records: entry
                .records
                .iter()
                .map(|record| EncodedRecord {
                    key: record.key.clone(),
                    date: table.intern(&record.date),
                    model: table.intern(&record.model),
                    input_tokens: record.input_tokens,
                    output_tokens: record.output_tokens,
                    cache_creation: record.cache_creation,
                    cache_read: record.cache_read,
                })
                .collect(),
        })
        .collect();

    let encoded = EncodedSnapshot {
        strings: table.into_strings(),
        root: snapshot.root.clone(),
        files,
        manifest: snapshot.manifest.clone(),
        last_full_walk_ms: snapshot.last_full_walk_ms,
    };

    let mut buf = Vec::with_capacity(HEADER_LEN + snapshot.record_count() * 48);
    buf.extend_from_slice(&MAGIC);
    buf.extend_from_slice(&FORMAT_VERSION.to_le_bytes());
    buf.extend(bincode::serde::encode_to_vec(&encoded, payload_config())?);
    Ok(buf)
}

/// Check magic and version, returning the payload slice
fn split_header(bytes: &[u8]) -> Result<&[u8], CacheError> {
    if bytes.len() < HEADER_LEN {
        return Err(CacheError::Truncated { len: bytes.len() });
    }
    let (header, payload) = bytes.split_at(HEADER_LEN);
    if header[..4] != MAGIC {
        return Err(CacheError::BadMagic);
    }
    let version = u32::from_le_bytes([header[4], header[5], header[6], header[7]]);
    if version != FORMAT_VERSION {
        return Err(CacheError::UnsupportedVersion {
            found: version,
            expected: FORMAT_VERSION,
        });
    }
    Ok(payload)
}

/// Parse bytes produced by [`encode`]
pub(crate) fn decode(bytes: &[u8]) -> Result<CacheSnapshot, CacheError> {
    let payload = split_header(bytes)?;
    let (encoded, _): (EncodedSnapshot, usize) =
        bincode::serde::decode_from_slice(payload, payload_config())?;

    let strings = encoded.strings;
    let timezone = strings
        .get(TIMEZONE_INDEX as usize)
        .cloned()
        .ok_or(CacheError::MissingTimezone)?;

    let mut files = BTreeMap::new();
    for file in encoded.files {
        let records = file
            .records
            .into_iter()
            .map(|record| {
                Ok(UsageRecord {
                    key: record.key,
                    date: resolve(&strings, record.date)?.to_string(),
                    model: resolve(&strings, record.model)?.to_string(),
                    input_tokens: record.input_tokens,
                    output_tokens: record.output_tokens,
                    cache_creation: record.cache_creation,
                    cache_read: record.cache_read,
                })
            })
            .collect::<Result<Vec<_>, CacheError>>()?;
        files.insert(
            file.path,
            FileCacheEntry {
                mtime: file.mtime,
                size: file.size,
                records,
            },
        );
    }

    Ok(CacheSnapshot {
        format_version: FORMAT_VERSION,
        timezone,
        root: encoded.root,
        files,
        manifest: encoded.manifest,
        last_full_walk_ms: encoded.last_full_walk_ms,
    })
}
