use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub(crate) enum AppError {
    #[error("Invalid date \"{input}\" (expected YYYYMMDD or YYYY-MM-DD)")]
    InvalidDate { input: String },

    #[error("Invalid timezone: {input}")]
    InvalidTimezone { input: String },

    #[error("Failed to read config {}: {source}", path.display())]
    ConfigRead {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse config {}: {source}", path.display())]
    ConfigParse {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("Invalid pricing for model \"{model}\": rates must be finite and non-negative")]
    InvalidPricing { model: String },
    #[error("Failed to serialize output: {0}")]
    Output(#[from] serde_json::Error),
}

/// Failures of the on-disk cache. None of these is fatal: a failed load
/// means a rebuild, a failed save means a warning.
#[derive(Debug, Error)]
pub(crate) enum CacheError {
    #[error("cache I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("cache file too short ({len} bytes)")]
    Truncated { len: usize },

    #[error("cache magic mismatch")]
    BadMagic,

    #[error("unsupported cache format version {found} (expected {expected})")]
    UnsupportedVersion { found: u32, expected: u32 },

    #[error("failed to encode cache payload: {0}")]
    Encode(#[from] bincode::error::EncodeError),

    #[error("failed to decode cache payload: {0}")]
    Decode(#[from] bincode::error::DecodeError),

    #[error("string table index {index} out of range ({len} entries)")]
    StringIndex { index: u32, len: usize },

    #[error("cache string table is empty")]
    MissingTimezone,

    #[error("failed to decode legacy cache: {0}")]
    Legacy(#[from] serde_json::Error),
}
