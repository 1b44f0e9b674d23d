use std::time::Duration;

/// Standard date format used throughout the codebase: "2025-01-15"
pub(crate) const DATE_FORMAT: &str = "%Y-%m-%d";

/// Fallback value when a log line carries no model name
pub(crate) const UNKNOWN: &str = "unknown";

/// Log files are the `*.jsonl` files under the root
pub(crate) const LOG_EXTENSION: &str = "jsonl";

/// Forced full walk interval, catches changes the directory manifest cannot see
pub(crate) const FULL_WALK_INTERVAL: Duration = Duration::from_secs(5 * 60);

/// Environment variable overriding the cache directory
pub(crate) const CACHE_DIR_ENV: &str = "CCTALLY_CACHE_DIR";

/// Environment variable overriding the Claude config directory
pub(crate) const CLAUDE_CONFIG_DIR_ENV: &str = "CLAUDE_CONFIG_DIR";
