//! CLI argument definitions
//!
//! Flags and the merge with config file values.

use std::io::IsTerminal;
use std::path::PathBuf;

use clap::{Parser, ValueEnum};

use crate::config::{Config, ConfigSortOrder};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub(crate) enum SortOrder {
    /// Oldest first (default)
    #[default]
    Asc,
    /// Newest first
    Desc,
}

impl From<ConfigSortOrder> for SortOrder {
    fn from(order: ConfigSortOrder) -> Self {
        match order {
            ConfigSortOrder::Asc => SortOrder::Asc,
            ConfigSortOrder::Desc => SortOrder::Desc,
        }
    }
}

#[derive(Debug, Parser)]
#[command(name = "cctally")]
#[command(about = "Fast, cached Claude Code token usage statistics", version)]
pub(crate) struct Cli {
    /// Print timing and cache statistics to stderr
    #[arg(short, long)]
    pub(crate) verbose: bool,

    /// Ignore the stored cache (a fresh one is still written)
    #[arg(long)]
    pub(crate) no_cache: bool,

    /// Delete the cache files and rebuild from scratch
    #[arg(long)]
    pub(crate) clear_cache: bool,

    /// Log directory to scan (default: ~/.claude/projects)
    #[arg(long, value_name = "DIR")]
    pub(crate) root: Option<PathBuf>,

    /// Filter from date (YYYYMMDD or YYYY-MM-DD)
    #[arg(short, long)]
    pub(crate) since: Option<String>,

    /// Filter until date (YYYYMMDD or YYYY-MM-DD)
    #[arg(short, long)]
    pub(crate) until: Option<String>,

    /// Timezone for date bucketing (e.g., "Asia/Shanghai", "UTC", "local")
    #[arg(long, value_name = "TZ")]
    pub(crate) timezone: Option<String>,

    /// Output as JSON
    #[arg(short, long)]
    pub(crate) json: bool,

    /// Show per-model breakdown
    #[arg(short, long)]
    pub(crate) breakdown: bool,

    /// Sort order for results
    #[arg(short, long, value_enum)]
    pub(crate) order: Option<SortOrder>,

    /// Disable colored output
    #[arg(long)]
    pub(crate) no_color: bool,

    /// Enable debug logging (overridden by RUST_LOG)
    #[arg(long)]
    pub(crate) debug: bool,
}

impl Cli {
    /// Merge config file values into CLI (CLI args take precedence)
    pub(crate) fn with_config(mut self, config: &Config) -> Self {
        // Boolean flags can only be switched on by the config
        self.breakdown |= config.breakdown;
        self.no_color |= config.no_color;
        self.debug |= config.debug;

        if self.order.is_none() {
            self.order = config.order.map(SortOrder::from);
        }
        if self.timezone.is_none() {
            self.timezone = config.timezone.clone();
        }
        if self.root.is_none() {
            self.root = config.root.clone();
        }
        self
    }

    pub(crate) fn sort_order(&self) -> SortOrder {
        self.order.unwrap_or_default()
    }

    pub(crate) fn use_color(&self) -> bool {
        !self.no_color && std::io::stdout().is_terminal()
    }
}
