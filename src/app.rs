use std::time::{Instant, SystemTime};

use crate::cache::{CacheSnapshot, CacheStore, StoredCache};
use crate::cli::Cli;
use crate::config::Config;
use crate::core::{DateFilter, aggregate_daily};
use crate::error::AppError;
use crate::output::{TableOptions, print_daily_table, render_daily_json};
use crate::pricing::PricingTable;
use crate::source::{DiscoveryStats, ReconcileStats, discover, find_root, reconcile};
use crate::utils::{Timezone, parse_date};

/// Wall-clock time of each pipeline phase, in milliseconds
#[derive(Debug, Default)]
struct Timings {
    load_ms: f64,
    discovery_ms: f64,
    reconcile_ms: f64,
    save_ms: Option<f64>,
}

fn elapsed_ms(start: Instant) -> f64 {
    start.elapsed().as_secs_f64() * 1000.0
}

/// Snapshot to work on, and how it came out of the store
#[derive(Debug)]
struct LoadedCache {
    snapshot: CacheSnapshot,
    /// Came from a compatible cache, so its file entries can be trusted
    valid: bool,
    /// Read from the legacy JSON file, which only a save retires
    migrated: bool,
}

/// Load the stored snapshot and decide whether it can be trusted.
fn load_snapshot(store: Option<&CacheStore>, cli: &Cli, label: &str) -> LoadedCache {
    if let Some(store) = store
        && cli.clear_cache
    {
        store.clear();
        tracing::info!(dir = %store.path().display(), "cache cleared");
    }

    let stored = match store {
        Some(store) if !cli.no_cache && !cli.clear_cache => store.load(),
        _ => None,
    };
    let migrated = stored.as_ref().is_some_and(StoredCache::is_legacy);
    if migrated {
        tracing::info!("upgrading legacy JSON cache");
    }
    let (snapshot, valid) = match stored.map(StoredCache::upgrade) {
        Some(snapshot) if snapshot.is_compatible(label) => (snapshot, true),
        Some(snapshot) => {
            tracing::info!(
                cached_timezone = %snapshot.timezone,
                cached_version = snapshot.format_version,
                timezone = label,
                "cache built under another timezone or format, rebuilding"
            );
            (CacheSnapshot::new(label), false)
        }
        None => (CacheSnapshot::new(label), false),
    };
    LoadedCache {
        snapshot,
        valid,
        migrated,
    }
}

fn print_stats(timings: &Timings, discovery: &DiscoveryStats, files: usize, reconcile: &ReconcileStats) {
    eprintln!();
    eprintln!("Cache load:     {:.2}ms", timings.load_ms);
    if discovery.full_walk {
        eprintln!(
            "Discovery:      {:.2}ms (full walk, {} dirs, {} files)",
            timings.discovery_ms, discovery.dirs_checked, files
        );
    } else {
        eprintln!(
            "Discovery:      {:.2}ms ({} dirs checked, {} changed, {} subtrees walked, {} files from cache)",
            timings.discovery_ms,
            discovery.dirs_checked,
            discovery.dirs_changed,
            discovery.subtrees_walked,
            discovery.files_from_cache
        );
    }
    eprintln!(
        "Reconcile:      {:.2}ms ({} hits, {} misses, {} lines parsed)",
        timings.reconcile_ms, reconcile.hits, reconcile.misses, reconcile.lines_read
    );
    eprintln!(
        "Records:        {} unique ({} conflicts resolved)",
        reconcile.unique, reconcile.conflicts
    );
    match timings.save_ms {
        Some(ms) => eprintln!("Cache save:     {ms:.2}ms"),
        None => eprintln!("Cache save:     skipped (unchanged)"),
    }
}

/// Run the whole pipeline: load cache, discover, reconcile, aggregate,
/// render, persist.
pub(crate) fn run(cli: &Cli, config: &Config) -> Result<(), AppError> {
    let timezone = Timezone::parse(cli.timezone.as_deref())?;
    let since = cli.since.as_deref().map(parse_date).transpose()?;
    let until = cli.until.as_deref().map(parse_date).transpose()?;
    let filter = DateFilter::new(since, until);
    let pricing = PricingTable::with_overrides(&config.pricing)?;

    let Some(root) = find_root(cli.root.as_deref()) else {
        tracing::warn!("cannot determine the home directory, pass --root");
        println!("No usage data found.");
        return Ok(());
    };
    tracing::debug!(root = %root.display(), "scanning logs");

    let mut timings = Timings::default();
    let label = timezone.label();
    let store = CacheStore::locate();
    if store.is_none() {
        tracing::warn!("cannot determine a cache directory, results will not be cached");
    }

    let start = Instant::now();
    let LoadedCache {
        mut snapshot,
        valid: cache_valid,
        migrated,
    } = load_snapshot(store.as_ref(), cli, &label);
    timings.load_ms = elapsed_ms(start);

    let start = Instant::now();
    let (files, discovery) = discover(&root, &mut snapshot, SystemTime::now());
    timings.discovery_ms = elapsed_ms(start);

    let start = Instant::now();
    let reconciled = reconcile(&files, &mut snapshot, cache_valid, timezone);
    timings.reconcile_ms = elapsed_ms(start);

    let day_stats = aggregate_daily(&reconciled.records, &filter);
    if day_stats.is_empty() {
        println!("No usage data found.");
    } else if cli.json {
        println!("{}", render_daily_json(&day_stats, &pricing, cli.sort_order())?);
    } else {
        print_daily_table(
            &day_stats,
            &pricing,
            TableOptions {
                order: cli.sort_order(),
                use_color: cli.use_color(),
                breakdown: cli.breakdown,
            },
        );
    }

    if (reconciled.dirty || discovery.manifest_changed() || migrated)
        && let Some(store) = &store
    {
        let start = Instant::now();
        match store.save(&snapshot) {
            Ok(()) => timings.save_ms = Some(elapsed_ms(start)),
            Err(err) => tracing::warn!(error = %err, "failed to save cache"),
        }
    }

    if cli.verbose {
        print_stats(&timings, &discovery, files.len(), &reconciled.stats);
    }
    Ok(())
}
