use serde::Serialize;
use std::collections::{BTreeMap, HashMap};

use crate::cli::SortOrder;
use crate::core::{DayStats, Stats};
use crate::output::format::round_cost;
use crate::output::table::sorted_dates;
use crate::pricing::{PricingTable, calculate_cost};

#[derive(Debug, Serialize)]
struct TokenCounts {
    input_tokens: i64,
    output_tokens: i64,
    cache_creation_tokens: i64,
    cache_read_tokens: i64,
    total_tokens: i64,
    cost: f64,
}

impl TokenCounts {
    fn new(stats: &Stats, cost: f64) -> Self {
        Self {
            input_tokens: stats.input_tokens,
            output_tokens: stats.output_tokens,
            cache_creation_tokens: stats.cache_creation,
            cache_read_tokens: stats.cache_read,
            total_tokens: stats.total_tokens(),
            cost: round_cost(cost),
        }
    }
}

#[derive(Debug, Serialize)]
struct DayJson<'a> {
    date: &'a str,
    #[serde(flatten)]
    totals: TokenCounts,
    models: BTreeMap<&'a str, TokenCounts>,
}

fn day_json<'a>(date: &'a str, data: &'a DayStats, pricing: &PricingTable) -> DayJson<'a> {
    let models: BTreeMap<&str, TokenCounts> = data
        .models
        .iter()
        .map(|(model, stats)| {
            let cost = calculate_cost(stats, model, pricing);
            (model.as_str(), TokenCounts::new(stats, cost))
        })
        .collect();
    // Sum unrounded per-model costs so the day total does not drift
    let cost = data
        .models
        .iter()
        .map(|(model, stats)| calculate_cost(stats, model, pricing))
        .sum();
    DayJson {
        date,
        totals: TokenCounts::new(&data.stats, cost),
        models,
    }
}

/// Daily usage as a pretty-printed JSON array
pub(crate) fn render_daily_json(
    day_stats: &HashMap<String, DayStats>,
    pricing: &PricingTable,
    order: SortOrder,
) -> Result<String, serde_json::Error> {
    let days: Vec<DayJson> = sorted_dates(day_stats, order)
        .into_iter()
        .map(|date| day_json(date, &day_stats[date], pricing))
        .collect();
    serde_json::to_string_pretty(&days)
}
