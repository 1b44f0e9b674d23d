use comfy_table::{Cell, Color, Table};
use std::collections::HashMap;

use crate::cli::SortOrder;
use crate::core::{DayStats, Stats};
use crate::output::format::{
    create_styled_table, format_cost, format_number, header_cell, right_cell, styled_cell,
};
use crate::pricing::{PricingTable, calculate_cost, sum_model_costs};

#[derive(Debug, Clone, Copy)]
pub(crate) struct TableOptions {
    pub(crate) order: SortOrder,
    pub(crate) use_color: bool,
    pub(crate) breakdown: bool,
}

pub(super) fn sorted_dates(day_stats: &HashMap<String, DayStats>, order: SortOrder) -> Vec<&String> {
    let mut keys: Vec<_> = day_stats.keys().collect();
    match order {
        SortOrder::Asc => keys.sort(),
        SortOrder::Desc => keys.sort_by(|a, b| b.cmp(a)),
    }
    keys
}

pub(super) fn sorted_models(data: &DayStats) -> Vec<&String> {
    let mut models: Vec<_> = data.models.keys().collect();
    models.sort();
    models
}

fn build_header(opts: &TableOptions) -> Vec<Cell> {
    let c = opts.use_color;
    let model_label = if opts.breakdown { "Model" } else { "Models" };
    [
        "Date",
        model_label,
        "Input",
        "Output",
        "Cache Write",
        "Cache Read",
        "Total",
        "Cost",
    ]
    .into_iter()
    .map(|label| header_cell(label, c))
    .collect()
}

fn token_cells(stats: &Stats, color: Option<Color>, bold: bool) -> [Cell; 5] {
    [
        right_cell(&format_number(stats.input_tokens), color, bold),
        right_cell(&format_number(stats.output_tokens), color, bold),
        right_cell(&format_number(stats.cache_creation), color, bold),
        right_cell(&format_number(stats.cache_read), color, bold),
        right_cell(&format_number(stats.total_tokens()), color, bold),
    ]
}

fn add_breakdown_rows(
    table: &mut Table,
    date: &str,
    data: &DayStats,
    cost_color: Option<Color>,
    pricing: &PricingTable,
) -> f64 {
    let mut day_cost = 0.0;
    for (i, model) in sorted_models(data).into_iter().enumerate() {
        let stats = &data.models[model];
        let cost = calculate_cost(stats, model, pricing);
        day_cost += cost;

        let mut row = vec![Cell::new(if i == 0 { date } else { "" }), Cell::new(model)];
        row.extend(token_cells(stats, None, false));
        row.push(right_cell(&format_cost(cost), cost_color, false));
        table.add_row(row);
    }
    day_cost
}

fn add_standard_row(
    table: &mut Table,
    date: &str,
    data: &DayStats,
    cost_color: Option<Color>,
    pricing: &PricingTable,
) -> f64 {
    let models_str = sorted_models(data)
        .iter()
        .map(|s| s.as_str())
        .collect::<Vec<_>>()
        .join(", ");
    let cost = sum_model_costs(&data.models, pricing);

    let mut row = vec![Cell::new(date), Cell::new(&models_str)];
    row.extend(token_cells(&data.stats, None, false));
    row.push(right_cell(&format_cost(cost), cost_color, false));
    table.add_row(row);
    cost
}

fn add_total_row(table: &mut Table, total_stats: &Stats, total_cost: f64, use_color: bool) {
    let cyan = use_color.then_some(Color::Cyan);
    let green = use_color.then_some(Color::Green);

    let mut row = vec![styled_cell("Total", cyan, true), Cell::new("")];
    row.extend(token_cells(total_stats, cyan, true));
    row.push(right_cell(&format_cost(total_cost), green, true));
    table.add_row(row);
}

pub(crate) fn render_daily_table(
    day_stats: &HashMap<String, DayStats>,
    pricing: &PricingTable,
    options: TableOptions,
) -> Table {
    let mut table = create_styled_table();
    table.set_header(build_header(&options));

    let cost_color = options.use_color.then_some(Color::Green);
    let mut total_stats = Stats::default();
    let mut total_cost = 0.0;

    for date in sorted_dates(day_stats, options.order) {
        let data = &day_stats[date];
        total_cost += if options.breakdown {
            add_breakdown_rows(&mut table, date, data, cost_color, pricing)
        } else {
            add_standard_row(&mut table, date, data, cost_color, pricing)
        };
        total_stats.add(&data.stats);
    }

    add_total_row(&mut table, &total_stats, total_cost, options.use_color);
    table
}

pub(crate) fn print_daily_table(
    day_stats: &HashMap<String, DayStats>,
    pricing: &PricingTable,
    options: TableOptions,
) {
    println!("\n  Token Usage\n");
    println!("{}", render_daily_table(day_stats, pricing, options));
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stats(input: i64, output: i64) -> Stats {
        Stats {
            input_tokens: input,
            output_tokens: output,
            count: 1,
            ..Default::default()
        }
    }

    fn sample() -> HashMap<String, DayStats> {
        let mut day_stats: HashMap<String, DayStats> = HashMap::new();
        let day = day_stats.entry("2025-01-02".to_string()).or_default();
        day.add_stats("sonnet", &stats(1_000_000, 0));
        day.add_stats("haiku", &stats(2_000, 3_000));
        day_stats
            .entry("2025-01-01".to_string())
            .or_default()
            .add_stats("sonnet", &stats(10, 20));
        day_stats
    }

    fn options(order: SortOrder, breakdown: bool) -> TableOptions {
        TableOptions {
            order,
            use_color: false,
            breakdown,
        }
    }

    #[test]
    fn standard_table_lists_days_and_total() {
        let table = render_daily_table(&sample(), &PricingTable::default(), options(SortOrder::Asc, false));
        let text = table.to_string();

        assert!(text.contains("Models"));
        assert!(text.contains("Cache Write"));
        assert!(text.contains("haiku, sonnet"));
        assert!(text.contains("1,005,000"));
        assert!(text.contains("Total"));
        assert!(text.find("2025-01-01").unwrap() < text.find("2025-01-02").unwrap());
        // 1M sonnet input = $3.00, haiku 2K in + 3K out = $0.017
        assert!(text.contains("$3.02"));
    }

    #[test]
    fn desc_order_reverses_days() {
        let table = render_daily_table(&sample(), &PricingTable::default(), options(SortOrder::Desc, false));
        let text = table.to_string();
        assert!(text.find("2025-01-02").unwrap() < text.find("2025-01-01").unwrap());
    }

    #[test]
    fn breakdown_has_row_per_model() {
        let table = render_daily_table(&sample(), &PricingTable::default(), options(SortOrder::Asc, true));
        // 3 model rows + total
        assert_eq!(table.row_iter().count(), 4);
        let text = table.to_string();
        assert!(text.contains("Model"));
        assert!(!text.contains("haiku, sonnet"));
    }
}
