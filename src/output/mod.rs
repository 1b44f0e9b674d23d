mod format;
mod json;
mod table;

pub(crate) use json::render_daily_json;
pub(crate) use table::{TableOptions, print_daily_table};
