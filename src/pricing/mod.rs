mod db;
mod types;

pub(crate) use db::{PricingTable, calculate_cost, sum_model_costs};
pub(crate) use types::ModelPricing;
