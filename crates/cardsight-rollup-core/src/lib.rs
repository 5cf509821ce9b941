mod aggregate;
mod document;
mod fields;
pub mod keys;
pub mod model;
mod range;
pub mod registry;

pub use aggregate::{aggregate_ga, aggregate_placements, aggregate_sessions};
pub use document::build_daily_document;
pub use range::{available_dates, available_raw_dates, build_rollup_range};
