pub(crate) mod metrics;
mod query_counters;

pub use query_counters::{QueryCounters, QueryStats};
