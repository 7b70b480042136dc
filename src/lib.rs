#[macro_use]
extern crate lazy_static;

#[macro_use]
mod errors;
mod bitvec;
pub mod engine;
pub mod ingest;
pub mod mem_store;
pub mod observability;
mod options;
pub mod unit_fmt;

pub use crate::engine::data_types::{AttributeInfo, SqlType, Value};
pub use crate::engine::execution::{CancellationToken, CompiledQuery, QueryOutput};
pub use crate::engine::planning::{AggregateKind, ArithmeticKind, ComparisonKind, Expr, PlanBuilder, PlanNode};
pub use crate::errors::QueryError;
pub use crate::ingest::raw_val::RawVal;
pub use crate::mem_store::DataTable;
pub use crate::observability::QueryStats;
pub use crate::options::Options;

pub type QueryResult = Result<QueryOutput, QueryError>;
