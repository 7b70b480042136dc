mod aggregation;
mod cancellation;
mod compilation_context;
mod compiled_query;
mod consumer;
mod pipeline;
mod query_state;

pub use self::aggregation::Aggregation;
pub use self::cancellation::CancellationToken;
pub use self::compilation_context::CompilationContext;
pub use self::compiled_query::{CompiledQuery, QueryOutput};
pub use self::consumer::BufferingConsumer;
pub use self::pipeline::*;
pub use self::query_state::{Id, QueryState, QueryStateLayout};
