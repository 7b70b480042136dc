use std::any::type_name;
use std::fmt;

use regex::Regex;

use crate::engine::data_types::{Row, RowBatch};
use crate::engine::execution::{ConsumerContext, ExecutionContext, OperatorId};
use crate::options::Options;
use crate::QueryError;

pub type BoxedOperator<'p> = Box<dyn OperatorTranslator + 'p>;

/// Translator for one plan operator, specialized for its node when the plan is compiled.
///
/// Per execution, `initialize_query_state` and `tear_down_query_state` run as a matched pair. Between them the
/// executor calls `produce` on the root operator; sources and pipeline breakers push rows up their pipeline
/// through `consume`/`consume_batch` of the operators above them.
pub trait OperatorTranslator: fmt::Debug + Send + Sync {
    fn name(&self) -> &'static str;

    /// Operators whose `produce` this operator drives.
    fn children(&self) -> Vec<OperatorId>;

    /// Called once per compiled query after all translators are bound.
    fn define_auxiliary_functions(&mut self, _options: &Options) -> Result<(), QueryError> { Ok(()) }

    fn initialize_query_state(&self, _ctx: &ExecutionContext) -> Result<(), QueryError> { Ok(()) }

    fn produce(&self, ctx: &ExecutionContext) -> Result<(), QueryError>;

    fn consume(&self, ctx: &ConsumerContext, row: &mut Row) -> Result<(), QueryError>;

    fn consume_batch(&self, ctx: &ConsumerContext, batch: &mut RowBatch) -> Result<(), QueryError> {
        batch.iterate(|row| self.consume(ctx, row))
    }

    fn tear_down_query_state(&self, _ctx: &ExecutionContext) -> Result<(), QueryError> { Ok(()) }

    fn display_op(&self, alternate: bool) -> String;

    fn display(&self, full: bool) -> String {
        format!("{:<60} {}", self.display_op(full), short_type_name::<Self>())
    }
}

lazy_static! {
    static ref MODULE_PATH: Regex = Regex::new(r"\w+::").unwrap();
}

fn short_type_name<T: ?Sized>() -> String {
    MODULE_PATH.replace_all(type_name::<T>(), "").into_owned()
}

/// Rejects rows pushed into a source operator.
pub(crate) fn not_a_consumer(name: &str) -> QueryError {
    fatal!("{} is a source and cannot consume rows", name)
}
