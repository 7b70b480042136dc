use std::sync::Arc;

use itertools::Itertools;

use crate::engine::data_types::{AttributeInfo, Row, RowBatch};
use crate::engine::execution::*;
use crate::engine::operators::OperatorTranslator;
use crate::engine::planning::PlanNode;
use crate::engine::runtime::Inserter;
use crate::mem_store::DataTable;
use crate::QueryError;

/// Sink writing every row of its input into a table. Rows are published when the input is exhausted,
/// a failed or cancelled execution leaves the table unchanged.
#[derive(Debug)]
pub struct InsertTranslator<'p> {
    child: OperatorId,
    table: &'p Arc<DataTable>,
    inputs: Vec<AttributeInfo>,
    inserter: Id<Inserter>,
}

impl<'p> InsertTranslator<'p> {
    pub fn compile(ctx: &mut CompilationContext<'p>,
                   input: &'p PlanNode,
                   table: &'p Arc<DataTable>,
                   position: PipelinePosition) -> Result<InsertTranslator<'p>, QueryError> {
        let inputs = input.output_attributes();
        if inputs.len() != table.columns().len() {
            bail!(QueryError::SchemaMismatch, "insert into {} with {} columns from input with {} columns",
                  table.name(), table.columns().len(), inputs.len());
        }
        let inserter = ctx.register("inserter");
        let child = ctx.compile_operator(input, position.pipeline)?;
        Ok(InsertTranslator { child, table, inputs, inserter })
    }

    fn insert_row(&self, inserter: &mut Inserter, row: &mut Row) -> Result<(), QueryError> {
        let mut slot = inserter.allocate_tuple_storage()?;
        for (i, (attribute, column)) in self.inputs.iter().zip(self.table.columns()).enumerate() {
            let value = row.derive_value(attribute.id)?.cast(column.sql_type)?;
            slot.set_value(i, &value)?;
        }
        inserter.insert()
    }
}

impl<'p> OperatorTranslator for InsertTranslator<'p> {
    fn name(&self) -> &'static str {
        "Insert"
    }

    fn children(&self) -> Vec<OperatorId> {
        vec![self.child]
    }

    fn initialize_query_state(&self, ctx: &ExecutionContext) -> Result<(), QueryError> {
        let mut inserter = Inserter::new();
        inserter.init(self.table.clone())?;
        ctx.state().init(self.inserter, inserter)
    }

    fn produce(&self, ctx: &ExecutionContext) -> Result<(), QueryError> {
        ctx.produce(self.child)?;
        ctx.check_cancelled()?;
        let rows = ctx.get_mut(self.inserter)?.finish()?;
        ctx.counters().rows_affected(rows as u64);
        Ok(())
    }

    fn consume(&self, ctx: &ConsumerContext, row: &mut Row) -> Result<(), QueryError> {
        let mut inserter = ctx.exec().get_mut(self.inserter)?;
        self.insert_row(&mut inserter, row)
    }

    fn consume_batch(&self, ctx: &ConsumerContext, batch: &mut RowBatch) -> Result<(), QueryError> {
        let mut inserter = ctx.exec().get_mut(self.inserter)?;
        batch.iterate(|row| self.insert_row(&mut inserter, row))
    }

    fn tear_down_query_state(&self, ctx: &ExecutionContext) -> Result<(), QueryError> {
        match ctx.state().take(self.inserter)? {
            Some(mut inserter) => inserter.tear_down(),
            None => Ok(()),
        }
    }

    fn display_op(&self, _: bool) -> String {
        format!("insert into {}({})", self.table.name(), self.table.columns().iter().map(|c| &c.name).join(", "))
    }
}
