use std::sync::Arc;

use crate::engine::data_types::{AttributeAccess, Row, RowBatch, Value};
use crate::engine::execution::*;
use crate::engine::expression::BoxedExpression;
use crate::engine::operators::aggregate_terms::{bind_having, BoundAggregates};
use crate::engine::operators::OperatorTranslator;
use crate::engine::planning::PlanNode;
use crate::engine::runtime::{MemoryPool, VarlenPool};
use crate::QueryError;

/// Aggregate state of the single group.
struct GlobalGroup {
    storage: Vec<u8>,
    pool: VarlenPool,
    memory: Arc<MemoryPool>,
}

impl Drop for GlobalGroup {
    fn drop(&mut self) {
        self.memory.free(self.storage.len());
    }
}

/// Pipeline breaker aggregating its whole input into exactly one output row.
#[derive(Debug)]
pub struct GlobalGroupByTranslator<'p> {
    child: OperatorId,
    aggregates: BoundAggregates<'p>,
    having: Option<BoxedExpression<'p>>,
    group: Id<GlobalGroup>,
    position: PipelinePosition,
}

impl<'p> GlobalGroupByTranslator<'p> {
    pub fn compile(ctx: &mut CompilationContext<'p>,
                   plan: &'p PlanNode,
                   id: OperatorId,
                   position: PipelinePosition) -> Result<GlobalGroupByTranslator<'p>, QueryError> {
        let (input, aggregates, having) = match *plan {
            PlanNode::Aggregate { ref input, ref group_by, ref aggregates, ref having, .. } if group_by.is_empty() =>
                (input, aggregates, having),
            _ => return Err(fatal!("GlobalGroupBy bound to {} node", plan.name())),
        };
        let aggregates = BoundAggregates::bind(aggregates)?;
        let having = bind_having(having.as_ref())?;
        let group = ctx.register("global_group");
        let build = ctx.new_pipeline(Some(position.pipeline));
        ctx.add_step(build, id)?;
        let child = ctx.compile_operator(input, build)?;
        Ok(GlobalGroupByTranslator { child, aggregates, having, group, position })
    }

    fn advance(&self, group: &mut GlobalGroup, row: &mut Row) -> Result<(), QueryError> {
        let inputs = self.aggregates.collect_inputs(row)?;
        self.aggregates.aggregation().advance_values(&mut group.storage, &inputs, &mut group.pool)
    }
}

impl<'p> OperatorTranslator for GlobalGroupByTranslator<'p> {
    fn name(&self) -> &'static str {
        "GlobalGroupBy"
    }

    fn children(&self) -> Vec<OperatorId> {
        vec![self.child]
    }

    fn initialize_query_state(&self, ctx: &ExecutionContext) -> Result<(), QueryError> {
        let aggregation = self.aggregates.aggregation();
        ctx.memory().allocate(aggregation.storage_size())?;
        let mut group = GlobalGroup {
            storage: vec![0; aggregation.storage_size()],
            pool: VarlenPool::charged_to(ctx.memory().clone()),
            memory: ctx.memory().clone(),
        };
        aggregation.create_empty_values(&mut group.storage, &mut group.pool)?;
        ctx.state().init(self.group, group)
    }

    fn produce(&self, ctx: &ExecutionContext) -> Result<(), QueryError> {
        ctx.produce(self.child)?;
        ctx.check_cancelled()?;
        let values = {
            let group = ctx.get(self.group)?;
            self.aggregates.aggregation().finalize_values(&group.storage, &group.pool)?
        };
        ctx.counters().finalized();
        let mut batch = RowBatch::new(1);
        for (output, value) in self.aggregates.outputs().iter().zip(values) {
            batch.add_attribute(output.id, Box::new(FinalValue(value)));
        }
        if let Some(ref having) = self.having {
            batch.filter(|row| Ok(having.derive_value(row)?.truth()? == Some(true)))?;
        }
        if batch.num_tuples() > 0 {
            ctx.consumer(self.position).consume_batch(&mut batch)?;
        }
        Ok(())
    }

    fn consume(&self, ctx: &ConsumerContext, row: &mut Row) -> Result<(), QueryError> {
        let mut group = ctx.exec().get_mut(self.group)?;
        self.advance(&mut group, row)
    }

    fn consume_batch(&self, ctx: &ConsumerContext, batch: &mut RowBatch) -> Result<(), QueryError> {
        let mut group = ctx.exec().get_mut(self.group)?;
        batch.iterate(|row| self.advance(&mut group, row))
    }

    fn tear_down_query_state(&self, ctx: &ExecutionContext) -> Result<(), QueryError> {
        ctx.state().take(self.group)?;
        Ok(())
    }

    fn display_op(&self, alternate: bool) -> String {
        match self.having {
            Some(ref having) if alternate => format!("global_group_by {} having {:?}", self.aggregates.display(), having),
            _ => format!("global_group_by {}", self.aggregates.display()),
        }
    }
}

struct FinalValue(Value);

impl AttributeAccess for FinalValue {
    fn access(&self, _: &mut Row) -> Result<Value, QueryError> {
        Ok(self.0.clone())
    }
}
