use crate::engine::execution::{OperatorId, Pipeline, PipelineId, PipelinePosition, QueryStateLayout, Id};
use crate::engine::operators::*;
use crate::engine::planning::PlanNode;
use crate::options::Options;
use crate::QueryError;

/// Collects the translators, pipelines and state slots of a plan while it is compiled.
pub struct CompilationContext<'p> {
    options: Options,
    layout: QueryStateLayout,
    operators: Vec<Option<BoxedOperator<'p>>>,
    pipelines: Vec<Pipeline>,
}

impl<'p> CompilationContext<'p> {
    pub fn new(options: &Options) -> CompilationContext<'p> {
        CompilationContext {
            options: options.clone(),
            layout: QueryStateLayout::default(),
            operators: Vec::new(),
            pipelines: Vec::new(),
        }
    }

    pub fn options(&self) -> &Options {
        &self.options
    }

    /// Reserves a slot of per-query state. Translators keep only the returned id.
    pub fn register<T: 'static>(&mut self, name: &'static str) -> Id<T> {
        self.layout.register(name)
    }

    pub fn layout_mut(&mut self) -> &mut QueryStateLayout {
        &mut self.layout
    }

    pub fn new_pipeline(&mut self, parent: Option<PipelineId>) -> PipelineId {
        let id = PipelineId(self.pipelines.len());
        self.pipelines.push(Pipeline::new(id, parent));
        id
    }

    /// Appends `operator` as the next step of `pipeline`.
    pub fn add_step(&mut self, pipeline: PipelineId, operator: OperatorId) -> Result<PipelinePosition, QueryError> {
        let pipeline = self.pipelines
            .get_mut(pipeline.0)
            .ok_or_else(|| fatal!("Unknown pipeline {}", pipeline.0))?;
        Ok(pipeline.push(operator))
    }

    /// Binds the translator for `plan` as the next step of `pipeline`, recursively binding its inputs below it.
    pub fn compile_operator(&mut self, plan: &'p PlanNode, pipeline: PipelineId) -> Result<OperatorId, QueryError> {
        let id = OperatorId(self.operators.len());
        self.operators.push(None);
        let position = self.add_step(pipeline, id)?;
        let operator: BoxedOperator<'p> = match *plan {
            PlanNode::SeqScan { ref table, ref columns, ref predicate } =>
                Box::new(SeqScanTranslator::compile(self, table, columns, predicate.as_ref(), position)?),
            PlanNode::Projection { ref input, ref targets } =>
                Box::new(ProjectionTranslator::compile(self, input, targets, position)?),
            PlanNode::Aggregate { ref group_by, .. } if group_by.is_empty() =>
                Box::new(GlobalGroupByTranslator::compile(self, plan, id, position)?),
            PlanNode::Aggregate { .. } =>
                Box::new(HashGroupByTranslator::compile(self, plan, id, position)?),
            PlanNode::Insert { ref input, ref table } =>
                Box::new(InsertTranslator::compile(self, input, table, position)?),
        };
        log::debug!("Bound {} as op{} at step {} of pipeline {}", operator.name(), id.0, position.step, pipeline.0);
        self.operators[id.0] = Some(operator);
        Ok(id)
    }

    /// Hands out the bound translators and pipelines. Fails if any reserved operator was never bound.
    pub fn finish(self) -> Result<(Vec<BoxedOperator<'p>>, Vec<Pipeline>, QueryStateLayout), QueryError> {
        let operators = self.operators
            .into_iter()
            .enumerate()
            .map(|(i, op)| op.ok_or_else(|| fatal!("Operator op{} was reserved but never bound", i)))
            .collect::<Result<Vec<_>, _>>()?;
        Ok((operators, self.pipelines, self.layout))
    }
}
