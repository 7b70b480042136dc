use std::fmt;
use std::sync::Arc;

use itertools::Itertools;

use crate::engine::data_types::{Row, RowBatch};
use crate::engine::execution::{CancellationToken, CompiledQuery, Id, QueryState};
use crate::engine::operators::OperatorTranslator;
use crate::engine::runtime::MemoryPool;
use crate::observability::QueryCounters;
use crate::options::Options;
use crate::QueryError;

#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
pub struct OperatorId(pub usize);

#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
pub struct PipelineId(pub usize);

/// Location of an operator within a pipeline. Step 0 is the topmost operator.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
pub struct PipelinePosition {
    pub pipeline: PipelineId,
    pub step: usize,
}

/// Chain of operators sharing one push-based control flow, listed from the top (step 0) down to the source.
/// A pipeline breaker is the top step of the child pipeline it materializes and also a step of its parent.
#[derive(Clone, Debug)]
pub struct Pipeline {
    pub id: PipelineId,
    pub parent: Option<PipelineId>,
    pub steps: Vec<OperatorId>,
}

impl Pipeline {
    pub fn new(id: PipelineId, parent: Option<PipelineId>) -> Pipeline {
        Pipeline { id, parent, steps: Vec::new() }
    }

    pub(crate) fn push(&mut self, operator: OperatorId) -> PipelinePosition {
        self.steps.push(operator);
        PipelinePosition { pipeline: self.id, step: self.steps.len() - 1 }
    }

    pub fn is_root(&self) -> bool {
        self.parent.is_none()
    }

    pub fn source(&self) -> Option<OperatorId> {
        self.steps.last().cloned()
    }
}

impl fmt::Display for Pipeline {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "pipeline {}: {}", self.id.0, self.steps.iter().map(|op| format!("op{}", op.0)).join(" <- "))?;
        if let Some(parent) = self.parent {
            write!(f, " (feeds pipeline {})", parent.0)?;
        }
        Ok(())
    }
}

/// Everything an operator can reach while one execution of a compiled query runs.
pub struct ExecutionContext<'q> {
    query: &'q CompiledQuery<'q>,
    state: QueryState,
    cancel: CancellationToken,
}

impl<'q> ExecutionContext<'q> {
    pub(crate) fn new(query: &'q CompiledQuery<'q>, state: QueryState, cancel: CancellationToken) -> ExecutionContext<'q> {
        ExecutionContext { query, state, cancel }
    }

    pub fn state(&self) -> &QueryState {
        &self.state
    }

    pub fn get<T: 'static>(&self, id: Id<T>) -> Result<std::cell::Ref<T>, QueryError> {
        self.state.get(id)
    }

    pub fn get_mut<T: 'static>(&self, id: Id<T>) -> Result<std::cell::RefMut<T>, QueryError> {
        self.state.get_mut(id)
    }

    pub fn options(&self) -> &Options {
        self.query.options()
    }

    pub fn memory(&self) -> &Arc<MemoryPool> {
        self.state.memory()
    }

    pub fn counters(&self) -> &QueryCounters {
        self.state.counters()
    }

    pub fn check_cancelled(&self) -> Result<(), QueryError> {
        self.cancel.check()
    }

    /// Runs `produce` of the given operator, attributing failures to it.
    pub fn produce(&self, operator: OperatorId) -> Result<(), QueryError> {
        let op = self.query.operator(operator)?;
        log::debug!("Producing {}", op.name());
        op.produce(self).map_err(|e| e.in_operator(op.name()))
    }

    /// Consumer context for rows pushed by the operator at `position`.
    pub fn consumer(&self, position: PipelinePosition) -> ConsumerContext {
        ConsumerContext { exec: self, position }
    }
}

/// Routes rows pushed by the operator at `position` to the next operator up the pipeline,
/// or to the query's result consumer at the top of the root pipeline.
#[derive(Clone, Copy)]
pub struct ConsumerContext<'e> {
    exec: &'e ExecutionContext<'e>,
    position: PipelinePosition,
}

impl<'e> ConsumerContext<'e> {
    pub fn exec(&self) -> &'e ExecutionContext<'e> {
        self.exec
    }

    pub fn position(&self) -> PipelinePosition {
        self.position
    }

    pub fn consume(&self, row: &mut Row) -> Result<(), QueryError> {
        match self.parent()? {
            Some((op, ctx)) => op.consume(&ctx, row).map_err(|e| e.in_operator(op.name())),
            None => self.exec.query.consumer().consume(self.exec, row),
        }
    }

    pub fn consume_batch(&self, batch: &mut RowBatch) -> Result<(), QueryError> {
        self.exec.counters().batch_produced();
        match self.parent()? {
            Some((op, ctx)) => op.consume_batch(&ctx, batch).map_err(|e| e.in_operator(op.name())),
            None => self.exec.query.consumer().consume_batch(self.exec, batch),
        }
    }

    fn parent(&self) -> Result<Option<(&'e dyn OperatorTranslator, ConsumerContext<'e>)>, QueryError> {
        let pipeline = self.exec.query.pipeline(self.position.pipeline)?;
        if self.position.step == 0 {
            ensure!(pipeline.is_root(), "Top of pipeline {} pushed rows into its own child pipeline", pipeline.id.0);
            return Ok(None);
        }
        let step = self.position.step - 1;
        let op = self.exec.query.operator(pipeline.steps[step])?;
        Ok(Some((op, ConsumerContext { exec: self.exec, position: PipelinePosition { pipeline: pipeline.id, step } })))
    }
}
