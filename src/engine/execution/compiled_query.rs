use std::fmt::Write;
use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;

use crate::engine::execution::*;
use crate::engine::operators::{BoxedOperator, OperatorTranslator};
use crate::engine::planning::PlanNode;
use crate::engine::runtime::MemoryPool;
use crate::ingest::raw_val::RawVal;
use crate::observability::metrics;
use crate::observability::QueryStats;
use crate::options::Options;
use crate::QueryError;

/// Result of one successful execution.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueryOutput {
    pub colnames: Vec<String>,
    pub rows: Vec<Vec<RawVal>>,
    pub rows_affected: u64,
    pub stats: QueryStats,
}

/// A plan bound to specialized translators. Immutable once compiled; every execution works on its own `QueryState`,
/// so one compiled query can be executed by several threads at once.
pub struct CompiledQuery<'p> {
    operators: Vec<BoxedOperator<'p>>,
    pipelines: Vec<Pipeline>,
    root: OperatorId,
    layout: QueryStateLayout,
    consumer: BufferingConsumer,
    options: Options,
}

impl<'p> CompiledQuery<'p> {
    pub fn compile(plan: &'p PlanNode, options: &Options) -> Result<CompiledQuery<'p>, QueryError> {
        let mut ctx = CompilationContext::new(options);
        let root_pipeline = ctx.new_pipeline(None);
        let root = ctx.compile_operator(plan, root_pipeline)?;
        let consumer = BufferingConsumer::new(plan.output_attributes(), ctx.layout_mut());
        let (operators, pipelines, layout) = ctx.finish()?;
        let query = CompiledQuery::from_parts(operators, pipelines, root, layout, consumer, options)?;
        metrics::QUERY_COMPILED_COUNT.inc();
        log::debug!("Compiled {} operators in {} pipelines with {} state slots:\n{}",
                    query.operators.len(), query.pipelines.len(), query.layout.len(), query.explain());
        Ok(query)
    }

    pub(crate) fn from_parts(mut operators: Vec<BoxedOperator<'p>>,
                             pipelines: Vec<Pipeline>,
                             root: OperatorId,
                             layout: QueryStateLayout,
                             consumer: BufferingConsumer,
                             options: &Options) -> Result<CompiledQuery<'p>, QueryError> {
        ensure!(root.0 < operators.len(), "Root operator op{} out of range", root.0);
        for op in &mut operators {
            op.define_auxiliary_functions(options)?;
        }
        Ok(CompiledQuery { operators, pipelines, root, layout, consumer, options: options.clone() })
    }

    pub fn execute(&self) -> Result<QueryOutput, QueryError> {
        self.execute_with(&CancellationToken::new())
    }

    /// Runs the query to completion or until `cancel` fires. Rows are returned only if the whole execution succeeds.
    pub fn execute_with(&self, cancel: &CancellationToken) -> Result<QueryOutput, QueryError> {
        let start = Instant::now();
        metrics::QUERY_COUNT.inc();
        let memory = Arc::new(MemoryPool::new(self.options.memory_limit));
        let state = QueryState::new(&self.layout, memory.clone());
        let ctx = ExecutionContext::new(self, state, cancel.clone());
        let result = self.run(&ctx);
        metrics::QUERY_MEMORY_PEAK_BYTES.set(memory.peak() as f64);
        match result {
            Ok((rows, rows_affected)) => {
                metrics::QUERY_OK_COUNT.inc();
                let stats = ctx.counters().snapshot(memory.peak(), start.elapsed().as_nanos() as u64);
                log::debug!("Query returned {} rows in {:?}", rows.len(), start.elapsed());
                Ok(QueryOutput {
                    colnames: self.consumer.attributes().iter().map(|a| a.name.clone()).collect(),
                    rows,
                    rows_affected,
                    stats,
                })
            }
            Err(QueryError::Cancelled) => {
                metrics::QUERY_CANCELLED_COUNT.inc();
                log::debug!("Query cancelled after {:?}", start.elapsed());
                Err(QueryError::Cancelled)
            }
            Err(err) => {
                metrics::QUERY_ERROR_COUNT.inc();
                log::debug!("Query failed: {}", err);
                Err(err)
            }
        }
    }

    fn run(&self, ctx: &ExecutionContext) -> Result<(Vec<Vec<RawVal>>, u64), QueryError> {
        let mut teardown = Teardown::new(self, ctx);
        teardown.consumer = true;
        self.consumer.initialize(ctx)?;
        for (i, op) in self.operators.iter().enumerate() {
            teardown.initialized.push(OperatorId(i));
            op.initialize_query_state(ctx).map_err(|e| e.in_operator(op.name()))?;
        }
        ctx.check_cancelled()?;
        ctx.produce(self.root)?;
        let rows = self.consumer.collect(ctx)?;
        let rows_affected = ctx.counters().affected();
        teardown.finish()?;
        Ok((rows, rows_affected))
    }

    pub fn operator(&self, id: OperatorId) -> Result<&dyn OperatorTranslator, QueryError> {
        self.operators
            .get(id.0)
            .map(|op| op.as_ref())
            .ok_or_else(|| fatal!("Unknown operator op{}", id.0))
    }

    pub fn pipeline(&self, id: PipelineId) -> Result<&Pipeline, QueryError> {
        self.pipelines.get(id.0).ok_or_else(|| fatal!("Unknown pipeline {}", id.0))
    }

    pub fn pipelines(&self) -> &[Pipeline] {
        &self.pipelines
    }

    pub fn options(&self) -> &Options {
        &self.options
    }

    pub fn consumer(&self) -> &BufferingConsumer {
        &self.consumer
    }

    /// Pipelines followed by the operator tree.
    pub fn explain(&self) -> String {
        let mut out = String::new();
        for pipeline in &self.pipelines {
            let _ = writeln!(out, "{}", pipeline);
        }
        self.explain_operator(self.root, 0, &mut out);
        out
    }

    fn explain_operator(&self, id: OperatorId, depth: usize, out: &mut String) {
        if let Ok(op) = self.operator(id) {
            let _ = writeln!(out, "{}op{} {}", "  ".repeat(depth), id.0, op.display(false));
            for child in op.children() {
                self.explain_operator(child, depth + 1, out);
            }
        }
    }
}

/// Tears down everything initialized by an execution in reverse order, on success, error, cancellation or unwind.
struct Teardown<'a, 'q> {
    query: &'a CompiledQuery<'q>,
    ctx: &'a ExecutionContext<'a>,
    initialized: Vec<OperatorId>,
    consumer: bool,
}

impl<'a, 'q> Teardown<'a, 'q> {
    fn new(query: &'a CompiledQuery<'q>, ctx: &'a ExecutionContext<'a>) -> Teardown<'a, 'q> {
        Teardown { query, ctx, initialized: Vec::new(), consumer: false }
    }

    fn finish(mut self) -> Result<(), QueryError> {
        self.tear_down()
    }

    /// Returns the first error, after attempting every teardown.
    fn tear_down(&mut self) -> Result<(), QueryError> {
        let mut first_error = None;
        while let Some(id) = self.initialized.pop() {
            let result = self.query
                .operator(id)
                .and_then(|op| op.tear_down_query_state(self.ctx).map_err(|e| e.in_operator(op.name())));
            if let Err(err) = result {
                first_error.get_or_insert(err);
            }
        }
        if self.consumer {
            self.consumer = false;
            if let Err(err) = self.query.consumer.tear_down(self.ctx) {
                first_error.get_or_insert(err);
            }
        }
        match first_error {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

impl<'a, 'q> Drop for Teardown<'a, 'q> {
    fn drop(&mut self) {
        if let Err(err) = self.tear_down() {
            log::warn!("Failed to tear down query state: {}", err);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::panic::{self, AssertUnwindSafe};
    use std::sync::Mutex;

    use super::*;
    use crate::engine::data_types::{Row, RowBatch};
    use crate::engine::operators::not_a_consumer;

    #[derive(Debug, Clone, Copy, PartialEq)]
    enum Behavior {
        Succeed,
        Fail,
        FailInit,
        Panic,
        WaitForCancel,
    }

    #[derive(Debug)]
    struct Recorder {
        index: usize,
        child: Option<OperatorId>,
        position: PipelinePosition,
        behavior: Behavior,
        log: Arc<Mutex<Vec<String>>>,
    }

    impl Recorder {
        fn record(&self, event: &str) {
            self.log.lock().unwrap().push(format!("{} op{}", event, self.index));
        }
    }

    impl OperatorTranslator for Recorder {
        fn name(&self) -> &'static str {
            "Recorder"
        }

        fn children(&self) -> Vec<OperatorId> {
            self.child.into_iter().collect()
        }

        fn initialize_query_state(&self, _: &ExecutionContext) -> Result<(), QueryError> {
            self.record("init");
            if self.child.is_none() && self.behavior == Behavior::FailInit {
                return Err(QueryError::ParseError("init".to_string()));
            }
            Ok(())
        }

        fn produce(&self, ctx: &ExecutionContext) -> Result<(), QueryError> {
            if let Some(child) = self.child {
                return ctx.produce(child);
            }
            match self.behavior {
                Behavior::Fail => Err(QueryError::Overflow),
                Behavior::Panic => panic!("operator panicked"),
                Behavior::WaitForCancel => ctx.check_cancelled(),
                _ => ctx.consumer(self.position).consume_batch(&mut RowBatch::new(0)),
            }
        }

        fn consume(&self, ctx: &ConsumerContext, row: &mut Row) -> Result<(), QueryError> {
            match self.child {
                Some(_) => ctx.exec().consumer(self.position).consume(row),
                None => Err(not_a_consumer(self.name())),
            }
        }

        fn tear_down_query_state(&self, _: &ExecutionContext) -> Result<(), QueryError> {
            self.record("teardown");
            Ok(())
        }

        fn display_op(&self, _: bool) -> String {
            format!("recorder {}", self.index)
        }
    }

    fn query(behavior: Behavior, log: &Arc<Mutex<Vec<String>>>) -> CompiledQuery<'static> {
        let mut pipeline = Pipeline::new(PipelineId(0), None);
        let top = pipeline.push(OperatorId(0));
        let source = pipeline.push(OperatorId(1));
        let operators: Vec<BoxedOperator<'static>> = vec![
            Box::new(Recorder { index: 0, child: Some(OperatorId(1)), position: top, behavior, log: log.clone() }),
            Box::new(Recorder { index: 1, child: None, position: source, behavior, log: log.clone() }),
        ];
        let mut layout = QueryStateLayout::default();
        let consumer = BufferingConsumer::new(vec![], &mut layout);
        CompiledQuery::from_parts(operators, vec![pipeline], OperatorId(0), layout, consumer, &Options::default()).unwrap()
    }

    fn events(log: &Arc<Mutex<Vec<String>>>) -> Vec<String> {
        log.lock().unwrap().clone()
    }

    const PAIRED: [&str; 4] = ["init op0", "init op1", "teardown op1", "teardown op0"];

    #[test]
    fn test_teardown_after_success() {
        let log = Arc::new(Mutex::new(vec![]));
        let output = query(Behavior::Succeed, &log).execute().unwrap();
        assert_eq!(output.rows, Vec::<Vec<RawVal>>::new());
        assert_eq!(output.stats.batches_produced, 1);
        assert_eq!(events(&log), PAIRED);
    }

    #[test]
    fn test_teardown_after_error() {
        let log = Arc::new(Mutex::new(vec![]));
        let err = query(Behavior::Fail, &log).execute().unwrap_err();
        assert!(matches!(err, QueryError::OperatorFailed { ref operator, .. } if operator == "Recorder"));
        assert!(matches!(err.root_cause(), QueryError::Overflow));
        assert_eq!(events(&log), PAIRED);
    }

    #[test]
    fn test_teardown_after_failed_initialization() {
        let log = Arc::new(Mutex::new(vec![]));
        let err = query(Behavior::FailInit, &log).execute().unwrap_err();
        assert!(matches!(err.root_cause(), QueryError::ParseError(_)));
        assert_eq!(events(&log), PAIRED);
    }

    #[test]
    fn test_teardown_after_panic() {
        let log = Arc::new(Mutex::new(vec![]));
        let query = query(Behavior::Panic, &log);
        let result = panic::catch_unwind(AssertUnwindSafe(|| query.execute()));
        assert!(result.is_err());
        assert_eq!(events(&log), PAIRED);
    }

    #[test]
    fn test_teardown_after_cancellation() {
        let log = Arc::new(Mutex::new(vec![]));
        let token = CancellationToken::new();
        token.cancel();
        let err = query(Behavior::WaitForCancel, &log).execute_with(&token).unwrap_err();
        assert!(matches!(err, QueryError::Cancelled));
        assert_eq!(events(&log), PAIRED);
    }

    #[test]
    fn test_explain() {
        let log = Arc::new(Mutex::new(vec![]));
        let explain = query(Behavior::Succeed, &log).explain();
        assert!(explain.starts_with("pipeline 0: op0 <- op1\nop0 recorder 0"));
        assert!(explain.contains("\n  op1 recorder 1"));
    }
}
