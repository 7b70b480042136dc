use std::cell::OnceCell;

use itertools::Itertools;

use crate::engine::data_types::{AttributeAccess, AttributeInfo, Row, RowBatch, SqlType, Value};
use crate::engine::execution::*;
use crate::engine::expression::BoxedExpression;
use crate::engine::operators::aggregate_terms::{bind_having, BoundAggregates};
use crate::engine::operators::OperatorTranslator;
use crate::engine::planning::PlanNode;
use crate::engine::runtime::*;
use crate::observability::QueryCounters;
use crate::options::Options;
use crate::QueryError;

/// Estimated hash tables larger than this are built with prefetching unless configured otherwise.
pub const PREFETCH_THRESHOLD_BYTES: usize = 1 << 20;
/// Rows whose home slots are prefetched before the first of them is probed.
pub const PREFETCH_GROUP_SIZE: usize = 16;
/// Upper bound on the entries a table is pre-sized for when the plan carries no group estimate.
pub const MAX_INITIAL_GROUPS: usize = 1 << 12;
/// Without a group estimate, the initial table takes at most this fraction of the memory limit.
pub const INITIAL_MEMORY_SHARE: usize = 8;

/// Pipeline breaker grouping its input by key into an `OAHashTable` of aggregate states.
///
/// The operator is the top step of the build pipeline, where it consumes rows, and a step of its parent pipeline,
/// into which it pushes one batch per chunk of the finished table. Aggregates of an output row are only finalized
/// when an operator above reads one of them.
#[derive(Debug)]
pub struct HashGroupByTranslator<'p> {
    child: OperatorId,
    group_by: &'p [AttributeInfo],
    key_types: Vec<SqlType>,
    aggregates: BoundAggregates<'p>,
    having: Option<BoxedExpression<'p>>,
    estimated_groups: usize,
    expected_groups: usize,
    prefetch: Option<bool>,
    use_prefetch: bool,
    table: Id<OAHashTable>,
    position: PipelinePosition,
}

impl<'p> HashGroupByTranslator<'p> {
    pub fn compile(ctx: &mut CompilationContext<'p>,
                   plan: &'p PlanNode,
                   id: OperatorId,
                   position: PipelinePosition) -> Result<HashGroupByTranslator<'p>, QueryError> {
        let (input, group_by, aggregates, having, prefetch) = match *plan {
            PlanNode::Aggregate { ref input, ref group_by, ref aggregates, ref having, prefetch, .. } =>
                (input, group_by, aggregates, having, prefetch),
            _ => return Err(fatal!("HashGroupBy bound to {} node", plan.name())),
        };
        ensure!(!group_by.is_empty(), "HashGroupBy bound to aggregate without grouping keys");
        let produced = input.output_attributes();
        for key in group_by {
            ensure!(produced.contains(key), "Grouping key {} is not produced by {}", key, input.name());
        }
        let aggregates = BoundAggregates::bind(aggregates)?;
        let having = bind_having(having.as_ref())?;
        let key_types = group_by.iter().map(|a| a.sql_type).collect::<Vec<_>>();
        let estimated_groups = HashGroupByTranslator::estimate_hash_table_size(
            plan, &key_types, aggregates.aggregation().storage_size(), ctx.options());
        let table = ctx.register("hash_table");

        let build = ctx.new_pipeline(Some(position.pipeline));
        ctx.add_step(build, id)?;
        let child = ctx.compile_operator(input, build)?;
        Ok(HashGroupByTranslator {
            child,
            group_by,
            key_types,
            aggregates,
            having,
            estimated_groups,
            expected_groups: plan.estimated_cardinality(),
            prefetch,
            use_prefetch: false,
            table,
            position,
        })
    }

    /// Number of groups the table is pre-sized for. The plan's estimate is taken as is. Without one, the input
    /// cardinality is capped at `MAX_INITIAL_GROUPS` and shrunk until the table fits into
    /// `1 / INITIAL_MEMORY_SHARE` of the memory limit; the table grows from there.
    pub fn estimate_hash_table_size(plan: &PlanNode, key_types: &[SqlType], value_size: usize, options: &Options) -> usize {
        let floor = options.initial_hash_table_capacity;
        if let PlanNode::Aggregate { estimated_groups: Some(groups), .. } = *plan {
            return groups.max(floor);
        }
        let mut groups = plan.estimated_cardinality().min(MAX_INITIAL_GROUPS).max(floor);
        if let Some(limit) = options.memory_limit {
            while groups > floor && OAHashTable::estimated_bytes(key_types, value_size, groups) > limit / INITIAL_MEMORY_SHARE {
                groups = (groups / 2).max(floor);
            }
        }
        groups
    }

    /// The plan's setting, else the configured override, else whether a table holding the expected number of groups
    /// exceeds `PREFETCH_THRESHOLD_BYTES`.
    pub fn use_prefetching(&self, options: &Options) -> bool {
        self.prefetch.or(options.use_prefetch).unwrap_or_else(|| {
            let bytes = OAHashTable::estimated_bytes(&self.key_types, self.aggregates.aggregation().storage_size(), self.expected_groups);
            bytes > PREFETCH_THRESHOLD_BYTES
        })
    }

    pub fn collect_hash_keys(&self, row: &mut Row) -> Result<(Vec<Value>, u64), QueryError> {
        let keys = self.group_by.iter().map(|a| row.derive_value(a.id)).collect::<Result<Vec<_>, _>>()?;
        let hash = OAHashTable::hash_keys(&keys);
        Ok((keys, hash))
    }

    fn insert(&self, table: &mut OAHashTable, hash: u64, keys: &[Value], inputs: &[Value]) -> Result<(), QueryError> {
        let aggregation = self.aggregates.aggregation();
        table.probe_or_insert(hash, keys, &ConsumerProbe { aggregation, inputs }, &ConsumerInsert { aggregation, inputs })?;
        Ok(())
    }
}

impl<'p> OperatorTranslator for HashGroupByTranslator<'p> {
    fn name(&self) -> &'static str {
        "HashGroupBy"
    }

    fn children(&self) -> Vec<OperatorId> {
        vec![self.child]
    }

    fn define_auxiliary_functions(&mut self, options: &Options) -> Result<(), QueryError> {
        self.use_prefetch = self.use_prefetching(options);
        Ok(())
    }

    fn initialize_query_state(&self, ctx: &ExecutionContext) -> Result<(), QueryError> {
        let table = OAHashTable::new(&self.key_types,
                                     self.aggregates.aggregation().storage_size(),
                                     self.estimated_groups,
                                     ctx.memory().clone())?;
        ctx.state().init(self.table, table)
    }

    fn produce(&self, ctx: &ExecutionContext) -> Result<(), QueryError> {
        ctx.produce(self.child)?;
        ctx.check_cancelled()?;
        let table = ctx.get(self.table)?;
        let stats = table.stats();
        ctx.counters().hash_table_built(table.num_entries() as u64, stats.resizes, stats.probes);
        log::debug!("Built {:?} with {} resizes and {} probes", *table, stats.resizes, stats.probes);
        let callback = ProduceResults {
            translator: self,
            consumer: ctx.consumer(self.position),
            counters: ctx.counters(),
        };
        table.vectorized_iterate(ctx.options().batch_size.max(1), &callback)
    }

    fn consume(&self, ctx: &ConsumerContext, row: &mut Row) -> Result<(), QueryError> {
        let (keys, hash) = self.collect_hash_keys(row)?;
        let inputs = self.aggregates.collect_inputs(row)?;
        let mut table = ctx.exec().get_mut(self.table)?;
        self.insert(&mut table, hash, &keys, &inputs)
    }

    fn consume_batch(&self, ctx: &ConsumerContext, batch: &mut RowBatch) -> Result<(), QueryError> {
        let mut table = ctx.exec().get_mut(self.table)?;
        if !self.use_prefetch {
            return batch.iterate(|row| {
                let (keys, hash) = self.collect_hash_keys(row)?;
                let inputs = self.aggregates.collect_inputs(row)?;
                self.insert(&mut table, hash, &keys, &inputs)
            });
        }
        let mut group = Vec::with_capacity(PREFETCH_GROUP_SIZE);
        let live = batch.num_tuples();
        let mut start = 0;
        while start < live {
            let end = (start + PREFETCH_GROUP_SIZE).min(live);
            group.clear();
            for i in start..end {
                let mut row = batch.row(batch.position(i));
                let (keys, hash) = self.collect_hash_keys(&mut row)?;
                let inputs = self.aggregates.collect_inputs(&mut row)?;
                table.prefetch(hash);
                group.push((hash, keys, inputs));
            }
            for (hash, keys, inputs) in &group {
                self.insert(&mut table, *hash, keys, inputs)?;
            }
            start = end;
        }
        Ok(())
    }

    fn tear_down_query_state(&self, ctx: &ExecutionContext) -> Result<(), QueryError> {
        ctx.state().take(self.table)?;
        Ok(())
    }

    fn display_op(&self, alternate: bool) -> String {
        let keys = self.group_by.iter().map(|a| a.to_string()).join(", ");
        let mut display = format!("hash_group_by[{}] {}", keys, self.aggregates.display());
        if let Some(ref having) = self.having {
            display.push_str(&format!(" having {:?}", having));
        }
        if alternate {
            display.push_str(&format!(" ({} groups estimated, prefetch: {})", self.estimated_groups, self.use_prefetch));
        }
        display
    }
}

/// Folds a row into the aggregates of an existing group.
pub struct ConsumerProbe<'a> {
    aggregation: &'a Aggregation,
    inputs: &'a [Value],
}

impl<'a> ProbeCallback for ConsumerProbe<'a> {
    fn process_entry(&self, payload: &mut [u8], pool: &mut VarlenPool) -> Result<(), QueryError> {
        self.aggregation.advance_values(payload, self.inputs, pool)
    }
}

/// Writes the initial aggregates of a new group.
pub struct ConsumerInsert<'a> {
    aggregation: &'a Aggregation,
    inputs: &'a [Value],
}

impl<'a> InsertCallback for ConsumerInsert<'a> {
    fn store_value(&self, payload: &mut [u8], pool: &mut VarlenPool) -> Result<(), QueryError> {
        self.aggregation.create_initial_values(payload, self.inputs, pool)
    }

    fn value_size(&self) -> usize {
        self.aggregation.storage_size()
    }
}

/// Pushes every chunk of the finished table up the parent pipeline as one batch.
struct ProduceResults<'a, 'p> {
    translator: &'a HashGroupByTranslator<'p>,
    consumer: ConsumerContext<'a>,
    counters: &'a QueryCounters,
}

impl<'a, 'p> VectorizedIterateCallback for ProduceResults<'a, 'p> {
    fn process_entries(&self, access: &HashTableAccess, selection: &[u32]) -> Result<(), QueryError> {
        let finalizer = AggregateFinalizer::new(self.translator.aggregates.aggregation(), access, selection, self.counters);
        let mut batch = RowBatch::new(selection.len());
        for (index, key) in self.translator.group_by.iter().enumerate() {
            batch.add_attribute(key.id, Box::new(GroupKeyAccess { access, selection, index }));
        }
        for (index, output) in self.translator.aggregates.outputs().iter().enumerate() {
            batch.add_attribute(output.id, Box::new(AggregateAccess { finalizer: &finalizer, index }));
        }
        if let Some(ref having) = self.translator.having {
            batch.filter(|row| Ok(having.derive_value(row)?.truth()? == Some(true)))?;
        }
        if batch.num_tuples() > 0 {
            self.consumer.consume_batch(&mut batch)?;
        }
        Ok(())
    }
}

/// Final aggregate values of the entries of one chunk, computed at most once per entry on first access.
pub struct AggregateFinalizer<'a> {
    aggregation: &'a Aggregation,
    access: &'a HashTableAccess<'a>,
    selection: &'a [u32],
    finalized: Vec<OnceCell<Vec<Value>>>,
    counters: &'a QueryCounters,
}

impl<'a> AggregateFinalizer<'a> {
    pub fn new(aggregation: &'a Aggregation,
               access: &'a HashTableAccess<'a>,
               selection: &'a [u32],
               counters: &'a QueryCounters) -> AggregateFinalizer<'a> {
        AggregateFinalizer {
            aggregation,
            access,
            selection,
            finalized: (0..selection.len()).map(|_| OnceCell::new()).collect(),
            counters,
        }
    }

    /// Finalized aggregates of the `row`th entry of the chunk.
    pub fn values(&self, row: usize) -> Result<&[Value], QueryError> {
        let cell = self.finalized
            .get(row)
            .ok_or_else(|| fatal!("Row {} out of range for chunk of {} entries", row, self.selection.len()))?;
        if let Some(values) = cell.get() {
            return Ok(values);
        }
        let slot = self.selection[row];
        let values = self.aggregation.finalize_values(self.access.payload(slot), self.access.pool())?;
        self.counters.finalized();
        Ok(cell.get_or_init(|| values))
    }
}

struct AggregateAccess<'a> {
    finalizer: &'a AggregateFinalizer<'a>,
    index: usize,
}

impl<'a> AttributeAccess for AggregateAccess<'a> {
    fn access(&self, row: &mut Row) -> Result<Value, QueryError> {
        self.finalizer
            .values(row.tid())?
            .get(self.index)
            .cloned()
            .ok_or_else(|| fatal!("Aggregate {} out of range", self.index))
    }
}

struct GroupKeyAccess<'a> {
    access: &'a HashTableAccess<'a>,
    selection: &'a [u32],
    index: usize,
}

impl<'a> AttributeAccess for GroupKeyAccess<'a> {
    fn access(&self, row: &mut Row) -> Result<Value, QueryError> {
        let slot = self.selection
            .get(row.tid())
            .ok_or_else(|| fatal!("Row {} out of range for chunk of {} entries", row.tid(), self.selection.len()))?;
        self.access.key(*slot, self.index)
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::sync::Arc;

    use super::*;
    use crate::engine::planning::{AggregateKind, PlanBuilder};
    use crate::ingest::raw_val::syntax::*;
    use crate::mem_store::DataTable;

    struct ReadTwice<'c> {
        aggregation: &'c Aggregation,
        counters: &'c QueryCounters,
        results: RefCell<Vec<(Vec<Value>, Vec<Value>)>>,
    }

    impl<'c> VectorizedIterateCallback for ReadTwice<'c> {
        fn process_entries(&self, access: &HashTableAccess, selection: &[u32]) -> Result<(), QueryError> {
            let finalizer = AggregateFinalizer::new(self.aggregation, access, selection, self.counters);
            for row in 0..selection.len() {
                let first = finalizer.values(row)?.to_vec();
                let second = finalizer.values(row)?.to_vec();
                self.results.borrow_mut().push((first, second));
            }
            Ok(())
        }
    }

    #[test]
    fn test_finalizer_memoizes() {
        let aggregation = Aggregation::setup(&[
            (AggregateKind::Sum, Some(SqlType::Integer)),
            (AggregateKind::Avg, Some(SqlType::Integer)),
        ]).unwrap();
        let mut table = OAHashTable::new(&[SqlType::Integer], aggregation.storage_size(), 4, MemoryPool::unbounded()).unwrap();
        for (k, v) in [(1, 2), (1, 3), (2, 5)] {
            let keys = [Value::integer(k)];
            let inputs = [Value::integer(v), Value::integer(v)];
            table.probe_or_insert(OAHashTable::hash_keys(&keys),
                                  &keys,
                                  &ConsumerProbe { aggregation: &aggregation, inputs: &inputs },
                                  &ConsumerInsert { aggregation: &aggregation, inputs: &inputs }).unwrap();
        }

        let counters = QueryCounters::new();
        let callback = ReadTwice { aggregation: &aggregation, counters: &counters, results: RefCell::new(vec![]) };
        table.vectorized_iterate(1024, &callback).unwrap();
        let results = callback.results.into_inner();
        assert_eq!(results.len(), 2);
        for (first, second) in &results {
            assert_eq!(first, second);
        }
        let mut sums = results.iter().map(|(values, _)| values.clone()).collect::<Vec<_>>();
        sums.sort_by(|a, b| a[1].compare(&b[1]).unwrap());
        assert_eq!(sums, vec![
            vec![Value::bigint(5), Value::decimal(2.5)],
            vec![Value::bigint(5), Value::decimal(5.0)],
        ]);
        assert_eq!(counters.finalizations(), 2);
    }

    #[test]
    fn test_initial_size_bounded_without_group_estimate() {
        let table = Arc::new(DataTable::new("t", vec![("k", SqlType::Integer)]));
        table.insert_rows(&(0..10_000).map(|i| vec![Int(i)]).collect::<Vec<_>>()).unwrap();
        let mut builder = PlanBuilder::new();
        let scan = builder.scan(&table);
        let plan = builder.aggregate(scan, &["k"], vec![("n", AggregateKind::CountStar, None)]).unwrap();
        let key_types = [SqlType::Integer];
        let estimate = |plan: &PlanNode, options: &Options|
            HashGroupByTranslator::estimate_hash_table_size(plan, &key_types, 8, options);

        assert_eq!(estimate(&plan, &Options::default()), MAX_INITIAL_GROUPS);
        let limited = estimate(&plan, &Options::default().with_memory_limit(Some(64 * 1024)));
        assert!(limited >= 16 && limited < MAX_INITIAL_GROUPS, "{}", limited);
        assert!(OAHashTable::estimated_bytes(&key_types, 8, limited) <= 64 * 1024 / INITIAL_MEMORY_SHARE);
        assert_eq!(estimate(&plan, &Options::default().with_memory_limit(Some(16))), 16);

        let hinted = plan.with_estimated_groups(50_000);
        assert_eq!(estimate(&hinted, &Options::default().with_memory_limit(Some(64 * 1024))), 50_000);
    }
}
