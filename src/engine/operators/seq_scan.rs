use std::sync::Arc;

use itertools::Itertools;

use crate::engine::data_types::{AttributeAccess, AttributeInfo, Row, RowBatch, SqlType, Value};
use crate::engine::execution::{CompilationContext, ConsumerContext, ExecutionContext, OperatorId, PipelinePosition};
use crate::engine::expression::{compile_expression, BoxedExpression};
use crate::engine::operators::{not_a_consumer, OperatorTranslator};
use crate::engine::planning::Expr;
use crate::mem_store::{DataTable, TileGroup};
use crate::observability::metrics;
use crate::QueryError;

/// Source reading a snapshot of a table in windows of `batch_size` tuples.
#[derive(Debug)]
pub struct SeqScanTranslator<'p> {
    table: &'p Arc<DataTable>,
    columns: &'p [(usize, AttributeInfo)],
    predicate: Option<BoxedExpression<'p>>,
    position: PipelinePosition,
}

impl<'p> SeqScanTranslator<'p> {
    pub fn compile(_ctx: &mut CompilationContext<'p>,
                   table: &'p Arc<DataTable>,
                   columns: &'p [(usize, AttributeInfo)],
                   predicate: Option<&'p Expr>,
                   position: PipelinePosition) -> Result<SeqScanTranslator<'p>, QueryError> {
        for (index, attribute) in columns {
            let column = table.columns()
                .get(*index)
                .ok_or_else(|| fatal!("SeqScan of {} reads column {} which does not exist", table.name(), index))?;
            ensure!(column.sql_type == attribute.sql_type,
                    "SeqScan of {} exposes column {} {} as {}", table.name(), column.name, column.sql_type, attribute);
        }
        let predicate = match predicate {
            Some(expr) => {
                let translator = compile_expression(expr)?;
                if translator.return_type() != SqlType::Boolean {
                    bail!(QueryError::TypeError, "scan predicate {} is not boolean", expr);
                }
                Some(translator)
            }
            None => None,
        };
        Ok(SeqScanTranslator { table, columns, predicate, position })
    }
}

impl<'p> OperatorTranslator for SeqScanTranslator<'p> {
    fn name(&self) -> &'static str {
        "SeqScan"
    }

    fn children(&self) -> Vec<OperatorId> {
        vec![]
    }

    fn produce(&self, ctx: &ExecutionContext) -> Result<(), QueryError> {
        let snapshot = self.table.scan_snapshot()?;
        let batch_size = ctx.options().batch_size.max(1);
        let consumer = ctx.consumer(self.position);
        for tile_group in &snapshot {
            let mut offset = 0;
            while offset < tile_group.len() {
                ctx.check_cancelled()?;
                let rows = batch_size.min(tile_group.len() - offset);
                let mut batch = RowBatch::new(rows);
                for &(column, ref attribute) in self.columns {
                    batch.add_attribute(attribute.id, Box::new(ColumnAccess { tile_group, column, offset }));
                }
                if let Some(ref predicate) = self.predicate {
                    batch.filter(|row| Ok(predicate.derive_value(row)?.truth()? == Some(true)))?;
                }
                ctx.counters().rows_scanned(rows as u64);
                metrics::ROWS_SCANNED_COUNT.inc_by(rows as f64);
                if batch.num_tuples() > 0 {
                    consumer.consume_batch(&mut batch)?;
                }
                offset += rows;
            }
        }
        Ok(())
    }

    fn consume(&self, _: &ConsumerContext, _: &mut Row) -> Result<(), QueryError> {
        Err(not_a_consumer(self.name()))
    }

    fn display_op(&self, alternate: bool) -> String {
        let columns = self.columns.iter().map(|(_, a)| a.to_string()).join(", ");
        match self.predicate {
            Some(ref predicate) if alternate => format!("scan {}[{}] where {:?}", self.table.name(), columns, predicate),
            Some(_) => format!("scan {}[{}] where ...", self.table.name(), columns),
            None => format!("scan {}[{}]", self.table.name(), columns),
        }
    }
}

/// Reads one column of a window of a tile group.
struct ColumnAccess<'a> {
    tile_group: &'a TileGroup,
    column: usize,
    offset: usize,
}

impl<'a> AttributeAccess for ColumnAccess<'a> {
    fn access(&self, row: &mut Row) -> Result<Value, QueryError> {
        self.tile_group.load_value(self.offset + row.tid(), self.column)
    }
}
