use crate::engine::data_types::{AttributeInfo, Row, RowBatch};
use crate::engine::execution::{ExecutionContext, Id, QueryStateLayout};
use crate::engine::runtime::Buffer;
use crate::ingest::raw_val::RawVal;
use crate::QueryError;

/// Receives the rows leaving the root pipeline and buffers them until the query completes.
#[derive(Debug)]
pub struct BufferingConsumer {
    attributes: Vec<AttributeInfo>,
    buffer: Id<Buffer>,
}

impl BufferingConsumer {
    pub fn new(attributes: Vec<AttributeInfo>, layout: &mut QueryStateLayout) -> BufferingConsumer {
        BufferingConsumer {
            attributes,
            buffer: layout.register("result_buffer"),
        }
    }

    pub fn attributes(&self) -> &[AttributeInfo] {
        &self.attributes
    }

    pub fn initialize(&self, ctx: &ExecutionContext) -> Result<(), QueryError> {
        let types = self.attributes.iter().map(|a| a.sql_type).collect::<Vec<_>>();
        let mut buffer = Buffer::new();
        buffer.init(&types, ctx.memory().clone())?;
        ctx.state().init(self.buffer, buffer)
    }

    pub fn consume(&self, ctx: &ExecutionContext, row: &mut Row) -> Result<(), QueryError> {
        let values = self.attributes
            .iter()
            .map(|a| row.derive_value(a.id))
            .collect::<Result<Vec<_>, _>>()?;
        ctx.get_mut(self.buffer)?.append(&values)
    }

    pub fn consume_batch(&self, ctx: &ExecutionContext, batch: &mut RowBatch) -> Result<(), QueryError> {
        let mut buffer = ctx.get_mut(self.buffer)?;
        batch.iterate(|row| {
            let values = self.attributes
                .iter()
                .map(|a| row.derive_value(a.id))
                .collect::<Result<Vec<_>, _>>()?;
            buffer.append(&values)
        })
    }

    /// Buffered rows in arrival order.
    pub fn collect(&self, ctx: &ExecutionContext) -> Result<Vec<Vec<RawVal>>, QueryError> {
        let buffer = ctx.get(self.buffer)?;
        let mut rows = Vec::with_capacity(buffer.num_tuples()?);
        buffer.iterate(|tuple| {
            rows.push(tuple.iter().map(|v| v.to_raw()).collect());
            Ok(())
        })?;
        Ok(rows)
    }

    pub fn tear_down(&self, ctx: &ExecutionContext) -> Result<(), QueryError> {
        match ctx.state().take(self.buffer)? {
            Some(mut buffer) => buffer.destroy(),
            None => Ok(()),
        }
    }
}
