use std::fmt;

use fnv::FnvHashMap;
use itertools::Itertools;

use crate::engine::data_types::{AttributeId, Value};
use crate::QueryError;

/// Computes the value of one attribute for a given row of a batch.
pub trait AttributeAccess {
    fn access(&self, row: &mut Row) -> Result<Value, QueryError>;
}

/// A window of `num_rows` rows sharing one set of attribute accessors. An optional selection vector
/// restricts which positions of the window are live.
pub struct RowBatch<'b> {
    num_rows: usize,
    selection: Option<Vec<u32>>,
    attributes: Vec<(AttributeId, Box<dyn AttributeAccess + 'b>)>,
}

impl<'b> RowBatch<'b> {
    pub fn new(num_rows: usize) -> RowBatch<'b> {
        RowBatch {
            num_rows,
            selection: None,
            attributes: Vec::new(),
        }
    }

    pub fn with_selection(num_rows: usize, selection: Vec<u32>) -> RowBatch<'b> {
        RowBatch {
            num_rows,
            selection: Some(selection),
            attributes: Vec::new(),
        }
    }

    /// Empty batch over the same window and selection, for operators that expose new attributes of the same rows.
    pub fn derive_window<'x>(&self) -> RowBatch<'x> {
        RowBatch {
            num_rows: self.num_rows,
            selection: self.selection.clone(),
            attributes: Vec::new(),
        }
    }

    pub fn add_attribute(&mut self, attribute: AttributeId, access: Box<dyn AttributeAccess + 'b>) {
        self.attributes.retain(|(id, _)| *id != attribute);
        self.attributes.push((attribute, access));
    }

    pub fn has_attribute(&self, attribute: AttributeId) -> bool {
        self.attributes.iter().any(|(id, _)| *id == attribute)
    }

    /// Number of live rows.
    pub fn num_tuples(&self) -> usize {
        match self.selection {
            Some(ref selection) => selection.len(),
            None => self.num_rows,
        }
    }

    /// Size of the underlying window, including rows removed by the selection vector.
    pub fn capacity(&self) -> usize {
        self.num_rows
    }

    /// Position within the window of the `i`th live row.
    pub fn position(&self, i: usize) -> usize {
        match self.selection {
            Some(ref selection) => selection[i] as usize,
            None => i,
        }
    }

    pub fn row(&self, position: usize) -> Row<'_, 'b> {
        Row::new(self, position)
    }

    /// Row at `position` that starts out with values already derived for it.
    pub fn row_with_cache(&self, position: usize, cache: FnvHashMap<AttributeId, Value>) -> Row<'_, 'b> {
        Row { batch: self, tid: position, cache }
    }

    pub fn iterate<F>(&self, mut f: F) -> Result<(), QueryError>
        where F: FnMut(&mut Row) -> Result<(), QueryError> {
        for i in 0..self.num_tuples() {
            let mut row = Row::new(self, self.position(i));
            f(&mut row)?;
        }
        Ok(())
    }

    /// Narrows the selection vector to the rows satisfying `predicate`.
    pub fn filter<F>(&mut self, mut predicate: F) -> Result<(), QueryError>
        where F: FnMut(&mut Row) -> Result<bool, QueryError> {
        let mut selected = Vec::with_capacity(self.num_tuples());
        for i in 0..self.num_tuples() {
            let position = self.position(i);
            let mut row = Row::new(self, position);
            if predicate(&mut row)? {
                selected.push(position as u32);
            }
        }
        self.selection = Some(selected);
        Ok(())
    }

    fn accessor(&self, attribute: AttributeId) -> Result<&(dyn AttributeAccess + 'b), QueryError> {
        self.attributes
            .iter()
            .find(|(id, _)| *id == attribute)
            .map(|(_, access)| access.as_ref())
            .ok_or_else(|| fatal!("No accessor for attribute {} in batch with attributes [{}]",
                                  attribute, self.attributes.iter().map(|(id, _)| id).join(", ")))
    }
}

impl<'b> fmt::Debug for RowBatch<'b> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "RowBatch {{ rows: {}/{}, attributes: [{}] }}",
               self.num_tuples(), self.num_rows, self.attributes.iter().map(|(id, _)| id).join(", "))
    }
}

/// One row of a batch. Attribute values are computed on first use and cached for the lifetime of the row.
pub struct Row<'r, 'b> {
    batch: &'r RowBatch<'b>,
    tid: usize,
    cache: FnvHashMap<AttributeId, Value>,
}

impl<'r, 'b> Row<'r, 'b> {
    fn new(batch: &'r RowBatch<'b>, tid: usize) -> Row<'r, 'b> {
        Row {
            batch,
            tid,
            cache: FnvHashMap::default(),
        }
    }

    /// Position of the row within its batch window.
    pub fn tid(&self) -> usize {
        self.tid
    }

    pub fn derive_value(&mut self, attribute: AttributeId) -> Result<Value, QueryError> {
        if let Some(value) = self.cache.get(&attribute) {
            return Ok(value.clone());
        }
        let batch = self.batch;
        let value = batch.accessor(attribute)?.access(self)?;
        self.cache.insert(attribute, value.clone());
        Ok(value)
    }

    /// Values derived so far, to resume the row later with `RowBatch::row_with_cache`.
    pub fn into_cache(self) -> FnvHashMap<AttributeId, Value> {
        self.cache
    }

    /// Attaches a value computed by an operator to this row, shadowing any accessor of the batch.
    pub fn register_attribute_value(&mut self, attribute: AttributeId, value: Value) {
        self.cache.insert(attribute, value);
    }
}
