use std::fmt;

use crate::engine::data_types::Value;
use crate::engine::runtime::{CompactStorage, VarlenPool};
use crate::QueryError;

/// Immutable block of tuples in `CompactStorage` layout together with the pool holding their varchar payloads.
pub struct TileGroup {
    layout: CompactStorage,
    data: Vec<u8>,
    pool: VarlenPool,
    num_tuples: usize,
}

impl TileGroup {
    pub(crate) fn new(layout: CompactStorage) -> TileGroup {
        TileGroup {
            layout,
            data: Vec::new(),
            pool: VarlenPool::new(),
            num_tuples: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.num_tuples
    }

    pub fn is_empty(&self) -> bool {
        self.num_tuples == 0
    }

    pub fn load_value(&self, tuple: usize, column: usize) -> Result<Value, QueryError> {
        ensure!(tuple < self.num_tuples, "Tuple {} out of bounds for tile group of {} tuples", tuple, self.num_tuples);
        self.layout.load_value(self.tuple(tuple), column, &self.pool)
    }

    pub fn load_tuple(&self, tuple: usize) -> Result<Vec<Value>, QueryError> {
        ensure!(tuple < self.num_tuples, "Tuple {} out of bounds for tile group of {} tuples", tuple, self.num_tuples);
        self.layout.load_values(self.tuple(tuple), &self.pool)
    }

    fn tuple(&self, tuple: usize) -> &[u8] {
        let size = self.layout.storage_size();
        &self.data[tuple * size..(tuple + 1) * size]
    }

    /// Zeroed space for one more tuple. The tuple only becomes part of the group once `commit_tuple` is called.
    pub(crate) fn reserve_tuple(&mut self) -> (&mut [u8], &mut VarlenPool, &CompactStorage) {
        let size = self.layout.storage_size();
        let start = self.num_tuples * size;
        self.data.truncate(start);
        self.data.resize(start + size, 0);
        (&mut self.data[start..], &mut self.pool, &self.layout)
    }

    pub(crate) fn commit_tuple(&mut self) -> Result<(), QueryError> {
        let size = self.layout.storage_size();
        ensure!(self.data.len() == (self.num_tuples + 1) * size, "Tuple committed without reserved storage");
        self.num_tuples += 1;
        Ok(())
    }

    pub(crate) fn pool_mut(&mut self) -> &mut VarlenPool {
        &mut self.pool
    }

    pub(crate) fn heap_size(&self) -> usize {
        self.data.len() + self.pool.heap_size()
    }
}

impl fmt::Debug for TileGroup {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "TileGroup {{ tuples: {}, bytes: {} }}", self.num_tuples, self.heap_size())
    }
}
