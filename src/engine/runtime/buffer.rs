use std::fmt;
use std::sync::Arc;

use crate::engine::data_types::{SqlType, Value};
use crate::engine::runtime::{CompactStorage, MemoryPool, VarlenPool};
use crate::QueryError;

/// Append-only tuple buffer with a fixed schema.
///
/// `init` must precede every other call and `destroy` ends the buffer's life; both are enforced with `FatalError`s.
#[derive(Default)]
pub struct Buffer {
    state: BufferState,
}

#[derive(Default)]
enum BufferState {
    #[default]
    Uninitialized,
    Active(TupleStore),
    Destroyed,
}

struct TupleStore {
    layout: CompactStorage,
    data: Vec<u8>,
    num_tuples: usize,
    pool: VarlenPool,
    memory: Arc<MemoryPool>,
}

impl Buffer {
    pub fn new() -> Buffer {
        Buffer::default()
    }

    pub fn init(&mut self, types: &[SqlType], memory: Arc<MemoryPool>) -> Result<(), QueryError> {
        match self.state {
            BufferState::Uninitialized => {
                self.state = BufferState::Active(TupleStore {
                    layout: CompactStorage::setup(types),
                    data: Vec::new(),
                    num_tuples: 0,
                    pool: VarlenPool::charged_to(memory.clone()),
                    memory,
                });
                Ok(())
            }
            BufferState::Active(_) => Err(fatal!("Buffer initialized twice")),
            BufferState::Destroyed => Err(fatal!("Buffer initialized after destroy")),
        }
    }

    /// Appends one tuple. A tuple that does not match the schema is rejected and leaves the buffer unchanged.
    pub fn append(&mut self, values: &[Value]) -> Result<(), QueryError> {
        let store = self.active_mut("append")?;
        store.layout.check_values(values)?;
        let tuple_size = store.layout.storage_size();
        store.memory.allocate(tuple_size)?;
        let start = store.data.len();
        store.data.resize(start + tuple_size, 0);
        if let Err(err) = store.layout.store_values(&mut store.data[start..], values, &mut store.pool) {
            store.data.truncate(start);
            store.memory.free(tuple_size);
            return Err(err);
        }
        store.num_tuples += 1;
        Ok(())
    }

    /// Calls `f` with every tuple in insertion order.
    pub fn iterate<F>(&self, mut f: F) -> Result<(), QueryError>
        where F: FnMut(Vec<Value>) -> Result<(), QueryError> {
        let store = self.active("iterate")?;
        let tuple_size = store.layout.storage_size();
        for i in 0..store.num_tuples {
            let tuple = &store.data[i * tuple_size..(i + 1) * tuple_size];
            f(store.layout.load_values(tuple, &store.pool)?)?;
        }
        Ok(())
    }

    /// Drops all tuples, keeping the schema.
    pub fn reset(&mut self) -> Result<(), QueryError> {
        let store = self.active_mut("reset")?;
        store.memory.free(store.data.len());
        store.data.clear();
        store.pool.clear();
        store.num_tuples = 0;
        Ok(())
    }

    pub fn destroy(&mut self) -> Result<(), QueryError> {
        self.reset()?;
        self.state = BufferState::Destroyed;
        Ok(())
    }

    pub fn num_tuples(&self) -> Result<usize, QueryError> {
        Ok(self.active("num_tuples")?.num_tuples)
    }

    pub fn is_initialized(&self) -> bool {
        matches!(self.state, BufferState::Active(_))
    }

    fn active(&self, operation: &str) -> Result<&TupleStore, QueryError> {
        match self.state {
            BufferState::Active(ref store) => Ok(store),
            BufferState::Uninitialized => Err(fatal!("Buffer::{} called before init", operation)),
            BufferState::Destroyed => Err(fatal!("Buffer::{} called after destroy", operation)),
        }
    }

    fn active_mut(&mut self, operation: &str) -> Result<&mut TupleStore, QueryError> {
        match self.state {
            BufferState::Active(ref mut store) => Ok(store),
            BufferState::Uninitialized => Err(fatal!("Buffer::{} called before init", operation)),
            BufferState::Destroyed => Err(fatal!("Buffer::{} called after destroy", operation)),
        }
    }
}

impl Drop for TupleStore {
    fn drop(&mut self) {
        self.memory.free(self.data.len());
    }
}

impl fmt::Debug for Buffer {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self.state {
            BufferState::Uninitialized => write!(f, "Buffer(uninitialized)"),
            BufferState::Active(ref store) => write!(f, "Buffer({} tuples of {:?})", store.num_tuples, store.layout.types()),
            BufferState::Destroyed => write!(f, "Buffer(destroyed)"),
        }
    }
}
