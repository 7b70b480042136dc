use std::any::Any;
use std::cell::{Ref, RefCell, RefMut};
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

use crate::engine::runtime::MemoryPool;
use crate::observability::QueryCounters;
use crate::QueryError;

/// Typed handle to a slot of the per-query state, stable from compilation onwards.
pub struct Id<T> {
    index: usize,
    name: &'static str,
    t: PhantomData<fn() -> T>,
}

impl<T> Clone for Id<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for Id<T> {}

impl<T> fmt::Debug for Id<T> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self)
    }
}

impl<T> fmt::Display for Id<T> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}_{}", self.name, self.index)
    }
}

/// Slots registered by translators while a plan is compiled.
#[derive(Debug, Default, Clone)]
pub struct QueryStateLayout {
    slots: Vec<&'static str>,
}

impl QueryStateLayout {
    pub fn register<T: 'static>(&mut self, name: &'static str) -> Id<T> {
        self.slots.push(name);
        Id { index: self.slots.len() - 1, name, t: PhantomData }
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn names(&self) -> &[&'static str] {
        &self.slots
    }
}

/// Mutable state of one query execution. Every slot starts out empty, is filled by the operator owning it
/// during initialization and emptied again on teardown.
pub struct QueryState {
    slots: Vec<RefCell<Option<Box<dyn Any>>>>,
    names: Vec<&'static str>,
    memory: Arc<MemoryPool>,
    counters: QueryCounters,
}

impl QueryState {
    pub fn new(layout: &QueryStateLayout, memory: Arc<MemoryPool>) -> QueryState {
        QueryState {
            slots: layout.slots.iter().map(|_| RefCell::new(None)).collect(),
            names: layout.slots.clone(),
            memory,
            counters: QueryCounters::new(),
        }
    }

    pub fn memory(&self) -> &Arc<MemoryPool> {
        &self.memory
    }

    pub fn counters(&self) -> &QueryCounters {
        &self.counters
    }

    pub fn init<T: 'static>(&self, id: Id<T>, value: T) -> Result<(), QueryError> {
        let mut slot = self.slot(id)?.try_borrow_mut().map_err(|_| fatal!("State slot {} is in use", id))?;
        ensure!(slot.is_none(), "State slot {} initialized twice", id);
        *slot = Some(Box::new(value));
        Ok(())
    }

    pub fn is_initialized<T: 'static>(&self, id: Id<T>) -> bool {
        self.slot(id)
            .ok()
            .and_then(|cell| cell.try_borrow().ok().map(|slot| slot.is_some()))
            .unwrap_or(false)
    }

    pub fn get<T: 'static>(&self, id: Id<T>) -> Result<Ref<T>, QueryError> {
        let slot = self.slot(id)?.try_borrow().map_err(|_| fatal!("State slot {} is borrowed mutably", id))?;
        Ref::filter_map(slot, |s| s.as_ref().and_then(|b| b.downcast_ref::<T>()))
            .map_err(|_| fatal!("State slot {} is not initialized", id))
    }

    pub fn get_mut<T: 'static>(&self, id: Id<T>) -> Result<RefMut<T>, QueryError> {
        let slot = self.slot(id)?.try_borrow_mut().map_err(|_| fatal!("State slot {} is in use", id))?;
        RefMut::filter_map(slot, |s| s.as_mut().and_then(|b| b.downcast_mut::<T>()))
            .map_err(|_| fatal!("State slot {} is not initialized", id))
    }

    /// Removes the value from its slot, returning `None` if it was never initialized.
    pub fn take<T: 'static>(&self, id: Id<T>) -> Result<Option<T>, QueryError> {
        let mut slot = self.slot(id)?.try_borrow_mut().map_err(|_| fatal!("State slot {} is in use", id))?;
        match slot.take() {
            Some(value) => value
                .downcast::<T>()
                .map(|b| Some(*b))
                .map_err(|_| fatal!("State slot {} holds a value of another type", id)),
            None => Ok(None),
        }
    }

    fn slot<T>(&self, id: Id<T>) -> Result<&RefCell<Option<Box<dyn Any>>>, QueryError> {
        match self.slots.get(id.index) {
            Some(slot) if self.names[id.index] == id.name => Ok(slot),
            _ => Err(fatal!("State slot {} does not belong to this query", id)),
        }
    }
}

impl fmt::Debug for QueryState {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let live = self.slots.iter().filter(|s| s.try_borrow().map(|s| s.is_some()).unwrap_or(true)).count();
        write!(f, "QueryState {{ slots: {}, live: {}, memory: {} }}", self.slots.len(), live, self.memory.allocated())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slot_lifecycle() {
        let mut layout = QueryStateLayout::default();
        let counts = layout.register::<Vec<u64>>("counts");
        let name = layout.register::<String>("name");
        let state = QueryState::new(&layout, MemoryPool::unbounded());

        assert!(matches!(state.get(counts), Err(QueryError::FatalError(_))));
        state.init(counts, vec![1, 2]).unwrap();
        assert!(state.init(counts, vec![]).is_err());
        state.get_mut(counts).unwrap().push(3);
        assert_eq!(*state.get(counts).unwrap(), vec![1, 2, 3]);
        {
            let _borrowed = state.get(counts).unwrap();
            assert!(state.get_mut(counts).is_err());
        }
        assert!(!state.is_initialized(name));
        assert_eq!(state.take(counts).unwrap(), Some(vec![1, 2, 3]));
        assert_eq!(state.take(counts).unwrap(), None);
    }
}
