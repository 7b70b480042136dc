use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crate::QueryError;

const ORDERING: Ordering = Ordering::SeqCst;

/// Accounts for the memory held by one query's runtime structures.
/// Allocation only fails once the optional limit would be exceeded.
#[derive(Debug, Default)]
pub struct MemoryPool {
    limit: Option<usize>,
    allocated: AtomicUsize,
    peak: AtomicUsize,
}

impl MemoryPool {
    pub fn new(limit: Option<usize>) -> MemoryPool {
        MemoryPool {
            limit,
            allocated: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
        }
    }

    pub fn unbounded() -> Arc<MemoryPool> {
        Arc::new(MemoryPool::new(None))
    }

    pub fn allocate(&self, bytes: usize) -> Result<(), QueryError> {
        let mut current = self.allocated.load(ORDERING);
        loop {
            let next = current.saturating_add(bytes);
            if let Some(limit) = self.limit {
                if next > limit {
                    return Err(QueryError::PoolExhausted { requested: bytes, limit });
                }
            }
            match self.allocated.compare_exchange(current, next, ORDERING, ORDERING) {
                Ok(_) => {
                    self.peak.fetch_max(next, ORDERING);
                    return Ok(());
                }
                Err(actual) => current = actual,
            }
        }
    }

    pub fn free(&self, bytes: usize) {
        let _ = self.allocated.fetch_update(ORDERING, ORDERING, |current| Some(current.saturating_sub(bytes)));
    }

    pub fn allocated(&self) -> usize {
        self.allocated.load(ORDERING)
    }

    pub fn peak(&self) -> usize {
        self.peak.load(ORDERING)
    }

    pub fn limit(&self) -> Option<usize> {
        self.limit
    }
}

/// Arena for variable length values referenced from fixed-size storage by handle.
#[derive(Debug, Default)]
pub struct VarlenPool {
    strings: Vec<Box<str>>,
    bytes: usize,
    memory: Option<Arc<MemoryPool>>,
}

impl VarlenPool {
    pub fn new() -> VarlenPool {
        VarlenPool::default()
    }

    /// Pool whose allocations are charged to `memory`.
    pub fn charged_to(memory: Arc<MemoryPool>) -> VarlenPool {
        VarlenPool {
            strings: Vec::new(),
            bytes: 0,
            memory: Some(memory),
        }
    }

    pub fn add(&mut self, s: &str) -> Result<u64, QueryError> {
        if let Some(ref memory) = self.memory {
            memory.allocate(s.len())?;
        }
        self.bytes += s.len();
        self.strings.push(s.into());
        Ok(self.strings.len() as u64 - 1)
    }

    pub fn get(&self, handle: u64) -> Result<&str, QueryError> {
        self.strings
            .get(handle as usize)
            .map(|s| s.as_ref())
            .ok_or_else(|| fatal!("Invalid varlen handle {} (pool holds {} values)", handle, self.strings.len()))
    }

    pub fn heap_size(&self) -> usize {
        self.bytes
    }

    pub fn clear(&mut self) {
        if let Some(ref memory) = self.memory {
            memory.free(self.bytes);
        }
        self.strings.clear();
        self.bytes = 0;
    }
}

impl Drop for VarlenPool {
    fn drop(&mut self) {
        self.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_limit_enforced() {
        let pool = MemoryPool::new(Some(100));
        pool.allocate(60).unwrap();
        match pool.allocate(50) {
            Err(QueryError::PoolExhausted { requested, limit }) => {
                assert_eq!(requested, 50);
                assert_eq!(limit, 100);
            }
            other => panic!("expected exhaustion, got {:?}", other),
        }
        assert_eq!(pool.allocated(), 60);
        pool.free(60);
        pool.allocate(100).unwrap();
        assert_eq!(pool.peak(), 100);
    }

    #[test]
    fn test_varlen_pool_charges_memory() {
        let memory = Arc::new(MemoryPool::new(Some(8)));
        {
            let mut varlen = VarlenPool::charged_to(memory.clone());
            let handle = varlen.add("abcde").unwrap();
            assert_eq!(varlen.get(handle).unwrap(), "abcde");
            assert!(varlen.add("fghij").is_err());
            assert_eq!(memory.allocated(), 5);
        }
        assert_eq!(memory.allocated(), 0);
    }
}
