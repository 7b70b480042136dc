use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use byteorder::{ByteOrder, LittleEndian};
use seahash::SeaHasher;

use crate::engine::data_types::{SqlType, Value};
use crate::engine::runtime::prefetch::prefetch_read;
use crate::engine::runtime::{CompactStorage, MemoryPool, VarlenPool};
use crate::observability::metrics;
use crate::QueryError;

const EMPTY: u8 = 0;
const OCCUPIED: u8 = 1;
const REMOVED: u8 = 2;

/// Status byte, padding and the cached 64 bit hash.
const HEADER_SIZE: usize = 16;
const HASH_OFFSET: usize = 8;

pub const LOAD_FACTOR: f64 = 0.7;
pub const MIN_CAPACITY: usize = 16;

/// Invoked with the payload of the entry matching a probed key.
pub trait ProbeCallback {
    fn process_entry(&self, payload: &mut [u8], pool: &mut VarlenPool) -> Result<(), QueryError>;
}

/// Initializes the payload of a freshly allocated entry.
pub trait InsertCallback {
    fn store_value(&self, payload: &mut [u8], pool: &mut VarlenPool) -> Result<(), QueryError>;
    fn value_size(&self) -> usize;
}

/// Receives the live slots of one chunk of the backing storage.
pub trait VectorizedIterateCallback {
    fn process_entries(&self, access: &HashTableAccess, selection: &[u32]) -> Result<(), QueryError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeResult {
    Hit,
    Inserted,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HashTableStats {
    pub resizes: u64,
    pub probes: u64,
}

enum Probe {
    Found(usize),
    Vacant(usize),
}

/// Open addressing hash table mapping typed key tuples to fixed-size opaque payloads.
///
/// Every slot holds a header (status, cached hash), the key in `CompactStorage` layout and the payload.
/// Collisions are resolved by triangular probing, which visits every slot of a power-of-two table
/// exactly once before repeating. Removal leaves a tombstone so probe chains stay intact.
pub struct OAHashTable {
    keys: CompactStorage,
    value_size: usize,
    entry_size: usize,
    capacity: usize,
    mask: usize,
    num_entries: usize,
    num_removed: usize,
    entries: Vec<u8>,
    pool: VarlenPool,
    memory: Arc<MemoryPool>,
    stats: HashTableStats,
}

impl OAHashTable {
    pub fn new(key_types: &[SqlType],
               value_size: usize,
               estimated_entries: usize,
               memory: Arc<MemoryPool>) -> Result<OAHashTable, QueryError> {
        let keys = CompactStorage::setup(key_types);
        let entry_size = HEADER_SIZE + keys.storage_size() + value_size;
        let capacity = OAHashTable::capacity_for(estimated_entries);
        memory.allocate(capacity * entry_size)?;
        Ok(OAHashTable {
            keys,
            value_size,
            entry_size,
            capacity,
            mask: capacity - 1,
            num_entries: 0,
            num_removed: 0,
            entries: vec![0; capacity * entry_size],
            pool: VarlenPool::charged_to(memory.clone()),
            memory,
            stats: HashTableStats::default(),
        })
    }

    /// Smallest power-of-two capacity that holds `entries` without exceeding the load factor.
    pub fn capacity_for(entries: usize) -> usize {
        let required = (entries as f64 / LOAD_FACTOR).ceil() as usize + 1;
        required.next_power_of_two().max(MIN_CAPACITY)
    }

    /// Bytes of backing storage allocated by a table pre-sized for `entries` entries.
    pub fn estimated_bytes(key_types: &[SqlType], value_size: usize, entries: usize) -> usize {
        let entry_size = HEADER_SIZE + CompactStorage::setup(key_types).storage_size() + value_size;
        OAHashTable::capacity_for(entries) * entry_size
    }

    pub fn hash_keys(keys: &[Value]) -> u64 {
        let mut hasher = SeaHasher::new();
        keys.hash(&mut hasher);
        hasher.finish()
    }

    pub fn num_entries(&self) -> usize {
        self.num_entries
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn value_size(&self) -> usize {
        self.value_size
    }

    /// Bytes per slot including header and key.
    pub fn entry_size(&self) -> usize {
        self.entry_size
    }

    pub fn stats(&self) -> HashTableStats {
        self.stats
    }

    pub fn key_types(&self) -> &[SqlType] {
        self.keys.types()
    }

    /// Calls `on_hit` with the payload of the entry matching `keys`, or allocates a new entry and initializes
    /// it with `on_miss`. May grow the table, which is only fatal if the memory pool is exhausted.
    pub fn probe_or_insert<P, I>(&mut self,
                                 hash: u64,
                                 keys: &[Value],
                                 on_hit: &P,
                                 on_miss: &I) -> Result<ProbeResult, QueryError>
        where P: ProbeCallback, I: InsertCallback {
        self.keys.check_values(keys)?;
        self.stats.probes += 1;
        if let Probe::Found(slot) = self.probe(hash, keys)? {
            let (payload, pool) = self.payload_mut(slot);
            on_hit.process_entry(payload, pool)?;
            return Ok(ProbeResult::Hit);
        }

        ensure!(on_miss.value_size() == self.value_size,
                "Insert callback writes {} bytes into payload of {} bytes", on_miss.value_size(), self.value_size);
        if (self.num_entries + self.num_removed + 1) as f64 > self.capacity as f64 * LOAD_FACTOR {
            let new_capacity = if (self.num_entries + 1) as f64 > self.capacity as f64 * LOAD_FACTOR {
                self.capacity * 2
            } else {
                self.capacity
            };
            self.rehash(new_capacity)?;
        }
        let slot = match self.probe(hash, keys)? {
            Probe::Vacant(slot) => slot,
            Probe::Found(slot) => return Err(fatal!("Key reappeared in slot {} after rehash", slot)),
        };

        let key_size = self.keys.storage_size();
        let start = slot * self.entry_size;
        let entry = &mut self.entries[start..start + self.entry_size];
        self.keys.store_values(&mut entry[HEADER_SIZE..HEADER_SIZE + key_size], keys, &mut self.pool)?;
        on_miss.store_value(&mut entry[HEADER_SIZE + key_size..], &mut self.pool)?;
        LittleEndian::write_u64(&mut entry[HASH_OFFSET..HEADER_SIZE], hash);
        if entry[0] == REMOVED {
            self.num_removed -= 1;
        }
        entry[0] = OCCUPIED;
        self.num_entries += 1;
        Ok(ProbeResult::Inserted)
    }

    /// Payload of the entry matching `keys`.
    pub fn lookup(&self, hash: u64, keys: &[Value]) -> Result<Option<&[u8]>, QueryError> {
        Ok(match self.probe(hash, keys)? {
            Probe::Found(slot) => Some(self.payload(slot)),
            Probe::Vacant(_) => None,
        })
    }

    /// Removes the entry matching `keys`, leaving a tombstone in its slot.
    pub fn remove(&mut self, hash: u64, keys: &[Value]) -> Result<bool, QueryError> {
        match self.probe(hash, keys)? {
            Probe::Found(slot) => {
                self.entries[slot * self.entry_size] = REMOVED;
                self.num_entries -= 1;
                self.num_removed += 1;
                Ok(true)
            }
            Probe::Vacant(_) => Ok(false),
        }
    }

    /// Hints the CPU to load the home slot of `hash`.
    pub fn prefetch(&self, hash: u64) {
        let start = (hash as usize & self.mask) * self.entry_size;
        prefetch_read(&self.entries[start..start + self.entry_size]);
    }

    /// Walks the backing storage in chunks of `chunk_size` slots and passes the live slots of every
    /// non-empty chunk to `callback`.
    pub fn vectorized_iterate<C: VectorizedIterateCallback>(&self, chunk_size: usize, callback: &C) -> Result<(), QueryError> {
        ensure!(chunk_size > 0, "vectorized_iterate called with chunk size 0");
        let access = HashTableAccess { table: self };
        let mut selection = Vec::with_capacity(chunk_size);
        let mut start = 0;
        while start < self.capacity {
            let end = (start + chunk_size).min(self.capacity);
            selection.clear();
            for slot in start..end {
                if self.status(slot) == OCCUPIED {
                    selection.push(slot as u32);
                }
            }
            if !selection.is_empty() {
                callback.process_entries(&access, &selection)?;
            }
            start = end;
        }
        Ok(())
    }

    fn probe(&self, hash: u64, keys: &[Value]) -> Result<Probe, QueryError> {
        let mut slot = hash as usize & self.mask;
        let mut first_removed = None;
        for i in 0..self.capacity {
            match self.status(slot) {
                EMPTY => return Ok(Probe::Vacant(first_removed.unwrap_or(slot))),
                REMOVED => {
                    if first_removed.is_none() {
                        first_removed = Some(slot);
                    }
                }
                _ => if self.stored_hash(slot) == hash && self.keys_equal(slot, keys)? {
                    return Ok(Probe::Found(slot));
                }
            }
            slot = (slot + i + 1) & self.mask;
        }
        first_removed
            .map(Probe::Vacant)
            .ok_or_else(|| fatal!("Probe sequence exhausted in full table of capacity {}", self.capacity))
    }

    fn rehash(&mut self, new_capacity: usize) -> Result<(), QueryError> {
        let new_bytes = new_capacity * self.entry_size;
        self.memory.allocate(new_bytes)?;
        let mut entries = vec![0u8; new_bytes];
        let new_mask = new_capacity - 1;
        for old_slot in 0..self.capacity {
            if self.status(old_slot) != OCCUPIED {
                continue;
            }
            let mut slot = self.stored_hash(old_slot) as usize & new_mask;
            let mut i = 0;
            while entries[slot * self.entry_size] != EMPTY {
                i += 1;
                slot = (slot + i) & new_mask;
            }
            let src = old_slot * self.entry_size;
            let dst = slot * self.entry_size;
            entries[dst..dst + self.entry_size].copy_from_slice(&self.entries[src..src + self.entry_size]);
        }
        let old_bytes = self.entries.len();
        self.entries = entries;
        self.memory.free(old_bytes);
        log::debug!("Rehashed hash table with {} entries from {} to {} slots ({} tombstones dropped)",
                    self.num_entries, self.capacity, new_capacity, self.num_removed);
        self.capacity = new_capacity;
        self.mask = new_mask;
        self.num_removed = 0;
        self.stats.resizes += 1;
        metrics::HASH_TABLE_RESIZE_COUNT.inc();
        Ok(())
    }

    fn status(&self, slot: usize) -> u8 {
        self.entries[slot * self.entry_size]
    }

    fn stored_hash(&self, slot: usize) -> u64 {
        let start = slot * self.entry_size;
        LittleEndian::read_u64(&self.entries[start + HASH_OFFSET..start + HEADER_SIZE])
    }

    fn key_bytes(&self, slot: usize) -> &[u8] {
        let start = slot * self.entry_size + HEADER_SIZE;
        &self.entries[start..start + self.keys.storage_size()]
    }

    fn keys_equal(&self, slot: usize, keys: &[Value]) -> Result<bool, QueryError> {
        let stored = self.key_bytes(slot);
        for (i, key) in keys.iter().enumerate() {
            if !self.keys.value_equals(stored, i, key, &self.pool)? {
                return Ok(false);
            }
        }
        Ok(true)
    }

    fn payload(&self, slot: usize) -> &[u8] {
        let start = slot * self.entry_size + HEADER_SIZE + self.keys.storage_size();
        &self.entries[start..start + self.value_size]
    }

    fn payload_mut(&mut self, slot: usize) -> (&mut [u8], &mut VarlenPool) {
        let start = slot * self.entry_size + HEADER_SIZE + self.keys.storage_size();
        (&mut self.entries[start..start + self.value_size], &mut self.pool)
    }
}

impl Drop for OAHashTable {
    fn drop(&mut self) {
        self.memory.free(self.entries.len());
    }
}

impl fmt::Debug for OAHashTable {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "OAHashTable {{ entries: {}, capacity: {}, entry_size: {}, tombstones: {} }}",
               self.num_entries, self.capacity, self.entry_size, self.num_removed)
    }
}

/// Read access to the live slots handed out by `vectorized_iterate`.
pub struct HashTableAccess<'a> {
    table: &'a OAHashTable,
}

impl<'a> HashTableAccess<'a> {
    pub fn key(&self, slot: u32, index: usize) -> Result<Value, QueryError> {
        self.table.keys.load_value(self.table.key_bytes(slot as usize), index, &self.table.pool)
    }

    pub fn keys(&self, slot: u32) -> Result<Vec<Value>, QueryError> {
        self.table.keys.load_values(self.table.key_bytes(slot as usize), &self.table.pool)
    }

    pub fn payload(&self, slot: u32) -> &'a [u8] {
        self.table.payload(slot as usize)
    }

    pub fn pool(&self) -> &'a VarlenPool {
        &self.table.pool
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;

    use fnv::FnvHashMap;

    use super::*;

    struct Increment;

    impl ProbeCallback for Increment {
        fn process_entry(&self, payload: &mut [u8], _: &mut VarlenPool) -> Result<(), QueryError> {
            let count = LittleEndian::read_u64(payload);
            LittleEndian::write_u64(payload, count + 1);
            Ok(())
        }
    }

    struct Store(u64);

    impl InsertCallback for Store {
        fn store_value(&self, payload: &mut [u8], _: &mut VarlenPool) -> Result<(), QueryError> {
            LittleEndian::write_u64(payload, self.0);
            Ok(())
        }

        fn value_size(&self) -> usize {
            8
        }
    }

    struct Collect(RefCell<Vec<(Vec<Value>, u64)>>);

    impl VectorizedIterateCallback for Collect {
        fn process_entries(&self, access: &HashTableAccess, selection: &[u32]) -> Result<(), QueryError> {
            for &slot in selection {
                self.0.borrow_mut().push((access.keys(slot)?, LittleEndian::read_u64(access.payload(slot))));
            }
            Ok(())
        }
    }

    fn key(i: i64) -> Vec<Value> {
        vec![Value::bigint(i), Value::varchar(format!("key-{}", i % 7))]
    }

    fn insert(table: &mut OAHashTable, keys: &[Value], value: u64) -> ProbeResult {
        table.probe_or_insert(OAHashTable::hash_keys(keys), keys, &Increment, &Store(value)).unwrap()
    }

    fn table(estimated: usize) -> OAHashTable {
        OAHashTable::new(&[SqlType::BigInt, SqlType::Varchar], 8, estimated, MemoryPool::unbounded()).unwrap()
    }

    #[test]
    fn test_capacity_power_of_two() {
        assert_eq!(OAHashTable::capacity_for(0), MIN_CAPACITY);
        assert_eq!(OAHashTable::capacity_for(100), 256);
        assert!(OAHashTable::capacity_for(1000).is_power_of_two());
    }

    #[test]
    fn test_probe_hits_existing_entry() {
        let mut table = table(4);
        assert_eq!(insert(&mut table, &key(1), 10), ProbeResult::Inserted);
        assert_eq!(insert(&mut table, &key(1), 10), ProbeResult::Hit);
        assert_eq!(insert(&mut table, &key(2), 20), ProbeResult::Inserted);
        let k = key(1);
        let payload = table.lookup(OAHashTable::hash_keys(&k), &k).unwrap().unwrap();
        assert_eq!(LittleEndian::read_u64(payload), 11);
        assert_eq!(table.num_entries(), 2);
    }

    #[test]
    fn test_resize_keeps_all_entries() {
        let mut table = table(8);
        let initial_capacity = table.capacity();
        for i in 0..5000 {
            insert(&mut table, &key(i), i as u64);
        }
        assert!(table.capacity() > initial_capacity);
        assert!(table.stats().resizes > 0);
        assert_eq!(table.num_entries(), 5000);
        assert!(table.num_entries() as f64 <= table.capacity() as f64 * LOAD_FACTOR);
        for i in 0..5000 {
            let k = key(i);
            let payload = table.lookup(OAHashTable::hash_keys(&k), &k).unwrap();
            assert_eq!(payload.map(LittleEndian::read_u64), Some(i as u64));
        }
    }

    #[test]
    fn test_iterate_visits_each_key_once() {
        let mut table = table(2);
        for i in 0..777 {
            insert(&mut table, &key(i), 0);
            insert(&mut table, &key(i), 0);
        }
        for chunk_size in [1, 13, 1024] {
            let collect = Collect(RefCell::new(vec![]));
            table.vectorized_iterate(chunk_size, &collect).unwrap();
            let mut counts = FnvHashMap::default();
            for (k, payload) in collect.0.into_inner() {
                assert_eq!(payload, 1);
                *counts.entry(k[0].as_i64().unwrap()).or_insert(0) += 1;
            }
            assert_eq!(counts.len(), 777);
            assert!(counts.values().all(|&c| c == 1));
        }
    }

    #[test]
    fn test_remove_leaves_reachable_chain() {
        let mut table = table(64);
        let keys = (0..40).map(key).collect::<Vec<_>>();
        for (i, k) in keys.iter().enumerate() {
            insert(&mut table, k, i as u64);
        }
        for k in keys.iter().step_by(2) {
            assert!(table.remove(OAHashTable::hash_keys(k), k).unwrap());
        }
        assert!(!table.remove(OAHashTable::hash_keys(&keys[0]), &keys[0]).unwrap());
        assert_eq!(table.num_entries(), 20);
        for (i, k) in keys.iter().enumerate() {
            let found = table.lookup(OAHashTable::hash_keys(k), k).unwrap().map(LittleEndian::read_u64);
            assert_eq!(found, if i % 2 == 0 { None } else { Some(i as u64) });
        }
        assert_eq!(insert(&mut table, &keys[0], 99), ProbeResult::Inserted);
        assert_eq!(table.num_entries(), 21);
    }

    #[test]
    fn test_pool_exhaustion_leaves_table_intact() {
        let memory = Arc::new(MemoryPool::new(Some(4096)));
        let mut table = OAHashTable::new(&[SqlType::BigInt], 8, 0, memory.clone()).unwrap();
        let mut inserted = 0;
        let error = loop {
            let k = [Value::bigint(inserted)];
            match table.probe_or_insert(OAHashTable::hash_keys(&k), &k, &Increment, &Store(7)) {
                Ok(_) => inserted += 1,
                Err(err) => break err,
            }
        };
        assert!(matches!(error, QueryError::PoolExhausted { limit: 4096, .. }));
        assert_eq!(table.num_entries(), inserted as usize);
        for i in 0..inserted {
            let k = [Value::bigint(i)];
            assert!(table.lookup(OAHashTable::hash_keys(&k), &k).unwrap().is_some());
        }
        drop(table);
        assert_eq!(memory.allocated(), 0);
    }

    #[test]
    fn test_mismatching_key_rejected() {
        let mut table = table(4);
        let k = [Value::bigint(1)];
        let result = table.probe_or_insert(OAHashTable::hash_keys(&k), &k, &Increment, &Store(0));
        assert!(matches!(result, Err(QueryError::SchemaMismatch(_))));
        assert_eq!(table.num_entries(), 0);
    }
}
