use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

const ORDERING: Ordering = Ordering::SeqCst;

/// Counters updated by the operators of one query execution.
#[derive(Debug, Default)]
pub struct QueryCounters {
    rows_scanned: AtomicU64,
    batches_produced: AtomicU64,
    groups: AtomicU64,
    hash_table_resizes: AtomicU64,
    hash_table_probes: AtomicU64,
    finalizations: AtomicU64,
    rows_affected: AtomicU64,
}

impl QueryCounters {
    pub fn new() -> QueryCounters {
        QueryCounters::default()
    }

    pub fn rows_scanned(&self, rows: u64) {
        self.rows_scanned.fetch_add(rows, ORDERING);
    }

    pub fn batch_produced(&self) {
        self.batches_produced.fetch_add(1, ORDERING);
    }

    pub fn hash_table_built(&self, groups: u64, resizes: u64, probes: u64) {
        self.groups.fetch_add(groups, ORDERING);
        self.hash_table_resizes.fetch_add(resizes, ORDERING);
        self.hash_table_probes.fetch_add(probes, ORDERING);
    }

    pub fn finalized(&self) {
        self.finalizations.fetch_add(1, ORDERING);
    }

    pub fn rows_affected(&self, rows: u64) {
        self.rows_affected.fetch_add(rows, ORDERING);
    }

    pub fn finalizations(&self) -> u64 {
        self.finalizations.load(ORDERING)
    }

    pub fn affected(&self) -> u64 {
        self.rows_affected.load(ORDERING)
    }

    pub fn snapshot(&self, memory_peak_bytes: usize, runtime_ns: u64) -> QueryStats {
        QueryStats {
            rows_scanned: self.rows_scanned.load(ORDERING),
            batches_produced: self.batches_produced.load(ORDERING),
            groups: self.groups.load(ORDERING),
            hash_table_resizes: self.hash_table_resizes.load(ORDERING),
            hash_table_probes: self.hash_table_probes.load(ORDERING),
            finalizations: self.finalizations.load(ORDERING),
            memory_peak_bytes: memory_peak_bytes as u64,
            runtime_ns,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct QueryStats {
    pub rows_scanned: u64,
    pub batches_produced: u64,
    pub groups: u64,
    pub hash_table_resizes: u64,
    pub hash_table_probes: u64,
    pub finalizations: u64,
    pub memory_peak_bytes: u64,
    pub runtime_ns: u64,
}
