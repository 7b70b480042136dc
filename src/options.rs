/// Knobs fixed when a plan is compiled.
#[derive(Clone, Debug)]
pub struct Options {
    /// Number of rows per batch produced by scans and per chunk of hash table iteration.
    pub batch_size: usize,
    /// Forces prefetching in hash group-by on or off. `None` decides per operator from the estimated table size.
    pub use_prefetch: Option<bool>,
    /// Upper bound on the runtime memory of one query execution.
    pub memory_limit: Option<usize>,
    /// Lower bound on the number of entries hash tables are sized for.
    pub initial_hash_table_capacity: usize,
    /// Number of threads used by the CLI to execute a compiled query concurrently.
    pub threads: usize,
}

impl Default for Options {
    fn default() -> Options {
        Options {
            batch_size: 1024,
            use_prefetch: None,
            memory_limit: None,
            initial_hash_table_capacity: 16,
            threads: num_cpus::get(),
        }
    }
}

impl Options {
    pub fn with_batch_size(mut self, batch_size: usize) -> Options {
        self.batch_size = batch_size.max(1);
        self
    }

    pub fn with_prefetch(mut self, use_prefetch: Option<bool>) -> Options {
        self.use_prefetch = use_prefetch;
        self
    }

    pub fn with_memory_limit(mut self, memory_limit: Option<usize>) -> Options {
        self.memory_limit = memory_limit;
        self
    }

    pub fn with_initial_hash_table_capacity(mut self, capacity: usize) -> Options {
        self.initial_hash_table_capacity = capacity;
        self
    }

    pub fn with_threads(mut self, threads: usize) -> Options {
        self.threads = threads.max(1);
        self
    }
}
