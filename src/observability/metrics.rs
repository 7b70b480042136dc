use prometheus::{register_counter, register_gauge};
use prometheus::{Counter, Gauge};

lazy_static! {
    pub static ref QUERY_COMPILED_COUNT: Counter =
        register_counter!("query_compiled_count", "Number of plans compiled").unwrap();
    pub static ref QUERY_COUNT: Counter =
        register_counter!("query_count", "Number of queries executed").unwrap();
    pub static ref QUERY_OK_COUNT: Counter =
        register_counter!("query_ok_count", "Number of queries executed successfully").unwrap();
    pub static ref QUERY_ERROR_COUNT: Counter =
        register_counter!("query_error_count", "Number of queries executed with errors").unwrap();
    pub static ref QUERY_CANCELLED_COUNT: Counter =
        register_counter!("query_cancelled_count", "Number of queries cancelled before completion").unwrap();
    pub static ref ROWS_SCANNED_COUNT: Counter =
        register_counter!("rows_scanned_count", "Number of rows read by table scans").unwrap();
    pub static ref HASH_TABLE_RESIZE_COUNT: Counter =
        register_counter!("hash_table_resize_count", "Number of times a hash table was rehashed").unwrap();
    pub static ref QUERY_MEMORY_PEAK_BYTES: Gauge =
        register_gauge!("query_memory_peak_bytes", "Peak memory pool usage of the last executed query").unwrap();
}
