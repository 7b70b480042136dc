mod buffer;
mod compact_storage;
pub mod function_table;
mod inserter;
mod memory_pool;
pub mod numeric_functions;
mod oa_hash_table;
mod prefetch;

pub use self::buffer::Buffer;
pub use self::compact_storage::CompactStorage;
pub use self::function_table::{RuntimeFn, RuntimeFunction};
pub use self::inserter::{Inserter, TupleSlot, TILE_GROUP_SIZE};
pub use self::memory_pool::{MemoryPool, VarlenPool};
pub use self::oa_hash_table::*;
pub use self::prefetch::prefetch_read;
