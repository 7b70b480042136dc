pub mod table;
pub mod tile_group;

pub use self::table::{ColumnSchema, DataTable};
pub use self::tile_group::TileGroup;
