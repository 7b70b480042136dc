mod attribute;
mod row_batch;
mod types;
mod value;

pub use self::attribute::*;
pub use self::row_batch::*;
pub use self::types::*;
pub use self::value::*;
