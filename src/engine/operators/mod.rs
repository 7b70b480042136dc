mod aggregate_terms;
mod global_group_by;
mod hash_group_by;
mod insert;
mod operator_translator;
mod projection;
mod seq_scan;

pub use self::global_group_by::GlobalGroupByTranslator;
pub use self::hash_group_by::*;
pub use self::insert::InsertTranslator;
pub use self::operator_translator::*;
pub use self::projection::ProjectionTranslator;
pub use self::seq_scan::SeqScanTranslator;
