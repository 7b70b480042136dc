pub mod data_types;
pub mod execution;
pub mod expression;
pub mod operators;
pub mod planning;
pub mod runtime;
