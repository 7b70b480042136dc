mod builder;
mod expression;
mod plan;

pub use self::builder::PlanBuilder;
pub use self::expression::*;
pub use self::plan::*;
