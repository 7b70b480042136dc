use std::fmt;

use ordered_float::OrderedFloat;
use serde::{Deserialize, Serialize};

/// Untyped value used at the boundary of the engine: rows loaded into tables and rows returned from queries.
#[derive(Debug, PartialEq, Eq, PartialOrd, Ord, Clone, Hash, Serialize, Deserialize)]
pub enum RawVal {
    Bool(bool),
    Int(i64),
    Float(OrderedFloat<f64>),
    Str(String),
    Null,
}

impl RawVal {
    pub fn is_null(&self) -> bool {
        *self == RawVal::Null
    }
}

impl fmt::Display for RawVal {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            RawVal::Null => write!(f, "null"),
            RawVal::Bool(b) => write!(f, "{}", b),
            RawVal::Int(i) => write!(f, "{}", i),
            RawVal::Str(ref s) => write!(f, "\"{}\"", s),
            RawVal::Float(x) => write!(f, "{}", x),
        }
    }
}

pub mod syntax {
    pub use super::RawVal::{Bool, Int, Null};

    #[allow(non_snake_case)]
    pub fn Str(s: &str) -> super::RawVal {
        super::RawVal::Str(s.to_string())
    }

    #[allow(non_snake_case)]
    pub fn Float(f: f64) -> super::RawVal {
        super::RawVal::from(f)
    }
}

impl From<f64> for RawVal {
    fn from(val: f64) -> Self {
        RawVal::Float(OrderedFloat(val))
    }
}

impl From<String> for RawVal {
    fn from(val: String) -> Self {
        RawVal::Str(val)
    }
}

impl From<()> for RawVal {
    fn from(_: ()) -> Self {
        RawVal::Null
    }
}

impl From<bool> for RawVal {
    fn from(val: bool) -> Self {
        RawVal::Bool(val)
    }
}

impl<T: Into<RawVal>> From<Option<T>> for RawVal {
    fn from(val: Option<T>) -> Self {
        match val {
            Some(val) => val.into(),
            None => RawVal::Null,
        }
    }
}

impl<'a> From<&'a str> for RawVal {
    fn from(val: &str) -> RawVal {
        RawVal::Str(val.to_string())
    }
}

impl From<i64> for RawVal {
    fn from(val: i64) -> RawVal {
        RawVal::Int(val)
    }
}

impl From<i32> for RawVal {
    fn from(val: i32) -> RawVal {
        RawVal::Int(val as i64)
    }
}
