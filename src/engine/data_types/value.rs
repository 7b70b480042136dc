use std::cmp::Ordering;
use std::fmt;

use ordered_float::OrderedFloat;

use crate::engine::data_types::SqlType;
use crate::ingest::raw_val::RawVal;
use crate::QueryError;

/// Payload of a `Value`. All integral types share the `Int` representation, the declared width is
/// carried by the value's `SqlType`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Datum {
    Boolean(bool),
    Int(i64),
    Decimal(OrderedFloat<f64>),
    Varchar(String),
}

/// A single scalar result: semantic type, payload and null indicator.
/// Null values always carry the default payload of their type so that equality and hashing
/// treat all nulls of one type alike.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Value {
    sql_type: SqlType,
    datum: Datum,
    null: bool,
}

impl Value {
    pub fn null(sql_type: SqlType) -> Value {
        let datum = match sql_type {
            SqlType::Boolean => Datum::Boolean(false),
            SqlType::Decimal => Datum::Decimal(OrderedFloat(0.0)),
            SqlType::Varchar => Datum::Varchar(String::new()),
            _ => Datum::Int(0),
        };
        Value { sql_type, datum, null: true }
    }

    pub fn boolean(b: bool) -> Value {
        Value { sql_type: SqlType::Boolean, datum: Datum::Boolean(b), null: false }
    }

    /// Integral value of the given type, failing if `i` does not fit.
    pub fn int(sql_type: SqlType, i: i64) -> Result<Value, QueryError> {
        match (sql_type.min_int(), sql_type.max_int()) {
            (Some(min), Some(max)) => {
                if i < min || i > max {
                    return Err(QueryError::Overflow);
                }
                Ok(Value { sql_type, datum: Datum::Int(i), null: false })
            }
            _ => Err(fatal!("Value::int called with non-integral type {}", sql_type)),
        }
    }

    pub fn bigint(i: i64) -> Value {
        Value { sql_type: SqlType::BigInt, datum: Datum::Int(i), null: false }
    }

    pub fn integer(i: i32) -> Value {
        Value { sql_type: SqlType::Integer, datum: Datum::Int(i as i64), null: false }
    }

    pub fn decimal(f: f64) -> Value {
        Value { sql_type: SqlType::Decimal, datum: Datum::Decimal(OrderedFloat(f)), null: false }
    }

    pub fn varchar<S: Into<String>>(s: S) -> Value {
        Value { sql_type: SqlType::Varchar, datum: Datum::Varchar(s.into()), null: false }
    }

    pub fn sql_type(&self) -> SqlType {
        self.sql_type
    }

    pub fn is_null(&self) -> bool {
        self.null
    }

    pub fn datum(&self) -> &Datum {
        &self.datum
    }

    pub fn as_i64(&self) -> Result<i64, QueryError> {
        match self.datum {
            Datum::Int(i) => Ok(i),
            Datum::Boolean(b) => Ok(b as i64),
            _ => Err(fatal!("{} value read as integer", self.sql_type)),
        }
    }

    pub fn as_f64(&self) -> Result<f64, QueryError> {
        match self.datum {
            Datum::Int(i) => Ok(i as f64),
            Datum::Decimal(f) => Ok(f.0),
            _ => Err(fatal!("{} value read as decimal", self.sql_type)),
        }
    }

    pub fn as_bool(&self) -> Result<bool, QueryError> {
        match self.datum {
            Datum::Boolean(b) => Ok(b),
            _ => Err(fatal!("{} value read as boolean", self.sql_type)),
        }
    }

    pub fn as_str(&self) -> Result<&str, QueryError> {
        match self.datum {
            Datum::Varchar(ref s) => Ok(s),
            _ => Err(fatal!("{} value read as varchar", self.sql_type)),
        }
    }

    /// Three-valued truth: `None` if null.
    pub fn truth(&self) -> Result<Option<bool>, QueryError> {
        if self.null {
            Ok(None)
        } else {
            self.as_bool().map(Some)
        }
    }

    /// Orders two non-null values of comparable types. Integral and decimal operands are compared
    /// after promotion.
    pub fn compare(&self, other: &Value) -> Result<Ordering, QueryError> {
        ensure!(!self.null && !other.null, "compare called on null value");
        match (&self.datum, &other.datum) {
            (Datum::Int(l), Datum::Int(r)) => Ok(l.cmp(r)),
            (Datum::Boolean(l), Datum::Boolean(r)) => Ok(l.cmp(r)),
            (Datum::Varchar(l), Datum::Varchar(r)) => Ok(l.as_str().cmp(r.as_str())),
            (Datum::Decimal(_), _) | (_, Datum::Decimal(_))
            if self.sql_type.is_numeric() && other.sql_type.is_numeric() => {
                Ok(OrderedFloat(self.as_f64()?).cmp(&OrderedFloat(other.as_f64()?)))
            }
            _ => Err(QueryError::TypeError(format!("cannot compare {} with {}", self.sql_type, other.sql_type))),
        }
    }

    /// Converts to the given type. Only numeric widening/narrowing is supported.
    pub fn cast(&self, target: SqlType) -> Result<Value, QueryError> {
        if self.sql_type == target {
            return Ok(self.clone());
        }
        if self.null {
            return Ok(Value::null(target));
        }
        match target {
            SqlType::Decimal if self.sql_type.is_numeric() => Ok(Value::decimal(self.as_f64()?)),
            t if t.is_integral() && self.sql_type.is_integral() => Value::int(t, self.as_i64()?),
            t => Err(QueryError::TypeError(format!("cannot cast {} to {}", self.sql_type, t))),
        }
    }

    pub fn to_raw(&self) -> RawVal {
        if self.null {
            return RawVal::Null;
        }
        match self.datum {
            Datum::Boolean(b) => RawVal::Bool(b),
            Datum::Int(i) => RawVal::Int(i),
            Datum::Decimal(f) => RawVal::Float(f),
            Datum::Varchar(ref s) => RawVal::Str(s.clone()),
        }
    }

    pub fn from_raw(raw: &RawVal, sql_type: SqlType) -> Result<Value, QueryError> {
        match (raw, sql_type) {
            (RawVal::Null, t) => Ok(Value::null(t)),
            (RawVal::Bool(b), SqlType::Boolean) => Ok(Value::boolean(*b)),
            (RawVal::Int(i), t) if t.is_integral() => Value::int(t, *i),
            (RawVal::Int(i), SqlType::Decimal) => Ok(Value::decimal(*i as f64)),
            (RawVal::Float(f), SqlType::Decimal) => Ok(Value::decimal(f.0)),
            (RawVal::Str(s), SqlType::Varchar) => Ok(Value::varchar(s.as_str())),
            (raw, t) => Err(QueryError::SchemaMismatch(format!("{} is not a valid {}", raw, t))),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        if self.null {
            return write!(f, "null::{}", self.sql_type);
        }
        match self.datum {
            Datum::Boolean(b) => write!(f, "{}", b),
            Datum::Int(i) => write!(f, "{}::{}", i, self.sql_type),
            Datum::Decimal(x) => write!(f, "{}::{}", x, self.sql_type),
            Datum::Varchar(ref s) => write!(f, "'{}'", s),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_int_range_checked() {
        assert!(Value::int(SqlType::TinyInt, 127).is_ok());
        assert!(matches!(Value::int(SqlType::TinyInt, 128), Err(QueryError::Overflow)));
        assert!(matches!(Value::int(SqlType::SmallInt, -32769), Err(QueryError::Overflow)));
    }

    #[test]
    fn test_nulls_compare_equal() {
        assert_eq!(Value::null(SqlType::Integer), Value::null(SqlType::Integer));
        assert_ne!(Value::null(SqlType::Integer), Value::integer(0));
    }

    #[test]
    fn test_compare_mixed_numeric() {
        assert_eq!(Value::integer(2).compare(&Value::decimal(2.5)).unwrap(), Ordering::Less);
        assert_eq!(Value::bigint(3).compare(&Value::integer(3)).unwrap(), Ordering::Equal);
        assert!(Value::varchar("a").compare(&Value::integer(1)).is_err());
    }

    #[test]
    fn test_raw_round_trip_types() {
        let v = Value::from_raw(&RawVal::Int(5), SqlType::Decimal).unwrap();
        assert_eq!(v.sql_type(), SqlType::Decimal);
        assert_eq!(v.to_raw(), RawVal::from(5.0));
        assert!(Value::from_raw(&RawVal::Str("x".to_string()), SqlType::Integer).is_err());
    }
}
