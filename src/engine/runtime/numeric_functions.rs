use std::num::IntErrorKind;

use num::Float;

use crate::engine::data_types::{Datum, SqlType, Value};
use crate::QueryError;

fn single_arg<'a>(name: &str, args: &'a [Value]) -> Result<&'a Value, QueryError> {
    match args {
        [arg] => Ok(arg),
        _ => Err(fatal!("{} called with {} arguments", name, args.len())),
    }
}

fn map_decimal<F: Fn(f64) -> f64>(name: &str, args: &[Value], f: F) -> Result<Value, QueryError> {
    let arg = single_arg(name, args)?;
    if arg.is_null() {
        return Ok(arg.clone());
    }
    match *arg.datum() {
        Datum::Int(_) => Ok(arg.clone()),
        Datum::Decimal(x) => Ok(Value::decimal(f(x.0))),
        _ => Err(fatal!("{} called on {}", name, arg.sql_type())),
    }
}

pub fn abs(args: &[Value]) -> Result<Value, QueryError> {
    let arg = single_arg("abs", args)?;
    if arg.is_null() {
        return Ok(arg.clone());
    }
    match *arg.datum() {
        Datum::Int(i) => Value::int(arg.sql_type(), i.checked_abs().ok_or(QueryError::Overflow)?),
        Datum::Decimal(x) => Ok(Value::decimal(x.0.abs())),
        _ => Err(fatal!("abs called on {}", arg.sql_type())),
    }
}

pub fn floor(args: &[Value]) -> Result<Value, QueryError> {
    map_decimal("floor", args, <f64 as Float>::floor)
}

pub fn ceil(args: &[Value]) -> Result<Value, QueryError> {
    map_decimal("ceil", args, <f64 as Float>::ceil)
}

/// Rounds half away from zero.
pub fn round(args: &[Value]) -> Result<Value, QueryError> {
    map_decimal("round", args, <f64 as Float>::round)
}

fn input_str<'a>(name: &str, args: &'a [Value]) -> Result<Option<&'a str>, QueryError> {
    let arg = single_arg(name, args)?;
    if arg.is_null() {
        Ok(None)
    } else {
        Ok(Some(arg.as_str()?.trim()))
    }
}

pub fn input_boolean(args: &[Value]) -> Result<Value, QueryError> {
    let s = match input_str("input_boolean", args)? {
        Some(s) => s,
        None => return Ok(Value::null(SqlType::Boolean)),
    };
    match s.to_lowercase().as_str() {
        "t" | "true" | "y" | "yes" | "on" | "1" => Ok(Value::boolean(true)),
        "f" | "false" | "n" | "no" | "off" | "0" => Ok(Value::boolean(false)),
        _ => bail!(QueryError::ParseError, "invalid input syntax for type boolean: \"{}\"", s),
    }
}

fn input_integral(name: &str, args: &[Value], sql_type: SqlType) -> Result<Value, QueryError> {
    let s = match input_str(name, args)? {
        Some(s) => s,
        None => return Ok(Value::null(sql_type)),
    };
    let i = match s.parse::<i64>() {
        Ok(i) => i,
        Err(err) => match err.kind() {
            IntErrorKind::PosOverflow | IntErrorKind::NegOverflow =>
                bail!(QueryError::OutOfRange, "value \"{}\" is out of range for type {}", s, sql_type),
            _ => bail!(QueryError::ParseError, "invalid input syntax for type {}: \"{}\"", sql_type, s),
        },
    };
    match (sql_type.min_int(), sql_type.max_int()) {
        (Some(min), Some(max)) if i >= min && i <= max => Value::int(sql_type, i),
        _ => bail!(QueryError::OutOfRange, "value \"{}\" is out of range for type {}", s, sql_type),
    }
}

pub fn input_tinyint(args: &[Value]) -> Result<Value, QueryError> {
    input_integral("input_tinyint", args, SqlType::TinyInt)
}

pub fn input_smallint(args: &[Value]) -> Result<Value, QueryError> {
    input_integral("input_smallint", args, SqlType::SmallInt)
}

pub fn input_integer(args: &[Value]) -> Result<Value, QueryError> {
    input_integral("input_integer", args, SqlType::Integer)
}

pub fn input_bigint(args: &[Value]) -> Result<Value, QueryError> {
    input_integral("input_bigint", args, SqlType::BigInt)
}

pub fn input_decimal(args: &[Value]) -> Result<Value, QueryError> {
    let s = match input_str("input_decimal", args)? {
        Some(s) => s,
        None => return Ok(Value::null(SqlType::Decimal)),
    };
    match s.parse::<f64>() {
        Ok(x) => Ok(Value::decimal(x)),
        Err(_) => bail!(QueryError::ParseError, "invalid input syntax for type decimal: \"{}\"", s),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_abs() {
        assert_eq!(abs(&[Value::integer(-5)]).unwrap(), Value::integer(5));
        assert_eq!(abs(&[Value::decimal(-2.5)]).unwrap(), Value::decimal(2.5));
        assert_eq!(abs(&[Value::null(SqlType::SmallInt)]).unwrap(), Value::null(SqlType::SmallInt));
        assert!(matches!(abs(&[Value::bigint(i64::MIN)]), Err(QueryError::Overflow)));
        assert!(matches!(abs(&[Value::int(SqlType::TinyInt, -128).unwrap()]), Err(QueryError::Overflow)));
    }

    #[test]
    fn test_rounding() {
        assert_eq!(floor(&[Value::decimal(-1.5)]).unwrap(), Value::decimal(-2.0));
        assert_eq!(ceil(&[Value::decimal(-1.5)]).unwrap(), Value::decimal(-1.0));
        assert_eq!(round(&[Value::decimal(2.5)]).unwrap(), Value::decimal(3.0));
        assert_eq!(round(&[Value::decimal(-2.5)]).unwrap(), Value::decimal(-3.0));
        assert_eq!(round(&[Value::integer(7)]).unwrap(), Value::integer(7));
    }

    #[test]
    fn test_input_functions() {
        assert_eq!(input_integer(&[Value::varchar("  42 ")]).unwrap(), Value::integer(42));
        assert_eq!(input_bigint(&[Value::null(SqlType::Varchar)]).unwrap(), Value::null(SqlType::BigInt));
        assert!(matches!(input_tinyint(&[Value::varchar("128")]), Err(QueryError::OutOfRange(_))));
        assert!(matches!(input_bigint(&[Value::varchar("99999999999999999999")]), Err(QueryError::OutOfRange(_))));
        assert!(matches!(input_smallint(&[Value::varchar("12a")]), Err(QueryError::ParseError(_))));
        assert_eq!(input_boolean(&[Value::varchar("YES")]).unwrap(), Value::boolean(true));
        assert_eq!(input_boolean(&[Value::varchar("off")]).unwrap(), Value::boolean(false));
        assert!(matches!(input_boolean(&[Value::varchar("maybe")]), Err(QueryError::ParseError(_))));
        assert_eq!(input_decimal(&[Value::varchar("-0.25")]).unwrap(), Value::decimal(-0.25));
        assert!(matches!(input_decimal(&[Value::varchar("")]), Err(QueryError::ParseError(_))));
    }
}
