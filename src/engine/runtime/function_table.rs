use std::fmt;

use fnv::FnvHashMap;
use itertools::Itertools;

use crate::engine::data_types::{SqlType, Value};
use crate::engine::runtime::numeric_functions as numeric;
use crate::QueryError;

pub type RuntimeFn = fn(&[Value]) -> Result<Value, QueryError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArgType {
    Numeric,
    Exact(SqlType),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReturnType {
    SameAsArgument(usize),
    Fixed(SqlType),
}

/// One entry of the runtime function table: name, fixed signature and implementation.
#[derive(Clone)]
pub struct RuntimeFunction {
    pub name: &'static str,
    pub args: &'static [ArgType],
    pub returns: ReturnType,
    pub implementation: RuntimeFn,
}

impl RuntimeFunction {
    /// Checks the argument types of a call site and returns the result type.
    pub fn bind(&self, arg_types: &[SqlType]) -> Result<SqlType, QueryError> {
        if arg_types.len() != self.args.len() {
            bail!(QueryError::TypeError, "{} expects {} arguments, got {}", self.name, self.args.len(), arg_types.len());
        }
        for (expected, &actual) in self.args.iter().zip(arg_types.iter()) {
            let matches = match *expected {
                ArgType::Numeric => actual.is_numeric(),
                ArgType::Exact(t) => actual == t,
            };
            if !matches {
                bail!(QueryError::TypeError, "{} cannot be called with ({})", self, arg_types.iter().join(", "));
            }
        }
        Ok(match self.returns {
            ReturnType::SameAsArgument(i) => arg_types[i],
            ReturnType::Fixed(t) => t,
        })
    }
}

impl fmt::Debug for RuntimeFunction {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self)
    }
}

impl fmt::Display for RuntimeFunction {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let args = self.args.iter().map(|a| match a {
            ArgType::Numeric => "numeric".to_string(),
            ArgType::Exact(t) => t.to_string(),
        }).join(", ");
        write!(f, "{}({})", self.name, args)
    }
}

const NUMERIC: &[ArgType] = &[ArgType::Numeric];
const VARCHAR: &[ArgType] = &[ArgType::Exact(SqlType::Varchar)];

fn function(name: &'static str, args: &'static [ArgType], returns: ReturnType, implementation: RuntimeFn) -> RuntimeFunction {
    RuntimeFunction { name, args, returns, implementation }
}

lazy_static! {
    static ref FUNCTION_TABLE: FnvHashMap<&'static str, RuntimeFunction> = {
        let functions = vec![
            function("abs", NUMERIC, ReturnType::SameAsArgument(0), numeric::abs),
            function("floor", NUMERIC, ReturnType::SameAsArgument(0), numeric::floor),
            function("ceil", NUMERIC, ReturnType::SameAsArgument(0), numeric::ceil),
            function("round", NUMERIC, ReturnType::SameAsArgument(0), numeric::round),
            function("input_boolean", VARCHAR, ReturnType::Fixed(SqlType::Boolean), numeric::input_boolean),
            function("input_tinyint", VARCHAR, ReturnType::Fixed(SqlType::TinyInt), numeric::input_tinyint),
            function("input_smallint", VARCHAR, ReturnType::Fixed(SqlType::SmallInt), numeric::input_smallint),
            function("input_integer", VARCHAR, ReturnType::Fixed(SqlType::Integer), numeric::input_integer),
            function("input_bigint", VARCHAR, ReturnType::Fixed(SqlType::BigInt), numeric::input_bigint),
            function("input_decimal", VARCHAR, ReturnType::Fixed(SqlType::Decimal), numeric::input_decimal),
        ];
        functions.into_iter().map(|f| (f.name, f)).collect()
    };
}

/// Resolves a function by case-insensitive name.
pub fn lookup(name: &str) -> Result<&'static RuntimeFunction, QueryError> {
    FUNCTION_TABLE
        .get(name.to_lowercase().as_str())
        .ok_or_else(|| QueryError::NotImplemented(format!("function {}", name)))
}

pub fn function_names() -> Vec<&'static str> {
    FUNCTION_TABLE.keys().cloned().sorted().collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_case_insensitive() {
        let f = lookup("ABS").unwrap();
        assert_eq!(f.name, "abs");
        assert_eq!(f.bind(&[SqlType::SmallInt]).unwrap(), SqlType::SmallInt);
        assert_eq!((f.implementation)(&[Value::integer(-3)]).unwrap(), Value::integer(3));
        assert_eq!(lookup("Input_Integer").unwrap().bind(&[SqlType::Varchar]).unwrap(), SqlType::Integer);
    }

    #[test]
    fn test_bind_rejects_bad_calls() {
        assert!(matches!(lookup("sqrt"), Err(QueryError::NotImplemented(_))));
        assert!(matches!(lookup("floor").unwrap().bind(&[SqlType::Varchar]), Err(QueryError::TypeError(_))));
        assert!(matches!(lookup("round").unwrap().bind(&[]), Err(QueryError::TypeError(_))));
        assert!(matches!(lookup("input_decimal").unwrap().bind(&[SqlType::BigInt]), Err(QueryError::TypeError(_))));
        assert_eq!(function_names().len(), 10);
    }
}
