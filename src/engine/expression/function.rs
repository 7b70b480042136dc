use std::fmt;

use itertools::Itertools;

use crate::engine::data_types::{Row, SqlType, Value};
use crate::engine::expression::{BoxedExpression, ExpressionTranslator};
use crate::engine::runtime::{function_table, RuntimeFunction};
use crate::QueryError;

/// Call of a runtime function, resolved in the function table when the plan is compiled.
pub struct FunctionTranslator<'p> {
    function: &'static RuntimeFunction,
    args: Vec<BoxedExpression<'p>>,
    return_type: SqlType,
}

impl<'p> FunctionTranslator<'p> {
    pub fn new(name: &str, args: Vec<BoxedExpression<'p>>, return_type: SqlType) -> Result<FunctionTranslator<'p>, QueryError> {
        let function = function_table::lookup(name)?;
        let bound = function.bind(&args.iter().map(|a| a.return_type()).collect::<Vec<_>>())?;
        ensure!(bound == return_type, "{} returns {}, expression expects {}", function, bound, return_type);
        Ok(FunctionTranslator { function, args, return_type })
    }
}

impl<'p> ExpressionTranslator for FunctionTranslator<'p> {
    fn derive_value(&self, row: &mut Row) -> Result<Value, QueryError> {
        let args = self.args.iter().map(|a| a.derive_value(row)).collect::<Result<Vec<_>, _>>()?;
        (self.function.implementation)(&args)
    }

    fn return_type(&self) -> SqlType {
        self.return_type
    }
}

impl<'p> fmt::Debug for FunctionTranslator<'p> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}({:?})", self.function.name, self.args.iter().format(", "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::data_types::AttributeInfo;
    use crate::engine::expression::compile_expression;
    use crate::engine::expression::test_util::*;
    use crate::engine::planning::Expr;

    #[test]
    fn test_function_call() {
        let s = AttributeInfo::new(0, "s", SqlType::Varchar);
        let expr = Expr::func("Abs", vec![Expr::func("input_integer", vec![Expr::col(&s)])]);
        let translator = compile_expression(&expr).unwrap();
        assert_eq!(translator.return_type(), SqlType::Integer);
        let batch = batch(vec![(&s, vec![Value::varchar(" -12"), Value::null(SqlType::Varchar), Value::varchar("x")])]);
        assert_eq!(translator.derive_value(&mut batch.row(0)).unwrap(), Value::integer(12));
        assert_eq!(translator.derive_value(&mut batch.row(1)).unwrap(), Value::null(SqlType::Integer));
        assert!(matches!(translator.derive_value(&mut batch.row(2)), Err(QueryError::ParseError(_))));
    }
}
