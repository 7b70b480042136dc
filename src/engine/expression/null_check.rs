use crate::engine::data_types::{Row, SqlType, Value};
use crate::engine::expression::{BoxedExpression, ExpressionTranslator};
use crate::QueryError;

/// IS NULL / IS NOT NULL. Never produces null.
#[derive(Debug)]
pub struct NullCheckTranslator<'p> {
    expr: BoxedExpression<'p>,
    negated: bool,
}

impl<'p> NullCheckTranslator<'p> {
    pub fn new(expr: BoxedExpression<'p>, negated: bool) -> NullCheckTranslator<'p> {
        NullCheckTranslator { expr, negated }
    }
}

impl<'p> ExpressionTranslator for NullCheckTranslator<'p> {
    fn derive_value(&self, row: &mut Row) -> Result<Value, QueryError> {
        Ok(Value::boolean(self.expr.derive_value(row)?.is_null() != self.negated))
    }

    fn return_type(&self) -> SqlType {
        SqlType::Boolean
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
    fn test_null_checks_and_negation() {
        let a = AttributeInfo::new(0, "a", SqlType::Varchar);
        let b = AttributeInfo::new(1, "b", SqlType::Boolean);
        let batch = batch(vec![
            (&a, vec![Value::varchar("x"), Value::null(SqlType::Varchar)]),
            (&b, vec![Value::boolean(true), Value::null(SqlType::Boolean)]),
        ]);
        let is_null_expr = Expr::is_null(Expr::col(&a));
        let is_not_null_expr = Expr::is_not_null(Expr::col(&a));
        let not_expr = Expr::not(Expr::col(&b));
        let is_null = compile_expression(&is_null_expr).unwrap();
        let is_not_null = compile_expression(&is_not_null_expr).unwrap();
        let not = compile_expression(&not_expr).unwrap();
        assert_eq!(is_null.derive_value(&mut batch.row(0)).unwrap(), Value::boolean(false));
        assert_eq!(is_null.derive_value(&mut batch.row(1)).unwrap(), Value::boolean(true));
        assert_eq!(is_not_null.derive_value(&mut batch.row(1)).unwrap(), Value::boolean(false));
        assert_eq!(not.derive_value(&mut batch.row(0)).unwrap(), Value::boolean(false));
        assert_eq!(not.derive_value(&mut batch.row(1)).unwrap(), Value::null(SqlType::Boolean));
    }
}
