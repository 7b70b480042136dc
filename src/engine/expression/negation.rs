use crate::engine::data_types::{Row, SqlType, Value};
use crate::engine::expression::{BoxedExpression, ExpressionTranslator};
use crate::QueryError;

#[derive(Debug)]
pub struct NegationTranslator<'p> {
    expr: BoxedExpression<'p>,
}

impl<'p> NegationTranslator<'p> {
    pub fn new(expr: BoxedExpression<'p>) -> NegationTranslator<'p> {
        NegationTranslator { expr }
    }
}

impl<'p> ExpressionTranslator for NegationTranslator<'p> {
    fn derive_value(&self, row: &mut Row) -> Result<Value, QueryError> {
        Ok(match self.expr.derive_value(row)?.truth()? {
            Some(b) => Value::boolean(!b),
            None => Value::null(SqlType::Boolean),
        })
    }

    fn return_type(&self) -> SqlType {
        SqlType::Boolean
    }
}
