use crate::engine::data_types::{Row, SqlType, Value};
use crate::engine::expression::ExpressionTranslator;
use crate::QueryError;

#[derive(Debug)]
pub struct ConstantTranslator<'p> {
    value: &'p Value,
}

impl<'p> ConstantTranslator<'p> {
    pub fn new(value: &'p Value) -> ConstantTranslator<'p> {
        ConstantTranslator { value }
    }
}

impl<'p> ExpressionTranslator for ConstantTranslator<'p> {
    fn derive_value(&self, _: &mut Row) -> Result<Value, QueryError> {
        Ok(self.value.clone())
    }

    fn return_type(&self) -> SqlType {
        self.value.sql_type()
    }
}
