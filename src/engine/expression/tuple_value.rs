use crate::engine::data_types::{AttributeInfo, Row, SqlType, Value};
use crate::engine::expression::ExpressionTranslator;
use crate::QueryError;

/// Reads one attribute of the current row.
#[derive(Debug)]
pub struct TupleValueTranslator<'p> {
    attribute: &'p AttributeInfo,
}

impl<'p> TupleValueTranslator<'p> {
    pub fn new(name: &str, attribute: Option<&'p AttributeInfo>) -> Result<TupleValueTranslator<'p>, QueryError> {
        match attribute {
            Some(attribute) => Ok(TupleValueTranslator { attribute }),
            None => Err(fatal!("Column {} was never resolved to an attribute", name)),
        }
    }
}

impl<'p> ExpressionTranslator for TupleValueTranslator<'p> {
    fn derive_value(&self, row: &mut Row) -> Result<Value, QueryError> {
        let value = row.derive_value(self.attribute.id)?;
        ensure!(value.sql_type() == self.attribute.sql_type,
                "Attribute {} produced value {} of unexpected type", self.attribute, value);
        Ok(value)
    }

    fn return_type(&self) -> SqlType {
        self.attribute.sql_type
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::expression::test_util::*;

    #[test]
    fn test_reads_attribute() {
        let a = AttributeInfo::new(4, "a", SqlType::SmallInt);
        let batch = batch(vec![(&a, vec![Value::int(SqlType::SmallInt, 7).unwrap(), Value::null(SqlType::SmallInt)])]);
        let translator = TupleValueTranslator::new("a", Some(&a)).unwrap();
        assert_eq!(translator.derive_value(&mut batch.row(0)).unwrap(), Value::int(SqlType::SmallInt, 7).unwrap());
        assert_eq!(translator.derive_value(&mut batch.row(1)).unwrap(), Value::null(SqlType::SmallInt));
    }

    #[test]
    fn test_unresolved_column_fails_fast() {
        assert!(matches!(TupleValueTranslator::new("a", None), Err(QueryError::FatalError(_))));
    }
}
