use crate::engine::data_types::{Row, SqlType, Value};
use crate::engine::expression::{BoxedExpression, ExpressionTranslator};
use crate::engine::planning::ConjunctionKind;
use crate::QueryError;

/// AND / OR under three-valued logic. The right operand is only evaluated if the left one does not decide the result.
#[derive(Debug)]
pub struct ConjunctionTranslator<'p> {
    kind: ConjunctionKind,
    lhs: BoxedExpression<'p>,
    rhs: BoxedExpression<'p>,
}

impl<'p> ConjunctionTranslator<'p> {
    pub fn new(kind: ConjunctionKind, lhs: BoxedExpression<'p>, rhs: BoxedExpression<'p>) -> ConjunctionTranslator<'p> {
        ConjunctionTranslator { kind, lhs, rhs }
    }
}

impl<'p> ExpressionTranslator for ConjunctionTranslator<'p> {
    fn derive_value(&self, row: &mut Row) -> Result<Value, QueryError> {
        // The value that decides the result on its own: false for AND, true for OR.
        let dominant = self.kind == ConjunctionKind::Or;
        let lhs = self.lhs.derive_value(row)?.truth()?;
        if lhs == Some(dominant) {
            return Ok(Value::boolean(dominant));
        }
        let rhs = self.rhs.derive_value(row)?.truth()?;
        Ok(match (lhs, rhs) {
            (_, Some(r)) if r == dominant => Value::boolean(dominant),
            (Some(_), Some(_)) => Value::boolean(!dominant),
            _ => Value::null(SqlType::Boolean),
        })
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

    fn truth_table(kind: ConjunctionKind) -> Vec<Value> {
        let inputs = [Value::boolean(true), Value::boolean(false), Value::null(SqlType::Boolean)];
        let l = AttributeInfo::new(0, "l", SqlType::Boolean);
        let r = AttributeInfo::new(1, "r", SqlType::Boolean);
        let mut lhs = vec![];
        let mut rhs = vec![];
        for a in inputs.iter() {
            for b in inputs.iter() {
                lhs.push(a.clone());
                rhs.push(b.clone());
            }
        }
        let expr = match kind {
            ConjunctionKind::And => Expr::and(Expr::col(&l), Expr::col(&r)),
            ConjunctionKind::Or => Expr::or(Expr::col(&l), Expr::col(&r)),
        };
        let translator = compile_expression(&expr).unwrap();
        let batch = batch(vec![(&l, lhs), (&r, rhs)]);
        (0..9).map(|i| translator.derive_value(&mut batch.row(i)).unwrap()).collect()
    }

    #[test]
    fn test_and() {
        let (t, f, n) = (Value::boolean(true), Value::boolean(false), Value::null(SqlType::Boolean));
        assert_eq!(truth_table(ConjunctionKind::And),
                   vec![t.clone(), f.clone(), n.clone(), f.clone(), f.clone(), f.clone(), n.clone(), f, n]);
    }

    #[test]
    fn test_or() {
        let (t, f, n) = (Value::boolean(true), Value::boolean(false), Value::null(SqlType::Boolean));
        assert_eq!(truth_table(ConjunctionKind::Or),
                   vec![t.clone(), t.clone(), t.clone(), t.clone(), f, n.clone(), t, n.clone(), n]);
    }

    #[test]
    fn test_short_circuit() {
        let l = AttributeInfo::new(0, "l", SqlType::Boolean);
        let missing = AttributeInfo::new(1, "missing", SqlType::Boolean);
        let expr = Expr::and(Expr::col(&l), Expr::col(&missing));
        let translator = compile_expression(&expr).unwrap();
        let batch = batch(vec![(&l, vec![Value::boolean(false), Value::boolean(true)])]);
        assert_eq!(translator.derive_value(&mut batch.row(0)).unwrap(), Value::boolean(false));
        assert!(translator.derive_value(&mut batch.row(1)).is_err());
    }
}
