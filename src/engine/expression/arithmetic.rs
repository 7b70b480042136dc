use std::fmt;
use std::marker::PhantomData;

use crate::engine::data_types::{Row, SqlType, Value};
use crate::engine::expression::{BoxedExpression, ExpressionTranslator};
use crate::engine::planning::ArithmeticKind;
use crate::QueryError;

/// Binary arithmetic operator. Integral operands are computed in 64 bits, decimals as IEEE doubles.
pub trait ArithmeticOp: fmt::Debug + Send + Sync + 'static {
    fn perform_int(lhs: i64, rhs: i64) -> Result<i64, QueryError>;
    fn perform_decimal(lhs: f64, rhs: f64) -> Result<f64, QueryError>;
    fn symbol() -> &'static str;
}

#[derive(Debug)]
pub struct Addition;

#[derive(Debug)]
pub struct Subtraction;

#[derive(Debug)]
pub struct Multiplication;

#[derive(Debug)]
pub struct Division;

#[derive(Debug)]
pub struct Modulo;

impl ArithmeticOp for Addition {
    #[inline]
    fn perform_int(lhs: i64, rhs: i64) -> Result<i64, QueryError> {
        lhs.checked_add(rhs).ok_or(QueryError::Overflow)
    }

    #[inline]
    fn perform_decimal(lhs: f64, rhs: f64) -> Result<f64, QueryError> {
        Ok(lhs + rhs)
    }

    fn symbol() -> &'static str { "+" }
}

impl ArithmeticOp for Subtraction {
    #[inline]
    fn perform_int(lhs: i64, rhs: i64) -> Result<i64, QueryError> {
        lhs.checked_sub(rhs).ok_or(QueryError::Overflow)
    }

    #[inline]
    fn perform_decimal(lhs: f64, rhs: f64) -> Result<f64, QueryError> {
        Ok(lhs - rhs)
    }

    fn symbol() -> &'static str { "-" }
}

impl ArithmeticOp for Multiplication {
    #[inline]
    fn perform_int(lhs: i64, rhs: i64) -> Result<i64, QueryError> {
        lhs.checked_mul(rhs).ok_or(QueryError::Overflow)
    }

    #[inline]
    fn perform_decimal(lhs: f64, rhs: f64) -> Result<f64, QueryError> {
        Ok(lhs * rhs)
    }

    fn symbol() -> &'static str { "*" }
}

impl ArithmeticOp for Division {
    #[inline]
    fn perform_int(lhs: i64, rhs: i64) -> Result<i64, QueryError> {
        if rhs == 0 {
            return Err(QueryError::DivideByZero);
        }
        lhs.checked_div(rhs).ok_or(QueryError::Overflow)
    }

    #[inline]
    fn perform_decimal(lhs: f64, rhs: f64) -> Result<f64, QueryError> {
        if rhs == 0.0 {
            return Err(QueryError::DivideByZero);
        }
        Ok(lhs / rhs)
    }

    fn symbol() -> &'static str { "/" }
}

impl ArithmeticOp for Modulo {
    #[inline]
    fn perform_int(lhs: i64, rhs: i64) -> Result<i64, QueryError> {
        if rhs == 0 {
            return Err(QueryError::DivideByZero);
        }
        lhs.checked_rem(rhs).ok_or(QueryError::Overflow)
    }

    #[inline]
    fn perform_decimal(lhs: f64, rhs: f64) -> Result<f64, QueryError> {
        if rhs == 0.0 {
            return Err(QueryError::DivideByZero);
        }
        Ok(lhs % rhs)
    }

    fn symbol() -> &'static str { "%" }
}

pub struct ArithmeticTranslator<'p, Op> {
    lhs: BoxedExpression<'p>,
    rhs: BoxedExpression<'p>,
    return_type: SqlType,
    op: PhantomData<Op>,
}

impl<'p, Op: ArithmeticOp> ArithmeticTranslator<'p, Op> {
    pub fn new(lhs: BoxedExpression<'p>, rhs: BoxedExpression<'p>, return_type: SqlType) -> ArithmeticTranslator<'p, Op> {
        ArithmeticTranslator { lhs, rhs, return_type, op: PhantomData }
    }
}

impl<'p, Op: ArithmeticOp> ExpressionTranslator for ArithmeticTranslator<'p, Op> {
    fn derive_value(&self, row: &mut Row) -> Result<Value, QueryError> {
        let lhs = self.lhs.derive_value(row)?;
        let rhs = self.rhs.derive_value(row)?;
        if lhs.is_null() || rhs.is_null() {
            return Ok(Value::null(self.return_type));
        }
        if self.return_type == SqlType::Decimal {
            Ok(Value::decimal(Op::perform_decimal(lhs.as_f64()?, rhs.as_f64()?)?))
        } else {
            Value::int(self.return_type, Op::perform_int(lhs.as_i64()?, rhs.as_i64()?)?)
        }
    }

    fn return_type(&self) -> SqlType {
        self.return_type
    }
}

impl<'p, Op: ArithmeticOp> fmt::Debug for ArithmeticTranslator<'p, Op> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "({:?} {} {:?}):{}", self.lhs, Op::symbol(), self.rhs, self.return_type)
    }
}

pub(super) fn compile<'p>(kind: ArithmeticKind,
                          lhs: BoxedExpression<'p>,
                          rhs: BoxedExpression<'p>,
                          return_type: SqlType) -> BoxedExpression<'p> {
    match kind {
        ArithmeticKind::Add => Box::new(ArithmeticTranslator::<Addition>::new(lhs, rhs, return_type)),
        ArithmeticKind::Subtract => Box::new(ArithmeticTranslator::<Subtraction>::new(lhs, rhs, return_type)),
        ArithmeticKind::Multiply => Box::new(ArithmeticTranslator::<Multiplication>::new(lhs, rhs, return_type)),
        ArithmeticKind::Divide => Box::new(ArithmeticTranslator::<Division>::new(lhs, rhs, return_type)),
        ArithmeticKind::Modulo => Box::new(ArithmeticTranslator::<Modulo>::new(lhs, rhs, return_type)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::data_types::AttributeInfo;
    use crate::engine::expression::compile_expression;
    use crate::engine::expression::test_util::*;
    use crate::engine::planning::Expr;

    fn eval(kind: ArithmeticKind, lhs: Value, rhs: Value) -> Result<Value, QueryError> {
        let l = AttributeInfo::new(0, "l", lhs.sql_type());
        let r = AttributeInfo::new(1, "r", rhs.sql_type());
        let expr = Expr::arithmetic(kind, Expr::col(&l), Expr::col(&r));
        let translator = compile_expression(&expr)?;
        let batch = batch(vec![(&l, vec![lhs]), (&r, vec![rhs])]);
        let value = translator.derive_value(&mut batch.row(0))?;
        assert_eq!(value.sql_type(), translator.return_type());
        Ok(value)
    }

    fn tiny(i: i64) -> Value {
        Value::int(SqlType::TinyInt, i).unwrap()
    }

    #[test]
    fn test_integer_arithmetic() {
        assert_eq!(eval(ArithmeticKind::Add, tiny(3), Value::integer(4)).unwrap(), Value::integer(7));
        assert_eq!(eval(ArithmeticKind::Subtract, tiny(3), tiny(5)).unwrap(), tiny(-2));
        assert_eq!(eval(ArithmeticKind::Divide, Value::bigint(-7), Value::bigint(2)).unwrap(), Value::bigint(-3));
        assert_eq!(eval(ArithmeticKind::Modulo, Value::integer(-7), Value::integer(3)).unwrap(), Value::integer(-1));
    }

    #[test]
    fn test_overflow_narrowed_to_result_type() {
        assert!(matches!(eval(ArithmeticKind::Add, tiny(100), tiny(100)), Err(QueryError::Overflow)));
        assert!(matches!(eval(ArithmeticKind::Multiply, Value::bigint(i64::MAX), Value::bigint(2)), Err(QueryError::Overflow)));
        assert!(matches!(eval(ArithmeticKind::Divide, Value::bigint(i64::MIN), Value::bigint(-1)), Err(QueryError::Overflow)));
    }

    #[test]
    fn test_division_by_zero() {
        assert!(matches!(eval(ArithmeticKind::Divide, Value::integer(1), Value::integer(0)), Err(QueryError::DivideByZero)));
        assert!(matches!(eval(ArithmeticKind::Modulo, Value::bigint(1), tiny(0)), Err(QueryError::DivideByZero)));
        assert!(matches!(eval(ArithmeticKind::Divide, Value::decimal(1.0), Value::decimal(0.0)), Err(QueryError::DivideByZero)));
    }

    #[test]
    fn test_decimal_promotion_and_nulls() {
        assert_eq!(eval(ArithmeticKind::Multiply, Value::integer(3), Value::decimal(0.5)).unwrap(), Value::decimal(1.5));
        for kind in [ArithmeticKind::Add, ArithmeticKind::Subtract, ArithmeticKind::Multiply,
                     ArithmeticKind::Divide, ArithmeticKind::Modulo] {
            assert_eq!(eval(kind, Value::null(SqlType::Integer), Value::bigint(0)).unwrap(), Value::null(SqlType::BigInt));
            assert_eq!(eval(kind, Value::decimal(1.0), Value::null(SqlType::SmallInt)).unwrap(), Value::null(SqlType::Decimal));
        }
    }
}
