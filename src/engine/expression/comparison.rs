use std::cmp::Ordering;
use std::fmt;
use std::marker::PhantomData;

use crate::engine::data_types::{Row, SqlType, Value};
use crate::engine::expression::{BoxedExpression, ExpressionTranslator};
use crate::engine::planning::ComparisonKind;
use crate::QueryError;

pub trait ComparisonOp: fmt::Debug + Send + Sync + 'static {
    fn holds(ordering: Ordering) -> bool;
    fn symbol() -> &'static str;
}

#[derive(Debug)]
pub struct Equals;

#[derive(Debug)]
pub struct NotEquals;

#[derive(Debug)]
pub struct LessThan;

#[derive(Debug)]
pub struct LessThanEquals;

#[derive(Debug)]
pub struct GreaterThan;

#[derive(Debug)]
pub struct GreaterThanEquals;

impl ComparisonOp for Equals {
    #[inline]
    fn holds(ordering: Ordering) -> bool { ordering == Ordering::Equal }
    fn symbol() -> &'static str { "=" }
}

impl ComparisonOp for NotEquals {
    #[inline]
    fn holds(ordering: Ordering) -> bool { ordering != Ordering::Equal }
    fn symbol() -> &'static str { "<>" }
}

impl ComparisonOp for LessThan {
    #[inline]
    fn holds(ordering: Ordering) -> bool { ordering == Ordering::Less }
    fn symbol() -> &'static str { "<" }
}

impl ComparisonOp for LessThanEquals {
    #[inline]
    fn holds(ordering: Ordering) -> bool { ordering != Ordering::Greater }
    fn symbol() -> &'static str { "<=" }
}

impl ComparisonOp for GreaterThan {
    #[inline]
    fn holds(ordering: Ordering) -> bool { ordering == Ordering::Greater }
    fn symbol() -> &'static str { ">" }
}

impl ComparisonOp for GreaterThanEquals {
    #[inline]
    fn holds(ordering: Ordering) -> bool { ordering != Ordering::Less }
    fn symbol() -> &'static str { ">=" }
}

/// Compares two operands: numbers after promotion, strings lexicographically, `false < true`.
pub struct ComparisonTranslator<'p, Op> {
    lhs: BoxedExpression<'p>,
    rhs: BoxedExpression<'p>,
    op: PhantomData<Op>,
}

impl<'p, Op: ComparisonOp> ComparisonTranslator<'p, Op> {
    pub fn new(lhs: BoxedExpression<'p>, rhs: BoxedExpression<'p>) -> ComparisonTranslator<'p, Op> {
        ComparisonTranslator { lhs, rhs, op: PhantomData }
    }
}

impl<'p, Op: ComparisonOp> ExpressionTranslator for ComparisonTranslator<'p, Op> {
    fn derive_value(&self, row: &mut Row) -> Result<Value, QueryError> {
        let lhs = self.lhs.derive_value(row)?;
        let rhs = self.rhs.derive_value(row)?;
        if lhs.is_null() || rhs.is_null() {
            return Ok(Value::null(SqlType::Boolean));
        }
        Ok(Value::boolean(Op::holds(lhs.compare(&rhs)?)))
    }

    fn return_type(&self) -> SqlType {
        SqlType::Boolean
    }
}

impl<'p, Op: ComparisonOp> fmt::Debug for ComparisonTranslator<'p, Op> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "({:?} {} {:?})", self.lhs, Op::symbol(), self.rhs)
    }
}

pub(super) fn compile<'p>(kind: ComparisonKind, lhs: BoxedExpression<'p>, rhs: BoxedExpression<'p>) -> BoxedExpression<'p> {
    match kind {
        ComparisonKind::Equal => Box::new(ComparisonTranslator::<Equals>::new(lhs, rhs)),
        ComparisonKind::NotEqual => Box::new(ComparisonTranslator::<NotEquals>::new(lhs, rhs)),
        ComparisonKind::LessThan => Box::new(ComparisonTranslator::<LessThan>::new(lhs, rhs)),
        ComparisonKind::LessThanOrEqual => Box::new(ComparisonTranslator::<LessThanEquals>::new(lhs, rhs)),
        ComparisonKind::GreaterThan => Box::new(ComparisonTranslator::<GreaterThan>::new(lhs, rhs)),
        ComparisonKind::GreaterThanOrEqual => Box::new(ComparisonTranslator::<GreaterThanEquals>::new(lhs, rhs)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::data_types::AttributeInfo;
    use crate::engine::expression::compile_expression;
    use crate::engine::expression::test_util::*;
    use crate::engine::planning::Expr;

    const ALL: [ComparisonKind; 6] = [
        ComparisonKind::Equal,
        ComparisonKind::NotEqual,
        ComparisonKind::LessThan,
        ComparisonKind::LessThanOrEqual,
        ComparisonKind::GreaterThan,
        ComparisonKind::GreaterThanOrEqual,
    ];

    fn eval(kind: ComparisonKind, lhs: Value, rhs: Value) -> Value {
        let l = AttributeInfo::new(0, "l", lhs.sql_type());
        let r = AttributeInfo::new(1, "r", rhs.sql_type());
        let expr = Expr::comparison(kind, Expr::col(&l), Expr::col(&r));
        let translator = compile_expression(&expr).unwrap();
        let batch = batch(vec![(&l, vec![lhs]), (&r, vec![rhs])]);
        translator.derive_value(&mut batch.row(0)).unwrap()
    }

    #[test]
    fn test_numeric_promotion() {
        let results = ALL.iter()
            .map(|&kind| eval(kind, Value::integer(2), Value::decimal(2.5)).as_bool().unwrap())
            .collect::<Vec<_>>();
        assert_eq!(results, vec![false, true, true, true, false, false]);
        assert_eq!(eval(ComparisonKind::Equal, Value::int(SqlType::TinyInt, 9).unwrap(), Value::bigint(9)),
                   Value::boolean(true));
    }

    #[test]
    fn test_strings_and_booleans() {
        assert_eq!(eval(ComparisonKind::LessThan, Value::varchar("apple"), Value::varchar("banana")), Value::boolean(true));
        assert_eq!(eval(ComparisonKind::GreaterThan, Value::varchar("b"), Value::varchar("abc")), Value::boolean(true));
        assert_eq!(eval(ComparisonKind::LessThan, Value::boolean(false), Value::boolean(true)), Value::boolean(true));
    }

    #[test]
    fn test_null_propagation() {
        for kind in ALL {
            assert_eq!(eval(kind, Value::null(SqlType::Integer), Value::integer(1)), Value::null(SqlType::Boolean));
            assert_eq!(eval(kind, Value::varchar("x"), Value::null(SqlType::Varchar)), Value::null(SqlType::Boolean));
        }
    }
}
