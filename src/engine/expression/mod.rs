use std::fmt;

use crate::engine::data_types::{Row, SqlType, Value};
use crate::engine::planning::Expr;
use crate::QueryError;

mod arithmetic;
mod comparison;
mod conjunction;
mod constant;
mod function;
mod negation;
mod null_check;
mod tuple_value;

pub use self::arithmetic::*;
pub use self::comparison::*;
pub use self::conjunction::ConjunctionTranslator;
pub use self::constant::ConstantTranslator;
pub use self::function::FunctionTranslator;
pub use self::negation::NegationTranslator;
pub use self::null_check::NullCheckTranslator;
pub use self::tuple_value::TupleValueTranslator;

pub type BoxedExpression<'p> = Box<dyn ExpressionTranslator + 'p>;

/// Evaluates one bound expression node against the current row.
///
/// Translators are specialized for their node when the plan is compiled: operand types, operator
/// implementations and runtime functions are fixed, so evaluation does no dispatch on the expression tree.
/// `derive_value` must be a pure function of the row's attribute values and must not mutate shared state.
pub trait ExpressionTranslator: fmt::Debug + Send + Sync {
    fn derive_value(&self, row: &mut Row) -> Result<Value, QueryError>;
    /// Type carried by every value `derive_value` returns.
    fn return_type(&self) -> SqlType;
}

pub fn compile_expression(expr: &Expr) -> Result<BoxedExpression<'_>, QueryError> {
    let return_type = expr.return_type()?;
    Ok(match *expr {
        Expr::TupleValue { ref name, ref attribute } => Box::new(TupleValueTranslator::new(name, attribute.as_ref())?),
        Expr::Constant(ref value) => Box::new(ConstantTranslator::new(value)),
        Expr::Arithmetic(kind, ref lhs, ref rhs) =>
            arithmetic::compile(kind, compile_expression(lhs)?, compile_expression(rhs)?, return_type),
        Expr::Comparison(kind, ref lhs, ref rhs) =>
            comparison::compile(kind, compile_expression(lhs)?, compile_expression(rhs)?),
        Expr::Conjunction(kind, ref lhs, ref rhs) =>
            Box::new(ConjunctionTranslator::new(kind, compile_expression(lhs)?, compile_expression(rhs)?)),
        Expr::Not(ref expr) => Box::new(NegationTranslator::new(compile_expression(expr)?)),
        Expr::IsNull { ref expr, negated } => Box::new(NullCheckTranslator::new(compile_expression(expr)?, negated)),
        Expr::Function { ref name, ref args } => {
            let args = args.iter().map(compile_expression).collect::<Result<Vec<_>, _>>()?;
            Box::new(FunctionTranslator::new(name, args, return_type)?)
        }
    })
}


#[cfg(test)]
mod tests {
    use super::test_util::*;
    use super::*;
    use crate::engine::data_types::AttributeInfo;
    use crate::engine::planning::{ArithmeticKind, ComparisonKind};

    #[test]
    fn test_compiled_tree_evaluates() {
        let a = AttributeInfo::new(0, "a", SqlType::Integer);
        let b = AttributeInfo::new(1, "b", SqlType::Decimal);
        let expr = Expr::and(
            Expr::comparison(ComparisonKind::GreaterThan,
                             Expr::arithmetic(ArithmeticKind::Multiply, Expr::col(&a), Expr::constant(Value::integer(2))),
                             Expr::col(&b)),
            Expr::is_not_null(Expr::col(&b)));
        let translator = compile_expression(&expr).unwrap();
        assert_eq!(translator.return_type(), SqlType::Boolean);
        let batch = batch(vec![
            (&a, vec![Value::integer(3), Value::integer(1), Value::null(SqlType::Integer)]),
            (&b, vec![Value::decimal(5.5), Value::null(SqlType::Decimal), Value::decimal(1.0)]),
        ]);
        let results = (0..3)
            .map(|i| translator.derive_value(&mut batch.row(i)).unwrap())
            .collect::<Vec<_>>();
        assert_eq!(results, vec![Value::boolean(true), Value::boolean(false), Value::null(SqlType::Boolean)]);
    }

    #[test]
    fn test_type_errors_at_bind_time() {
        let s = AttributeInfo::new(0, "s", SqlType::Varchar);
        let expr = Expr::arithmetic(ArithmeticKind::Add, Expr::col(&s), Expr::constant(Value::integer(1)));
        assert!(matches!(compile_expression(&expr), Err(QueryError::TypeError(_))));
        assert!(matches!(compile_expression(&Expr::unresolved("missing")), Err(QueryError::FatalError(_))));
    }
}
