use std::fmt;

use itertools::Itertools;

use crate::engine::data_types::{AttributeInfo, SqlType, Value};
use crate::engine::runtime::function_table;
use crate::QueryError;

use self::Expr::*;

/// Bound scalar expression. Column references carry the attribute they were resolved to by the binder.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    TupleValue { name: String, attribute: Option<AttributeInfo> },
    Constant(Value),
    Arithmetic(ArithmeticKind, Box<Expr>, Box<Expr>),
    Comparison(ComparisonKind, Box<Expr>, Box<Expr>),
    Conjunction(ConjunctionKind, Box<Expr>, Box<Expr>),
    Not(Box<Expr>),
    IsNull { expr: Box<Expr>, negated: bool },
    Function { name: String, args: Vec<Expr> },
}

#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
pub enum ArithmeticKind {
    Add,
    Subtract,
    Multiply,
    Divide,
    Modulo,
}

#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
pub enum ComparisonKind {
    Equal,
    NotEqual,
    LessThan,
    LessThanOrEqual,
    GreaterThan,
    GreaterThanOrEqual,
}

#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
pub enum ConjunctionKind {
    And,
    Or,
}

impl Expr {
    pub fn col(attribute: &AttributeInfo) -> Expr {
        TupleValue { name: attribute.name.clone(), attribute: Some(attribute.clone()) }
    }

    /// Column reference the binder has not resolved.
    pub fn unresolved(name: &str) -> Expr {
        TupleValue { name: name.to_string(), attribute: None }
    }

    pub fn constant<V: Into<Value>>(value: V) -> Expr {
        Constant(value.into())
    }

    pub fn arithmetic(kind: ArithmeticKind, lhs: Expr, rhs: Expr) -> Expr {
        Arithmetic(kind, Box::new(lhs), Box::new(rhs))
    }

    pub fn comparison(kind: ComparisonKind, lhs: Expr, rhs: Expr) -> Expr {
        Comparison(kind, Box::new(lhs), Box::new(rhs))
    }

    pub fn and(lhs: Expr, rhs: Expr) -> Expr {
        Conjunction(ConjunctionKind::And, Box::new(lhs), Box::new(rhs))
    }

    pub fn or(lhs: Expr, rhs: Expr) -> Expr {
        Conjunction(ConjunctionKind::Or, Box::new(lhs), Box::new(rhs))
    }

    pub fn not(expr: Expr) -> Expr {
        Not(Box::new(expr))
    }

    pub fn is_null(expr: Expr) -> Expr {
        IsNull { expr: Box::new(expr), negated: false }
    }

    pub fn is_not_null(expr: Expr) -> Expr {
        IsNull { expr: Box::new(expr), negated: true }
    }

    pub fn func(name: &str, args: Vec<Expr>) -> Expr {
        Function { name: name.to_string(), args }
    }

    /// Statically inferred type of every value the expression produces.
    pub fn return_type(&self) -> Result<SqlType, QueryError> {
        match *self {
            TupleValue { ref name, ref attribute } => attribute
                .as_ref()
                .map(|a| a.sql_type)
                .ok_or_else(|| fatal!("Column {} was never resolved to an attribute", name)),
            Constant(ref value) => Ok(value.sql_type()),
            Arithmetic(_, ref lhs, ref rhs) => lhs.return_type()?.promote(rhs.return_type()?),
            Comparison(kind, ref lhs, ref rhs) => {
                let (l, r) = (lhs.return_type()?, rhs.return_type()?);
                if !l.comparable_with(r) {
                    bail!(QueryError::TypeError, "cannot apply {} to {} and {}", kind, l, r);
                }
                Ok(SqlType::Boolean)
            }
            Conjunction(kind, ref lhs, ref rhs) => {
                let (l, r) = (lhs.return_type()?, rhs.return_type()?);
                if l != SqlType::Boolean || r != SqlType::Boolean {
                    bail!(QueryError::TypeError, "{} requires boolean operands, got {} and {}", kind, l, r);
                }
                Ok(SqlType::Boolean)
            }
            Not(ref expr) => match expr.return_type()? {
                SqlType::Boolean => Ok(SqlType::Boolean),
                t => bail!(QueryError::TypeError, "NOT requires a boolean operand, got {}", t),
            },
            IsNull { ref expr, .. } => {
                expr.return_type()?;
                Ok(SqlType::Boolean)
            }
            Function { ref name, ref args } => {
                let arg_types = args.iter().map(|a| a.return_type()).collect::<Result<Vec<_>, _>>()?;
                function_table::lookup(name)?.bind(&arg_types)
            }
        }
    }

    /// Whether the expression can evaluate to null given the nullability of the attributes it reads.
    pub fn nullable(&self) -> bool {
        match *self {
            TupleValue { ref attribute, .. } => attribute.as_ref().map(|a| a.nullable).unwrap_or(true),
            Constant(ref value) => value.is_null(),
            Arithmetic(kind, ref lhs, ref rhs) => {
                kind == ArithmeticKind::Divide || kind == ArithmeticKind::Modulo || lhs.nullable() || rhs.nullable()
            }
            Comparison(_, ref lhs, ref rhs) | Conjunction(_, ref lhs, ref rhs) => lhs.nullable() || rhs.nullable(),
            Not(ref expr) => expr.nullable(),
            IsNull { .. } => false,
            Function { ref args, .. } => args.iter().any(|a| a.nullable()),
        }
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            TupleValue { ref name, attribute: Some(ref a) } => write!(f, "{}{}", name, a.id),
            TupleValue { ref name, attribute: None } => write!(f, "{}?", name),
            Constant(ref value) => write!(f, "{}", value),
            Arithmetic(kind, ref lhs, ref rhs) => write!(f, "({} {} {})", lhs, kind, rhs),
            Comparison(kind, ref lhs, ref rhs) => write!(f, "({} {} {})", lhs, kind, rhs),
            Conjunction(kind, ref lhs, ref rhs) => write!(f, "({} {} {})", lhs, kind, rhs),
            Not(ref expr) => write!(f, "NOT {}", expr),
            IsNull { ref expr, negated: false } => write!(f, "{} IS NULL", expr),
            IsNull { ref expr, negated: true } => write!(f, "{} IS NOT NULL", expr),
            Function { ref name, ref args } => write!(f, "{}({})", name, args.iter().join(", ")),
        }
    }
}

impl fmt::Display for ArithmeticKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let symbol = match self {
            ArithmeticKind::Add => "+",
            ArithmeticKind::Subtract => "-",
            ArithmeticKind::Multiply => "*",
            ArithmeticKind::Divide => "/",
            ArithmeticKind::Modulo => "%",
        };
        write!(f, "{}", symbol)
    }
}

impl fmt::Display for ComparisonKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let symbol = match self {
            ComparisonKind::Equal => "=",
            ComparisonKind::NotEqual => "<>",
            ComparisonKind::LessThan => "<",
            ComparisonKind::LessThanOrEqual => "<=",
            ComparisonKind::GreaterThan => ">",
            ComparisonKind::GreaterThanOrEqual => ">=",
        };
        write!(f, "{}", symbol)
    }
}

impl fmt::Display for ConjunctionKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ConjunctionKind::And => write!(f, "AND"),
            ConjunctionKind::Or => write!(f, "OR"),
        }
    }
}
