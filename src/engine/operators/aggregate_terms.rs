use itertools::Itertools;

use crate::engine::data_types::{AttributeInfo, Row, SqlType, Value};
use crate::engine::execution::Aggregation;
use crate::engine::expression::{compile_expression, BoxedExpression};
use crate::engine::planning::{AggregateTerm, Expr};
use crate::QueryError;

/// Aggregate terms of a group-by bound to their input translators and storage layout.
#[derive(Debug)]
pub(super) struct BoundAggregates<'p> {
    inputs: Vec<Option<BoxedExpression<'p>>>,
    outputs: Vec<&'p AttributeInfo>,
    aggregation: Aggregation,
}

impl<'p> BoundAggregates<'p> {
    pub fn bind(terms: &'p [AggregateTerm]) -> Result<BoundAggregates<'p>, QueryError> {
        let mut inputs = Vec::with_capacity(terms.len());
        let mut descriptors = Vec::with_capacity(terms.len());
        for term in terms {
            let input = term.expr.as_ref().map(compile_expression).transpose()?;
            descriptors.push((term.kind, input.as_ref().map(|e| e.return_type())));
            inputs.push(input);
        }
        let aggregation = Aggregation::setup(&descriptors)?;
        for (term, output_type) in terms.iter().zip(aggregation.output_types()) {
            ensure!(term.output.sql_type == output_type,
                    "Aggregate {} produces {} but is bound to {}", term.kind, output_type, term.output);
        }
        Ok(BoundAggregates {
            inputs,
            outputs: terms.iter().map(|t| &t.output).collect(),
            aggregation,
        })
    }

    pub fn aggregation(&self) -> &Aggregation {
        &self.aggregation
    }

    pub fn outputs(&self) -> &[&'p AttributeInfo] {
        &self.outputs
    }

    /// One input value per aggregate. `COUNT(*)` gets a placeholder that is never read.
    pub fn collect_inputs(&self, row: &mut Row) -> Result<Vec<Value>, QueryError> {
        self.inputs.iter().map(|input| match input {
            Some(expr) => expr.derive_value(row),
            None => Ok(Value::null(SqlType::BigInt)),
        }).collect()
    }

    pub fn display(&self) -> String {
        self.outputs.iter().map(|a| a.to_string()).join(", ")
    }
}

pub(super) fn bind_having(having: Option<&Expr>) -> Result<Option<BoxedExpression<'_>>, QueryError> {
    match having {
        Some(expr) => {
            let translator = compile_expression(expr)?;
            if translator.return_type() != SqlType::Boolean {
                bail!(QueryError::TypeError, "having clause {} is not boolean", expr);
            }
            Ok(Some(translator))
        }
        None => Ok(None),
    }
}
