use std::cell::RefCell;

use fnv::FnvHashMap;
use itertools::Itertools;

use crate::engine::data_types::{AttributeAccess, AttributeId, AttributeInfo, Row, RowBatch, Value};
use crate::engine::execution::{CompilationContext, ConsumerContext, ExecutionContext, OperatorId, PipelinePosition};
use crate::engine::expression::{compile_expression, BoxedExpression, ExpressionTranslator};
use crate::engine::operators::OperatorTranslator;
use crate::engine::planning::{Expr, PlanNode};
use crate::QueryError;

/// Streams rows through unchanged except for the target attributes, which are computed on demand.
#[derive(Debug)]
pub struct ProjectionTranslator<'p> {
    child: OperatorId,
    targets: Vec<(&'p AttributeInfo, BoxedExpression<'p>)>,
    position: PipelinePosition,
}

impl<'p> ProjectionTranslator<'p> {
    pub fn compile(ctx: &mut CompilationContext<'p>,
                   input: &'p PlanNode,
                   targets: &'p [(AttributeInfo, Expr)],
                   position: PipelinePosition) -> Result<ProjectionTranslator<'p>, QueryError> {
        let targets = targets.iter().map(|(attribute, expr)| {
            let translator = compile_expression(expr)?;
            ensure!(translator.return_type() == attribute.sql_type,
                    "Projection target {} bound to expression {} of type {}", attribute, expr, translator.return_type());
            Ok((attribute, translator))
        }).collect::<Result<Vec<_>, QueryError>>()?;
        let child = ctx.compile_operator(input, position.pipeline)?;
        Ok(ProjectionTranslator { child, targets, position })
    }
}

impl<'p> OperatorTranslator for ProjectionTranslator<'p> {
    fn name(&self) -> &'static str {
        "Projection"
    }

    fn children(&self) -> Vec<OperatorId> {
        vec![self.child]
    }

    fn produce(&self, ctx: &ExecutionContext) -> Result<(), QueryError> {
        ctx.produce(self.child)
    }

    fn consume(&self, ctx: &ConsumerContext, row: &mut Row) -> Result<(), QueryError> {
        for (attribute, expr) in &self.targets {
            let value = expr.derive_value(row)?;
            row.register_attribute_value(attribute.id, value);
        }
        ctx.exec().consumer(self.position).consume(row)
    }

    fn consume_batch(&self, ctx: &ConsumerContext, batch: &mut RowBatch) -> Result<(), QueryError> {
        let source = SourceRows::new(&*batch);
        let mut projected = project_batch(&source, &self.targets);
        ctx.exec().consumer(self.position).consume_batch(&mut projected)
    }

    fn display_op(&self, alternate: bool) -> String {
        if alternate {
            format!("project[{}]", self.targets.iter().map(|(a, e)| format!("{} = {:?}", a, e)).join(", "))
        } else {
            format!("project[{}]", self.targets.iter().map(|(a, _)| a.to_string()).join(", "))
        }
    }
}

/// Rows of the input batch with the values derived for them so far, shared by all targets of one projected batch
/// so that every input attribute is computed at most once per row.
struct SourceRows<'a> {
    batch: &'a RowBatch<'a>,
    derived: RefCell<FnvHashMap<usize, FnvHashMap<AttributeId, Value>>>,
}

impl<'a> SourceRows<'a> {
    fn new(batch: &'a RowBatch<'a>) -> SourceRows<'a> {
        SourceRows { batch, derived: RefCell::new(FnvHashMap::default()) }
    }

    fn derive_value(&self, tid: usize, expr: &dyn ExpressionTranslator) -> Result<Value, QueryError> {
        // Taken out while evaluating, the expression may read through other projections.
        let cache = self.derived.borrow_mut().remove(&tid).unwrap_or_default();
        let mut row = self.batch.row_with_cache(tid, cache);
        let value = expr.derive_value(&mut row);
        self.derived.borrow_mut().insert(tid, row.into_cache());
        value
    }
}

/// Window over the input rows exposing each target as a lazily evaluated attribute.
fn project_batch<'a, 'p: 'a>(source: &'a SourceRows<'a>,
                             targets: &'a [(&'p AttributeInfo, BoxedExpression<'p>)]) -> RowBatch<'a> {
    let mut projected = source.batch.derive_window();
    for (attribute, expr) in targets {
        projected.add_attribute(attribute.id, Box::new(ProjectedAccess { source, expr: expr.as_ref() }));
    }
    projected
}

struct ProjectedAccess<'a> {
    source: &'a SourceRows<'a>,
    expr: &'a dyn ExpressionTranslator,
}

impl<'a> AttributeAccess for ProjectedAccess<'a> {
    fn access(&self, row: &mut Row) -> Result<Value, QueryError> {
        self.source.derive_value(row.tid(), self.expr)
    }
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;
    use std::rc::Rc;
    use std::sync::Arc;

    use super::*;
    use crate::engine::data_types::SqlType;
    use crate::engine::execution::CompiledQuery;
    use crate::engine::planning::{ArithmeticKind, PlanBuilder};
    use crate::ingest::raw_val::syntax::*;
    use crate::mem_store::DataTable;
    use crate::options::Options;

    #[test]
    fn test_projection_computes_targets() {
        let table = Arc::new(DataTable::new("t", vec![("a", SqlType::Integer), ("b", SqlType::Integer)]));
        table.insert_rows(&[vec![Int(1), Int(10)], vec![Int(2), Null], vec![Int(3), Int(30)]]).unwrap();
        let mut builder = PlanBuilder::new();
        let scan = builder.scan(&table);
        let a = scan.attribute("a").unwrap();
        let b = scan.attribute("b").unwrap();
        let plan = builder.project(scan, vec![
            ("sum", Expr::arithmetic(ArithmeticKind::Add, Expr::col(&a), Expr::col(&b))),
            ("a", Expr::col(&a)),
        ]).unwrap();
        let output = CompiledQuery::compile(&plan, &Options::default().with_batch_size(2)).unwrap().execute().unwrap();
        assert_eq!(output.colnames, vec!["sum".to_string(), "a".to_string()]);
        assert_eq!(output.rows, vec![vec![Int(11), Int(1)], vec![Null, Int(2)], vec![Int(33), Int(3)]]);
    }

    struct CountingAccess {
        calls: Rc<Cell<usize>>,
    }

    impl AttributeAccess for CountingAccess {
        fn access(&self, row: &mut Row) -> Result<Value, QueryError> {
            self.calls.set(self.calls.get() + 1);
            Ok(Value::bigint(row.tid() as i64 + 2))
        }
    }

    #[test]
    fn test_input_attribute_derived_once_per_row() {
        let a = AttributeInfo::new(0, "a", SqlType::BigInt);
        let sum = AttributeInfo::new(1, "sum", SqlType::BigInt);
        let product = AttributeInfo::new(2, "product", SqlType::BigInt);
        let sum_expr = Expr::arithmetic(ArithmeticKind::Add, Expr::col(&a), Expr::col(&a));
        let product_expr = Expr::arithmetic(ArithmeticKind::Multiply, Expr::col(&a), Expr::col(&a));
        let targets = vec![
            (&sum, compile_expression(&sum_expr).unwrap()),
            (&product, compile_expression(&product_expr).unwrap()),
        ];

        let calls = Rc::new(Cell::new(0));
        let mut input = RowBatch::new(2);
        input.add_attribute(a.id, Box::new(CountingAccess { calls: calls.clone() }));
        let source = SourceRows::new(&input);
        let projected = project_batch(&source, &targets);

        let mut row = projected.row(1);
        assert_eq!(row.derive_value(sum.id).unwrap(), Value::bigint(6));
        assert_eq!(row.derive_value(product.id).unwrap(), Value::bigint(9));
        assert_eq!(calls.get(), 1);

        let mut row = projected.row(0);
        assert_eq!(row.derive_value(product.id).unwrap(), Value::bigint(4));
        assert_eq!(calls.get(), 2);
    }
}
