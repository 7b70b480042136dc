use std::sync::Arc;

use crate::engine::data_types::{AttributeInfo, SqlType};
use crate::engine::planning::{AggregateKind, AggregateTerm, Expr, PlanNode};
use crate::mem_store::DataTable;
use crate::QueryError;

/// Builds bound plans by hand, allocating a fresh attribute id for every column a node produces.
#[derive(Debug, Default)]
pub struct PlanBuilder {
    next_id: u32,
}

impl PlanBuilder {
    pub fn new() -> PlanBuilder {
        PlanBuilder::default()
    }

    pub fn attribute(&mut self, name: &str, sql_type: SqlType) -> AttributeInfo {
        let attribute = AttributeInfo::new(self.next_id, name, sql_type);
        self.next_id += 1;
        attribute
    }

    /// Scan of all columns of `table`.
    pub fn scan(&mut self, table: &Arc<DataTable>) -> PlanNode {
        let columns = table.columns()
            .iter()
            .enumerate()
            .map(|(i, c)| (i, self.attribute(&c.name, c.sql_type)))
            .collect();
        PlanNode::SeqScan { table: table.clone(), columns, predicate: None }
    }

    pub fn project(&mut self, input: PlanNode, targets: Vec<(&str, Expr)>) -> Result<PlanNode, QueryError> {
        let mut bound = Vec::with_capacity(targets.len());
        for (name, expr) in targets {
            let mut attribute = self.attribute(name, expr.return_type()?);
            attribute.nullable = expr.nullable();
            bound.push((attribute, expr));
        }
        Ok(PlanNode::Projection { input: Box::new(input), targets: bound })
    }

    /// Groups `input` by the named columns. An empty `group_by` computes a single global group.
    pub fn aggregate(&mut self,
                     input: PlanNode,
                     group_by: &[&str],
                     aggregates: Vec<(&str, AggregateKind, Option<Expr>)>) -> Result<PlanNode, QueryError> {
        let group_by = group_by.iter().map(|name| input.attribute(name)).collect::<Result<Vec<_>, _>>()?;
        let mut terms = Vec::with_capacity(aggregates.len());
        for (name, kind, expr) in aggregates {
            let input_type = match expr {
                Some(ref e) => Some(e.return_type()?),
                None => None,
            };
            let mut output = self.attribute(name, kind.output_type(input_type)?);
            output.nullable = !matches!(kind, AggregateKind::Count | AggregateKind::CountStar);
            terms.push(AggregateTerm { kind, expr, output });
        }
        Ok(PlanNode::Aggregate {
            input: Box::new(input),
            group_by,
            aggregates: terms,
            having: None,
            estimated_groups: None,
            prefetch: None,
        })
    }

    pub fn insert(&mut self, input: PlanNode, table: &Arc<DataTable>) -> Result<PlanNode, QueryError> {
        let produced = input.output_attributes();
        if produced.len() != table.columns().len() {
            bail!(QueryError::SchemaMismatch, "insert into {} with {} columns from input with {} columns",
                  table.name(), table.columns().len(), produced.len());
        }
        for (attribute, column) in produced.iter().zip(table.columns()) {
            if attribute.sql_type != column.sql_type && !(attribute.sql_type.is_numeric() && column.sql_type.is_numeric()) {
                bail!(QueryError::SchemaMismatch, "cannot insert {} into column {} {}", attribute, column.name, column.sql_type);
            }
        }
        Ok(PlanNode::Insert { input: Box::new(input), table: table.clone() })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_attribute_ids_unique() {
        let table = Arc::new(DataTable::new("t", vec![("k", SqlType::Integer), ("v", SqlType::Decimal)]));
        let mut builder = PlanBuilder::new();
        let scan = builder.scan(&table);
        let k = scan.attribute("k").unwrap();
        let v = scan.attribute("v").unwrap();
        let plan = builder.aggregate(scan, &["k"], vec![
            ("total", AggregateKind::Sum, Some(Expr::col(&v))),
            ("n", AggregateKind::CountStar, None),
        ]).unwrap();
        let outputs = plan.output_attributes();
        assert_eq!(outputs.iter().map(|a| a.id.0).collect::<Vec<_>>(), vec![k.id.0, 2, 3]);
        assert_eq!(outputs[1].sql_type, SqlType::Decimal);
        assert!(!outputs[2].nullable);
    }

    #[test]
    fn test_sum_of_varchar_rejected() {
        let table = Arc::new(DataTable::new("t", vec![("s", SqlType::Varchar)]));
        let mut builder = PlanBuilder::new();
        let scan = builder.scan(&table);
        let s = scan.attribute("s").unwrap();
        let result = builder.aggregate(scan, &[], vec![("x", AggregateKind::Sum, Some(Expr::col(&s)))]);
        assert!(matches!(result, Err(QueryError::TypeError(_))));
    }
}
