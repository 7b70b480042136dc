use std::fmt;
use std::sync::Arc;

use itertools::Itertools;

use crate::engine::data_types::{AttributeInfo, SqlType};
use crate::engine::planning::Expr;
use crate::mem_store::DataTable;
use crate::QueryError;

#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
pub enum AggregateKind {
    CountStar,
    Count,
    Sum,
    Min,
    Max,
    Avg,
}

impl AggregateKind {
    /// Type of the aggregate's result for the given input type. `COUNT(*)` has no input.
    pub fn output_type(self, input: Option<SqlType>) -> Result<SqlType, QueryError> {
        match (self, input) {
            (AggregateKind::CountStar, _) | (AggregateKind::Count, Some(_)) => Ok(SqlType::BigInt),
            (AggregateKind::Sum, Some(t)) if t.is_integral() => Ok(SqlType::BigInt),
            (AggregateKind::Sum, Some(SqlType::Decimal)) | (AggregateKind::Avg, Some(SqlType::Decimal)) => Ok(SqlType::Decimal),
            (AggregateKind::Avg, Some(t)) if t.is_integral() => Ok(SqlType::Decimal),
            (AggregateKind::Min, Some(t)) | (AggregateKind::Max, Some(t)) => Ok(t),
            (kind, Some(t)) => bail!(QueryError::TypeError, "{} is not defined for {}", kind, t),
            (kind, None) => Err(fatal!("{} requires an input expression", kind)),
        }
    }
}

impl fmt::Display for AggregateKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let name = match self {
            AggregateKind::CountStar => "count(*)",
            AggregateKind::Count => "count",
            AggregateKind::Sum => "sum",
            AggregateKind::Min => "min",
            AggregateKind::Max => "max",
            AggregateKind::Avg => "avg",
        };
        write!(f, "{}", name)
    }
}

/// One aggregate of an `Aggregate` node and the attribute its result is exposed as.
#[derive(Debug, Clone, PartialEq)]
pub struct AggregateTerm {
    pub kind: AggregateKind,
    pub expr: Option<Expr>,
    pub output: AttributeInfo,
}

/// Bound, typed physical plan. Every node names its output columns through `AttributeInfo`s.
#[derive(Debug, Clone)]
pub enum PlanNode {
    SeqScan {
        table: Arc<DataTable>,
        columns: Vec<(usize, AttributeInfo)>,
        predicate: Option<Expr>,
    },
    Projection {
        input: Box<PlanNode>,
        targets: Vec<(AttributeInfo, Expr)>,
    },
    Aggregate {
        input: Box<PlanNode>,
        group_by: Vec<AttributeInfo>,
        aggregates: Vec<AggregateTerm>,
        having: Option<Expr>,
        estimated_groups: Option<usize>,
        prefetch: Option<bool>,
    },
    Insert {
        input: Box<PlanNode>,
        table: Arc<DataTable>,
    },
}

impl PlanNode {
    pub fn output_attributes(&self) -> Vec<AttributeInfo> {
        match *self {
            PlanNode::SeqScan { ref columns, .. } => columns.iter().map(|(_, a)| a.clone()).collect(),
            PlanNode::Projection { ref targets, .. } => targets.iter().map(|(a, _)| a.clone()).collect(),
            PlanNode::Aggregate { ref group_by, ref aggregates, .. } => group_by
                .iter()
                .cloned()
                .chain(aggregates.iter().map(|a| a.output.clone()))
                .collect(),
            PlanNode::Insert { .. } => vec![],
        }
    }

    pub fn attribute(&self, name: &str) -> Result<AttributeInfo, QueryError> {
        self.output_attributes()
            .into_iter()
            .find(|a| a.name == name)
            .ok_or_else(|| QueryError::TypeError(format!(
                "no column {} in [{}]", name, self.output_attributes().iter().map(|a| &a.name).join(", "))))
    }

    /// Upstream estimate of the number of rows the node produces.
    pub fn estimated_cardinality(&self) -> usize {
        match *self {
            PlanNode::SeqScan { ref table, .. } => table.num_tuples().unwrap_or(0),
            PlanNode::Projection { ref input, .. } | PlanNode::Insert { ref input, .. } => input.estimated_cardinality(),
            PlanNode::Aggregate { ref input, ref group_by, estimated_groups, .. } => {
                if group_by.is_empty() {
                    1
                } else {
                    estimated_groups.unwrap_or_else(|| input.estimated_cardinality())
                }
            }
        }
    }

    pub fn name(&self) -> &'static str {
        match *self {
            PlanNode::SeqScan { .. } => "SeqScan",
            PlanNode::Projection { .. } => "Projection",
            PlanNode::Aggregate { ref group_by, .. } if group_by.is_empty() => "GlobalGroupBy",
            PlanNode::Aggregate { .. } => "HashGroupBy",
            PlanNode::Insert { .. } => "Insert",
        }
    }

    /// Restricts the rows of a scan.
    pub fn filter(self, condition: Expr) -> Result<PlanNode, QueryError> {
        match self {
            PlanNode::SeqScan { table, columns, predicate } => {
                let predicate = match predicate {
                    Some(existing) => Expr::and(existing, condition),
                    None => condition,
                };
                if predicate.return_type()? != SqlType::Boolean {
                    bail!(QueryError::TypeError, "scan predicate {} is not boolean", predicate);
                }
                Ok(PlanNode::SeqScan { table, columns, predicate: Some(predicate) })
            }
            other => Err(QueryError::NotImplemented(format!("filter on {}", other.name()))),
        }
    }

    pub fn having(self, condition: Expr) -> Result<PlanNode, QueryError> {
        match self {
            PlanNode::Aggregate { input, group_by, aggregates, estimated_groups, prefetch, .. } => {
                if condition.return_type()? != SqlType::Boolean {
                    bail!(QueryError::TypeError, "having clause {} is not boolean", condition);
                }
                Ok(PlanNode::Aggregate { input, group_by, aggregates, having: Some(condition), estimated_groups, prefetch })
            }
            other => Err(QueryError::NotImplemented(format!("having on {}", other.name()))),
        }
    }

    /// Hint for the number of groups, used to pre-size the hash table.
    pub fn with_estimated_groups(mut self, groups: usize) -> PlanNode {
        if let PlanNode::Aggregate { ref mut estimated_groups, .. } = self {
            *estimated_groups = Some(groups);
        }
        self
    }

    pub fn with_prefetch(mut self, enabled: bool) -> PlanNode {
        if let PlanNode::Aggregate { ref mut prefetch, .. } = self {
            *prefetch = Some(enabled);
        }
        self
    }
}
