use std::cmp::Ordering;
use std::fmt;

use itertools::Itertools;

use crate::engine::data_types::{SqlType, Value};
use crate::engine::planning::AggregateKind;
use crate::engine::runtime::{CompactStorage, VarlenPool};
use crate::QueryError;

#[derive(Debug, Clone, Copy, PartialEq)]
struct AggregateInfo {
    kind: AggregateKind,
    input_type: Option<SqlType>,
    output_type: SqlType,
    /// Storage field holding the running value (the sum for AVG).
    field: usize,
    /// Storage field holding the non-null input count of AVG.
    count_field: Option<usize>,
}

/// Computes the per-group storage layout of a list of aggregates and implements their initialization,
/// advance and finalization on raw group storage.
///
/// Integral inputs of any width are summed in 64 bits with overflow detection. A group whose inputs are all null
/// reports null for SUM, MIN, MAX and AVG and 0 for COUNT.
#[derive(Clone, PartialEq)]
pub struct Aggregation {
    aggregates: Vec<AggregateInfo>,
    storage: CompactStorage,
}

impl Aggregation {
    pub fn setup(terms: &[(AggregateKind, Option<SqlType>)]) -> Result<Aggregation, QueryError> {
        let mut aggregates = Vec::with_capacity(terms.len());
        let mut fields = Vec::with_capacity(terms.len());
        for &(kind, input_type) in terms {
            let output_type = kind.output_type(input_type)?;
            let field = fields.len();
            let count_field = match kind {
                AggregateKind::Avg => {
                    let sum_type = if output_type == SqlType::Decimal && input_type != Some(SqlType::Decimal) {
                        SqlType::BigInt
                    } else {
                        output_type
                    };
                    fields.push(sum_type);
                    fields.push(SqlType::BigInt);
                    Some(field + 1)
                }
                _ => {
                    fields.push(output_type);
                    None
                }
            };
            aggregates.push(AggregateInfo { kind, input_type, output_type, field, count_field });
        }
        Ok(Aggregation { aggregates, storage: CompactStorage::setup(&fields) })
    }

    /// Bytes of group storage needed for all aggregates.
    pub fn storage_size(&self) -> usize {
        self.storage.storage_size()
    }

    pub fn num_aggregates(&self) -> usize {
        self.aggregates.len()
    }

    pub fn output_types(&self) -> Vec<SqlType> {
        self.aggregates.iter().map(|a| a.output_type).collect()
    }

    /// State of a group that has not seen any row.
    pub fn create_empty_values(&self, space: &mut [u8], pool: &mut VarlenPool) -> Result<(), QueryError> {
        for aggregate in &self.aggregates {
            match aggregate.kind {
                AggregateKind::Count | AggregateKind::CountStar => {
                    self.storage.set_value(space, aggregate.field, &Value::bigint(0), pool)?;
                }
                _ => {
                    let field_type = self.storage.types()[aggregate.field];
                    self.storage.set_value(space, aggregate.field, &Value::null(field_type), pool)?;
                }
            }
            if let Some(count_field) = aggregate.count_field {
                self.storage.set_value(space, count_field, &Value::bigint(0), pool)?;
            }
        }
        Ok(())
    }

    /// Initializes the storage of a new group with the contribution of its first row.
    /// `inputs` holds one value per aggregate, the entry for `COUNT(*)` is ignored.
    pub fn create_initial_values(&self, space: &mut [u8], inputs: &[Value], pool: &mut VarlenPool) -> Result<(), QueryError> {
        self.create_empty_values(space, pool)?;
        self.advance_values(space, inputs, pool)
    }

    /// Folds one more row into the storage of an existing group.
    pub fn advance_values(&self, space: &mut [u8], inputs: &[Value], pool: &mut VarlenPool) -> Result<(), QueryError> {
        ensure!(inputs.len() == self.aggregates.len(),
                "Aggregation over {} aggregates advanced with {} inputs", self.aggregates.len(), inputs.len());
        for (aggregate, input) in self.aggregates.iter().zip(inputs) {
            if aggregate.kind == AggregateKind::CountStar {
                self.increment(space, aggregate.field, pool)?;
                continue;
            }
            if input.is_null() {
                continue;
            }
            match aggregate.kind {
                AggregateKind::Count => self.increment(space, aggregate.field, pool)?,
                AggregateKind::Sum => self.add(space, aggregate.field, input, pool)?,
                AggregateKind::Avg => {
                    self.add(space, aggregate.field, input, pool)?;
                    if let Some(count_field) = aggregate.count_field {
                        self.increment(space, count_field, pool)?;
                    }
                }
                AggregateKind::Min => self.replace_if(space, aggregate.field, input, Ordering::Less, pool)?,
                AggregateKind::Max => self.replace_if(space, aggregate.field, input, Ordering::Greater, pool)?,
                AggregateKind::CountStar => {}
            }
        }
        Ok(())
    }

    /// Final values of all aggregates of a group, in declaration order.
    pub fn finalize_values(&self, space: &[u8], pool: &VarlenPool) -> Result<Vec<Value>, QueryError> {
        self.aggregates.iter().map(|aggregate| {
            let value = self.storage.load_value(space, aggregate.field, pool)?;
            match (aggregate.kind, aggregate.count_field) {
                (AggregateKind::Avg, Some(count_field)) => {
                    let count = self.storage.load_value(space, count_field, pool)?.as_i64()?;
                    if value.is_null() || count == 0 {
                        Ok(Value::null(SqlType::Decimal))
                    } else {
                        Ok(Value::decimal(value.as_f64()? / count as f64))
                    }
                }
                _ => Ok(value),
            }
        }).collect()
    }

    fn increment(&self, space: &mut [u8], field: usize, pool: &mut VarlenPool) -> Result<(), QueryError> {
        let count = self.storage.load_value(space, field, pool)?.as_i64()?;
        self.storage.set_value(space, field, &Value::bigint(count + 1), pool)
    }

    fn add(&self, space: &mut [u8], field: usize, input: &Value, pool: &mut VarlenPool) -> Result<(), QueryError> {
        let current = self.storage.load_value(space, field, pool)?;
        let sum = match current.sql_type() {
            SqlType::Decimal => {
                let base = if current.is_null() { 0.0 } else { current.as_f64()? };
                Value::decimal(base + input.as_f64()?)
            }
            _ => {
                let base = if current.is_null() { 0 } else { current.as_i64()? };
                Value::bigint(base.checked_add(input.as_i64()?).ok_or(QueryError::Overflow)?)
            }
        };
        self.storage.set_value(space, field, &sum, pool)
    }

    fn replace_if(&self, space: &mut [u8], field: usize, input: &Value, wanted: Ordering, pool: &mut VarlenPool) -> Result<(), QueryError> {
        let current = self.storage.load_value(space, field, pool)?;
        if current.is_null() || input.compare(&current)? == wanted {
            self.storage.set_value(space, field, input, pool)?;
        }
        Ok(())
    }
}

impl fmt::Debug for Aggregation {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "Aggregation[{}] ({} bytes)", self.aggregates.iter().map(|a| match a.input_type {
            Some(t) => format!("{}({})", a.kind, t),
            None => a.kind.to_string(),
        }).join(", "), self.storage_size())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn aggregation() -> Aggregation {
        Aggregation::setup(&[
            (AggregateKind::Sum, Some(SqlType::Integer)),
            (AggregateKind::Count, Some(SqlType::Integer)),
            (AggregateKind::CountStar, None),
            (AggregateKind::Min, Some(SqlType::Varchar)),
            (AggregateKind::Max, Some(SqlType::Integer)),
            (AggregateKind::Avg, Some(SqlType::Integer)),
        ]).unwrap()
    }

    fn inputs(i: Option<i32>, s: Option<&str>) -> Vec<Value> {
        let i = i.map(Value::integer).unwrap_or(Value::null(SqlType::Integer));
        let s = s.map(Value::varchar).unwrap_or(Value::null(SqlType::Varchar));
        vec![i.clone(), i.clone(), Value::null(SqlType::BigInt), s, i.clone(), i]
    }

    #[test]
    fn test_output_types() {
        assert_eq!(aggregation().output_types(), vec![
            SqlType::BigInt, SqlType::BigInt, SqlType::BigInt, SqlType::Varchar, SqlType::Integer, SqlType::Decimal,
        ]);
        let invalid = Aggregation::setup(&[(AggregateKind::Avg, Some(SqlType::Boolean))]);
        assert!(matches!(invalid, Err(QueryError::TypeError(_))));
    }

    #[test]
    fn test_advance_and_finalize() {
        let aggregation = aggregation();
        let mut pool = VarlenPool::new();
        let mut space = vec![0u8; aggregation.storage_size()];
        aggregation.create_initial_values(&mut space, &inputs(Some(4), Some("m")), &mut pool).unwrap();
        aggregation.advance_values(&mut space, &inputs(None, Some("b")), &mut pool).unwrap();
        aggregation.advance_values(&mut space, &inputs(Some(1), None), &mut pool).unwrap();
        assert_eq!(aggregation.finalize_values(&space, &pool).unwrap(), vec![
            Value::bigint(5),
            Value::bigint(2),
            Value::bigint(3),
            Value::varchar("b"),
            Value::integer(4),
            Value::decimal(2.5),
        ]);
    }

    #[test]
    fn test_all_null_group() {
        let aggregation = aggregation();
        let mut pool = VarlenPool::new();
        let mut space = vec![0u8; aggregation.storage_size()];
        aggregation.create_initial_values(&mut space, &inputs(None, None), &mut pool).unwrap();
        aggregation.advance_values(&mut space, &inputs(None, None), &mut pool).unwrap();
        assert_eq!(aggregation.finalize_values(&space, &pool).unwrap(), vec![
            Value::null(SqlType::BigInt),
            Value::bigint(0),
            Value::bigint(2),
            Value::null(SqlType::Varchar),
            Value::null(SqlType::Integer),
            Value::null(SqlType::Decimal),
        ]);
    }

    #[test]
    fn test_sum_overflow() {
        let aggregation = Aggregation::setup(&[(AggregateKind::Sum, Some(SqlType::BigInt))]).unwrap();
        let mut pool = VarlenPool::new();
        let mut space = vec![0u8; aggregation.storage_size()];
        aggregation.create_initial_values(&mut space, &[Value::bigint(i64::MAX)], &mut pool).unwrap();
        let result = aggregation.advance_values(&mut space, &[Value::bigint(1)], &mut pool);
        assert!(matches!(result, Err(QueryError::Overflow)));
    }

    #[test]
    fn test_decimal_sum_and_avg() {
        let aggregation = Aggregation::setup(&[
            (AggregateKind::Sum, Some(SqlType::Decimal)),
            (AggregateKind::Avg, Some(SqlType::Decimal)),
        ]).unwrap();
        let mut pool = VarlenPool::new();
        let mut space = vec![0u8; aggregation.storage_size()];
        aggregation.create_initial_values(&mut space, &[Value::decimal(0.5), Value::decimal(0.5)], &mut pool).unwrap();
        aggregation.advance_values(&mut space, &[Value::decimal(1.0), Value::decimal(1.0)], &mut pool).unwrap();
        assert_eq!(aggregation.finalize_values(&space, &pool).unwrap(), vec![Value::decimal(1.5), Value::decimal(0.75)]);
    }
}
