use std::fmt;
use std::sync::{Arc, RwLock};

use itertools::Itertools;

use crate::engine::data_types::{SqlType, Value};
use crate::engine::runtime::{CompactStorage, Inserter};
use crate::ingest::raw_val::RawVal;
use crate::mem_store::TileGroup;
use crate::QueryError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnSchema {
    pub name: String,
    pub sql_type: SqlType,
}

/// Named in-memory table. Data is held in immutable tile groups, so a scan works on a snapshot and
/// never blocks concurrent inserts.
pub struct DataTable {
    name: String,
    columns: Vec<ColumnSchema>,
    layout: CompactStorage,
    tile_groups: RwLock<Vec<Arc<TileGroup>>>,
}

impl DataTable {
    pub fn new(name: &str, columns: Vec<(&str, SqlType)>) -> DataTable {
        let columns = columns
            .into_iter()
            .map(|(name, sql_type)| ColumnSchema { name: name.to_string(), sql_type })
            .collect::<Vec<_>>();
        let layout = CompactStorage::setup(&columns.iter().map(|c| c.sql_type).collect::<Vec<_>>());
        DataTable {
            name: name.to_string(),
            columns,
            layout,
            tile_groups: RwLock::default(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn columns(&self) -> &[ColumnSchema] {
        &self.columns
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == name)
    }

    pub fn layout(&self) -> &CompactStorage {
        &self.layout
    }

    /// Published tile groups at the time of the call.
    pub fn scan_snapshot(&self) -> Result<Vec<Arc<TileGroup>>, QueryError> {
        let tile_groups = self.tile_groups.read().map_err(|_| fatal!("Tile group lock of {} poisoned", self.name))?;
        Ok(tile_groups.clone())
    }

    pub fn num_tuples(&self) -> Result<usize, QueryError> {
        Ok(self.scan_snapshot()?.iter().map(|tg| tg.len()).sum())
    }

    pub(crate) fn publish(&self, tile_groups: Vec<TileGroup>) -> Result<(), QueryError> {
        if tile_groups.is_empty() {
            return Ok(());
        }
        let mut published = self.tile_groups.write().map_err(|_| fatal!("Tile group lock of {} poisoned", self.name))?;
        published.extend(tile_groups.into_iter().map(Arc::new));
        Ok(())
    }

    /// Loads rows of raw values. Either all rows are published or, on error, none.
    pub fn insert_rows(self: &Arc<Self>, rows: &[Vec<RawVal>]) -> Result<usize, QueryError> {
        let mut inserter = Inserter::new();
        inserter.init(self.clone())?;
        let result = self.stage_rows(&mut inserter, rows).and_then(|_| inserter.finish());
        inserter.tear_down()?;
        result
    }

    fn stage_rows(&self, inserter: &mut Inserter, rows: &[Vec<RawVal>]) -> Result<(), QueryError> {
        for row in rows {
            if row.len() != self.columns.len() {
                bail!(QueryError::SchemaMismatch, "table {} has {} columns, row has {} values",
                      self.name, self.columns.len(), row.len());
            }
            let values = row.iter()
                .zip(self.columns.iter())
                .map(|(raw, column)| Value::from_raw(raw, column.sql_type))
                .collect::<Result<Vec<_>, _>>()?;
            inserter.insert_values(&values)?;
        }
        Ok(())
    }
}

impl fmt::Debug for DataTable {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "DataTable {}({})", self.name,
               self.columns.iter().map(|c| format!("{} {}", c.name, c.sql_type)).join(", "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingest::raw_val::syntax::*;

    #[test]
    fn test_insert_rows_all_or_nothing() {
        let table = Arc::new(DataTable::new("t", vec![("k", SqlType::Integer), ("v", SqlType::Decimal)]));
        assert_eq!(table.insert_rows(&[vec![Int(1), Float(0.5)], vec![Int(2), Null]]).unwrap(), 2);
        let result = table.insert_rows(&[vec![Int(3), Float(1.0)], vec![Str("x"), Float(1.0)]]);
        assert!(matches!(result, Err(QueryError::SchemaMismatch(_))));
        assert_eq!(table.num_tuples().unwrap(), 2);
        let snapshot = table.scan_snapshot().unwrap();
        assert_eq!(snapshot[0].load_tuple(1).unwrap(), vec![Value::integer(2), Value::null(SqlType::Decimal)]);
    }

    #[test]
    fn test_snapshot_unaffected_by_later_inserts() {
        let table = Arc::new(DataTable::new("t", vec![("k", SqlType::BigInt)]));
        table.insert_rows(&[vec![Int(1)]]).unwrap();
        let snapshot = table.scan_snapshot().unwrap();
        table.insert_rows(&[vec![Int(2)]]).unwrap();
        assert_eq!(snapshot.iter().map(|tg| tg.len()).sum::<usize>(), 1);
        assert_eq!(table.num_tuples().unwrap(), 2);
    }
}
