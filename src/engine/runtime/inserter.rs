use std::fmt;
use std::mem;
use std::sync::Arc;

use crate::engine::data_types::Value;
use crate::engine::runtime::{CompactStorage, VarlenPool};
use crate::mem_store::{DataTable, TileGroup};
use crate::QueryError;

pub const TILE_GROUP_SIZE: usize = 1024;

/// Stages tuples for a `DataTable`. Staged tuples become visible to scans only once `finish` publishes them,
/// `tear_down` discards whatever was not published.
#[derive(Default)]
pub struct Inserter {
    state: InserterState,
}

#[derive(Default)]
enum InserterState {
    #[default]
    Uninitialized,
    Active(Staging),
    TornDown,
}

struct Staging {
    table: Arc<DataTable>,
    tile_groups: Vec<TileGroup>,
    pending: bool,
    published: usize,
}

/// Storage for one tuple handed out by `allocate_tuple_storage`.
pub struct TupleSlot<'a> {
    storage: &'a mut [u8],
    pool: &'a mut VarlenPool,
    layout: &'a CompactStorage,
}

impl<'a> TupleSlot<'a> {
    pub fn set_value(&mut self, index: usize, value: &Value) -> Result<(), QueryError> {
        self.layout.set_value(self.storage, index, value, self.pool)
    }

    pub fn store(&mut self, values: &[Value]) -> Result<(), QueryError> {
        self.layout.store_values(self.storage, values, self.pool)
    }
}

impl Inserter {
    pub fn new() -> Inserter {
        Inserter::default()
    }

    pub fn init(&mut self, table: Arc<DataTable>) -> Result<(), QueryError> {
        match self.state {
            InserterState::Uninitialized => {
                self.state = InserterState::Active(Staging {
                    table,
                    tile_groups: Vec::new(),
                    pending: false,
                    published: 0,
                });
                Ok(())
            }
            InserterState::Active(_) => Err(fatal!("Inserter initialized twice")),
            InserterState::TornDown => Err(fatal!("Inserter initialized after tear_down")),
        }
    }

    /// Zeroed storage for the next tuple, committed by `insert`.
    pub fn allocate_tuple_storage(&mut self) -> Result<TupleSlot<'_>, QueryError> {
        let staging = self.active_mut("allocate_tuple_storage")?;
        staging.pending = true;
        let (storage, pool, layout) = staging.current_tile_group()?.reserve_tuple();
        Ok(TupleSlot { storage, pool, layout })
    }

    /// Pool owning the varchar payloads of the tile group currently being filled.
    pub fn get_pool(&mut self) -> Result<&mut VarlenPool, QueryError> {
        Ok(self.active_mut("get_pool")?.current_tile_group()?.pool_mut())
    }

    /// Commits the tuple written into the last allocated storage.
    pub fn insert(&mut self) -> Result<(), QueryError> {
        let staging = self.active_mut("insert")?;
        ensure!(staging.pending, "Inserter::insert called without allocated tuple storage");
        let tile_group = staging.tile_groups
            .last_mut()
            .ok_or_else(|| fatal!("Inserter has no tile group to commit to"))?;
        tile_group.commit_tuple()?;
        staging.pending = false;
        Ok(())
    }

    /// Stages a complete tuple. Values must match the table schema exactly.
    pub fn insert_values(&mut self, values: &[Value]) -> Result<(), QueryError> {
        self.active_mut("insert_values")?.table.layout().check_values(values)?;
        self.allocate_tuple_storage()?.store(values)?;
        self.insert()
    }

    /// Publishes all staged tuples to the table in one step and returns their number.
    pub fn finish(&mut self) -> Result<usize, QueryError> {
        let staging = self.active_mut("finish")?;
        staging.pending = false;
        let tile_groups = mem::take(&mut staging.tile_groups)
            .into_iter()
            .filter(|tg| !tg.is_empty())
            .collect::<Vec<_>>();
        let rows = tile_groups.iter().map(|tg| tg.len()).sum::<usize>();
        staging.table.publish(tile_groups)?;
        staging.published += rows;
        log::debug!("Published {} rows to table {}", rows, staging.table.name());
        Ok(rows)
    }

    pub fn num_staged(&self) -> usize {
        match self.state {
            InserterState::Active(ref staging) => staging.tile_groups.iter().map(|tg| tg.len()).sum(),
            _ => 0,
        }
    }

    pub fn tear_down(&mut self) -> Result<(), QueryError> {
        match mem::replace(&mut self.state, InserterState::TornDown) {
            InserterState::Active(staging) => {
                let discarded = staging.tile_groups.iter().map(|tg| tg.len()).sum::<usize>();
                if discarded > 0 {
                    log::debug!("Discarding {} unpublished rows for table {}", discarded, staging.table.name());
                }
                Ok(())
            }
            InserterState::Uninitialized => Err(fatal!("Inserter::tear_down called before init")),
            InserterState::TornDown => Err(fatal!("Inserter torn down twice")),
        }
    }

    fn active_mut(&mut self, operation: &str) -> Result<&mut Staging, QueryError> {
        match self.state {
            InserterState::Active(ref mut staging) => Ok(staging),
            InserterState::Uninitialized => Err(fatal!("Inserter::{} called before init", operation)),
            InserterState::TornDown => Err(fatal!("Inserter::{} called after tear_down", operation)),
        }
    }
}

impl Staging {
    fn current_tile_group(&mut self) -> Result<&mut TileGroup, QueryError> {
        let full = self.tile_groups.last().map(|tg| tg.len() >= TILE_GROUP_SIZE).unwrap_or(true);
        if full {
            self.tile_groups.push(TileGroup::new(self.table.layout().clone()));
        }
        self.tile_groups.last_mut().ok_or_else(|| fatal!("Inserter has no tile group"))
    }
}

impl fmt::Debug for Inserter {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self.state {
            InserterState::Uninitialized => write!(f, "Inserter(uninitialized)"),
            InserterState::Active(ref staging) =>
                write!(f, "Inserter({}, staged: {}, published: {})", staging.table.name(), self.num_staged(), staging.published),
            InserterState::TornDown => write!(f, "Inserter(torn down)"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::data_types::SqlType;

    fn table() -> Arc<DataTable> {
        Arc::new(DataTable::new("t", vec![("id", SqlType::BigInt), ("name", SqlType::Varchar)]))
    }

    #[test]
    fn test_rows_visible_after_finish() {
        let table = table();
        let mut inserter = Inserter::new();
        inserter.init(table.clone()).unwrap();
        for i in 0..(TILE_GROUP_SIZE as i64 + 10) {
            inserter.insert_values(&[Value::bigint(i), Value::varchar(format!("n{}", i))]).unwrap();
        }
        assert_eq!(table.num_tuples().unwrap(), 0);
        assert_eq!(inserter.finish().unwrap(), TILE_GROUP_SIZE + 10);
        assert_eq!(table.num_tuples().unwrap(), TILE_GROUP_SIZE + 10);
        let snapshot = table.scan_snapshot().unwrap();
        assert_eq!(snapshot.len(), 2);
        assert_eq!(snapshot[1].load_tuple(9).unwrap(), vec![Value::bigint(TILE_GROUP_SIZE as i64 + 9), Value::varchar("n1033")]);
        inserter.tear_down().unwrap();
    }

    #[test]
    fn test_tear_down_discards_staged_rows() {
        let table = table();
        let mut inserter = Inserter::new();
        inserter.init(table.clone()).unwrap();
        {
            let mut slot = inserter.allocate_tuple_storage().unwrap();
            slot.set_value(0, &Value::bigint(1)).unwrap();
            slot.set_value(1, &Value::null(SqlType::Varchar)).unwrap();
        }
        inserter.insert().unwrap();
        assert_eq!(inserter.num_staged(), 1);
        inserter.tear_down().unwrap();
        assert_eq!(table.num_tuples().unwrap(), 0);
    }

    #[test]
    fn test_lifecycle_enforced() {
        let mut inserter = Inserter::new();
        assert!(matches!(inserter.insert(), Err(QueryError::FatalError(_))));
        assert!(matches!(inserter.tear_down(), Err(QueryError::FatalError(_))));
        let mut inserter = Inserter::new();
        inserter.init(table()).unwrap();
        assert!(matches!(inserter.insert(), Err(QueryError::FatalError(_))));
        let result = inserter.insert_values(&[Value::integer(1), Value::varchar("x")]);
        assert!(matches!(result, Err(QueryError::SchemaMismatch(_))));
        assert_eq!(inserter.num_staged(), 0);
        inserter.tear_down().unwrap();
        assert!(matches!(inserter.finish(), Err(QueryError::FatalError(_))));
    }
}
