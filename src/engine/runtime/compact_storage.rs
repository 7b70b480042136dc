use byteorder::{ByteOrder, LittleEndian};
use itertools::Itertools;

use crate::bitvec::{bytes_for_bits, BitVec, BitVecMut};
use crate::engine::data_types::{Datum, SqlType, Value};
use crate::engine::runtime::VarlenPool;
use crate::QueryError;

/// Fixed layout for a tuple of typed values: fields are packed back to back in declaration order,
/// followed by a null bitmap. Varchar fields hold a handle into a `VarlenPool`.
#[derive(Debug, Clone, PartialEq)]
pub struct CompactStorage {
    types: Vec<SqlType>,
    offsets: Vec<usize>,
    null_bitmap_offset: usize,
    storage_size: usize,
}

impl CompactStorage {
    pub fn setup(types: &[SqlType]) -> CompactStorage {
        let mut offsets = Vec::with_capacity(types.len());
        let mut offset = 0;
        for t in types {
            offsets.push(offset);
            offset += t.storage_size();
        }
        CompactStorage {
            types: types.to_vec(),
            offsets,
            null_bitmap_offset: offset,
            storage_size: offset + bytes_for_bits(types.len()),
        }
    }

    pub fn storage_size(&self) -> usize {
        self.storage_size
    }

    pub fn types(&self) -> &[SqlType] {
        &self.types
    }

    pub fn num_fields(&self) -> usize {
        self.types.len()
    }

    /// Fails with `SchemaMismatch` unless `values` has exactly the declared arity and types.
    pub fn check_values(&self, values: &[Value]) -> Result<(), QueryError> {
        if values.len() != self.types.len() {
            bail!(QueryError::SchemaMismatch, "expected {} values ({}), got {}",
                  self.types.len(), self.types.iter().join(", "), values.len());
        }
        for (i, (value, t)) in values.iter().zip(self.types.iter()).enumerate() {
            if value.sql_type() != *t {
                bail!(QueryError::SchemaMismatch, "field {} has type {}, got {}", i, t, value);
            }
        }
        Ok(())
    }

    /// Writes all values. The tuple is validated before any byte is written.
    pub fn store_values(&self, space: &mut [u8], values: &[Value], pool: &mut VarlenPool) -> Result<(), QueryError> {
        self.check_values(values)?;
        for (i, value) in values.iter().enumerate() {
            self.set_value(space, i, value, pool)?;
        }
        Ok(())
    }

    pub fn set_value(&self, space: &mut [u8], index: usize, value: &Value, pool: &mut VarlenPool) -> Result<(), QueryError> {
        let t = self.field_type(index)?;
        ensure!(space.len() >= self.storage_size, "storage space of {} bytes too small for {}", space.len(), self.storage_size);
        if value.sql_type() != t {
            bail!(QueryError::SchemaMismatch, "field {} has type {}, got {}", index, t, value);
        }
        let offset = self.offsets[index];
        let field = &mut space[offset..offset + t.storage_size()];
        if value.is_null() {
            field.iter_mut().for_each(|b| *b = 0);
            space[self.null_bitmap_offset..].set(index);
            return Ok(());
        }
        match *value.datum() {
            Datum::Boolean(b) => field[0] = b as u8,
            Datum::Int(i) => match t {
                SqlType::TinyInt => field[0] = i as i8 as u8,
                SqlType::SmallInt => LittleEndian::write_i16(field, i as i16),
                SqlType::Integer => LittleEndian::write_i32(field, i as i32),
                _ => LittleEndian::write_i64(field, i),
            },
            Datum::Decimal(f) => LittleEndian::write_f64(field, f.0),
            Datum::Varchar(ref s) => {
                let handle = pool.add(s)?;
                LittleEndian::write_u64(field, handle);
            }
        }
        space[self.null_bitmap_offset..].unset(index);
        Ok(())
    }

    pub fn is_null(&self, space: &[u8], index: usize) -> bool {
        space[self.null_bitmap_offset..].is_set(index)
    }

    pub fn load_value(&self, space: &[u8], index: usize, pool: &VarlenPool) -> Result<Value, QueryError> {
        let t = self.field_type(index)?;
        if self.is_null(space, index) {
            return Ok(Value::null(t));
        }
        let offset = self.offsets[index];
        let field = &space[offset..offset + t.storage_size()];
        Ok(match t {
            SqlType::Boolean => Value::boolean(field[0] != 0),
            SqlType::TinyInt => Value::int(t, field[0] as i8 as i64)?,
            SqlType::SmallInt => Value::int(t, LittleEndian::read_i16(field) as i64)?,
            SqlType::Integer => Value::int(t, LittleEndian::read_i32(field) as i64)?,
            SqlType::BigInt => Value::bigint(LittleEndian::read_i64(field)),
            SqlType::Decimal => Value::decimal(LittleEndian::read_f64(field)),
            SqlType::Varchar => Value::varchar(pool.get(LittleEndian::read_u64(field))?),
        })
    }

    pub fn load_values(&self, space: &[u8], pool: &VarlenPool) -> Result<Vec<Value>, QueryError> {
        (0..self.types.len()).map(|i| self.load_value(space, i, pool)).collect()
    }

    /// Compares a stored field against `value` without materializing varchar payloads.
    pub fn value_equals(&self, space: &[u8], index: usize, value: &Value, pool: &VarlenPool) -> Result<bool, QueryError> {
        let t = self.field_type(index)?;
        if value.sql_type() != t {
            return Ok(false);
        }
        let null = self.is_null(space, index);
        if null || value.is_null() {
            return Ok(null && value.is_null());
        }
        if t == SqlType::Varchar {
            let offset = self.offsets[index];
            let stored = pool.get(LittleEndian::read_u64(&space[offset..offset + 8]))?;
            return Ok(stored == value.as_str()?);
        }
        Ok(self.load_value(space, index, pool)? == *value)
    }

    fn field_type(&self, index: usize) -> Result<SqlType, QueryError> {
        self.types
            .get(index)
            .cloned()
            .ok_or_else(|| fatal!("field index {} out of bounds for storage with {} fields", index, self.types.len()))
    }
}
