use std::fmt;

use serde::{Deserialize, Serialize};

use crate::QueryError;

#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug, Serialize, Deserialize)]
pub enum SqlType {
    Boolean,
    TinyInt,
    SmallInt,
    Integer,
    BigInt,
    Decimal,
    Varchar,
}

impl SqlType {
    pub fn is_integral(self) -> bool {
        matches!(self, SqlType::TinyInt | SqlType::SmallInt | SqlType::Integer | SqlType::BigInt)
    }

    pub fn is_numeric(self) -> bool {
        self.is_integral() || self == SqlType::Decimal
    }

    /// Number of bytes occupied by a value of this type in compact storage.
    /// Varchar values are stored as a handle into a varlen pool.
    pub fn storage_size(self) -> usize {
        match self {
            SqlType::Boolean | SqlType::TinyInt => 1,
            SqlType::SmallInt => 2,
            SqlType::Integer => 4,
            SqlType::BigInt | SqlType::Decimal | SqlType::Varchar => 8,
        }
    }

    pub fn min_int(self) -> Option<i64> {
        match self {
            SqlType::TinyInt => Some(i8::MIN as i64),
            SqlType::SmallInt => Some(i16::MIN as i64),
            SqlType::Integer => Some(i32::MIN as i64),
            SqlType::BigInt => Some(i64::MIN),
            _ => None,
        }
    }

    pub fn max_int(self) -> Option<i64> {
        match self {
            SqlType::TinyInt => Some(i8::MAX as i64),
            SqlType::SmallInt => Some(i16::MAX as i64),
            SqlType::Integer => Some(i32::MAX as i64),
            SqlType::BigInt => Some(i64::MAX),
            _ => None,
        }
    }

    fn integral_rank(self) -> u8 {
        match self {
            SqlType::TinyInt => 1,
            SqlType::SmallInt => 2,
            SqlType::Integer => 3,
            SqlType::BigInt => 4,
            _ => 0,
        }
    }

    /// Common type two numeric operands are promoted to.
    pub fn promote(self, other: SqlType) -> Result<SqlType, QueryError> {
        if !self.is_numeric() || !other.is_numeric() {
            bail!(QueryError::TypeError, "cannot combine {} and {}", self, other);
        }
        if self == SqlType::Decimal || other == SqlType::Decimal {
            return Ok(SqlType::Decimal);
        }
        Ok(if self.integral_rank() >= other.integral_rank() { self } else { other })
    }

    /// Whether values of the two types can be compared with each other.
    pub fn comparable_with(self, other: SqlType) -> bool {
        self == other || (self.is_numeric() && other.is_numeric())
    }
}

impl fmt::Display for SqlType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let name = match self {
            SqlType::Boolean => "boolean",
            SqlType::TinyInt => "tinyint",
            SqlType::SmallInt => "smallint",
            SqlType::Integer => "integer",
            SqlType::BigInt => "bigint",
            SqlType::Decimal => "decimal",
            SqlType::Varchar => "varchar",
        };
        write!(f, "{}", name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_promote() {
        assert_eq!(SqlType::TinyInt.promote(SqlType::Integer).unwrap(), SqlType::Integer);
        assert_eq!(SqlType::BigInt.promote(SqlType::SmallInt).unwrap(), SqlType::BigInt);
        assert_eq!(SqlType::Integer.promote(SqlType::Decimal).unwrap(), SqlType::Decimal);
        assert!(SqlType::Varchar.promote(SqlType::Integer).is_err());
    }
}
