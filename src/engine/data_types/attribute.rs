use std::fmt;

use serde::{Deserialize, Serialize};

use crate::engine::data_types::SqlType;

#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug, Serialize, Deserialize)]
pub struct AttributeId(pub u32);

impl fmt::Display for AttributeId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Describes one column flowing through a pipeline. Ids are unique within a plan.
#[derive(Clone, PartialEq, Eq, Hash, Debug, Serialize, Deserialize)]
pub struct AttributeInfo {
    pub id: AttributeId,
    pub name: String,
    pub sql_type: SqlType,
    pub nullable: bool,
}

impl AttributeInfo {
    pub fn new(id: u32, name: &str, sql_type: SqlType) -> AttributeInfo {
        AttributeInfo {
            id: AttributeId(id),
            name: name.to_string(),
            sql_type,
            nullable: true,
        }
    }

    pub fn not_null(mut self) -> AttributeInfo {
        self.nullable = false;
        self
    }
}

impl fmt::Display for AttributeInfo {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}{}:{}", self.name, self.id, self.sql_type)
    }
}
