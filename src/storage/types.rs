//! Backing Table Data Types
//!
//! Schema descriptions, the row envelope, and the outcome of conditional
//! writes. These types cross the table-server wire unchanged, so everything
//! here is serde-serializable.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Unique id of one logical mutation.
///
/// Generated once per mutation and reused on every retry of it, which lets
/// the table replay the original outcome instead of applying twice.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct OpId(pub String);

impl OpId {
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }
}

impl Default for OpId {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct KeyspaceSpec {
    pub name: String,
    pub replication_factor: usize,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum ColumnType {
    BigInt,
    Text,
    Boolean,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ColumnSpec {
    pub name: String,
    pub kind: ColumnType,
}

impl ColumnSpec {
    pub fn new(name: &str, kind: ColumnType) -> Self {
        Self {
            name: name.to_string(),
            kind,
        }
    }
}

/// Declared schema of a table. Rows are stored as JSON documents whose
/// fields are these columns.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TableSpec {
    pub name: String,
    pub primary_key: Vec<String>,
    pub columns: Vec<ColumnSpec>,
}

/// Fully-qualified table address.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct TableRef {
    pub keyspace: String,
    pub table: String,
}

impl TableRef {
    pub fn new(keyspace: &str, table: &str) -> Self {
        Self {
            keyspace: keyspace.to_string(),
            table: table.to_string(),
        }
    }
}

impl fmt::Display for TableRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.keyspace, self.table)
    }
}

/// A stored record and its write version (1 on insert, +1 per applied write).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Row {
    pub value_json: String,
    pub version: u64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum SchemaChange {
    Created,
    AlreadyExists,
}

/// Result of a conditional write.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum WriteOutcome {
    /// The write went through; `version` is the row's new version.
    Applied { version: u64 },
    /// The condition did not hold. `current` is the row as it stood.
    Rejected { current: Option<Row> },
}

impl WriteOutcome {
    pub fn is_applied(&self) -> bool {
        matches!(self, Self::Applied { .. })
    }
}
