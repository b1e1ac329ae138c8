//! Storage trait: the destination that executes multi-row writes

use super::{error::Result, row::Row};

/// Destination table identity
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TableRef {
    pub database: String,
    pub table: String,
}

impl TableRef {
    pub fn new(database: impl Into<String>, table: impl Into<String>) -> Self {
        Self {
            database: database.into(),
            table: table.into(),
        }
    }
}

impl std::fmt::Display for TableRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}", self.database, self.table)
    }
}

/// Persistence client used by both the synchronous and the batching path
///
/// Implementations must treat an empty `rows` slice as a successful no-op.
/// Atomicity of a multi-row write is whatever the destination provides.
pub trait Storage: Send + Sync {
    /// Liveness probe, run once when a hook is constructed
    fn ping(&self) -> Result<()>;

    /// Write `rows`, each positional under `columns`, in one request
    fn write(&self, table: &TableRef, columns: &[String], rows: &[Row]) -> Result<()>;

    fn name(&self) -> &str;
}
