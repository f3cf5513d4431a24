pub mod cluster;
pub mod cql;
pub mod gateway;
pub mod memory;
pub mod row;
pub mod schema;
pub mod value;

pub use cluster::{ClusterSettings, ScyllaGateway};
pub use cql::{Comparison, Predicate, Projection, Statement};
pub use gateway::{BoundStatement, PreparedStatement, StorageGateway};
pub use memory::MemoryGateway;
pub use row::StorageRow;
pub use schema::{Column, TableSchema};
pub use value::{CqlValue, Row};

use thiserror::Error;

/// Failure of a single store operation.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum StoreError {
    #[error("Unsupported statement: {0}")]
    Unsupported(String),

    #[error("Unknown table '{0}'")]
    UnknownTable(String),

    #[error("Unknown column '{column}' in table '{table}'")]
    UnknownColumn { table: String, column: String },

    #[error("Primary key column '{column}' missing from write to '{table}'")]
    MissingKeyColumn { table: String, column: String },

    #[error("Expected {expected} bound values, got {found}")]
    ParameterCount { expected: usize, found: usize },

    #[error("Column {column}: expected {expected}, found {found}")]
    TypeMismatch {
        column: String,
        expected: &'static str,
        found: &'static str,
    },

    #[error("Column index {index} out of range for row of width {width}")]
    ColumnIndex { index: usize, width: usize },

    #[error("Batch spans more than one partition of '{table}'")]
    CrossPartitionBatch { table: String },

    #[error("Statement is not a write: {0}")]
    NotAWrite(String),

    #[error("Store unavailable: {0}")]
    Unavailable(String),

    #[error("Store operation timed out: {0}")]
    Timeout(String),

    #[error("Invalid identifier '{0}'")]
    InvalidIdentifier(String),

    #[error("Driver error: {0}")]
    Driver(String),
}

impl StoreError {
    /// Errors worth retrying: the statement itself was fine.
    pub fn is_transient(&self) -> bool {
        matches!(self, StoreError::Unavailable(_) | StoreError::Timeout(_))
    }
}
