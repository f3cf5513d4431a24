use super::{CqlValue, Row, StoreError};
use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;

/// Handle to a statement template the gateway has accepted.
///
/// Gateways key their own prepared state by the template text, so the handle
/// is cheap to clone and share across tasks.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct PreparedStatement {
    cql: Arc<str>,
}

impl PreparedStatement {
    pub fn new(cql: &str) -> Self {
        Self {
            cql: Arc::from(cql.trim()),
        }
    }

    pub fn cql(&self) -> &str {
        &self.cql
    }

    pub fn bind(&self, values: Vec<CqlValue>) -> BoundStatement {
        BoundStatement {
            statement: self.clone(),
            values,
        }
    }
}

impl fmt::Debug for PreparedStatement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PreparedStatement")
            .field("cql", &self.cql)
            .finish()
    }
}

/// A prepared statement together with the values bound to its markers.
#[derive(Debug, Clone)]
pub struct BoundStatement {
    pub statement: PreparedStatement,
    pub values: Vec<CqlValue>,
}

/// The four store operations the pipelines depend on.
///
/// Implementations must tolerate concurrent callers sharing one instance;
/// callers never mutate client state, they only issue independent statements.
#[async_trait]
pub trait StorageGateway: Send + Sync {
    async fn prepare(&self, template: &str) -> Result<PreparedStatement, StoreError>;

    async fn execute(
        &self,
        statement: &PreparedStatement,
        values: Vec<CqlValue>,
    ) -> Result<(), StoreError>;

    /// Apply all statements atomically. Every statement must be a write to
    /// the same partition key of the same table.
    async fn execute_batch(&self, statements: Vec<BoundStatement>) -> Result<(), StoreError>;

    async fn query(&self, cql: &str, values: Vec<CqlValue>) -> Result<Vec<Row>, StoreError>;
}
