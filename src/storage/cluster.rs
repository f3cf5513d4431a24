//! Gateway to a Cassandra-compatible cluster through the `scylla` driver.

use super::schema::{air_quality_tables, check_identifier, create_keyspace_cql};
use super::{BoundStatement, CqlValue, PreparedStatement, Row, StorageGateway, StoreError};
use crate::models::TimeUuid;
use async_trait::async_trait;
use chrono::NaiveDate;
use scylla::batch::Batch;
use scylla::frame::response::result::CqlValue as DriverValue;
use scylla::frame::value::{CqlDate, CqlTimeuuid};
use scylla::prepared_statement::PreparedStatement as DriverStatement;
use scylla::transport::errors::{DbError, NewSessionError, QueryError};
use scylla::{Session, SessionBuilder};
use std::collections::HashMap;
use tokio::sync::RwLock;
use tracing::{debug, info};

/// `CqlDate` counts days from 2^31 days before the Unix epoch.
const CQL_DATE_EPOCH_OFFSET: i64 = 1 << 31;

/// Where and as whom to connect.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClusterSettings {
    /// `host:port` of one or more nodes.
    pub contact_points: Vec<String>,
    pub keyspace: String,
    pub username: Option<String>,
    pub password: Option<String>,
}

pub struct ScyllaGateway {
    session: Session,
    statements: RwLock<HashMap<String, DriverStatement>>,
}

impl ScyllaGateway {
    /// Connect and switch to the configured keyspace, which must exist.
    pub async fn connect(settings: &ClusterSettings) -> Result<Self, StoreError> {
        check_identifier(&settings.keyspace)?;
        let session = open_session(settings).await?;
        session
            .use_keyspace(settings.keyspace.as_str(), false)
            .await
            .map_err(store_error)?;

        info!(
            "Connected to {} (keyspace {})",
            settings.contact_points.join(", "),
            settings.keyspace
        );
        Ok(Self::with_session(session))
    }

    /// Connect, creating the keyspace and the loader's tables if missing.
    pub async fn initialize(
        settings: &ClusterSettings,
        replication_factor: u32,
    ) -> Result<Self, StoreError> {
        let session = open_session(settings).await?;

        let keyspace = create_keyspace_cql(&settings.keyspace, replication_factor)?;
        session.query(keyspace, ()).await.map_err(store_error)?;
        session
            .use_keyspace(settings.keyspace.as_str(), false)
            .await
            .map_err(store_error)?;

        for table in air_quality_tables() {
            debug!("Creating table {}", table.name);
            session
                .query(table.create_cql(), ())
                .await
                .map_err(store_error)?;
        }

        info!(
            "Keyspace {} ready (replication factor {})",
            settings.keyspace, replication_factor
        );
        Ok(Self::with_session(session))
    }

    fn with_session(session: Session) -> Self {
        Self {
            session,
            statements: RwLock::new(HashMap::new()),
        }
    }

    /// Driver statement for `cql`, preparing it on first use.
    async fn driver_statement(&self, cql: &str) -> Result<DriverStatement, StoreError> {
        if let Some(statement) = self.statements.read().await.get(cql) {
            return Ok(statement.clone());
        }

        let statement = self.session.prepare(cql).await.map_err(store_error)?;
        self.statements
            .write()
            .await
            .insert(cql.to_string(), statement.clone());
        Ok(statement)
    }
}

#[async_trait]
impl StorageGateway for ScyllaGateway {
    async fn prepare(&self, template: &str) -> Result<PreparedStatement, StoreError> {
        let prepared = PreparedStatement::new(template);
        self.driver_statement(prepared.cql()).await?;
        Ok(prepared)
    }

    async fn execute(
        &self,
        statement: &PreparedStatement,
        values: Vec<CqlValue>,
    ) -> Result<(), StoreError> {
        let driver = self.driver_statement(statement.cql()).await?;
        self.session
            .execute(&driver, driver_values(values)?)
            .await
            .map_err(store_error)?;
        Ok(())
    }

    async fn execute_batch(&self, statements: Vec<BoundStatement>) -> Result<(), StoreError> {
        if statements.is_empty() {
            return Ok(());
        }

        let mut batch = Batch::default();
        let mut values = Vec::with_capacity(statements.len());
        for bound in statements {
            batch.append_statement(self.driver_statement(bound.statement.cql()).await?);
            values.push(driver_values(bound.values)?);
        }

        self.session
            .batch(&batch, values)
            .await
            .map_err(store_error)?;
        Ok(())
    }

    async fn query(&self, cql: &str, values: Vec<CqlValue>) -> Result<Vec<Row>, StoreError> {
        let driver = self.driver_statement(cql).await?;
        let result = self
            .session
            .execute(&driver, driver_values(values)?)
            .await
            .map_err(store_error)?;

        result
            .rows
            .unwrap_or_default()
            .into_iter()
            .map(|row| {
                row.columns
                    .into_iter()
                    .map(from_driver)
                    .collect::<Result<Vec<_>, _>>()
                    .map(Row::new)
            })
            .collect()
    }
}

async fn open_session(settings: &ClusterSettings) -> Result<Session, StoreError> {
    let mut builder = SessionBuilder::new().known_nodes(&settings.contact_points);
    if let Some(username) = &settings.username {
        builder = builder.user(username.as_str(), settings.password.as_deref().unwrap_or_default());
    }
    builder.build().await.map_err(session_error)
}

fn driver_values(values: Vec<CqlValue>) -> Result<Vec<Option<DriverValue>>, StoreError> {
    values.into_iter().map(to_driver).collect()
}

fn to_driver(value: CqlValue) -> Result<Option<DriverValue>, StoreError> {
    Ok(match value {
        CqlValue::Null => None,
        CqlValue::Int(v) => Some(DriverValue::Int(v)),
        CqlValue::BigInt(v) => Some(DriverValue::BigInt(v)),
        CqlValue::Double(v) => Some(DriverValue::Double(v)),
        CqlValue::Text(v) => Some(DriverValue::Text(v)),
        CqlValue::Date(date) => Some(DriverValue::Date(to_cql_date(date)?)),
        CqlValue::Timeuuid(id) => Some(DriverValue::Timeuuid(CqlTimeuuid::from(*id.as_uuid()))),
    })
}

fn from_driver(value: Option<DriverValue>) -> Result<CqlValue, StoreError> {
    match value {
        None => Ok(CqlValue::Null),
        Some(DriverValue::Int(v)) => Ok(CqlValue::Int(v)),
        Some(DriverValue::BigInt(v)) => Ok(CqlValue::BigInt(v)),
        Some(DriverValue::Double(v)) => Ok(CqlValue::Double(v)),
        Some(DriverValue::Text(v)) | Some(DriverValue::Ascii(v)) => Ok(CqlValue::Text(v)),
        Some(DriverValue::Date(date)) => from_cql_date(date).map(CqlValue::Date),
        Some(DriverValue::Timeuuid(id)) => Ok(CqlValue::Timeuuid(TimeUuid::from_uuid(id.into()))),
        Some(other) => Err(StoreError::Unsupported(format!("column value {:?}", other))),
    }
}

fn unix_epoch() -> NaiveDate {
    NaiveDate::from_ymd_opt(1970, 1, 1).unwrap_or_default()
}

fn to_cql_date(date: NaiveDate) -> Result<CqlDate, StoreError> {
    let days = date.signed_duration_since(unix_epoch()).num_days() + CQL_DATE_EPOCH_OFFSET;
    u32::try_from(days)
        .map(CqlDate)
        .map_err(|_| StoreError::Unsupported(format!("date {} out of range", date)))
}

fn from_cql_date(date: CqlDate) -> Result<NaiveDate, StoreError> {
    let days = i64::from(date.0) - CQL_DATE_EPOCH_OFFSET;
    unix_epoch()
        .checked_add_signed(chrono::Duration::days(days))
        .ok_or_else(|| StoreError::Unsupported(format!("date offset {} out of range", days)))
}

/// Timeouts and unavailable replicas are retryable; the rest is not.
fn store_error(err: QueryError) -> StoreError {
    match &err {
        QueryError::TimeoutError | QueryError::RequestTimeout(_) => {
            StoreError::Timeout(err.to_string())
        }
        QueryError::IoError(_) => StoreError::Unavailable(err.to_string()),
        QueryError::DbError(db, _) => match db {
            DbError::ReadTimeout { .. } | DbError::WriteTimeout { .. } => {
                StoreError::Timeout(err.to_string())
            }
            DbError::Unavailable { .. } | DbError::Overloaded => {
                StoreError::Unavailable(err.to_string())
            }
            _ => StoreError::Driver(err.to_string()),
        },
        _ => StoreError::Driver(err.to_string()),
    }
}

fn session_error(err: NewSessionError) -> StoreError {
    StoreError::Unavailable(err.to_string())
}
