//! In-process wide-column store for tests and benchmarks.
//!
//! Understands the statement shapes in [`super::cql`]. Rows live in one
//! ordered map per table, keyed by primary key (partition key columns
//! followed by clustering columns), so scans come back in key order. Writes
//! are upserts: an INSERT replaces the named columns of an existing row and
//! leaves the others untouched. Bound values must match the declared column
//! types. A batch is validated in full before any row is applied and is
//! limited to a single partition.

use super::schema::{air_quality_tables, TableSchema};
use super::{
    BoundStatement, CqlValue, PreparedStatement, Projection, Row, Statement, StorageGateway,
    StoreError,
};
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::time::Duration;
use tokio::sync::RwLock;

type PrimaryKey = Vec<CqlValue>;

#[derive(Debug, Clone)]
struct MemoryTable {
    schema: TableSchema,
    key_indices: Vec<usize>,
    rows: BTreeMap<PrimaryKey, Vec<CqlValue>>,
}

impl MemoryTable {
    fn new(schema: TableSchema) -> Self {
        let key_indices = schema
            .primary_key()
            .filter_map(|key| schema.column_index(key))
            .collect();

        Self {
            schema,
            key_indices,
            rows: BTreeMap::new(),
        }
    }

    fn column_index(&self, column: &str) -> Result<usize, StoreError> {
        self.schema
            .column_index(column)
            .ok_or_else(|| StoreError::UnknownColumn {
                table: self.schema.name.clone(),
                column: column.to_string(),
            })
    }

    fn check_type(&self, index: usize, value: &CqlValue) -> Result<(), StoreError> {
        let column = &self.schema.columns[index];
        if value.is_null() || value.type_name() == column.cql_type {
            Ok(())
        } else {
            Err(StoreError::TypeMismatch {
                column: column.name.clone(),
                expected: column.cql_type,
                found: value.type_name(),
            })
        }
    }

    fn partition_width(&self) -> usize {
        self.schema.partition_key.len()
    }

    fn upsert(&mut self, write: PendingWrite) {
        let width = self.schema.columns.len();
        let row = self
            .rows
            .entry(write.key)
            .or_insert_with(|| vec![CqlValue::Null; width]);
        for (index, value) in write.cells {
            row[index] = value;
        }
    }
}

/// A validated INSERT, ready to apply.
#[derive(Debug)]
struct PendingWrite {
    table: String,
    key: PrimaryKey,
    cells: Vec<(usize, CqlValue)>,
}

pub struct MemoryGateway {
    tables: RwLock<HashMap<String, MemoryTable>>,
    write_latency: Option<Duration>,
}

impl MemoryGateway {
    pub fn new(schemas: impl IntoIterator<Item = TableSchema>) -> Self {
        let tables = schemas
            .into_iter()
            .map(|schema| (schema.name.clone(), MemoryTable::new(schema)))
            .collect();

        Self {
            tables: RwLock::new(tables),
            write_latency: None,
        }
    }

    /// A store with the loader's four tables declared and empty.
    pub fn with_air_quality_tables() -> Self {
        Self::new(air_quality_tables())
    }

    /// Delay every write by `latency`, simulating a network round trip.
    pub fn with_write_latency(mut self, latency: Duration) -> Self {
        self.write_latency = Some(latency);
        self
    }

    pub async fn row_count(&self, table: &str) -> Result<usize, StoreError> {
        let tables = self.tables.read().await;
        tables
            .get(table)
            .map(|t| t.rows.len())
            .ok_or_else(|| StoreError::UnknownTable(table.to_string()))
    }

    fn pending_write(
        tables: &HashMap<String, MemoryTable>,
        statement: &PreparedStatement,
        values: Vec<CqlValue>,
    ) -> Result<PendingWrite, StoreError> {
        let (table_name, columns) = match Statement::parse(statement.cql())? {
            Statement::Insert { table, columns } => (table, columns),
            Statement::Select { .. } => {
                return Err(StoreError::NotAWrite(statement.cql().to_string()))
            }
        };

        if values.len() != columns.len() {
            return Err(StoreError::ParameterCount {
                expected: columns.len(),
                found: values.len(),
            });
        }

        let table = tables
            .get(&table_name)
            .ok_or_else(|| StoreError::UnknownTable(table_name.clone()))?;

        let mut cells = Vec::with_capacity(values.len());
        for (column, value) in columns.iter().zip(values) {
            let index = table.column_index(column)?;
            table.check_type(index, &value)?;
            cells.push((index, value));
        }

        let mut key = Vec::with_capacity(table.key_indices.len());
        for (&index, name) in table.key_indices.iter().zip(table.schema.primary_key()) {
            match cells.iter().find(|(i, _)| *i == index) {
                Some((_, value)) if !value.is_null() => key.push(value.clone()),
                _ => {
                    return Err(StoreError::MissingKeyColumn {
                        table: table_name.clone(),
                        column: name.clone(),
                    })
                }
            }
        }

        Ok(PendingWrite {
            table: table_name,
            key,
            cells,
        })
    }

    async fn simulate_latency(&self) {
        if let Some(latency) = self.write_latency {
            tokio::time::sleep(latency).await;
        }
    }
}

#[async_trait]
impl StorageGateway for MemoryGateway {
    async fn prepare(&self, template: &str) -> Result<PreparedStatement, StoreError> {
        let statement = Statement::parse(template)?;
        let tables = self.tables.read().await;
        let table = statement.table();
        if !tables.contains_key(table) {
            return Err(StoreError::UnknownTable(table.to_string()));
        }
        Ok(PreparedStatement::new(template))
    }

    async fn execute(
        &self,
        statement: &PreparedStatement,
        values: Vec<CqlValue>,
    ) -> Result<(), StoreError> {
        self.simulate_latency().await;

        let mut tables = self.tables.write().await;
        let write = Self::pending_write(&tables, statement, values)?;
        if let Some(table) = tables.get_mut(&write.table) {
            table.upsert(write);
        }
        Ok(())
    }

    async fn execute_batch(&self, statements: Vec<BoundStatement>) -> Result<(), StoreError> {
        if statements.is_empty() {
            return Ok(());
        }
        self.simulate_latency().await;

        let mut tables = self.tables.write().await;
        let mut writes = Vec::with_capacity(statements.len());
        for bound in statements {
            writes.push(Self::pending_write(&tables, &bound.statement, bound.values)?);
        }

        let first = &writes[0];
        let width = tables[&first.table].partition_width();
        let partition = &first.key[..width];
        if writes
            .iter()
            .any(|w| w.table != first.table || w.key[..width] != *partition)
        {
            return Err(StoreError::CrossPartitionBatch {
                table: first.table.clone(),
            });
        }

        let table_name = first.table.clone();
        if let Some(table) = tables.get_mut(&table_name) {
            for write in writes {
                table.upsert(write);
            }
        }
        Ok(())
    }

    async fn query(&self, cql: &str, values: Vec<CqlValue>) -> Result<Vec<Row>, StoreError> {
        let (table_name, projection, predicates) = match Statement::parse(cql)? {
            Statement::Select {
                table,
                projection,
                predicates,
            } => (table, projection, predicates),
            Statement::Insert { .. } => {
                return Err(StoreError::Unsupported(format!(
                    "query requires a SELECT: {}",
                    cql.trim()
                )))
            }
        };

        if values.len() != predicates.len() {
            return Err(StoreError::ParameterCount {
                expected: predicates.len(),
                found: values.len(),
            });
        }

        let tables = self.tables.read().await;
        let table = tables
            .get(&table_name)
            .ok_or_else(|| StoreError::UnknownTable(table_name.clone()))?;

        let projected: Vec<usize> = match &projection {
            Projection::All => (0..table.schema.columns.len()).collect(),
            Projection::Columns(columns) => columns
                .iter()
                .map(|c| table.column_index(c))
                .collect::<Result<_, _>>()?,
        };

        let filters = predicates
            .iter()
            .zip(values.iter())
            .map(|(p, v)| -> Result<_, StoreError> {
                Ok((table.column_index(&p.column)?, p.comparison, v))
            })
            .collect::<Result<Vec<_>, StoreError>>()?;

        let mut rows = Vec::new();
        'rows: for cells in table.rows.values() {
            for (index, comparison, bound) in &filters {
                let cell = &cells[*index];
                if cell.is_null() {
                    continue 'rows;
                }
                let ordering = cell
                    .partial_compare(bound)
                    .ok_or_else(|| StoreError::TypeMismatch {
                        column: table.schema.columns[*index].name.clone(),
                        expected: cell.type_name(),
                        found: bound.type_name(),
                    })?;
                if !comparison.holds(ordering) {
                    continue 'rows;
                }
            }
            rows.push(Row::new(projected.iter().map(|&i| cells[i].clone()).collect()));
        }

        Ok(rows)
    }
}
