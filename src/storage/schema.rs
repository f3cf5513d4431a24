use super::StoreError;

/// Table names
pub const STATIONS_TABLE: &str = "stations";
pub const POLLUTANTS_TABLE: &str = "pollutants";
pub const MEASUREMENTS_TABLE: &str = "measurements";
pub const DAILY_AGGREGATES_TABLE: &str = "daily_pollutant_values_by_station";

/// Write statements
pub const INSERT_STATION: &str = "INSERT INTO stations \
    (station_code, station_name, address, latitude, longitude) \
    VALUES (?, ?, ?, ?, ?)";

pub const INSERT_POLLUTANT: &str = "INSERT INTO pollutants \
    (pollutant_code, pollutant_name, unit_of_measurement, good, normal, bad, very_bad) \
    VALUES (?, ?, ?, ?, ?, ?, ?)";

pub const INSERT_MEASUREMENT: &str = "INSERT INTO measurements \
    (station_code, measurement_date, ts, pollutant_code, average_value, instrument_status) \
    VALUES (?, ?, ?, ?, ?, ?)";

pub const INSERT_DAILY_AGGREGATE: &str = "INSERT INTO daily_pollutant_values_by_station \
    (station_code, measurement_date, pollutant_code, avg_value, max_value, min_value, air_quality_label, count_measurements) \
    VALUES (?, ?, ?, ?, ?, ?, ?, ?)";

/// Read statements
pub const SELECT_STATION_CODES: &str = "SELECT station_code FROM stations";

pub const SELECT_THRESHOLDS: &str =
    "SELECT pollutant_code, good, normal, bad, very_bad FROM pollutants";

pub const SELECT_STATION_MEASUREMENTS: &str = "SELECT average_value, pollutant_code, measurement_date \
    FROM measurements \
    WHERE station_code = ? AND measurement_date >= ? AND measurement_date <= ? ALLOW FILTERING";

pub const SELECT_DAILY_AGGREGATES: &str = "SELECT measurement_date, pollutant_code, avg_value, \
    min_value, max_value, count_measurements, air_quality_label \
    FROM daily_pollutant_values_by_station \
    WHERE station_code = ? AND measurement_date >= ? AND measurement_date <= ?";

/// One column and its CQL type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Column {
    pub name: String,
    pub cql_type: &'static str,
}

/// Layout of one table: partition key, clustering columns, then regular columns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableSchema {
    pub name: String,
    pub partition_key: Vec<String>,
    pub clustering_key: Vec<String>,
    pub columns: Vec<Column>,
}

type ColumnSpec<'a> = (&'a str, &'static str);

impl TableSchema {
    pub fn new(
        name: &str,
        partition_key: &[ColumnSpec<'_>],
        clustering_key: &[ColumnSpec<'_>],
        regular: &[ColumnSpec<'_>],
    ) -> Self {
        let names = |cols: &[ColumnSpec<'_>]| cols.iter().map(|(c, _)| c.to_string()).collect::<Vec<_>>();
        let columns = partition_key
            .iter()
            .chain(clustering_key)
            .chain(regular)
            .map(|&(name, cql_type)| Column {
                name: name.to_string(),
                cql_type,
            })
            .collect();

        Self {
            name: name.to_string(),
            partition_key: names(partition_key),
            clustering_key: names(clustering_key),
            columns,
        }
    }

    pub fn column_index(&self, column: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == column)
    }

    pub fn primary_key(&self) -> impl Iterator<Item = &String> {
        self.partition_key.iter().chain(self.clustering_key.iter())
    }

    /// `CREATE TABLE IF NOT EXISTS` statement for this layout.
    pub fn create_cql(&self) -> String {
        let columns: Vec<String> = self
            .columns
            .iter()
            .map(|c| format!("{} {}", c.name, c.cql_type))
            .collect();

        let mut key = format!("({})", self.partition_key.join(", "));
        for clustering in &self.clustering_key {
            key.push_str(", ");
            key.push_str(clustering);
        }

        format!(
            "CREATE TABLE IF NOT EXISTS {} ({}, PRIMARY KEY ({}))",
            self.name,
            columns.join(", "),
            key
        )
    }
}

/// `CREATE KEYSPACE IF NOT EXISTS` with simple replication.
pub fn create_keyspace_cql(keyspace: &str, replication_factor: u32) -> Result<String, StoreError> {
    check_identifier(keyspace)?;
    Ok(format!(
        "CREATE KEYSPACE IF NOT EXISTS {} WITH replication = \
         {{'class': 'SimpleStrategy', 'replication_factor': {}}} AND durable_writes = true",
        keyspace, replication_factor
    ))
}

/// Keyspace names are spliced into DDL, so only plain identifiers pass.
pub fn check_identifier(name: &str) -> Result<(), StoreError> {
    let mut chars = name.chars();
    let valid = matches!(chars.next(), Some(c) if c.is_ascii_alphabetic())
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        && name.len() <= 48;
    if valid {
        Ok(())
    } else {
        Err(StoreError::InvalidIdentifier(name.to_string()))
    }
}

/// Tables used by the loader and the aggregation pipeline.
pub fn air_quality_tables() -> Vec<TableSchema> {
    vec![
        TableSchema::new(
            STATIONS_TABLE,
            &[("station_code", "int")],
            &[],
            &[
                ("station_name", "text"),
                ("address", "text"),
                ("latitude", "double"),
                ("longitude", "double"),
            ],
        ),
        TableSchema::new(
            POLLUTANTS_TABLE,
            &[("pollutant_code", "text")],
            &[],
            &[
                ("pollutant_name", "text"),
                ("unit_of_measurement", "text"),
                ("good", "double"),
                ("normal", "double"),
                ("bad", "double"),
                ("very_bad", "double"),
            ],
        ),
        TableSchema::new(
            MEASUREMENTS_TABLE,
            &[("station_code", "int"), ("measurement_date", "date")],
            &[("ts", "timeuuid")],
            &[
                ("pollutant_code", "text"),
                ("average_value", "double"),
                ("instrument_status", "int"),
            ],
        ),
        TableSchema::new(
            DAILY_AGGREGATES_TABLE,
            &[("station_code", "int")],
            &[("measurement_date", "date"), ("pollutant_code", "text")],
            &[
                ("avg_value", "double"),
                ("max_value", "double"),
                ("min_value", "double"),
                ("air_quality_label", "text"),
                ("count_measurements", "bigint"),
            ],
        ),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::Statement;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_statements_reference_declared_columns() {
        let tables = air_quality_tables();
        for cql in [
            INSERT_STATION,
            INSERT_POLLUTANT,
            INSERT_MEASUREMENT,
            INSERT_DAILY_AGGREGATE,
            SELECT_STATION_CODES,
            SELECT_THRESHOLDS,
            SELECT_STATION_MEASUREMENTS,
            SELECT_DAILY_AGGREGATES,
        ] {
            let statement = Statement::parse(cql).unwrap();
            let table = tables
                .iter()
                .find(|t| t.name == statement.table())
                .unwrap_or_else(|| panic!("no table for {}", cql));

            if let Statement::Insert { columns, .. } = &statement {
                for column in columns {
                    assert!(table.column_index(column).is_some(), "{} not in {}", column, table.name);
                }
                for key in table.primary_key() {
                    assert!(columns.contains(key), "{} missing key {}", cql, key);
                }
            }
        }
    }

    #[test]
    fn test_create_table_statements() {
        let tables = air_quality_tables();
        let measurements = tables.iter().find(|t| t.name == MEASUREMENTS_TABLE).unwrap();
        assert_eq!(
            measurements.create_cql(),
            "CREATE TABLE IF NOT EXISTS measurements (station_code int, measurement_date date, \
             ts timeuuid, pollutant_code text, average_value double, instrument_status int, \
             PRIMARY KEY ((station_code, measurement_date), ts))"
        );

        let stations = tables.iter().find(|t| t.name == STATIONS_TABLE).unwrap();
        assert!(stations.create_cql().ends_with("PRIMARY KEY ((station_code)))"));
    }

    #[test]
    fn test_keyspace_name_must_be_an_identifier() {
        let cql = create_keyspace_cql("air_quality", 3).unwrap();
        assert!(cql.starts_with("CREATE KEYSPACE IF NOT EXISTS air_quality "));
        assert!(cql.contains("'replication_factor': 3"));

        for bad in ["", "1st", "air-quality", "x; DROP KEYSPACE y"] {
            assert!(matches!(
                create_keyspace_cql(bad, 1),
                Err(StoreError::InvalidIdentifier(_))
            ));
        }
    }
}
