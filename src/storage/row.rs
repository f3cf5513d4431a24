use super::CqlValue;

/// A record type that knows how to write itself to its table.
pub trait StorageRow: Send + Sync + 'static {
    /// INSERT template whose markers line up with [`StorageRow::bind_values`].
    const INSERT: &'static str;

    /// Values of the partition key columns; rows sharing them may be batched.
    fn partition_key(&self) -> Vec<CqlValue>;

    fn bind_values(&self) -> Vec<CqlValue>;

    /// Short human-readable identity used in failure reports.
    fn describe(&self) -> String;
}
