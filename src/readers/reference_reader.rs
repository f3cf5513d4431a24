use crate::error::{ProcessingError, Result};
use crate::readers::{ChunkedRecordSource, CsvRecord};
use std::path::Path;
use tracing::debug;
use validator::Validate;

/// Chunk size used when slurping small reference files.
const REFERENCE_CHUNK: usize = 1024;

/// Reads a whole reference file (stations or pollutants) and validates every record.
pub struct ReferenceReader;

impl ReferenceReader {
    pub fn read_all<T: CsvRecord + Validate>(path: &Path) -> Result<Vec<T>> {
        let source = ChunkedRecordSource::<T>::open(path, REFERENCE_CHUNK)?;
        let mut records = Vec::new();

        for chunk in source {
            for located in chunk? {
                located
                    .record
                    .validate()
                    .map_err(|e| ProcessingError::InvalidRow {
                        location: located.location,
                        message: e.to_string(),
                    })?;
                records.push(located.record);
            }
        }

        debug!("Read {} records from {}", records.len(), path.display());
        Ok(records)
    }
}
