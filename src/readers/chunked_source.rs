use crate::error::{ProcessingError, Result, RowLocation};
use csv::{ReaderBuilder, StringRecord, Trim};
use serde::de::DeserializeOwned;
use std::fs::File;
use std::io::{BufReader, Read};
use std::marker::PhantomData;
use std::path::Path;
use tracing::debug;

/// A record type read from a headered CSV file with a fixed column layout.
pub trait CsvRecord: DeserializeOwned + Send + 'static {
    /// Expected header, in order.
    const COLUMNS: &'static [&'static str];
}

/// A parsed record together with where it came from.
#[derive(Debug, Clone, PartialEq)]
pub struct Located<T> {
    pub location: RowLocation,
    pub record: T,
}

/// Lazy sequence of record batches from one CSV source.
///
/// Only the current batch is held in memory. The header is checked when the
/// source is opened. After the first error the source yields nothing more.
pub struct ChunkedRecordSource<T> {
    reader: csv::Reader<Box<dyn Read + Send>>,
    headers: StringRecord,
    source_name: String,
    chunk_size: usize,
    rows_read: u64,
    finished: bool,
    _record: PhantomData<fn() -> T>,
}

impl<T: CsvRecord> ChunkedRecordSource<T> {
    pub fn open(path: &Path, chunk_size: usize) -> Result<Self> {
        let file = File::open(path)?;
        Self::from_reader(
            BufReader::new(file),
            &path.display().to_string(),
            chunk_size,
        )
    }

    pub fn from_reader<R: Read + Send + 'static>(
        input: R,
        source_name: &str,
        chunk_size: usize,
    ) -> Result<Self> {
        let boxed: Box<dyn Read + Send> = Box::new(input);
        let mut reader = ReaderBuilder::new()
            .has_headers(true)
            .trim(Trim::All)
            .from_reader(boxed);

        let headers = reader.headers()?.clone();
        check_header(source_name, &headers, T::COLUMNS)?;

        Ok(Self {
            reader,
            headers,
            source_name: source_name.to_string(),
            chunk_size: chunk_size.max(1),
            rows_read: 0,
            finished: false,
            _record: PhantomData,
        })
    }

    /// Data rows consumed so far.
    pub fn rows_read(&self) -> u64 {
        self.rows_read
    }

    fn finish(&mut self) {
        self.finished = true;
        debug!("Finished {}: {} rows", self.source_name, self.rows_read);
    }

    fn next_chunk(&mut self) -> Result<Vec<Located<T>>> {
        let mut chunk = Vec::with_capacity(self.chunk_size.min(4096));
        let mut record = StringRecord::new();

        while chunk.len() < self.chunk_size {
            let row = self.rows_read + 1;
            let has_row = self.reader.read_record(&mut record).map_err(|e| {
                let offset = e.position().map(|p| p.byte());
                ProcessingError::InvalidRow {
                    location: RowLocation::new(row, offset),
                    message: e.to_string(),
                }
            })?;
            if !has_row {
                break;
            }
            self.rows_read = row;

            let location = RowLocation::new(row, record.position().map(|p| p.byte()));
            let parsed = record
                .deserialize::<T>(Some(&self.headers))
                .map_err(|e| ProcessingError::InvalidRow {
                    location,
                    message: e.to_string(),
                })?;
            chunk.push(Located {
                location,
                record: parsed,
            });
        }

        Ok(chunk)
    }
}

impl<T: CsvRecord> Iterator for ChunkedRecordSource<T> {
    type Item = Result<Vec<Located<T>>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }

        match self.next_chunk() {
            Ok(chunk) if chunk.is_empty() => {
                self.finish();
                None
            }
            Ok(chunk) => {
                if chunk.len() < self.chunk_size {
                    self.finish();
                }
                Some(Ok(chunk))
            }
            Err(e) => {
                self.finished = true;
                Some(Err(e))
            }
        }
    }
}

fn check_header(source_name: &str, headers: &StringRecord, expected: &[&str]) -> Result<()> {
    let matches = headers.len() == expected.len()
        && headers.iter().zip(expected).all(|(found, want)| found == *want);

    if matches {
        Ok(())
    } else {
        Err(ProcessingError::SchemaMismatch {
            source_name: source_name.to_string(),
            expected: expected.iter().map(|c| c.to_string()).collect(),
            found: headers.iter().map(|c| c.to_string()).collect(),
        })
    }
}
