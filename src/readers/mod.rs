pub mod chunked_source;
pub mod reference_reader;

pub use chunked_source::{ChunkedRecordSource, CsvRecord, Located};
pub use reference_reader::ReferenceReader;
