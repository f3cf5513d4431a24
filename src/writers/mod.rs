pub mod concurrent_writer;
pub mod timing_log;

pub use concurrent_writer::{ConcurrentWriter, WriteFailure, WriteMode, WriteReport};
pub use timing_log::{TimingLog, TimingRecord};
