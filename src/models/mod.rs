pub mod aggregate;
pub mod measurement;
pub mod pollutant;
pub mod station;
pub mod time_uuid;

pub use aggregate::{ClassifiedAggregate, DailyAggregate, QualityLabel};
pub use measurement::{RawMeasurement, RawRow};
pub use pollutant::{Pollutant, PollutantCode, PollutantThreshold};
pub use station::Station;
pub use time_uuid::{TimeUuid, TimeUuidGenerator};
