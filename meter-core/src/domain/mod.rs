pub mod reading;

pub use reading::{Measurements, Reading, ReadingPayload, RecordError};
