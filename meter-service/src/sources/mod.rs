use meter_core::domain::Reading;
use serde_json::Value;

use crate::pipeline::PipelineError;

pub mod legacy_dump;
pub mod ndjson_file;

pub use legacy_dump::LegacyDumpSource;
pub use ndjson_file::NdjsonFileSource;

/// Rebuilds a stored reading from one legacy record, tagging failures with
/// the record number.
pub(crate) fn decode_record(value: Value, position: usize) -> Result<Reading, PipelineError> {
    Reading::from_stored(value)
        .map_err(|e| PipelineError::Source(format!("record {position}: {e}")))
}
