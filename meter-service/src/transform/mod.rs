use crate::pipeline::{Envelope, PipelineError, Transform};
use time::{macros::datetime, OffsetDateTime};

const MIN_CREATED_AT: OffsetDateTime = datetime!(2000-01-01 00:00:00 UTC);
const MAX_CREATED_AT: OffsetDateTime = datetime!(2100-01-01 00:00:00 UTC);

/// Pure validation of an imported reading.
///
/// Rules:
/// - `created_at` must fall in [2000-01-01, 2100-01-01).
/// - Energy counters must be non-negative.
pub fn validate_reading(env: Envelope) -> Result<Envelope, PipelineError> {
    let r = &env.reading;

    if r.created_at < MIN_CREATED_AT || r.created_at >= MAX_CREATED_AT {
        return Err(PipelineError::Transform(format!(
            "record {}: created_at out of allowed range",
            env.position
        )));
    }

    let m = &r.measurements;
    let counters = [
        ("Energia_Ativa_Positiva", m.active_energy_import),
        ("Energia_Reativa_Positiva", m.reactive_energy_import),
        ("Energia_Ativa_Negativa", m.active_energy_export),
        ("Energia_Reativa_Negativa", m.reactive_energy_export),
    ];
    if let Some((name, _)) = counters.iter().find(|(_, v)| v.is_some_and(|v| v < 0.0)) {
        return Err(PipelineError::Transform(format!(
            "record {}: {name} must be non-negative",
            env.position
        )));
    }

    Ok(env)
}

#[derive(Clone, Default)]
pub struct ReadingValidation;

#[async_trait::async_trait]
impl Transform for ReadingValidation {
    async fn apply(&self, input: Envelope) -> Result<Envelope, PipelineError> {
        match validate_reading(input) {
            Ok(env) => Ok(env),
            Err(e) => {
                metrics::counter!("import_invalid_total").increment(1);
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use meter_core::domain::{Reading, ReadingPayload};

    fn envelope(at: OffsetDateTime, energy: Option<f64>) -> Envelope {
        let mut payload = ReadingPayload::default();
        payload.measurements.active_energy_import = energy;
        Envelope {
            reading: Reading::received(payload, None, at),
            position: 7,
        }
    }

    #[test]
    fn accepts_valid_reading() {
        let res = validate_reading(envelope(datetime!(2024-01-01 00:00:00 UTC), Some(1234.5)));
        assert!(res.is_ok());
    }

    #[test]
    fn rejects_negative_energy_counter() {
        let res = validate_reading(envelope(datetime!(2024-01-01 00:00:00 UTC), Some(-0.1)));
        assert!(matches!(res, Err(PipelineError::Transform(_))));
    }

    #[test]
    fn rejects_out_of_range_timestamp() {
        let res = validate_reading(envelope(datetime!(1999-12-31 23:59:59 UTC), None));
        assert!(matches!(res, Err(PipelineError::Transform(_))));
        let res = validate_reading(envelope(datetime!(2100-01-01 00:00:00 UTC), None));
        assert!(matches!(res, Err(PipelineError::Transform(_))));
    }
}
