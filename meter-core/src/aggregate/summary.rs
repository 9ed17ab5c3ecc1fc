use serde::Serialize;
use time::OffsetDateTime;

use super::demand::round2;
use crate::domain::Reading;

/// Whole-store electrical summary.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReadingSummary {
    #[serde(rename = "total_leituras")]
    pub total_readings: usize,
    #[serde(rename = "tensao_media")]
    pub voltage_mean: f64,
    #[serde(rename = "corrente_media")]
    pub current_mean: f64,
    #[serde(rename = "potencia_media")]
    pub power_mean: f64,
    #[serde(rename = "potencia_maxima")]
    pub power_max: f64,
    #[serde(rename = "potencia_minima")]
    pub power_min: f64,
    #[serde(rename = "data_inicio", with = "time::serde::rfc3339::option")]
    pub first_at: Option<OffsetDateTime>,
    #[serde(rename = "data_fim", with = "time::serde::rfc3339::option")]
    pub last_at: Option<OffsetDateTime>,
}

/// Summarizes chronologically ordered readings. Means and extremes only
/// consider readings that carry a three-phase voltage; a missing current or
/// power in such a reading counts as zero, and the minimum power ignores
/// non-positive values.
pub fn summarize(readings: &[Reading]) -> ReadingSummary {
    let mut n = 0usize;
    let (mut voltage, mut current, mut power) = (0.0, 0.0, 0.0);
    let mut power_max: f64 = 0.0;
    let mut power_min: Option<f64> = None;

    for m in readings.iter().map(|r| &r.measurements) {
        let Some(v) = m.voltage_3ph else { continue };
        let p = m.active_power_3ph.unwrap_or(0.0);
        n += 1;
        voltage += v;
        current += m.current_3ph.unwrap_or(0.0);
        power += p;
        power_max = power_max.max(p);
        if p > 0.0 {
            power_min = Some(power_min.map_or(p, |cur| cur.min(p)));
        }
    }

    let mean = |sum: f64| if n > 0 { round2(sum / n as f64) } else { 0.0 };

    ReadingSummary {
        total_readings: readings.len(),
        voltage_mean: mean(voltage),
        current_mean: mean(current),
        power_mean: mean(power),
        power_max: round2(power_max),
        power_min: round2(power_min.unwrap_or(0.0)),
        first_at: readings.first().map(|r| r.created_at),
        last_at: readings.last().map(|r| r.created_at),
    }
}
