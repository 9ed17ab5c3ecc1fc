use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use time::{format_description::well_known::Rfc3339, OffsetDateTime};

/// Declares the meter registers once: the struct, its wire names and
/// lookup by wire name all come from the same list.
macro_rules! measurements {
    ($($field:ident => $key:literal,)*) => {
        /// Numeric registers reported by the meter. Every register is
        /// optional; a failed Modbus read arrives as `null`.
        #[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
        #[serde(default)]
        pub struct Measurements {
            $(
                #[serde(rename = $key)]
                pub $field: Option<f64>,
            )*
        }

        impl Measurements {
            /// Wire names of all registers, in register-map order.
            pub const KEYS: &'static [&'static str] = &[$($key),*];

            pub fn get(&self, key: &str) -> Option<f64> {
                match key {
                    $($key => self.$field,)*
                    _ => None,
                }
            }

            fn slot_mut(&mut self, key: &str) -> Option<&mut Option<f64>> {
                match key {
                    $($key => Some(&mut self.$field),)*
                    _ => None,
                }
            }
        }
    };
}

measurements! {
    voltage_3ph => "Tensao_Trifasica",
    current_3ph => "Corrente_Trifasica",
    power_factor_3ph => "Fator_Potencia_Trifasico",
    apparent_power_3ph => "Potencia_Aparente_Trifasica",
    reactive_power_3ph => "Potencia_Reativa_Trifasica",
    active_power_3ph => "Potencia_Ativa_Trifasica",
    frequency => "Frequencia",
    voltage_l1 => "Tensao_Fase_1",
    voltage_l2 => "Tensao_Fase_2",
    voltage_l3 => "Tensao_Fase_3",
    current_l1 => "Corrente_Fase_1",
    current_l2 => "Corrente_Fase_2",
    current_l3 => "Corrente_Fase_3",
    active_power_l1 => "Potencia_Ativa_Fase_1",
    active_power_l2 => "Potencia_Ativa_Fase_2",
    active_power_l3 => "Potencia_Ativa_Fase_3",
    reactive_power_l1 => "Potencia_Reativa_Fase_1",
    reactive_power_l2 => "Potencia_Reativa_Fase_2",
    reactive_power_l3 => "Potencia_Reativa_Fase_3",
    apparent_power_l1 => "Potencia_Aparente_Fase_1",
    apparent_power_l2 => "Potencia_Aparente_Fase_2",
    apparent_power_l3 => "Potencia_Aparente_Fase_3",
    power_factor_l1 => "Fator_Potencia_Fase_1",
    power_factor_l2 => "Fator_Potencia_Fase_2",
    power_factor_l3 => "Fator_Potencia_Fase_3",
    active_energy_import => "Energia_Ativa_Positiva",
    reactive_energy_import => "Energia_Reativa_Positiva",
    active_energy_export => "Energia_Ativa_Negativa",
    reactive_energy_export => "Energia_Reativa_Negativa",
    max_active_demand => "Demanda_Maxima_Ativa",
    active_demand => "Demanda_Ativa",
    max_apparent_demand => "Demanda_Maxima_Aparente",
    apparent_demand => "Demanda_Aparente",
    line_voltage_12 => "Tensao_Linha_12",
    line_voltage_23 => "Tensao_Linha_23",
    line_voltage_31 => "Tensao_Linha_31",
    max_voltage_3ph => "Tensao_Maxima_Trifasica",
    max_current_3ph => "Corrente_Maxima_Trifasica",
    voltage_thd_l1 => "THD_Tensao_Fase_1",
    voltage_thd_l2 => "THD_Tensao_Fase_2",
    voltage_thd_l3 => "THD_Tensao_Fase_3",
    current_thd_l1 => "THD_Corrente_Fase_1",
    current_thd_l2 => "THD_Corrente_Fase_2",
    current_thd_l3 => "THD_Corrente_Fase_3",
}

/// Keys the server owns; a device cannot set them.
const SERVER_KEYS: &[&str] = &["created_at", "client_ip"];

/// A device body as posted to the ingestion endpoint, before the server
/// stamps it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReadingPayload {
    pub device_id: Option<String>,
    pub device_timestamp: Option<String>,
    pub measurements: Measurements,
    pub extra: BTreeMap<String, Value>,
}

impl ReadingPayload {
    /// Lenient conversion from an arbitrary JSON object. Content never makes
    /// this fail: registers that are not numbers (or numeric strings) become
    /// absent and unknown keys are kept as-is.
    pub fn from_json(object: Map<String, Value>) -> Self {
        let mut payload = ReadingPayload::default();

        for (key, value) in object {
            match key.as_str() {
                "device_id" => payload.device_id = text(&value),
                "timestamp" => payload.device_timestamp = text(&value),
                k if SERVER_KEYS.contains(&k) => {}
                k => match payload.measurements.slot_mut(k) {
                    Some(slot) => *slot = numeric(&value),
                    None => {
                        payload.extra.insert(key, value);
                    }
                },
            }
        }

        payload
    }
}

fn numeric(value: &Value) -> Option<f64> {
    let v = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }?;
    v.is_finite().then_some(v)
}

fn text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RecordError {
    #[error("expected a JSON object")]
    NotAnObject,
    #[error("missing created_at")]
    MissingCreatedAt,
    #[error("invalid created_at {0}")]
    InvalidCreatedAt(String),
}

/// One stored telemetry record. Immutable once handed to a store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reading {
    #[serde(default)]
    pub device_id: Option<String>,
    /// Clock of the device; informational only.
    #[serde(rename = "timestamp", default)]
    pub device_timestamp: Option<String>,
    #[serde(default)]
    pub client_ip: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(flatten)]
    pub measurements: Measurements,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl Reading {
    pub fn received(payload: ReadingPayload, client_ip: Option<String>, created_at: OffsetDateTime) -> Self {
        Reading {
            device_id: payload.device_id,
            device_timestamp: payload.device_timestamp,
            client_ip,
            created_at,
            measurements: payload.measurements,
            extra: payload.extra,
        }
    }

    /// Rebuilds a reading from a stored record (a data file entry or an
    /// export line). Registers go through the same lenient conversion as
    /// live ingestion; only a missing or malformed `created_at` fails.
    pub fn from_stored(value: Value) -> Result<Reading, RecordError> {
        let Value::Object(mut object) = value else {
            return Err(RecordError::NotAnObject);
        };

        let created_at = match object.remove("created_at") {
            Some(Value::String(s)) => OffsetDateTime::parse(s.trim(), &Rfc3339)
                .map_err(|e| RecordError::InvalidCreatedAt(format!("'{s}': {e}")))?,
            Some(other) => return Err(RecordError::InvalidCreatedAt(other.to_string())),
            None => return Err(RecordError::MissingCreatedAt),
        };
        let client_ip = object.remove("client_ip").as_ref().and_then(text);

        Ok(Reading::received(
            ReadingPayload::from_json(object),
            client_ip,
            created_at,
        ))
    }

    /// Active demand in watts, the aggregation subject.
    pub fn demand(&self) -> Option<f64> {
        self.measurements.active_demand
    }
}
