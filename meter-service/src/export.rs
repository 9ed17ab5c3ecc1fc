//! CSV rendering of stored readings for spreadsheet download.

use meter_core::domain::Reading;
use time::{format_description::well_known::Rfc3339, macros::format_description, OffsetDateTime};

/// Register columns of the full export, header then wire key.
const FULL_COLUMNS: &[(&str, &str)] = &[
    ("Tensão Trifásica (V)", "Tensao_Trifasica"),
    ("Corrente Trifásica (A)", "Corrente_Trifasica"),
    ("Fator Potência Trifásico", "Fator_Potencia_Trifasico"),
    ("Potência Aparente Trifásica (VA)", "Potencia_Aparente_Trifasica"),
    ("Potência Reativa Trifásica (Var)", "Potencia_Reativa_Trifasica"),
    ("Potência Ativa Trifásica (W)", "Potencia_Ativa_Trifasica"),
    ("Frequência (Hz)", "Frequencia"),
    ("Tensão Fase 1 (V)", "Tensao_Fase_1"),
    ("Tensão Fase 2 (V)", "Tensao_Fase_2"),
    ("Tensão Fase 3 (V)", "Tensao_Fase_3"),
    ("Corrente Fase 1 (A)", "Corrente_Fase_1"),
    ("Corrente Fase 2 (A)", "Corrente_Fase_2"),
    ("Corrente Fase 3 (A)", "Corrente_Fase_3"),
    ("Energia Ativa Positiva (kWh)", "Energia_Ativa_Positiva"),
    ("Energia Reativa Positiva (kVARh)", "Energia_Reativa_Positiva"),
    ("Demanda Máxima Ativa (W)", "Demanda_Maxima_Ativa"),
    ("Demanda Ativa (W)", "Demanda_Ativa"),
    ("Tensão Linha 12 (V)", "Tensao_Linha_12"),
    ("Tensão Linha 23 (V)", "Tensao_Linha_23"),
    ("Tensão Linha 31 (V)", "Tensao_Linha_31"),
    ("THD Tensão Fase 1 (%)", "THD_Tensao_Fase_1"),
    ("THD Tensão Fase 2 (%)", "THD_Tensao_Fase_2"),
    ("THD Tensão Fase 3 (%)", "THD_Tensao_Fase_3"),
    ("THD Corrente Fase 1 (%)", "THD_Corrente_Fase_1"),
    ("THD Corrente Fase 2 (%)", "THD_Corrente_Fase_2"),
    ("THD Corrente Fase 3 (%)", "THD_Corrente_Fase_3"),
];

const SUMMARY_COLUMNS: &[(&str, &str)] = &[
    ("Tensao_Trifasica_V", "Tensao_Trifasica"),
    ("Corrente_Trifasica_A", "Corrente_Trifasica"),
    ("Potencia_Ativa_W", "Potencia_Ativa_Trifasica"),
    ("Demanda_Ativa_W", "Demanda_Ativa"),
    ("Frequencia_Hz", "Frequencia"),
    ("Fator_Potencia", "Fator_Potencia_Trifasico"),
    ("Energia_Ativa_kWh", "Energia_Ativa_Positiva"),
    ("THD_Tensao_F1_%", "THD_Tensao_Fase_1"),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportKind {
    Full,
    Summary,
    Period,
}

impl ExportKind {
    pub fn name(self) -> &'static str {
        match self {
            ExportKind::Full => "completos",
            ExportKind::Summary => "resumidos",
            ExportKind::Period => "periodo",
        }
    }

    pub fn file_name(self, now: OffsetDateTime) -> anyhow::Result<String> {
        let stamp = now.format(format_description!(
            "[year]-[month]-[day]_[hour]-[minute]-[second]"
        ))?;
        Ok(format!("dados_{}_multimedidor_{stamp}.csv", self.name()))
    }
}

fn cell(value: Option<f64>) -> String {
    value.map(|v| v.to_string()).unwrap_or_default()
}

/// Renders `readings` (oldest first) as `;`-separated CSV with CRLF line
/// endings. Absent registers are empty cells.
pub fn render(kind: ExportKind, readings: &[Reading]) -> anyhow::Result<Vec<u8>> {
    let mut wtr = csv::WriterBuilder::new()
        .delimiter(b';')
        .terminator(csv::Terminator::CRLF)
        .from_writer(Vec::new());

    match kind {
        ExportKind::Full | ExportKind::Period => {
            let mut header = vec!["ID", "Device ID", "Timestamp"];
            header.extend(FULL_COLUMNS.iter().map(|(h, _)| *h));
            header.extend(["Client IP", "Data/Hora Criação"]);
            wtr.write_record(&header)?;

            for (i, r) in readings.iter().enumerate() {
                let mut row = Vec::with_capacity(header.len());
                row.push((i + 1).to_string());
                row.push(r.device_id.clone().unwrap_or_default());
                row.push(r.device_timestamp.clone().unwrap_or_default());
                row.extend(FULL_COLUMNS.iter().map(|(_, key)| cell(r.measurements.get(key))));
                row.push(r.client_ip.clone().unwrap_or_default());
                row.push(r.created_at.format(&Rfc3339)?);
                wtr.write_record(&row)?;
            }
        }
        ExportKind::Summary => {
            let mut header = vec!["Data_Hora"];
            header.extend(SUMMARY_COLUMNS.iter().map(|(h, _)| *h));
            wtr.write_record(&header)?;

            for r in readings {
                let mut row = Vec::with_capacity(header.len());
                row.push(r.created_at.format(&Rfc3339)?);
                row.extend(SUMMARY_COLUMNS.iter().map(|(_, key)| cell(r.measurements.get(key))));
                wtr.write_record(&row)?;
            }
        }
    }

    wtr.into_inner()
        .map_err(|e| anyhow::anyhow!("failed to flush CSV writer: {}", e.error()))
}
