use axum::{
    extract::{Query, State},
    http::header,
    response::{IntoResponse, Response},
};
use meter_core::domain::Reading;
use serde::Deserialize;
use time::{macros::format_description, Date, OffsetDateTime, PrimitiveDateTime, Time};

use crate::{
    error::ApiError,
    export::{render, ExportKind},
    state::AppState,
};

fn attachment(kind: ExportKind, readings: &[Reading]) -> Result<Response, ApiError> {
    if readings.is_empty() {
        return Err(ApiError::NotFound("no readings to export".to_string()));
    }

    let body = render(kind, readings)?;
    let file_name = kind.file_name(OffsetDateTime::now_utc())?;
    metrics::counter!("csv_exports_total", "kind" => kind.name()).increment(1);
    tracing::info!(kind = kind.name(), rows = readings.len(), "csv export");

    Ok((
        [
            (header::CONTENT_TYPE, "text/csv; charset=utf-8".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{file_name}\""),
            ),
        ],
        body,
    )
        .into_response())
}

async fn latest_chronological(state: &AppState, limit: usize) -> Result<Vec<Reading>, ApiError> {
    let mut readings = state
        .store
        .recent(limit)
        .await
        .map_err(ApiError::store("failed to read readings for export"))?;
    readings.reverse();
    Ok(readings)
}

/// `GET /api/exportar/csv/completo`
pub async fn full(State(state): State<AppState>) -> Result<Response, ApiError> {
    let readings = latest_chronological(&state, state.settings.full_export_limit).await?;
    attachment(ExportKind::Full, &readings)
}

/// `GET /api/exportar/csv/resumido`
pub async fn summary(State(state): State<AppState>) -> Result<Response, ApiError> {
    let readings = latest_chronological(&state, state.settings.summary_export_limit).await?;
    attachment(ExportKind::Summary, &readings)
}

#[derive(Debug, Deserialize)]
pub struct PeriodParams {
    pub inicio: Option<String>,
    pub fim: Option<String>,
}

fn parse_date(name: &str, value: Option<&str>) -> Result<Date, ApiError> {
    let value = value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .ok_or_else(|| ApiError::BadRequest(format!("missing '{name}' (YYYY-MM-DD)")))?;
    Date::parse(value, format_description!("[year]-[month]-[day]"))
        .map_err(|_| ApiError::BadRequest(format!("invalid '{name}': {value}")))
}

/// `GET /api/exportar/csv/periodo?inicio=YYYY-MM-DD&fim=YYYY-MM-DD`. Both
/// dates are inclusive local calendar days.
pub async fn period(
    State(state): State<AppState>,
    Query(params): Query<PeriodParams>,
) -> Result<Response, ApiError> {
    let start = parse_date("inicio", params.inicio.as_deref())?;
    let end = parse_date("fim", params.fim.as_deref())?;
    if end < start {
        return Err(ApiError::BadRequest(
            "'fim' must not be before 'inicio'".to_string(),
        ));
    }
    let after_end = end
        .next_day()
        .ok_or_else(|| ApiError::BadRequest(format!("'fim' out of range: {end}")))?;

    let offset = state.settings.offset;
    let since = PrimitiveDateTime::new(start, Time::MIDNIGHT).assume_offset(offset);
    let until = PrimitiveDateTime::new(after_end, Time::MIDNIGHT).assume_offset(offset);

    let mut readings = state
        .store
        .window(since, until)
        .await
        .map_err(ApiError::store("failed to read readings for export"))?;
    let limit = state.settings.full_export_limit;
    if readings.len() > limit {
        readings.drain(..readings.len() - limit);
    }

    attachment(ExportKind::Period, &readings)
}
