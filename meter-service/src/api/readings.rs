use axum::{
    extract::{Query, State},
    Json,
};
use meter_core::{
    aggregate::{summarize, ReadingSummary},
    domain::Reading,
};
use serde::{Deserialize, Serialize};
use time::{OffsetDateTime, UtcOffset};

use crate::{error::ApiError, state::AppState};

/// `dd/mm/yyyy HH:MM:SS` in the dashboard's offset.
pub(crate) fn local_stamp(at: OffsetDateTime, offset: UtcOffset) -> String {
    let local = at.to_offset(offset);
    format!(
        "{:02}/{:02}/{} {:02}:{:02}:{:02}",
        local.day(),
        u8::from(local.month()),
        local.year(),
        local.hour(),
        local.minute(),
        local.second()
    )
}

#[derive(Debug, Serialize)]
pub struct OverviewResponse {
    pub status: &'static str,
    pub total_dados: usize,
    pub total_registros: usize,
    pub ultima_atualizacao: String,
    pub dados: Vec<Reading>,
}

/// `GET /api/data`: the latest few readings plus the store size.
pub async fn overview(State(state): State<AppState>) -> Result<Json<OverviewResponse>, ApiError> {
    let dados = state
        .store
        .recent(state.settings.latest_limit)
        .await
        .map_err(ApiError::store("failed to read readings"))?;
    let total = state
        .store
        .count()
        .await
        .map_err(ApiError::store("failed to count readings"))?;

    Ok(Json(OverviewResponse {
        status: "online",
        total_dados: dados.len(),
        total_registros: total,
        ultima_atualizacao: local_stamp(OffsetDateTime::now_utc(), state.settings.offset),
        dados,
    }))
}

#[derive(Debug, Serialize)]
pub struct LatestResponse {
    pub status: &'static str,
    pub dados: Option<Reading>,
}

pub async fn latest(State(state): State<AppState>) -> Result<Json<LatestResponse>, ApiError> {
    let mut recent = state
        .store
        .recent(1)
        .await
        .map_err(ApiError::store("failed to read readings"))?;

    Ok(Json(LatestResponse {
        status: "success",
        dados: recent.pop(),
    }))
}

#[derive(Debug, Deserialize)]
pub struct HistoryParams {
    pub limit: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct HistoryResponse {
    pub status: &'static str,
    pub total: usize,
    pub limite: usize,
    pub dados: Vec<Reading>,
}

/// `GET /api/history?limit=N`, newest first. A missing, unparsable or zero
/// limit falls back to the configured default.
pub async fn history(
    State(state): State<AppState>,
    Query(params): Query<HistoryParams>,
) -> Result<Json<HistoryResponse>, ApiError> {
    let limit = params
        .limit
        .as_deref()
        .and_then(|s| s.trim().parse::<usize>().ok())
        .filter(|n| *n > 0)
        .unwrap_or(state.settings.history_default_limit);

    let dados = state
        .store
        .recent(limit)
        .await
        .map_err(ApiError::store("failed to read history"))?;

    Ok(Json(HistoryResponse {
        status: "success",
        total: dados.len(),
        limite: limit,
        dados,
    }))
}

#[derive(Debug, Serialize)]
pub struct StatisticsResponse {
    pub status: &'static str,
    pub estatisticas: ReadingSummary,
}

pub async fn statistics(
    State(state): State<AppState>,
) -> Result<Json<StatisticsResponse>, ApiError> {
    let mut readings = state
        .store
        .recent(usize::MAX)
        .await
        .map_err(ApiError::store("failed to read readings"))?;
    readings.reverse();

    Ok(Json(StatisticsResponse {
        status: "success",
        estatisticas: summarize(&readings),
    }))
}
