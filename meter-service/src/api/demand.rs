use axum::{extract::State, Json};
use meter_core::{
    aggregate::{
        daily_profile, hourly_profile, realtime_series, DemandBucket, DemandPoint, DemandStats,
        DemandView,
    },
    domain::Reading,
};
use serde::Serialize;
use time::OffsetDateTime;

use crate::{error::ApiError, state::AppState};

#[derive(Debug, Serialize)]
pub struct HourlyStats {
    #[serde(flatten)]
    pub stats: DemandStats,
    pub horas_com_dados: usize,
}

#[derive(Debug, Serialize)]
pub struct HourlyResponse {
    pub status: &'static str,
    pub periodo: &'static str,
    pub total_horas: usize,
    pub dados: Vec<DemandBucket>,
    pub estatisticas: HourlyStats,
}

#[derive(Debug, Serialize)]
pub struct DailyStats {
    #[serde(flatten)]
    pub stats: DemandStats,
    pub dias_com_dados: usize,
}

#[derive(Debug, Serialize)]
pub struct DailyResponse {
    pub status: &'static str,
    pub periodo: &'static str,
    pub total_dias: usize,
    pub dados: Vec<DemandBucket>,
    pub estatisticas: DailyStats,
}

#[derive(Debug, Serialize)]
pub struct RealtimeStats {
    pub demanda_atual: f64,
    pub demanda_maxima: f64,
}

#[derive(Debug, Serialize)]
pub struct RealtimeResponse {
    pub status: &'static str,
    pub periodo: &'static str,
    pub total_registros: usize,
    pub dados: Vec<DemandPoint>,
    pub estatisticas: RealtimeStats,
}

async fn fetch(
    state: &AppState,
    view: DemandView,
    now: OffsetDateTime,
) -> Result<Vec<Reading>, ApiError> {
    metrics::counter!("demand_queries_total", "view" => view.name()).increment(1);
    let (since, until) = view.bounds(now);
    state
        .store
        .window(since, until)
        .await
        .map_err(ApiError::store("failed to load demand window"))
}

/// `GET /api/demanda-diaria`: one bucket per hour of the last 24 hours.
pub async fn hourly(State(state): State<AppState>) -> Result<Json<HourlyResponse>, ApiError> {
    let now = OffsetDateTime::now_utc();
    let readings = fetch(&state, DemandView::Hourly, now).await?;
    let profile = hourly_profile(&readings, now, state.settings.offset);

    Ok(Json(HourlyResponse {
        status: "success",
        periodo: "Últimas 24 horas",
        total_horas: profile.buckets.len(),
        dados: profile.buckets,
        estatisticas: HourlyStats {
            horas_com_dados: profile.stats.buckets_with_data,
            stats: profile.stats,
        },
    }))
}

/// `GET /api/demanda-mensal`: one bucket per local calendar day with data.
pub async fn daily(State(state): State<AppState>) -> Result<Json<DailyResponse>, ApiError> {
    let now = OffsetDateTime::now_utc();
    let readings = fetch(&state, DemandView::Daily, now).await?;
    let profile = daily_profile(&readings, now, state.settings.offset);

    Ok(Json(DailyResponse {
        status: "success",
        periodo: "Últimos 30 dias",
        total_dias: profile.buckets.len(),
        dados: profile.buckets,
        estatisticas: DailyStats {
            dias_com_dados: profile.stats.buckets_with_data,
            stats: profile.stats,
        },
    }))
}

pub async fn realtime(State(state): State<AppState>) -> Result<Json<RealtimeResponse>, ApiError> {
    let now = OffsetDateTime::now_utc();
    let readings = fetch(&state, DemandView::Realtime, now).await?;
    let series = realtime_series(&readings, now, state.settings.offset);

    Ok(Json(RealtimeResponse {
        status: "success",
        periodo: "Últimas 6 horas",
        total_registros: series.points.len(),
        dados: series.points,
        estatisticas: RealtimeStats {
            demanda_atual: series.current,
            demanda_maxima: series.max,
        },
    }))
}
