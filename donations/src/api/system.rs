use super::AppState;
use crate::errors::RelayError;
use crate::store::StoreTotals;
use axum::{Json, extract::State};
use serde::Serialize;

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub(super) struct StatsResponse {
    uptime_secs: u64,
    registered_tenants: usize,
    #[serde(flatten)]
    totals: StoreTotals,
}

pub(super) async fn stats(State(state): State<AppState>) -> Result<Json<StatsResponse>, RelayError> {
    Ok(Json(StatsResponse {
        uptime_secs: state.started_at.elapsed().as_secs(),
        registered_tenants: state.tenants.list()?.len(),
        totals: state.store.totals(),
    }))
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub(super) struct HealthResponse {
    status: &'static str,
    uptime_secs: u64,
}

pub(super) async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        uptime_secs: state.started_at.elapsed().as_secs(),
    })
}
