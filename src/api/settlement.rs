use axum::extract::{Query, State};
use axum::Json;
use serde::{Deserialize, Serialize};

use super::AppState;
use crate::db::SettlementRunRecord;
use crate::domain::TimeMs;
use crate::error::AppError;
use crate::orchestration::SettlementReport;

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunSettlementQuery {
    /// Settle as of this instant instead of now. Selects the period and the
    /// inactivity reference point.
    pub at_ms: Option<i64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunsQuery {
    pub limit: Option<u32>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunsResponse {
    pub runs: Vec<SettlementRunRecord>,
}

/// Manually trigger a settlement run. Waits for any run already in progress.
pub async fn run_settlement(
    Query(params): Query<RunSettlementQuery>,
    State(state): State<AppState>,
) -> Result<Json<SettlementReport>, AppError> {
    let now = params.at_ms.map(TimeMs::new).unwrap_or_else(TimeMs::now);
    let report = state.settlement.run_settlement(now, None).await?;
    Ok(Json(report))
}

pub async fn list_runs(
    Query(params): Query<RunsQuery>,
    State(state): State<AppState>,
) -> Result<Json<RunsResponse>, AppError> {
    let limit = params.limit.unwrap_or(20).clamp(1, 500);
    let runs = state.repo.list_settlement_runs(i64::from(limit)).await?;
    Ok(Json(RunsResponse { runs }))
}
