use axum::extract::{Query, State};
use axum::Json;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

use super::members::parse_user_id;
use super::AppState;
use crate::db::CommissionFilter;
use crate::domain::{CommissionEntry, CommissionStatus, Decimal};
use crate::error::AppError;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommissionsQuery {
    pub user_id: Option<String>,
    pub status: Option<String>,
    /// ISO week key, e.g. `2026-W42`.
    pub period: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CommissionsResponse {
    pub total_net_amount: Decimal,
    pub commissions: Vec<CommissionEntry>,
}

pub async fn get_commissions(
    Query(params): Query<CommissionsQuery>,
    State(state): State<AppState>,
) -> Result<Json<CommissionsResponse>, AppError> {
    let user_id = match params.user_id.as_deref() {
        Some("") | None => None,
        Some(u) => Some(parse_user_id(u, "userId")?),
    };
    let status = match params.status.as_deref() {
        Some("") | None => None,
        Some(s) => Some(CommissionStatus::from_str(s).map_err(AppError::BadRequest)?),
    };
    let period_key = params.period.filter(|p| !p.is_empty());

    let commissions = state
        .repo
        .query_commissions(&CommissionFilter {
            user_id,
            status,
            period_key,
        })
        .await?;

    let total_net_amount = commissions
        .iter()
        .try_fold(Decimal::zero(), |acc, c| {
            acc.add_or_overflow(c.net_amount, "total net amount")
        })
        .map_err(|e| AppError::Internal(e.to_string()))?;
    Ok(Json(CommissionsResponse {
        total_net_amount,
        commissions,
    }))
}
