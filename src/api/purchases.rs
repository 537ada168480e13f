use axum::extract::State;
use axum::Json;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use uuid::Uuid;

use super::members::parse_user_id;
use super::AppState;
use crate::domain::{Decimal, Leg};
use crate::error::AppError;
use crate::orchestration::CreditOutcome;

/// A package purchase event from the purchase system.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PurchaseRequest {
    /// Idempotency key. Redelivering the same event never double-credits.
    pub event_id: Option<String>,
    pub user_id: String,
    pub leg: String,
    pub pv: Option<Decimal>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PurchaseResponse {
    pub event_id: String,
    pub pv: Decimal,
    #[serde(flatten)]
    pub outcome: CreditOutcome,
}

pub async fn record_purchase(
    State(state): State<AppState>,
    Json(body): Json<PurchaseRequest>,
) -> Result<Json<PurchaseResponse>, AppError> {
    let user_id = parse_user_id(&body.user_id, "userId")?;
    let leg = Leg::from_str(&body.leg).map_err(|e| AppError::BadRequest(e.to_string()))?;
    let pv = body.pv.unwrap_or(state.config.package_pv);
    let event_id = match body.event_id {
        Some(id) if !id.trim().is_empty() => id,
        _ => Uuid::new_v4().to_string(),
    };

    let outcome = state
        .propagator
        .credit_pv(&event_id, &user_id, leg, pv)
        .await?;

    Ok(Json(PurchaseResponse {
        event_id,
        pv,
        outcome,
    }))
}
