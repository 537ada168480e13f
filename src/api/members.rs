use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

use super::AppState;
use crate::domain::{Member, Position, UserId};
use crate::engine::{resolve_rank, Rank};
use crate::error::AppError;
use crate::orchestration::place_member;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateMemberRequest {
    pub user_id: String,
    pub sponsor_id: Option<String>,
    pub position: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AffiliatesRequest {
    pub total_active_affiliates: u64,
}

/// A member record plus the rank its affiliate count currently resolves to.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MemberResponse {
    #[serde(flatten)]
    pub member: Member,
    pub rank: Rank,
}

impl From<Member> for MemberResponse {
    fn from(member: Member) -> Self {
        let rank = resolve_rank(member.total_active_affiliates);
        Self { member, rank }
    }
}

pub(crate) fn parse_user_id(raw: &str, field: &str) -> Result<UserId, AppError> {
    UserId::from_str(raw).map_err(|_| AppError::BadRequest(format!("Invalid {}", field)))
}

/// Create a member if absent and optionally place it in the tree.
///
/// `sponsorId` without `position` is rejected; a position alone is only
/// valid for `main`.
pub async fn create_member(
    State(state): State<AppState>,
    Json(body): Json<CreateMemberRequest>,
) -> Result<(StatusCode, Json<MemberResponse>), AppError> {
    let user_id = parse_user_id(&body.user_id, "userId")?;
    let sponsor_id = body
        .sponsor_id
        .as_deref()
        .map(|s| parse_user_id(s, "sponsorId"))
        .transpose()?;

    let placement = match body.position.as_deref() {
        Some(p) => {
            let position = Position::from_str(p)
                .map_err(|e| AppError::BadRequest(e.to_string()))?;
            Some((sponsor_id, position))
        }
        None if sponsor_id.is_some() => {
            return Err(AppError::BadRequest(
                "position is required when sponsorId is given".into(),
            ))
        }
        None => None,
    };

    let member = place_member(&state.repo, &user_id, placement).await?;
    Ok((StatusCode::CREATED, Json(member.into())))
}

pub async fn get_member(
    Path(user_id): Path<String>,
    State(state): State<AppState>,
) -> Result<Json<MemberResponse>, AppError> {
    let user_id = parse_user_id(&user_id, "userId")?;
    let member = state
        .repo
        .get_member(&user_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("member {}", user_id)))?;
    Ok(Json(member.into()))
}

/// Overwrite the active-affiliate count maintained by the referral system.
pub async fn set_affiliates(
    Path(user_id): Path<String>,
    State(state): State<AppState>,
    Json(body): Json<AffiliatesRequest>,
) -> Result<Json<MemberResponse>, AppError> {
    let user_id = parse_user_id(&user_id, "userId")?;
    if !state
        .repo
        .set_active_affiliates(&user_id, body.total_active_affiliates)
        .await?
    {
        return Err(AppError::NotFound(format!("member {}", user_id)));
    }

    let member = state
        .repo
        .get_member(&user_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("member {}", user_id)))?;
    Ok(Json(member.into()))
}
