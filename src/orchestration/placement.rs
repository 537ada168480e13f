//! Write-once placement of members under sponsors, with cycle checks.

use crate::db::Repository;
use crate::domain::{Member, Position, UserId};
use crate::error::LedgerError;
use std::collections::HashSet;
use tracing::info;

/// Create `user_id` if needed and, when given, place it under `sponsor_id`.
///
/// Placement is write-once: re-sending the same placement is a no-op, a
/// different one is a `Topology` error. `Position::Main` marks a root and
/// takes no sponsor; `Left`/`Right` require one.
pub async fn place_member(
    repo: &Repository,
    user_id: &UserId,
    placement: Option<(Option<UserId>, Position)>,
) -> Result<Member, LedgerError> {
    let member = repo.ensure_member(user_id).await?;
    let Some((sponsor_id, position)) = placement else {
        return Ok(member);
    };

    match (&sponsor_id, position) {
        (Some(_), Position::Main) => {
            return Err(LedgerError::Validation(
                "a main (root) position takes no sponsor".to_string(),
            ))
        }
        (None, Position::Left | Position::Right) => {
            return Err(LedgerError::Validation(format!(
                "a {} position requires a sponsor",
                position
            )))
        }
        _ => {}
    }

    if member.is_placed() {
        if member.sponsor_id == sponsor_id && member.position == Some(position) {
            return Ok(member);
        }
        return Err(LedgerError::Topology(format!(
            "member {} is already placed",
            user_id
        )));
    }

    if let Some(sponsor) = &sponsor_id {
        if sponsor == user_id {
            return Err(LedgerError::Topology(format!(
                "member {} cannot sponsor itself",
                user_id
            )));
        }
        if repo.get_member(sponsor).await?.is_none() {
            return Err(LedgerError::NotFound(format!("sponsor {}", sponsor)));
        }
        if sponsor_chain_contains(repo, sponsor, user_id).await? {
            return Err(LedgerError::Topology(format!(
                "placing {} under {} would create a cycle",
                user_id, sponsor
            )));
        }
    }

    if !repo
        .set_placement(user_id, sponsor_id.as_ref(), position)
        .await?
    {
        return Err(LedgerError::Topology(format!(
            "member {} was placed concurrently",
            user_id
        )));
    }

    info!(
        user = %user_id,
        sponsor = ?sponsor_id.as_ref().map(|s| s.as_str()),
        position = %position,
        "member placed"
    );

    repo.get_member(user_id)
        .await?
        .ok_or_else(|| LedgerError::NotFound(format!("member {}", user_id)))
}

/// Whether `target` appears on the sponsor chain starting at `start` (inclusive).
async fn sponsor_chain_contains(
    repo: &Repository,
    start: &UserId,
    target: &UserId,
) -> Result<bool, LedgerError> {
    let mut seen = HashSet::new();
    let mut current = Some(start.clone());
    while let Some(id) = current {
        if &id == target {
            return Ok(true);
        }
        if !seen.insert(id.clone()) {
            // Already looping above `target`; it is not on this chain.
            return Ok(false);
        }
        current = repo.get_member(&id).await?.and_then(|m| m.sponsor_id);
    }
    Ok(false)
}
