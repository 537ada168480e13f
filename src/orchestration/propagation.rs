//! Upward PV propagation from a purchasing member to the root of its tree.

use crate::db::Repository;
use crate::domain::{Decimal, Leg, Member, TimeMs, UserId};
use crate::engine::apply_credit;
use crate::error::LedgerError;
use serde::Serialize;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{error, info, warn};

/// Why upward propagation stopped before reaching a root.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "reason", content = "detail", rename_all = "snake_case")]
pub enum PropagationHalt {
    AncestorMissing(UserId),
    Cycle(UserId),
    MaxDepth,
    /// The ancestor's leg total would leave the decimal range.
    Overflow(UserId),
    Store(String),
}

/// Largest PV a single purchase may carry unless configured otherwise.
pub const DEFAULT_MAX_PURCHASE_PV: u32 = 1_000_000;

/// Result of crediting one purchase, reported for the purchasing member.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreditOutcome {
    pub user_id: UserId,
    pub left_leg_pv: Decimal,
    pub right_leg_pv: Decimal,
    pub activated: bool,
    pub newly_activated: bool,
    /// The purchasing member had already been credited for this event.
    pub duplicate: bool,
    pub ancestors_credited: usize,
    /// Ancestors skipped because an earlier attempt of this event reached them.
    pub ancestors_skipped: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub halt: Option<PropagationHalt>,
}

struct NodeCredit {
    member: Member,
    applied: bool,
    newly_activated: bool,
}

/// Credits purchase PV to a member and walks it up the sponsor chain.
///
/// Each node is credited in its own transaction and logged under the event
/// key, so a node is credited at most once per event. Retrying an event
/// resumes where an earlier attempt stopped. Failures above the purchasing
/// member halt the walk without undoing credits already applied below.
#[derive(Clone)]
pub struct PvPropagator {
    repo: Arc<Repository>,
    max_depth: usize,
    max_pv: Decimal,
}

impl PvPropagator {
    pub fn new(repo: Arc<Repository>, max_depth: usize) -> Self {
        Self {
            repo,
            max_depth,
            max_pv: Decimal::from(rust_decimal::Decimal::from(DEFAULT_MAX_PURCHASE_PV)),
        }
    }

    /// Reject purchases carrying more than `max_pv`.
    pub fn with_max_pv(mut self, max_pv: Decimal) -> Self {
        self.max_pv = max_pv;
        self
    }

    pub async fn credit_pv(
        &self,
        event_key: &str,
        member_id: &UserId,
        leg: Leg,
        pv_amount: Decimal,
    ) -> Result<CreditOutcome, LedgerError> {
        self.credit_pv_at(event_key, member_id, leg, pv_amount, TimeMs::now())
            .await
    }

    /// Credit `pv_amount` on `leg` to `member_id` and every ancestor, as of `at`.
    ///
    /// Every ancestor receives the same `leg` label as the purchasing member,
    /// whatever side of its own sponsor it sits on.
    pub async fn credit_pv_at(
        &self,
        event_key: &str,
        member_id: &UserId,
        leg: Leg,
        pv_amount: Decimal,
        at: TimeMs,
    ) -> Result<CreditOutcome, LedgerError> {
        if event_key.trim().is_empty() {
            return Err(LedgerError::Validation("event key must not be empty".into()));
        }
        if !pv_amount.is_positive() {
            return Err(LedgerError::Validation(format!(
                "pv amount must be positive, got {}",
                pv_amount
            )));
        }
        if pv_amount > self.max_pv {
            return Err(LedgerError::Validation(format!(
                "pv amount {} exceeds the per-purchase limit of {}",
                pv_amount, self.max_pv
            )));
        }

        let first = self
            .credit_node(event_key, member_id, leg, pv_amount, 0, at)
            .await?
            .ok_or_else(|| LedgerError::NotFound(format!("member {}", member_id)))?;

        let mut outcome = CreditOutcome {
            user_id: member_id.clone(),
            left_leg_pv: first.member.left_leg_pv,
            right_leg_pv: first.member.right_leg_pv,
            activated: first.member.binary_activated,
            newly_activated: first.newly_activated,
            duplicate: !first.applied,
            ancestors_credited: 0,
            ancestors_skipped: 0,
            halt: None,
        };

        let mut visited = HashSet::from([member_id.clone()]);
        let mut next = first.member.sponsor_id;
        let mut depth = 0usize;

        while let Some(ancestor) = next.take() {
            depth += 1;
            if !visited.insert(ancestor.clone()) {
                error!(event = %event_key, member = %ancestor, "sponsor cycle detected, propagation halted");
                outcome.halt = Some(PropagationHalt::Cycle(ancestor));
                break;
            }
            if depth > self.max_depth {
                error!(event = %event_key, max_depth = self.max_depth, "propagation depth limit reached");
                outcome.halt = Some(PropagationHalt::MaxDepth);
                break;
            }

            match self
                .credit_node(event_key, &ancestor, leg, pv_amount, depth, at)
                .await
            {
                Ok(Some(node)) => {
                    if node.applied {
                        outcome.ancestors_credited += 1;
                    } else {
                        outcome.ancestors_skipped += 1;
                    }
                    next = node.member.sponsor_id;
                }
                Ok(None) => {
                    warn!(event = %event_key, member = %ancestor, "ancestor missing, propagation halted");
                    outcome.halt = Some(PropagationHalt::AncestorMissing(ancestor));
                }
                Err(LedgerError::Overflow(e)) => {
                    error!(event = %event_key, member = %ancestor, error = %e, "ancestor pv out of range, propagation halted");
                    outcome.halt = Some(PropagationHalt::Overflow(ancestor));
                }
                Err(e) => {
                    error!(event = %event_key, member = %ancestor, error = %e, "ancestor credit failed, propagation halted");
                    outcome.halt = Some(PropagationHalt::Store(e.to_string()));
                }
            }
        }

        info!(
            event = %event_key,
            member = %member_id,
            leg = %leg,
            pv = %pv_amount,
            ancestors_credited = outcome.ancestors_credited,
            ancestors_skipped = outcome.ancestors_skipped,
            halted = outcome.halt.is_some(),
            "pv credited"
        );

        Ok(outcome)
    }

    async fn credit_node(
        &self,
        event_key: &str,
        user_id: &UserId,
        leg: Leg,
        amount: Decimal,
        depth: usize,
        at: TimeMs,
    ) -> Result<Option<NodeCredit>, LedgerError> {
        let Some(mut write) = self.repo.lock_member(user_id).await? else {
            return Ok(None);
        };

        if !write.record_credit(event_key, leg, amount, depth, at).await? {
            let member = write.member.clone();
            write.rollback().await?;
            return Ok(Some(NodeCredit {
                member,
                applied: false,
                newly_activated: false,
            }));
        }

        let effect = match apply_credit(&mut write.member, leg, amount, at) {
            Ok(effect) => effect,
            Err(e) => {
                write.rollback().await?;
                return Err(e.into());
            }
        };
        let member = write.commit().await?;
        if effect.newly_activated {
            info!(member = %user_id, "binary bonus activated");
        }

        Ok(Some(NodeCredit {
            member,
            applied: true,
            newly_activated: effect.newly_activated,
        }))
    }
}
