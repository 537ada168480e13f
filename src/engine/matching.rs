//! Weekly binary matching rules: inactivity reset, matched volume, income.

use crate::domain::{Decimal, DecimalOverflow, Member, TimeMs};
use serde::Serialize;

use super::rank::{resolve_rank, Rank};

/// What happens to a member whose PV is wiped for inactivity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ReactivationPolicy {
    /// Keep `binary_activated`; the member earns again as soon as PV matches.
    Keep,
    /// Clear activation and leg counts; the 1:2 rule must be met again.
    Requalify,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SettlementRules {
    pub inactivity_days: i64,
    pub reactivation: ReactivationPolicy,
}

impl Default for SettlementRules {
    fn default() -> Self {
        Self {
            inactivity_days: 90,
            reactivation: ReactivationPolicy::Keep,
        }
    }
}

/// Figures for a member whose legs matched this period.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchComputation {
    pub total_left: Decimal,
    pub total_right: Decimal,
    pub matched_volume: Decimal,
    pub rank: Rank,
    pub income: Decimal,
    pub carry_forward_left: Decimal,
    pub carry_forward_right: Decimal,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MatchDecision {
    /// Inactive for at least `inactivity_days`: wipe PV, no income.
    Reset { days_inactive: i64 },
    /// Nothing to match on at least one side.
    NoMatch { total_left: Decimal, total_right: Decimal },
    Match(MatchComputation),
}

/// Decide the settlement outcome for one activated member at `now`.
///
/// Fails only when the member's stored amounts are too large to combine.
pub fn evaluate_member(
    member: &Member,
    now: TimeMs,
    rules: &SettlementRules,
) -> Result<MatchDecision, DecimalOverflow> {
    if let Some(last) = member.last_activity_date {
        let days_inactive = now.days_since(last);
        if days_inactive >= rules.inactivity_days {
            return Ok(MatchDecision::Reset { days_inactive });
        }
    }

    let total_left = member.total_left_pv()?;
    let total_right = member.total_right_pv()?;
    let matched_volume = std::cmp::min(total_left, total_right);

    if !matched_volume.is_positive() {
        return Ok(MatchDecision::NoMatch {
            total_left,
            total_right,
        });
    }

    let rank = resolve_rank(member.total_active_affiliates);
    let income = matched_volume
        .checked_percent(rank.bonus_percent)
        .ok_or(DecimalOverflow("binary income"))?;

    Ok(MatchDecision::Match(MatchComputation {
        total_left,
        total_right,
        matched_volume,
        rank,
        income,
        carry_forward_left: total_left - matched_volume,
        carry_forward_right: total_right - matched_volume,
    }))
}

/// Zero all PV and carry-forward, stamping the reset.
pub fn apply_reset(member: &mut Member, now: TimeMs, policy: ReactivationPolicy) {
    member.left_leg_pv = Decimal::zero();
    member.right_leg_pv = Decimal::zero();
    member.carry_forward_left_pv = Decimal::zero();
    member.carry_forward_right_pv = Decimal::zero();
    member.inactivity_reset_date = Some(now);

    if policy == ReactivationPolicy::Requalify {
        member.binary_activated = false;
        member.binary_activation_date = None;
        member.left_leg_count = 0;
        member.right_leg_count = 0;
    }
}

/// Book a match: move everything into carry-forward and roll up the totals.
///
/// Lifetime totals are computed before anything is written, so an overflow
/// leaves the member untouched.
pub fn apply_match(
    member: &mut Member,
    computation: &MatchComputation,
    now: TimeMs,
) -> Result<(), DecimalOverflow> {
    let total_matched_pv = member
        .total_matched_pv
        .add_or_overflow(computation.matched_volume, "total matched pv")?;
    let total_binary_income = member
        .total_binary_income
        .add_or_overflow(computation.income, "total binary income")?;
    let total_earnings = member
        .total_earnings
        .add_or_overflow(computation.income, "total earnings")?;

    member.carry_forward_left_pv = computation.carry_forward_left;
    member.carry_forward_right_pv = computation.carry_forward_right;
    member.total_matched_pv = total_matched_pv;
    member.weekly_binary_income = computation.income;
    member.total_binary_income = total_binary_income;
    member.total_earnings = total_earnings;
    member.last_binary_match_date = Some(now);
    member.left_leg_pv = Decimal::zero();
    member.right_leg_pv = Decimal::zero();
    Ok(())
}
