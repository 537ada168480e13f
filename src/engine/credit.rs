//! Crediting purchase PV to a single tree node.

use crate::domain::{Decimal, DecimalOverflow, Leg, Member, TimeMs};

use super::activation::evaluate_activation;

/// Result of crediting PV to a single node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CreditEffect {
    /// The node flipped from inactive to active with this credit.
    pub newly_activated: bool,
}

/// Credit `amount` PV and one placement to `leg` of `member`.
///
/// Activation is evaluated against the member's own updated counts and only
/// ever flips false to true. On overflow the member is left untouched.
pub fn apply_credit(
    member: &mut Member,
    leg: Leg,
    amount: Decimal,
    now: TimeMs,
) -> Result<CreditEffect, DecimalOverflow> {
    match leg {
        Leg::Left => {
            member.left_leg_pv = member.left_leg_pv.add_or_overflow(amount, "left leg pv")?;
            member.left_leg_count = member.left_leg_count.saturating_add(1);
        }
        Leg::Right => {
            member.right_leg_pv = member.right_leg_pv.add_or_overflow(amount, "right leg pv")?;
            member.right_leg_count = member.right_leg_count.saturating_add(1);
        }
    }
    member.last_activity_date = Some(now);

    let mut effect = CreditEffect::default();
    if !member.binary_activated
        && evaluate_activation(member.left_leg_count, member.right_leg_count)
    {
        member.binary_activated = true;
        member.binary_activation_date = Some(now);
        effect.newly_activated = true;
    }
    Ok(effect)
}
