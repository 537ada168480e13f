//! Binary-tree member record.

use crate::domain::{Decimal, DecimalOverflow, Position, TimeMs, UserId};
use serde::{Deserialize, Serialize};

/// A user's node in the binary referral tree, with its per-leg PV ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Member {
    pub user_id: UserId,
    /// Write-once link to the member that placed this user.
    pub sponsor_id: Option<UserId>,
    /// Write-once placement relative to the sponsor.
    pub position: Option<Position>,

    pub left_leg_count: u64,
    pub right_leg_count: u64,
    /// PV accumulated in the current settlement period.
    pub left_leg_pv: Decimal,
    pub right_leg_pv: Decimal,
    /// Unmatched PV rolled over from earlier settlements.
    pub carry_forward_left_pv: Decimal,
    pub carry_forward_right_pv: Decimal,

    pub binary_activated: bool,
    pub binary_activation_date: Option<TimeMs>,

    /// Maintained by team-size logic outside this crate.
    pub total_active_affiliates: u64,

    pub total_matched_pv: Decimal,
    pub total_binary_income: Decimal,
    pub weekly_binary_income: Decimal,
    pub total_earnings: Decimal,
    pub last_binary_match_date: Option<TimeMs>,

    pub last_activity_date: Option<TimeMs>,
    pub inactivity_reset_date: Option<TimeMs>,

    #[serde(skip)]
    pub version: i64,
}

impl Member {
    /// A fresh, unplaced member with zeroed counters.
    pub fn new(user_id: UserId) -> Self {
        Self {
            user_id,
            sponsor_id: None,
            position: None,
            left_leg_count: 0,
            right_leg_count: 0,
            left_leg_pv: Decimal::zero(),
            right_leg_pv: Decimal::zero(),
            carry_forward_left_pv: Decimal::zero(),
            carry_forward_right_pv: Decimal::zero(),
            binary_activated: false,
            binary_activation_date: None,
            total_active_affiliates: 0,
            total_matched_pv: Decimal::zero(),
            total_binary_income: Decimal::zero(),
            weekly_binary_income: Decimal::zero(),
            total_earnings: Decimal::zero(),
            last_binary_match_date: None,
            last_activity_date: None,
            inactivity_reset_date: None,
            version: 0,
        }
    }

    /// Current-period PV plus carry-forward, per leg.
    pub fn total_left_pv(&self) -> Result<Decimal, DecimalOverflow> {
        self.left_leg_pv
            .add_or_overflow(self.carry_forward_left_pv, "total left pv")
    }

    pub fn total_right_pv(&self) -> Result<Decimal, DecimalOverflow> {
        self.right_leg_pv
            .add_or_overflow(self.carry_forward_right_pv, "total right pv")
    }

    pub fn is_placed(&self) -> bool {
        self.position.is_some()
    }

    pub fn is_root(&self) -> bool {
        self.sponsor_id.is_none()
    }
}
