//! Commission ledger entries and settlement periods.

use crate::domain::{Decimal, TimeMs, UserId};
use chrono::{Datelike, FixedOffset};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommissionType {
    BinaryBonus,
}

impl CommissionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            CommissionType::BinaryBonus => "binary_bonus",
        }
    }
}

impl FromStr for CommissionType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "binary_bonus" => Ok(CommissionType::BinaryBonus),
            other => Err(format!("unknown commission type {}", other)),
        }
    }
}

/// Payout state. Entries are created `Pending`; the payout workflow moves them on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CommissionStatus {
    Pending,
    Approved,
    Paid,
    Cancelled,
}

impl CommissionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CommissionStatus::Pending => "pending",
            CommissionStatus::Approved => "approved",
            CommissionStatus::Paid => "paid",
            CommissionStatus::Cancelled => "cancelled",
        }
    }
}

impl FromStr for CommissionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(CommissionStatus::Pending),
            "approved" => Ok(CommissionStatus::Approved),
            "paid" => Ok(CommissionStatus::Paid),
            "cancelled" => Ok(CommissionStatus::Cancelled),
            other => Err(format!("unknown commission status {}", other)),
        }
    }
}

/// Settlement period a commission is booked against.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Period {
    pub month: u32,
    pub year: i32,
    /// ISO week, e.g. `2026-W42`. One binary bonus per member per week.
    pub week_key: String,
}

impl Period {
    /// The period containing `at`, evaluated in the settlement timezone.
    pub fn containing(at: TimeMs, offset: FixedOffset) -> Self {
        let local = at.to_datetime().with_timezone(&offset);
        let iso = local.iso_week();
        Self {
            month: local.month(),
            year: local.year(),
            week_key: format!("{}-W{:02}", iso.year(), iso.week()),
        }
    }
}

/// An append-only payable amount produced by a settlement run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommissionEntry {
    pub id: Uuid,
    /// Unique per (user, type, period); the ledger rejects a second entry.
    pub entry_key: String,
    pub user_id: UserId,
    pub commission_type: CommissionType,
    pub gross_amount: Decimal,
    pub net_amount: Decimal,
    pub status: CommissionStatus,
    pub earning_date: TimeMs,
    pub period: Period,
    pub matched_volume: Decimal,
    pub rank_name: String,
    pub bonus_percent: u32,
    pub description: String,
}

impl CommissionEntry {
    /// A pending binary bonus for `matched_volume` paid at `bonus_percent`.
    pub fn binary_bonus(
        user_id: UserId,
        matched_volume: Decimal,
        income: Decimal,
        rank_name: &str,
        bonus_percent: u32,
        earning_date: TimeMs,
        period: Period,
    ) -> Self {
        let entry_key =
            Self::compute_entry_key(&user_id, CommissionType::BinaryBonus, &period.week_key);
        let description = format!(
            "Binary matching bonus: {} PV matched at {} ({}%)",
            matched_volume, rank_name, bonus_percent
        );
        Self {
            id: Uuid::new_v4(),
            entry_key,
            user_id,
            commission_type: CommissionType::BinaryBonus,
            gross_amount: income,
            net_amount: income,
            status: CommissionStatus::Pending,
            earning_date,
            period,
            matched_volume,
            rank_name: rank_name.to_string(),
            bonus_percent,
            description,
        }
    }

    /// Stable idempotency key for one commission per member, type and period.
    pub fn compute_entry_key(user_id: &UserId, kind: CommissionType, period_key: &str) -> String {
        use sha2::{Digest, Sha256};

        fn hash_var(hasher: &mut Sha256, data: &str) {
            hasher.update((data.len() as u32).to_le_bytes());
            hasher.update(data.as_bytes());
        }

        let mut hasher = Sha256::new();
        hash_var(&mut hasher, user_id.as_str());
        hash_var(&mut hasher, kind.as_str());
        hash_var(&mut hasher, period_key);

        let hash = hasher.finalize();
        format!("{}:{}", kind.as_str(), hex::encode(&hash[..16]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn d(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    fn utc() -> FixedOffset {
        FixedOffset::east_opt(0).unwrap()
    }

    #[test]
    fn test_period_uses_iso_week() {
        // Friday 2026-10-16 23:59 UTC
        let at = TimeMs::from(Utc.with_ymd_and_hms(2026, 10, 16, 23, 59, 0).unwrap());
        let period = Period::containing(at, utc());
        assert_eq!(period.week_key, "2026-W42");
        assert_eq!(period.month, 10);
        assert_eq!(period.year, 2026);
    }

    #[test]
    fn test_period_respects_offset() {
        // Sunday 2026-10-18 23:30 UTC is already Monday in UTC+02:00.
        let at = TimeMs::from(Utc.with_ymd_and_hms(2026, 10, 18, 23, 30, 0).unwrap());
        assert_eq!(Period::containing(at, utc()).week_key, "2026-W42");
        let plus_two = FixedOffset::east_opt(2 * 3600).unwrap();
        assert_eq!(Period::containing(at, plus_two).week_key, "2026-W43");
    }

    #[test]
    fn test_binary_bonus_entry_fields() {
        let at = TimeMs::from(Utc.with_ymd_and_hms(2026, 10, 16, 12, 0, 0).unwrap());
        let entry = CommissionEntry::binary_bonus(
            UserId::new("u1"),
            d("94.5"),
            d("9.45"),
            "IGNITOR",
            10,
            at,
            Period::containing(at, utc()),
        );
        assert_eq!(entry.status, CommissionStatus::Pending);
        assert_eq!(entry.commission_type, CommissionType::BinaryBonus);
        assert_eq!(entry.gross_amount, entry.net_amount);
        assert_eq!(
            entry.description,
            "Binary matching bonus: 94.5 PV matched at IGNITOR (10%)"
        );
        assert!(entry.entry_key.starts_with("binary_bonus:"));
    }

    #[test]
    fn test_entry_key_is_stable_per_period() {
        let user = UserId::new("u1");
        let k1 = CommissionEntry::compute_entry_key(&user, CommissionType::BinaryBonus, "2026-W42");
        let k2 = CommissionEntry::compute_entry_key(&user, CommissionType::BinaryBonus, "2026-W42");
        let k3 = CommissionEntry::compute_entry_key(&user, CommissionType::BinaryBonus, "2026-W43");
        assert_eq!(k1, k2);
        assert_ne!(k1, k3);
    }

    #[test]
    fn test_status_round_trips_through_str() {
        for status in [
            CommissionStatus::Pending,
            CommissionStatus::Approved,
            CommissionStatus::Paid,
            CommissionStatus::Cancelled,
        ] {
            assert_eq!(CommissionStatus::from_str(status.as_str()), Ok(status));
        }
        assert!(CommissionStatus::from_str("bogus").is_err());
    }
}
