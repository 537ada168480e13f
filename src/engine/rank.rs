//! Rank tiers keyed by active affiliate count.

use serde::Serialize;

/// A rank tier and the bonus percentage it pays on matched volume.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Rank {
    pub name: &'static str,
    pub min_affiliates: u64,
    pub bonus_percent: u32,
}

const fn rank(name: &'static str, min_affiliates: u64, bonus_percent: u32) -> Rank {
    Rank {
        name,
        min_affiliates,
        bonus_percent,
    }
}

/// Ascending by `min_affiliates`. The first entry is the default tier.
pub const RANKS: [Rank; 13] = [
    rank("NONE", 0, 0),
    rank("IGNITOR", 3, 10),
    rank("SPARK", 12, 10),
    rank("RISER", 40, 10),
    rank("PIONEER", 120, 10),
    rank("INNOVATOR", 250, 10),
    rank("TRAILBLAZER", 500, 15),
    rank("CATALYST", 1111, 15),
    rank("MOGUL", 2777, 15),
    rank("VANGUARD", 5555, 15),
    rank("LUMINARY", 11111, 20),
    rank("SOVEREIGN", 22222, 20),
    rank("ZENITH", 44444, 20),
];

/// Highest tier whose threshold is met by `total_active_affiliates`.
pub fn resolve_rank(total_active_affiliates: u64) -> Rank {
    let idx = RANKS.partition_point(|r| r.min_affiliates <= total_active_affiliates);
    // RANKS[0] has a zero threshold, so idx >= 1.
    RANKS[idx.saturating_sub(1)]
}
