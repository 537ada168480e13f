//! Binary bonus activation rule.

/// Whether a member with these leg placement counts qualifies for binary bonus.
///
/// Requires a 1:2 ratio in either direction: one placement on one leg and at
/// least two on the other.
pub fn evaluate_activation(left_leg_count: u64, right_leg_count: u64) -> bool {
    (left_leg_count >= 1 && right_leg_count >= 2) || (right_leg_count >= 1 && left_leg_count >= 2)
}
