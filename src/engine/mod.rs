//! Pure computation engine(s) for the binary ledger rules.

pub mod activation;
pub mod credit;
pub mod matching;
pub mod rank;

pub use activation::evaluate_activation;
pub use credit::{apply_credit, CreditEffect};
pub use matching::{
    apply_match, apply_reset, evaluate_member, MatchComputation, MatchDecision,
    ReactivationPolicy, SettlementRules,
};
pub use rank::{resolve_rank, Rank, RANKS};
