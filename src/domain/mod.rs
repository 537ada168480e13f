//! Domain types for the binary network ledger.
//!
//! This module provides:
//! - Lossless numeric handling via the Decimal wrapper
//! - Domain primitives: TimeMs, UserId, Leg, Position
//! - The Member tree node and Commission ledger entry

pub mod commission;
pub mod decimal;
pub mod member;
pub mod primitives;

pub use commission::{CommissionEntry, CommissionStatus, CommissionType, Period};
pub use decimal::{Decimal, DecimalOverflow};
pub use member::Member;
pub use primitives::{Leg, ParseError, Position, TimeMs, UserId, MS_PER_DAY};
