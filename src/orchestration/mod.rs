//! Store-backed workflows: placement, PV propagation, weekly settlement
//! and its scheduler.

pub mod placement;
pub mod propagation;
pub mod scheduler;
pub mod settlement;

pub use placement::place_member;
pub use propagation::{CreditOutcome, PropagationHalt, PvPropagator, DEFAULT_MAX_PURCHASE_PV};
pub use scheduler::{ScheduleError, SettlementScheduler, WeeklySchedule};
pub use settlement::{MemberOutcome, MemberResult, SettlementReport, SettlementRunner};
