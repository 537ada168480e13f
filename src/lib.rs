pub mod api;
pub mod config;
pub mod db;
pub mod domain;
pub mod engine;
pub mod error;
pub mod orchestration;

pub use config::Config;
pub use db::{init_db, Repository};
pub use domain::{
    CommissionEntry, CommissionStatus, Decimal, Leg, Member, Position, TimeMs, UserId,
};
pub use error::{AppError, LedgerError};
pub use orchestration::{PvPropagator, SettlementRunner, SettlementScheduler};
