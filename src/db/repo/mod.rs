//! Repository layer for database operations.
//!
//! This module provides the `Repository` struct for all database operations.
//! Methods are organized across submodules by domain:
//! - `members.rs` - Member tree nodes, locked member writes and the PV credit log
//! - `commissions.rs` - Commission ledger entries and settlement run audit rows

mod commissions;
mod members;

pub use commissions::{CommissionFilter, SettlementRunRecord};
pub use members::MemberWrite;

use crate::domain::{Decimal, TimeMs};
use sqlx::sqlite::{SqlitePool, SqliteRow};
use sqlx::Row;
use std::str::FromStr;

/// Repository for database operations.
pub struct Repository {
    pool: SqlitePool,
}

impl Repository {
    /// Create a new repository with the given connection pool.
    pub fn new(pool: SqlitePool) -> Self {
        Repository { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

/// Read a canonical decimal column, failing the row instead of guessing a value.
pub(crate) fn decimal_col(row: &SqliteRow, column: &str) -> Result<Decimal, sqlx::Error> {
    let raw: String = row.try_get(column)?;
    Decimal::from_str(&raw).map_err(|e| sqlx::Error::ColumnDecode {
        index: column.to_string(),
        source: Box::new(e),
    })
}

pub(crate) fn time_col(row: &SqliteRow, column: &str) -> Result<Option<TimeMs>, sqlx::Error> {
    let raw: Option<i64> = row.try_get(column)?;
    Ok(raw.map(TimeMs::new))
}

/// Parse a text column through `FromStr`, mapping failures to a decode error.
pub(crate) fn parsed_col<T>(row: &SqliteRow, column: &str) -> Result<T, sqlx::Error>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    let raw: String = row.try_get(column)?;
    raw.parse::<T>().map_err(|e| sqlx::Error::ColumnDecode {
        index: column.to_string(),
        source: format!("invalid value '{}': {}", raw, e).into(),
    })
}
