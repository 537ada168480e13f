//! Commission ledger and settlement run audit rows.

use super::members::MemberWrite;
use super::{decimal_col, parsed_col, Repository};
use crate::domain::{
    CommissionEntry, CommissionStatus, CommissionType, Decimal, Period, TimeMs, UserId,
};
use serde::Serialize;
use sqlx::sqlite::SqliteRow;
use sqlx::{QueryBuilder, Row, Sqlite};
use uuid::Uuid;

/// Optional predicates for listing commission entries.
#[derive(Debug, Clone, Default)]
pub struct CommissionFilter {
    pub user_id: Option<UserId>,
    pub status: Option<CommissionStatus>,
    pub period_key: Option<String>,
}

/// Summary of one settlement run, kept for audit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SettlementRunRecord {
    pub run_id: Uuid,
    pub period_key: String,
    pub started_at: TimeMs,
    pub finished_at: TimeMs,
    pub members_processed: u64,
    pub matched_count: u64,
    pub reset_count: u64,
    pub no_match_count: u64,
    pub already_settled_count: u64,
    pub error_count: u64,
    pub total_matched_pv: Decimal,
    pub total_income: Decimal,
    pub cancelled: bool,
}

fn commission_from_row(row: &SqliteRow) -> Result<CommissionEntry, sqlx::Error> {
    let id: Uuid = parsed_col(row, "id")?;
    let commission_type: CommissionType = parsed_col(row, "commission_type")?;
    let status: CommissionStatus = parsed_col(row, "status")?;

    Ok(CommissionEntry {
        id,
        entry_key: row.try_get("entry_key")?,
        user_id: UserId::new(row.try_get::<String, _>("user_id")?),
        commission_type,
        gross_amount: decimal_col(row, "gross_amount")?,
        net_amount: decimal_col(row, "net_amount")?,
        status,
        earning_date: TimeMs::new(row.try_get("earning_date")?),
        period: Period {
            month: row.try_get::<i64, _>("period_month")? as u32,
            year: row.try_get::<i64, _>("period_year")? as i32,
            week_key: row.try_get("period_key")?,
        },
        matched_volume: decimal_col(row, "matched_volume")?,
        rank_name: row.try_get("rank_name")?,
        bonus_percent: row.try_get::<i64, _>("bonus_percent")? as u32,
        description: row.try_get("description")?,
    })
}

impl Repository {
    /// List commission entries matching `filter`, oldest first.
    pub async fn query_commissions(
        &self,
        filter: &CommissionFilter,
    ) -> Result<Vec<CommissionEntry>, sqlx::Error> {
        let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new(
            r#"
            SELECT id, entry_key, user_id, commission_type, gross_amount, net_amount,
                   status, earning_date, period_month, period_year, period_key,
                   matched_volume, rank_name, bonus_percent, description
            FROM commission_entries
            WHERE 1 = 1
            "#,
        );
        if let Some(user_id) = &filter.user_id {
            qb.push(" AND user_id = ").push_bind(user_id.as_str().to_string());
        }
        if let Some(status) = filter.status {
            qb.push(" AND status = ").push_bind(status.as_str());
        }
        if let Some(period_key) = &filter.period_key {
            qb.push(" AND period_key = ").push_bind(period_key.clone());
        }
        qb.push(" ORDER BY earning_date ASC, entry_key ASC");

        let rows = qb.build().fetch_all(&self.pool).await?;
        rows.iter().map(commission_from_row).collect()
    }

    /// Record a finished settlement run.
    pub async fn insert_settlement_run(&self, run: &SettlementRunRecord) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            INSERT INTO settlement_runs (
                run_id, period_key, started_at, finished_at, members_processed,
                matched_count, reset_count, no_match_count, already_settled_count,
                error_count, total_matched_pv, total_income, cancelled
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(run.run_id.to_string())
        .bind(run.period_key.as_str())
        .bind(run.started_at.as_ms())
        .bind(run.finished_at.as_ms())
        .bind(run.members_processed as i64)
        .bind(run.matched_count as i64)
        .bind(run.reset_count as i64)
        .bind(run.no_match_count as i64)
        .bind(run.already_settled_count as i64)
        .bind(run.error_count as i64)
        .bind(run.total_matched_pv.to_canonical_string())
        .bind(run.total_income.to_canonical_string())
        .bind(run.cancelled as i64)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Most recent settlement runs, newest first.
    pub async fn list_settlement_runs(
        &self,
        limit: i64,
    ) -> Result<Vec<SettlementRunRecord>, sqlx::Error> {
        let rows = sqlx::query(
            r#"
            SELECT run_id, period_key, started_at, finished_at, members_processed,
                   matched_count, reset_count, no_match_count, already_settled_count,
                   error_count, total_matched_pv, total_income, cancelled
            FROM settlement_runs
            ORDER BY started_at DESC, run_id ASC
            LIMIT ?
            "#,
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| {
                Ok(SettlementRunRecord {
                    run_id: parsed_col(row, "run_id")?,
                    period_key: row.try_get("period_key")?,
                    started_at: TimeMs::new(row.try_get("started_at")?),
                    finished_at: TimeMs::new(row.try_get("finished_at")?),
                    members_processed: row.try_get::<i64, _>("members_processed")? as u64,
                    matched_count: row.try_get::<i64, _>("matched_count")? as u64,
                    reset_count: row.try_get::<i64, _>("reset_count")? as u64,
                    no_match_count: row.try_get::<i64, _>("no_match_count")? as u64,
                    already_settled_count: row.try_get::<i64, _>("already_settled_count")?
                        as u64,
                    error_count: row.try_get::<i64, _>("error_count")? as u64,
                    total_matched_pv: decimal_col(row, "total_matched_pv")?,
                    total_income: decimal_col(row, "total_income")?,
                    cancelled: row.try_get::<i64, _>("cancelled")? != 0,
                })
            })
            .collect()
    }
}

impl MemberWrite {
    /// Append a commission entry inside this member's transaction.
    ///
    /// Returns false if an entry with the same `entry_key` already exists.
    pub async fn insert_commission(&mut self, entry: &CommissionEntry) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            r#"
            INSERT INTO commission_entries (
                id, entry_key, user_id, commission_type, gross_amount, net_amount,
                status, earning_date, period_month, period_year, period_key,
                matched_volume, rank_name, bonus_percent, description, created_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(entry_key) DO NOTHING
            "#,
        )
        .bind(entry.id.to_string())
        .bind(entry.entry_key.as_str())
        .bind(entry.user_id.as_str())
        .bind(entry.commission_type.as_str())
        .bind(entry.gross_amount.to_canonical_string())
        .bind(entry.net_amount.to_canonical_string())
        .bind(entry.status.as_str())
        .bind(entry.earning_date.as_ms())
        .bind(entry.period.month as i64)
        .bind(entry.period.year as i64)
        .bind(entry.period.week_key.as_str())
        .bind(entry.matched_volume.to_canonical_string())
        .bind(entry.rank_name.as_str())
        .bind(entry.bonus_percent as i64)
        .bind(entry.description.as_str())
        .bind(TimeMs::now().as_ms())
        .execute(&mut *self.tx)
        .await?;

        Ok(result.rows_affected() > 0)
    }
}
