//! Member tree nodes and the per-event PV credit log.

use super::{decimal_col, time_col, Repository};
use crate::domain::{Decimal, Leg, Member, Position, TimeMs, UserId};
use sqlx::sqlite::{Sqlite, SqliteRow};
use sqlx::{Row, Transaction};

const MEMBER_COLUMNS: &str = r#"
    user_id, sponsor_id, position, left_leg_count, right_leg_count,
    left_leg_pv, right_leg_pv, carry_forward_left_pv, carry_forward_right_pv,
    binary_activated, binary_activation_date, total_active_affiliates,
    total_matched_pv, total_binary_income, weekly_binary_income, total_earnings,
    last_binary_match_date, last_activity_date, inactivity_reset_date, version
"#;

fn member_from_row(row: &SqliteRow) -> Result<Member, sqlx::Error> {
    let position: Option<String> = row.try_get("position")?;
    let position = position
        .map(|p| {
            p.parse::<Position>()
                .map_err(|e| sqlx::Error::ColumnDecode {
                    index: "position".to_string(),
                    source: Box::new(e),
                })
        })
        .transpose()?;
    let sponsor_id: Option<String> = row.try_get("sponsor_id")?;

    Ok(Member {
        user_id: UserId::new(row.try_get::<String, _>("user_id")?),
        sponsor_id: sponsor_id.map(UserId::new),
        position,
        left_leg_count: row.try_get::<i64, _>("left_leg_count")?.max(0) as u64,
        right_leg_count: row.try_get::<i64, _>("right_leg_count")?.max(0) as u64,
        left_leg_pv: decimal_col(row, "left_leg_pv")?,
        right_leg_pv: decimal_col(row, "right_leg_pv")?,
        carry_forward_left_pv: decimal_col(row, "carry_forward_left_pv")?,
        carry_forward_right_pv: decimal_col(row, "carry_forward_right_pv")?,
        binary_activated: row.try_get::<i64, _>("binary_activated")? != 0,
        binary_activation_date: time_col(row, "binary_activation_date")?,
        total_active_affiliates: row.try_get::<i64, _>("total_active_affiliates")?.max(0) as u64,
        total_matched_pv: decimal_col(row, "total_matched_pv")?,
        total_binary_income: decimal_col(row, "total_binary_income")?,
        weekly_binary_income: decimal_col(row, "weekly_binary_income")?,
        total_earnings: decimal_col(row, "total_earnings")?,
        last_binary_match_date: time_col(row, "last_binary_match_date")?,
        last_activity_date: time_col(row, "last_activity_date")?,
        inactivity_reset_date: time_col(row, "inactivity_reset_date")?,
        version: row.try_get("version")?,
    })
}

impl Repository {
    // =========================================================================
    // Member reads
    // =========================================================================

    /// Get a member by user id.
    ///
    /// # Errors
    /// Returns an error if the query fails or a stored value cannot be decoded.
    pub async fn get_member(&self, user_id: &UserId) -> Result<Option<Member>, sqlx::Error> {
        let sql = format!("SELECT {} FROM members WHERE user_id = ?", MEMBER_COLUMNS);
        let row = sqlx::query(&sql)
            .bind(user_id.as_str())
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(member_from_row).transpose()
    }

    /// User ids of every binary-activated member, in a stable order.
    pub async fn list_activated_member_ids(&self) -> Result<Vec<UserId>, sqlx::Error> {
        let rows = sqlx::query(
            "SELECT user_id FROM members WHERE binary_activated = 1 ORDER BY user_id ASC",
        )
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|r| r.try_get::<String, _>("user_id").map(UserId::new))
            .collect()
    }

    /// Direct children of `sponsor_id`.
    pub async fn list_children(&self, sponsor_id: &UserId) -> Result<Vec<Member>, sqlx::Error> {
        let sql = format!(
            "SELECT {} FROM members WHERE sponsor_id = ? ORDER BY user_id ASC",
            MEMBER_COLUMNS
        );
        let rows = sqlx::query(&sql)
            .bind(sponsor_id.as_str())
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(member_from_row).collect()
    }

    // =========================================================================
    // Member writes
    // =========================================================================

    /// Create a zeroed member if none exists, then return the stored record.
    pub async fn ensure_member(&self, user_id: &UserId) -> Result<Member, sqlx::Error> {
        sqlx::query(
            r#"
            INSERT INTO members (user_id, created_at)
            VALUES (?, ?)
            ON CONFLICT(user_id) DO NOTHING
            "#,
        )
        .bind(user_id.as_str())
        .bind(TimeMs::now().as_ms())
        .execute(&self.pool)
        .await?;

        self.get_member(user_id)
            .await?
            .ok_or(sqlx::Error::RowNotFound)
    }

    /// Set sponsor and position if, and only if, neither has been set before.
    ///
    /// Returns false when the member is already placed (or does not exist).
    pub async fn set_placement(
        &self,
        user_id: &UserId,
        sponsor_id: Option<&UserId>,
        position: Position,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            r#"
            UPDATE members
            SET sponsor_id = ?, position = ?, version = version + 1
            WHERE user_id = ? AND position IS NULL AND sponsor_id IS NULL
            "#,
        )
        .bind(sponsor_id.map(|s| s.as_str()))
        .bind(position.as_str())
        .bind(user_id.as_str())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Overwrite the externally maintained active-affiliate count.
    pub async fn set_active_affiliates(
        &self,
        user_id: &UserId,
        total_active_affiliates: u64,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE members SET total_active_affiliates = ?, version = version + 1 WHERE user_id = ?",
        )
        .bind(i64::try_from(total_active_affiliates).unwrap_or(i64::MAX))
        .bind(user_id.as_str())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Open a write transaction on one member.
    ///
    /// The transaction starts by bumping the row version, which takes the
    /// database write lock before the member is read. Concurrent credits and
    /// settlements of the same member therefore serialize instead of losing
    /// updates. Returns `None` if the member does not exist.
    pub async fn lock_member(&self, user_id: &UserId) -> Result<Option<MemberWrite>, sqlx::Error> {
        let mut tx = self.pool.begin().await?;

        let touched = sqlx::query("UPDATE members SET version = version + 1 WHERE user_id = ?")
            .bind(user_id.as_str())
            .execute(&mut *tx)
            .await?;
        if touched.rows_affected() == 0 {
            tx.rollback().await?;
            return Ok(None);
        }

        let sql = format!("SELECT {} FROM members WHERE user_id = ?", MEMBER_COLUMNS);
        let row = sqlx::query(&sql)
            .bind(user_id.as_str())
            .fetch_one(&mut *tx)
            .await?;
        let member = member_from_row(&row)?;

        Ok(Some(MemberWrite { tx, member }))
    }
}

/// A member loaded under the write lock. Dropping it without `commit` rolls back.
pub struct MemberWrite {
    pub(super) tx: Transaction<'static, Sqlite>,
    pub member: Member,
}

impl MemberWrite {
    /// Log that `event_key` credited this member.
    ///
    /// Returns false if the event was already applied to this member, in which
    /// case the caller must not credit it again.
    pub async fn record_credit(
        &mut self,
        event_key: &str,
        leg: Leg,
        amount: Decimal,
        depth: usize,
        applied_at: TimeMs,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            r#"
            INSERT INTO pv_credits (event_key, user_id, leg, amount, depth, applied_at)
            VALUES (?, ?, ?, ?, ?, ?)
            ON CONFLICT(event_key, user_id) DO NOTHING
            "#,
        )
        .bind(event_key)
        .bind(self.member.user_id.as_str())
        .bind(leg.as_str())
        .bind(amount.to_canonical_string())
        .bind(depth as i64)
        .bind(applied_at.as_ms())
        .execute(&mut *self.tx)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Persist the (mutated) member and commit. Sponsor and position are never rewritten.
    pub async fn commit(mut self) -> Result<Member, sqlx::Error> {
        let m = &self.member;
        sqlx::query(
            r#"
            UPDATE members SET
                left_leg_count = ?, right_leg_count = ?,
                left_leg_pv = ?, right_leg_pv = ?,
                carry_forward_left_pv = ?, carry_forward_right_pv = ?,
                binary_activated = ?, binary_activation_date = ?,
                total_matched_pv = ?, total_binary_income = ?,
                weekly_binary_income = ?, total_earnings = ?,
                last_binary_match_date = ?, last_activity_date = ?,
                inactivity_reset_date = ?
            WHERE user_id = ?
            "#,
        )
        .bind(m.left_leg_count as i64)
        .bind(m.right_leg_count as i64)
        .bind(m.left_leg_pv.to_canonical_string())
        .bind(m.right_leg_pv.to_canonical_string())
        .bind(m.carry_forward_left_pv.to_canonical_string())
        .bind(m.carry_forward_right_pv.to_canonical_string())
        .bind(m.binary_activated as i64)
        .bind(m.binary_activation_date.map(|t| t.as_ms()))
        .bind(m.total_matched_pv.to_canonical_string())
        .bind(m.total_binary_income.to_canonical_string())
        .bind(m.weekly_binary_income.to_canonical_string())
        .bind(m.total_earnings.to_canonical_string())
        .bind(m.last_binary_match_date.map(|t| t.as_ms()))
        .bind(m.last_activity_date.map(|t| t.as_ms()))
        .bind(m.inactivity_reset_date.map(|t| t.as_ms()))
        .bind(m.user_id.as_str())
        .execute(&mut *self.tx)
        .await?;

        self.tx.commit().await?;
        Ok(self.member)
    }

    /// Discard the transaction, leaving the stored member untouched.
    pub async fn rollback(self) -> Result<(), sqlx::Error> {
        self.tx.rollback().await
    }
}
