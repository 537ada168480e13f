//! Weekly settlement batch: per-member matching, commission booking, run audit.

use crate::db::{Repository, SettlementRunRecord};
use crate::domain::{CommissionEntry, Decimal, Period, TimeMs, UserId};
use crate::engine::{apply_match, apply_reset, evaluate_member, MatchDecision, SettlementRules};
use crate::error::LedgerError;
use chrono::FixedOffset;
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::{watch, Mutex};
use tracing::{error, info, warn};
use uuid::Uuid;

/// Outcome of settling a single member.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum MemberOutcome {
    #[serde(rename_all = "camelCase")]
    Matched {
        total_left: Decimal,
        total_right: Decimal,
        matched_volume: Decimal,
        rank_name: String,
        bonus_percent: u32,
        income: Decimal,
        carry_forward_left: Decimal,
        carry_forward_right: Decimal,
    },
    #[serde(rename_all = "camelCase")]
    Reset { days_inactive: i64 },
    #[serde(rename_all = "camelCase")]
    NoMatch {
        total_left: Decimal,
        total_right: Decimal,
    },
    /// A commission for this member and period already exists.
    AlreadySettled,
    /// No longer present or no longer activated when its turn came.
    Skipped,
    Error { message: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MemberResult {
    pub user_id: UserId,
    pub result: MemberOutcome,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SettlementReport {
    pub run_id: Uuid,
    pub period_key: String,
    pub started_at: TimeMs,
    pub finished_at: TimeMs,
    pub members_processed: u64,
    pub total_matched_pv: Decimal,
    pub total_income: Decimal,
    pub cancelled: bool,
    pub results: Vec<MemberResult>,
}

impl SettlementReport {
    fn count(&self, pred: impl Fn(&MemberOutcome) -> bool) -> u64 {
        self.results.iter().filter(|r| pred(&r.result)).count() as u64
    }

    pub fn matched_count(&self) -> u64 {
        self.count(|o| matches!(o, MemberOutcome::Matched { .. }))
    }

    pub fn reset_count(&self) -> u64 {
        self.count(|o| matches!(o, MemberOutcome::Reset { .. }))
    }

    pub fn error_count(&self) -> u64 {
        self.count(|o| matches!(o, MemberOutcome::Error { .. }))
    }

    pub fn outcome_for(&self, user_id: &UserId) -> Option<&MemberOutcome> {
        self.results
            .iter()
            .find(|r| &r.user_id == user_id)
            .map(|r| &r.result)
    }

    fn to_record(&self) -> SettlementRunRecord {
        SettlementRunRecord {
            run_id: self.run_id,
            period_key: self.period_key.clone(),
            started_at: self.started_at,
            finished_at: self.finished_at,
            members_processed: self.members_processed,
            matched_count: self.matched_count(),
            reset_count: self.reset_count(),
            no_match_count: self.count(|o| matches!(o, MemberOutcome::NoMatch { .. })),
            already_settled_count: self.count(|o| matches!(o, MemberOutcome::AlreadySettled)),
            error_count: self.error_count(),
            total_matched_pv: self.total_matched_pv,
            total_income: self.total_income,
            cancelled: self.cancelled,
        }
    }
}

/// Weekly binary matching over every activated member.
///
/// Members are settled one at a time, each in its own transaction, so a
/// failing member is recorded and skipped while the rest of the batch
/// proceeds. One binary bonus per member per ISO week: re-running a period
/// reports `AlreadySettled` instead of paying twice.
pub struct SettlementRunner {
    repo: Arc<Repository>,
    rules: SettlementRules,
    offset: FixedOffset,
    run_lock: Mutex<()>,
}

impl SettlementRunner {
    pub fn new(repo: Arc<Repository>, rules: SettlementRules, offset: FixedOffset) -> Self {
        Self {
            repo,
            rules,
            offset,
            run_lock: Mutex::new(()),
        }
    }

    /// Settle all activated members as of `now`.
    ///
    /// `cancel` is checked between members; when it reads true the run stops,
    /// keeping members already settled, and the report is marked cancelled.
    /// Runs never overlap: a second call waits for the first to finish.
    pub async fn run_settlement(
        &self,
        now: TimeMs,
        cancel: Option<&watch::Receiver<bool>>,
    ) -> Result<SettlementReport, sqlx::Error> {
        let _guard = self.run_lock.lock().await;

        let period = Period::containing(now, self.offset);
        let member_ids = self.repo.list_activated_member_ids().await?;
        let mut report = SettlementReport {
            run_id: Uuid::new_v4(),
            period_key: period.week_key.clone(),
            started_at: TimeMs::now(),
            finished_at: TimeMs::now(),
            members_processed: 0,
            total_matched_pv: Decimal::zero(),
            total_income: Decimal::zero(),
            cancelled: false,
            results: Vec::with_capacity(member_ids.len()),
        };

        info!(
            run_id = %report.run_id,
            period = %period.week_key,
            members = member_ids.len(),
            "settlement started"
        );

        for user_id in member_ids {
            if cancel.map(|rx| *rx.borrow()).unwrap_or(false) {
                warn!(run_id = %report.run_id, processed = report.members_processed, "settlement cancelled");
                report.cancelled = true;
                break;
            }

            let result = match self.settle_member(&user_id, now, &period).await {
                Ok(outcome) => outcome,
                Err(e) => {
                    error!(member = %user_id, error = %e, "member settlement failed");
                    MemberOutcome::Error {
                        message: e.to_string(),
                    }
                }
            };

            if let MemberOutcome::Matched {
                matched_volume,
                income,
                ..
            } = &result
            {
                report.total_matched_pv = report.total_matched_pv.saturating_add(*matched_volume);
                report.total_income = report.total_income.saturating_add(*income);
            }
            report.members_processed += 1;
            report.results.push(MemberResult { user_id, result });
        }

        report.finished_at = TimeMs::now();
        if let Err(e) = self.repo.insert_settlement_run(&report.to_record()).await {
            error!(run_id = %report.run_id, error = %e, "failed to record settlement run");
        }

        info!(
            run_id = %report.run_id,
            processed = report.members_processed,
            matched = report.matched_count(),
            resets = report.reset_count(),
            errors = report.error_count(),
            total_matched_pv = %report.total_matched_pv,
            total_income = %report.total_income,
            cancelled = report.cancelled,
            "settlement finished"
        );

        Ok(report)
    }

    async fn settle_member(
        &self,
        user_id: &UserId,
        now: TimeMs,
        period: &Period,
    ) -> Result<MemberOutcome, LedgerError> {
        let Some(mut write) = self.repo.lock_member(user_id).await? else {
            return Ok(MemberOutcome::Skipped);
        };
        if !write.member.binary_activated {
            write.rollback().await?;
            return Ok(MemberOutcome::Skipped);
        }

        let decision = match evaluate_member(&write.member, now, &self.rules) {
            Ok(decision) => decision,
            Err(e) => {
                write.rollback().await?;
                return Err(e.into());
            }
        };

        match decision {
            MatchDecision::Reset { days_inactive } => {
                apply_reset(&mut write.member, now, self.rules.reactivation);
                write.commit().await?;
                info!(member = %user_id, days_inactive, "pv reset for inactivity");
                Ok(MemberOutcome::Reset { days_inactive })
            }
            MatchDecision::NoMatch {
                total_left,
                total_right,
            } => {
                write.rollback().await?;
                Ok(MemberOutcome::NoMatch {
                    total_left,
                    total_right,
                })
            }
            MatchDecision::Match(computation) => {
                let entry = CommissionEntry::binary_bonus(
                    user_id.clone(),
                    computation.matched_volume,
                    computation.income,
                    computation.rank.name,
                    computation.rank.bonus_percent,
                    now,
                    period.clone(),
                );
                if !write.insert_commission(&entry).await? {
                    write.rollback().await?;
                    return Ok(MemberOutcome::AlreadySettled);
                }

                if let Err(e) = apply_match(&mut write.member, &computation, now) {
                    write.rollback().await?;
                    return Err(e.into());
                }
                write.commit().await?;

                Ok(MemberOutcome::Matched {
                    total_left: computation.total_left,
                    total_right: computation.total_right,
                    matched_volume: computation.matched_volume,
                    rank_name: computation.rank.name.to_string(),
                    bonus_percent: computation.rank.bonus_percent,
                    income: computation.income,
                    carry_forward_left: computation.carry_forward_left,
                    carry_forward_right: computation.carry_forward_right,
                })
            }
        }
    }
}
