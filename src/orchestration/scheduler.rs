//! Weekly settlement trigger: slot arithmetic and the background loop.

use crate::domain::TimeMs;
use crate::orchestration::settlement::SettlementRunner;
use chrono::{DateTime, Datelike, Duration, FixedOffset, NaiveTime, TimeZone, Timelike, Utc, Weekday};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ScheduleError {
    #[error("expected '<weekday> HH:MM', got '{0}'")]
    Format(String),
    #[error("unknown weekday '{0}'")]
    Weekday(String),
    #[error("invalid time '{0}'")]
    Time(String),
}

/// A weekly wall-clock slot in a fixed UTC offset, e.g. Friday 23:59.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WeeklySchedule {
    pub weekday: Weekday,
    pub hour: u32,
    pub minute: u32,
    pub offset: FixedOffset,
}

impl WeeklySchedule {
    /// Parse `"<weekday> HH:MM"`, e.g. `"fri 23:59"`.
    pub fn parse(raw: &str, offset: FixedOffset) -> Result<Self, ScheduleError> {
        let mut parts = raw.split_whitespace();
        let (Some(day), Some(time), None) = (parts.next(), parts.next(), parts.next()) else {
            return Err(ScheduleError::Format(raw.to_string()));
        };
        let weekday = day
            .parse::<Weekday>()
            .map_err(|_| ScheduleError::Weekday(day.to_string()))?;
        let time = NaiveTime::parse_from_str(time, "%H:%M")
            .map_err(|_| ScheduleError::Time(time.to_string()))?;

        Ok(Self {
            weekday,
            hour: time.hour(),
            minute: time.minute(),
            offset,
        })
    }

    /// First scheduled instant strictly after `now`.
    pub fn next_run_after(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        let local = now.with_timezone(&self.offset);
        let days_ahead = (self.weekday.num_days_from_monday() as i64
            - local.weekday().num_days_from_monday() as i64)
            .rem_euclid(7);
        let date = local.date_naive() + Duration::days(days_ahead);
        let local_slot = date
            .and_hms_opt(self.hour, self.minute, 0)
            .unwrap_or_else(|| date.and_time(NaiveTime::default()));
        let utc_slot = Utc.from_utc_datetime(
            &(local_slot - Duration::seconds(self.offset.local_minus_utc() as i64)),
        );

        if utc_slot > now {
            utc_slot
        } else {
            utc_slot + Duration::days(7)
        }
    }
}

/// Owns the background task that fires the weekly settlement.
///
/// Created and stopped by the application's startup/shutdown path. Stopping
/// also cancels an in-flight run between members.
pub struct SettlementScheduler {
    runner: Arc<SettlementRunner>,
    schedule: WeeklySchedule,
    shutdown: Option<watch::Sender<bool>>,
    handle: Option<JoinHandle<()>>,
}

impl SettlementScheduler {
    pub fn new(runner: Arc<SettlementRunner>, schedule: WeeklySchedule) -> Self {
        Self {
            runner,
            schedule,
            shutdown: None,
            handle: None,
        }
    }

    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Spawn the schedule loop. Does nothing if already running.
    pub fn start(&mut self) {
        if self.is_running() {
            return;
        }

        let (tx, mut rx) = watch::channel(false);
        let runner = self.runner.clone();
        let schedule = self.schedule;

        let handle = tokio::spawn(async move {
            loop {
                let now = Utc::now();
                let next = schedule.next_run_after(now);
                let wait = (next - now).to_std().unwrap_or_default();
                info!(next_run = %next, "next settlement scheduled");

                let fire = tokio::select! {
                    _ = tokio::time::sleep(wait) => true,
                    _ = rx.changed() => false,
                };
                if !fire || *rx.borrow() {
                    break;
                }

                if let Err(e) = runner.run_settlement(TimeMs::now(), Some(&rx)).await {
                    error!(error = %e, "scheduled settlement failed");
                }
            }
            info!("settlement scheduler stopped");
        });

        self.shutdown = Some(tx);
        self.handle = Some(handle);
        info!(weekday = %self.schedule.weekday, hour = self.schedule.hour, minute = self.schedule.minute, "settlement scheduler started");
    }

    /// Signal the loop to stop and wait for it to exit.
    pub async fn stop(&mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(true);
        }
        if let Some(handle) = self.handle.take() {
            if let Err(e) = handle.await {
                error!(error = %e, "settlement scheduler task panicked");
            }
        }
    }
}
