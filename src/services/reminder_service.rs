use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use sqlx::SqlitePool;
use tracing::{info, warn};

use crate::db::repository;
use crate::error::AppError;
use crate::models::TaskRecord;
use crate::models::task::parse_timestamp;
use crate::telegram::{Notifier, ReminderKind};

pub struct ReminderService {
    db: SqlitePool,
    notifier: Arc<dyn Notifier>,
}

#[derive(Debug, Serialize)]
pub struct ReminderStats {
    pub week_before_sent: usize,
    pub day_before_sent: usize,
    pub failed: usize,
}

/// Which reminders a task owes at `now`. Each fires at most once; the flag is
/// checked here and set after delivery.
pub fn due_reminders(task: &TaskRecord, now: DateTime<Utc>) -> Vec<ReminderKind> {
    let Some(event) = parse_timestamp(&task.event_date) else {
        return Vec::new();
    };

    let mut due = Vec::new();
    if !task.notified_week_before && now >= event - Duration::days(7) {
        due.push(ReminderKind::WeekBefore);
    }
    if !task.notified_day_before && now >= event - Duration::days(1) {
        due.push(ReminderKind::DayBefore);
    }
    due
}

impl ReminderService {
    pub fn new(db: SqlitePool, notifier: Arc<dyn Notifier>) -> Self {
        Self { db, notifier }
    }

    pub async fn run_sweep(&self) -> Result<ReminderStats, AppError> {
        self.run_sweep_at(Utc::now()).await
    }

    /// Scan active tasks for due reminders and fan each one out to every
    /// registered member in their own language. A reminder's flag is only
    /// marked once the whole fan-out succeeded, so a partial failure is
    /// retried on the next sweep.
    pub async fn run_sweep_at(&self, now: DateTime<Utc>) -> Result<ReminderStats, AppError> {
        let users = repository::fetch_users(&self.db).await?;
        let candidates = repository::fetch_reminder_candidates(&self.db).await?;

        let mut stats = ReminderStats {
            week_before_sent: 0,
            day_before_sent: 0,
            failed: 0,
        };

        for task in candidates {
            for kind in due_reminders(&task, now) {
                let mut delivered = true;
                for user in &users {
                    if let Err(e) = self.notifier.send_reminder(user, &task, kind).await {
                        warn!(
                            "reminder for task {} to user {} failed: {}",
                            task.id, user.telegram_id, e
                        );
                        delivered = false;
                    }
                }

                if !delivered {
                    stats.failed += 1;
                    continue;
                }

                match kind {
                    ReminderKind::WeekBefore => {
                        repository::mark_notified_week_before(&self.db, &task.id).await?;
                        stats.week_before_sent += 1;
                    }
                    ReminderKind::DayBefore => {
                        repository::mark_notified_day_before(&self.db, &task.id).await?;
                        stats.day_before_sent += 1;
                    }
                }
            }
        }

        info!(
            "Reminder sweep completed - week-before: {}, day-before: {}, failed: {}",
            stats.week_before_sent, stats.day_before_sent, stats.failed
        );
        Ok(stats)
    }
}
