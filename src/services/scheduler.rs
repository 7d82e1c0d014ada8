use std::sync::Arc;
use std::time::Duration;

use sqlx::SqlitePool;
use tracing::info;

use crate::services::maintenance::{self, MaintenanceStats};
use crate::services::reminder_service::{ReminderService, ReminderStats};
use crate::telegram::Notifier;

/// Background loop driving the reminder sweep and archive maintenance on a
/// fixed interval.
pub struct ReminderScheduler {
    db: SqlitePool,
    notifier: Arc<dyn Notifier>,
    interval: Duration,
}

impl ReminderScheduler {
    pub fn new(db: SqlitePool, notifier: Arc<dyn Notifier>, interval_secs: u64) -> Self {
        Self {
            db,
            notifier,
            interval: Duration::from_secs(interval_secs),
        }
    }

    pub async fn start(self) {
        info!("Starting reminder scheduler (interval: {:?})", self.interval);

        loop {
            tokio::time::sleep(self.interval).await;

            match self.run_tick().await {
                Ok((reminders, maintenance)) => {
                    info!(
                        "Scheduler tick - reminders: {} week-before, {} day-before, {} failed | \
                         maintenance: {} purged, {} evicted",
                        reminders.week_before_sent,
                        reminders.day_before_sent,
                        reminders.failed,
                        maintenance.purged_deleted,
                        maintenance.evicted_completed
                    );
                }
                Err(e) => {
                    // Keep looping through errors.
                    tracing::warn!("Scheduler tick failed: {:?}", e);
                }
            }
        }
    }

    async fn run_tick(
        &self,
    ) -> Result<(ReminderStats, MaintenanceStats), crate::error::AppError> {
        let maintenance = maintenance::run(&self.db).await?;
        let service = ReminderService::new(self.db.clone(), self.notifier.clone());
        let reminders = service.run_sweep().await?;
        Ok((reminders, maintenance))
    }
}
