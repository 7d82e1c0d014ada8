use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use sqlx::SqlitePool;
use tracing::info;

use crate::db::repository::{self, COMPLETED_ARCHIVE_CAP};
use crate::error::AppError;

/// Deleted-archive entries are kept for a month before being purged for good.
pub const DELETED_RETENTION_DAYS: i64 = 30;

#[derive(Debug, Serialize)]
pub struct MaintenanceStats {
    pub purged_deleted: u64,
    pub evicted_completed: u64,
}

pub async fn run(db: &SqlitePool) -> Result<MaintenanceStats, AppError> {
    run_at(db, Utc::now()).await
}

pub async fn run_at(db: &SqlitePool, now: DateTime<Utc>) -> Result<MaintenanceStats, AppError> {
    let cutoff = now - Duration::days(DELETED_RETENTION_DAYS);
    let purged_deleted = repository::purge_deleted_before(db, cutoff).await?;
    let evicted_completed = repository::trim_completed(db, COMPLETED_ARCHIVE_CAP).await?;

    if purged_deleted > 0 || evicted_completed > 0 {
        info!(
            "Archive maintenance - purged {} deleted, evicted {} completed",
            purged_deleted, evicted_completed
        );
    }

    Ok(MaintenanceStats {
        purged_deleted,
        evicted_completed,
    })
}
