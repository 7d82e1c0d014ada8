use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::error::AppError;

/// Time-derived display status. Never stored; computed on every read so a
/// restored task picks up the right value without any extra bookkeeping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Future,
    Preparation,
    PreparationCompleted,
    Urgent,
}

impl TaskStatus {
    /// Thresholds: a completed preparation wins outright; otherwise the task
    /// is urgent once the event has started, in preparation once the
    /// preparation deadline has passed, and future before that.
    pub fn derive(
        now: DateTime<Utc>,
        preparation_date: DateTime<Utc>,
        event_date: DateTime<Utc>,
        is_preparation_completed: bool,
    ) -> Self {
        if is_preparation_completed {
            TaskStatus::PreparationCompleted
        } else if now >= event_date {
            TaskStatus::Urgent
        } else if now >= preparation_date {
            TaskStatus::Preparation
        } else {
            TaskStatus::Future
        }
    }
}

/// Flat row as stored in the `tasks` table.
#[derive(Debug, Clone, FromRow)]
pub struct TaskRecord {
    pub id: String,
    pub title: String,
    pub description: String,
    pub event_date: String,
    pub preparation_date: String,
    pub created_by: i64,
    pub created_by_username: String,
    pub created_at: String,
    pub state: String,
    pub is_preparation_completed: bool,
    pub notified_week_before: bool,
    pub notified_day_before: bool,
    pub deleted_at: Option<String>,
    pub completed_at: Option<String>,
    pub version: i64,
}

impl TaskRecord {
    pub fn status_at(&self, now: DateTime<Utc>) -> TaskStatus {
        match (
            parse_timestamp(&self.preparation_date),
            parse_timestamp(&self.event_date),
        ) {
            (Some(prep), Some(event)) => {
                TaskStatus::derive(now, prep, event, self.is_preparation_completed)
            }
            // Dates are validated on the way in, so this only fires for rows
            // written by an older schema.
            _ => {
                tracing::warn!("task {} has unparsable dates", self.id);
                TaskStatus::Future
            }
        }
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct ChecklistItemRecord {
    pub id: String,
    pub text: String,
    pub is_completed: bool,
    pub position: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct ChecklistItem {
    pub id: String,
    pub text: String,
    pub is_completed: bool,
    pub completed_by: Vec<i64>,
}

/// Fully assembled task as served over the API.
#[derive(Debug, Clone, Serialize)]
pub struct Task {
    pub id: String,
    pub title: String,
    pub description: String,
    pub event_date: String,
    pub preparation_date: String,
    pub status: TaskStatus,
    pub is_preparation_completed: bool,
    pub ready_users: Vec<i64>,
    pub not_going_users: Vec<i64>,
    pub checklist: Vec<ChecklistItem>,
    pub photos: Vec<String>,
    pub created_by: i64,
    pub created_by_username: String,
    pub created_at: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deleted_at: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<String>,
    pub version: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewTaskRequest {
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub event_date: String,
    pub preparation_date: String,
    pub created_by: i64,
    pub created_by_username: String,
    #[serde(default)]
    pub checklist: Vec<String>,
    #[serde(default)]
    pub photos: Vec<String>,
}

/// Full-field replace of the editable fields. Checklist and photos are only
/// attachable at creation through this flow; later changes go through the
/// dedicated checklist and photo endpoints.
#[derive(Debug, Clone, Deserialize)]
pub struct UpdateTaskRequest {
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub event_date: String,
    pub preparation_date: String,
    pub expected_version: Option<i64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AttendanceRequest {
    pub user_id: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewChecklistItemRequest {
    pub text: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ToggleChecklistItemRequest {
    pub user_id: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewPhotoRequest {
    pub url: String,
}

/// Parse an RFC 3339 timestamp, tolerating the naive `YYYY-MM-DDTHH:MM[:SS]`
/// form the mini-app's date pickers produce (interpreted as UTC).
pub fn parse_timestamp(ts: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(ts) {
        return Some(dt.with_timezone(&Utc));
    }
    for fmt in ["%Y-%m-%dT%H:%M:%S", "%Y-%m-%dT%H:%M"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(ts, fmt) {
            return Some(naive.and_utc());
        }
    }
    None
}

/// Validate and normalize an input timestamp to RFC 3339 UTC so stored text
/// sorts chronologically.
pub fn normalize_timestamp(ts: &str) -> Result<String, AppError> {
    parse_timestamp(ts)
        .map(|dt| dt.to_rfc3339())
        .ok_or_else(|| AppError::BadRequest(format!("Invalid timestamp: {ts}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn at(h: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 8, 10, 12, 0, 0).unwrap() + Duration::hours(h)
    }

    #[test]
    fn status_is_future_before_preparation_starts() {
        // preparation in one hour, event in two
        let status = TaskStatus::derive(at(0), at(1), at(2), false);
        assert_eq!(status, TaskStatus::Future);
    }

    #[test]
    fn status_enters_preparation_at_the_deadline() {
        assert_eq!(
            TaskStatus::derive(at(1), at(1), at(2), false),
            TaskStatus::Preparation
        );
        assert_eq!(
            TaskStatus::derive(at(1) + Duration::seconds(1), at(1), at(2), false),
            TaskStatus::Preparation
        );
    }

    #[test]
    fn status_is_urgent_once_the_event_starts() {
        assert_eq!(
            TaskStatus::derive(at(2), at(1), at(2), false),
            TaskStatus::Urgent
        );
        assert_eq!(
            TaskStatus::derive(at(5), at(1), at(2), false),
            TaskStatus::Urgent
        );
    }

    #[test]
    fn completed_preparation_wins_over_time() {
        for now in [at(0), at(1), at(3)] {
            assert_eq!(
                TaskStatus::derive(now, at(1), at(2), true),
                TaskStatus::PreparationCompleted
            );
        }
    }

    #[test]
    fn status_serializes_snake_case() {
        let json = serde_json::to_string(&TaskStatus::PreparationCompleted).unwrap();
        assert_eq!(json, "\"preparation_completed\"");
    }

    #[test]
    fn parse_timestamp_accepts_rfc3339_and_naive_forms() {
        assert!(parse_timestamp("2026-08-10T12:00:00+02:00").is_some());
        assert!(parse_timestamp("2026-08-10T12:00:00").is_some());
        assert!(parse_timestamp("2026-08-10T12:00").is_some());
        assert!(parse_timestamp("next tuesday").is_none());
    }

    #[test]
    fn normalize_timestamp_emits_sortable_utc() {
        let a = normalize_timestamp("2026-08-10T12:00:00+02:00").unwrap();
        let b = normalize_timestamp("2026-08-10T11:00:00+00:00").unwrap();
        assert_eq!(a, b);
    }
}
