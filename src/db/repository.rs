use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::error::AppError;
use crate::models::{
    ChecklistItem, ChecklistItemRecord, NewTaskRequest, RegisterUserRequest, Task, TaskRecord,
    UpdateTaskRequest, User,
};
use crate::models::task::{normalize_timestamp, parse_timestamp};
use crate::models::user::{DEFAULT_LANGUAGE, DEFAULT_TIMEZONE, SUPPORTED_LANGUAGES};

/// The completed archive keeps only the most recent completions.
pub const COMPLETED_ARCHIVE_CAP: i64 = 10;

pub const ATTENDANCE_READY: &str = "ready";
pub const ATTENDANCE_NOT_GOING: &str = "not_going";

const TASK_COLUMNS: &str = "id, title, description, event_date, preparation_date, \
     created_by, created_by_username, created_at, state, is_preparation_completed, \
     notified_week_before, notified_day_before, deleted_at, completed_at, version";

fn select_tasks(where_clause: &str) -> String {
    format!("SELECT {TASK_COLUMNS} FROM tasks {where_clause}")
}

// === USERS ===

/// Register-or-return: first open creates the row, later opens leave it
/// untouched (only the settings call may change it afterwards).
pub async fn upsert_user(db: &SqlitePool, req: RegisterUserRequest) -> Result<User, AppError> {
    if let Some(existing) = find_user(db, req.telegram_id).await? {
        return Ok(existing);
    }

    let language = match req.language {
        Some(lang) => validate_language(lang)?,
        None => DEFAULT_LANGUAGE.to_string(),
    };
    let timezone = req.timezone.unwrap_or_else(|| DEFAULT_TIMEZONE.to_string());
    let created_at = Utc::now().to_rfc3339();

    sqlx::query(
        "INSERT INTO users (telegram_id, username, first_name, photo_url, timezone, language, created_at) \
         VALUES (?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(req.telegram_id)
    .bind(&req.username)
    .bind(&req.first_name)
    .bind(&req.photo_url)
    .bind(&timezone)
    .bind(&language)
    .bind(&created_at)
    .execute(db)
    .await?;

    Ok(User {
        telegram_id: req.telegram_id,
        username: req.username,
        first_name: req.first_name,
        photo_url: req.photo_url,
        timezone,
        language,
        created_at,
    })
}

pub async fn find_user(db: &SqlitePool, telegram_id: i64) -> Result<Option<User>, AppError> {
    let user = sqlx::query_as::<_, User>(
        "SELECT telegram_id, username, first_name, photo_url, timezone, language, created_at \
         FROM users WHERE telegram_id = ?",
    )
    .bind(telegram_id)
    .fetch_optional(db)
    .await?;
    Ok(user)
}

pub async fn fetch_users(db: &SqlitePool) -> Result<Vec<User>, AppError> {
    let users = sqlx::query_as::<_, User>(
        "SELECT telegram_id, username, first_name, photo_url, timezone, language, created_at \
         FROM users ORDER BY created_at",
    )
    .fetch_all(db)
    .await?;
    Ok(users)
}

pub async fn update_user_language(
    db: &SqlitePool,
    telegram_id: i64,
    language: String,
) -> Result<Option<User>, AppError> {
    let language = validate_language(language)?;
    let updated = sqlx::query("UPDATE users SET language = ? WHERE telegram_id = ?")
        .bind(&language)
        .bind(telegram_id)
        .execute(db)
        .await?
        .rows_affected();

    if updated == 0 {
        return Ok(None);
    }
    find_user(db, telegram_id).await
}

fn validate_language(language: String) -> Result<String, AppError> {
    if SUPPORTED_LANGUAGES.contains(&language.as_str()) {
        Ok(language)
    } else {
        Err(AppError::BadRequest(format!(
            "Unsupported language: {language}"
        )))
    }
}

// === TASKS ===

pub async fn insert_task(db: &SqlitePool, req: NewTaskRequest) -> Result<Task, AppError> {
    if req.title.trim().is_empty() {
        return Err(AppError::BadRequest("Title must not be empty".to_string()));
    }
    let event_date = normalize_timestamp(&req.event_date)?;
    let preparation_date = normalize_timestamp(&req.preparation_date)?;

    let id = Uuid::new_v4().to_string();
    let now = Utc::now().to_rfc3339();

    sqlx::query(
        "INSERT INTO tasks \
            (id, title, description, event_date, preparation_date, \
             created_by, created_by_username, created_at, state) \
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, 'active')",
    )
    .bind(&id)
    .bind(req.title.trim())
    .bind(&req.description)
    .bind(&event_date)
    .bind(&preparation_date)
    .bind(req.created_by)
    .bind(&req.created_by_username)
    .bind(&now)
    .execute(db)
    .await?;

    for (position, text) in req.checklist.iter().enumerate() {
        insert_checklist_row(db, &id, text, position as i64).await?;
    }
    for (position, url) in req.photos.iter().enumerate() {
        sqlx::query("INSERT INTO task_photos (task_id, position, url) VALUES (?, ?, ?)")
            .bind(&id)
            .bind(position as i64)
            .bind(url)
            .execute(db)
            .await?;
    }

    find_task(db, &id).await?.ok_or(AppError::NotFound)
}

/// Active tasks sorted by event date, optionally filtered to a range on the
/// event date.
pub async fn fetch_active_tasks(
    db: &SqlitePool,
    from: Option<&str>,
    to: Option<&str>,
) -> Result<Vec<Task>, AppError> {
    let from = from.map(bound_timestamp).transpose()?;
    let to = to.map(bound_timestamp).transpose()?;

    let records = sqlx::query_as::<_, TaskRecord>(&select_tasks(
        "WHERE state = 'active' ORDER BY event_date",
    ))
    .fetch_all(db)
    .await?;

    let mut tasks = Vec::with_capacity(records.len());
    for record in records {
        let event = parse_timestamp(&record.event_date);
        let in_range = match (event, from, to) {
            (Some(e), Some(f), _) if e < f => false,
            (Some(e), _, Some(t)) if e > t => false,
            _ => true,
        };
        if in_range {
            tasks.push(assemble(db, record).await?);
        }
    }
    Ok(tasks)
}

fn bound_timestamp(ts: &str) -> Result<DateTime<Utc>, AppError> {
    parse_timestamp(ts).ok_or_else(|| AppError::BadRequest(format!("Invalid date bound: {ts}")))
}

pub async fn find_task(db: &SqlitePool, id: &str) -> Result<Option<Task>, AppError> {
    match find_record(db, id).await? {
        Some(record) => Ok(Some(assemble(db, record).await?)),
        None => Ok(None),
    }
}

async fn find_record(db: &SqlitePool, id: &str) -> Result<Option<TaskRecord>, AppError> {
    let record = sqlx::query_as::<_, TaskRecord>(&select_tasks("WHERE id = ?"))
        .bind(id)
        .fetch_optional(db)
        .await?;
    Ok(record)
}

async fn find_active_record(db: &SqlitePool, id: &str) -> Result<Option<TaskRecord>, AppError> {
    let record = sqlx::query_as::<_, TaskRecord>(&select_tasks(
        "WHERE id = ? AND state = 'active'",
    ))
    .bind(id)
    .fetch_optional(db)
    .await?;
    Ok(record)
}

/// Full-field replace of the editable fields. With `expected_version` set the
/// edit becomes a compare-and-swap, so concurrent editors get a conflict
/// instead of silently clobbering each other.
pub async fn update_task(
    db: &SqlitePool,
    id: &str,
    req: UpdateTaskRequest,
) -> Result<Option<Task>, AppError> {
    let Some(current) = find_active_record(db, id).await? else {
        return Ok(None);
    };

    if let Some(expected) = req.expected_version {
        if expected != current.version {
            return Err(AppError::Conflict(format!(
                "Task was modified concurrently (version {}, expected {})",
                current.version, expected
            )));
        }
    }

    if req.title.trim().is_empty() {
        return Err(AppError::BadRequest("Title must not be empty".to_string()));
    }
    let event_date = normalize_timestamp(&req.event_date)?;
    let preparation_date = normalize_timestamp(&req.preparation_date)?;

    sqlx::query(
        "UPDATE tasks \
         SET title = ?, description = ?, event_date = ?, preparation_date = ?, \
             version = version + 1 \
         WHERE id = ?",
    )
    .bind(req.title.trim())
    .bind(&req.description)
    .bind(&event_date)
    .bind(&preparation_date)
    .bind(id)
    .execute(db)
    .await?;

    find_task(db, id).await
}

// === LIFECYCLE ===

/// Soft delete into the deleted archive.
pub async fn delete_task(db: &SqlitePool, id: &str) -> Result<bool, AppError> {
    let now = Utc::now().to_rfc3339();
    let moved = sqlx::query(
        "UPDATE tasks SET state = 'deleted', deleted_at = ?, version = version + 1 \
         WHERE id = ? AND state = 'active'",
    )
    .bind(&now)
    .bind(id)
    .execute(db)
    .await?
    .rows_affected();
    Ok(moved > 0)
}

pub async fn restore_deleted_task(db: &SqlitePool, id: &str) -> Result<Option<Task>, AppError> {
    let restored = sqlx::query(
        "UPDATE tasks SET state = 'active', deleted_at = NULL, version = version + 1 \
         WHERE id = ? AND state = 'deleted'",
    )
    .bind(id)
    .execute(db)
    .await?
    .rows_affected();

    if restored == 0 {
        return Ok(None);
    }
    find_task(db, id).await
}

/// Move into the completed archive. Finishing forces the preparation flag on
/// and evicts archive entries beyond the cap.
pub async fn finish_task(db: &SqlitePool, id: &str) -> Result<Option<Task>, AppError> {
    let now = Utc::now().to_rfc3339();
    let moved = sqlx::query(
        "UPDATE tasks \
         SET state = 'completed', completed_at = ?, is_preparation_completed = 1, \
             version = version + 1 \
         WHERE id = ? AND state = 'active'",
    )
    .bind(&now)
    .bind(id)
    .execute(db)
    .await?
    .rows_affected();

    if moved == 0 {
        return Ok(None);
    }
    trim_completed(db, COMPLETED_ARCHIVE_CAP).await?;
    find_task(db, id).await
}

/// Restoring a finished task resets the preparation flag so its status is
/// derived from the dates again.
pub async fn restore_completed_task(db: &SqlitePool, id: &str) -> Result<Option<Task>, AppError> {
    let restored = sqlx::query(
        "UPDATE tasks \
         SET state = 'active', completed_at = NULL, is_preparation_completed = 0, \
             version = version + 1 \
         WHERE id = ? AND state = 'completed'",
    )
    .bind(id)
    .execute(db)
    .await?
    .rows_affected();

    if restored == 0 {
        return Ok(None);
    }
    find_task(db, id).await
}

pub async fn fetch_deleted_tasks(db: &SqlitePool) -> Result<Vec<Task>, AppError> {
    let records = sqlx::query_as::<_, TaskRecord>(&select_tasks(
        "WHERE state = 'deleted' ORDER BY COALESCE(deleted_at, created_at) DESC",
    ))
    .fetch_all(db)
    .await?;
    assemble_all(db, records).await
}

pub async fn fetch_completed_tasks(db: &SqlitePool) -> Result<Vec<Task>, AppError> {
    let records = sqlx::query_as::<_, TaskRecord>(&select_tasks(
        "WHERE state = 'completed' ORDER BY COALESCE(completed_at, created_at) DESC LIMIT ?",
    ))
    .bind(COMPLETED_ARCHIVE_CAP)
    .fetch_all(db)
    .await?;
    assemble_all(db, records).await
}

// === ATTENDANCE ===

/// Idempotent set add with mutual exclusion: a member is either ready or not
/// going, and marking one side moves them off the other. There is no un-mark
/// operation.
pub async fn mark_attendance(
    db: &SqlitePool,
    task_id: &str,
    user_id: i64,
    kind: &str,
) -> Result<Option<Task>, AppError> {
    if find_active_record(db, task_id).await?.is_none() {
        return Ok(None);
    }

    sqlx::query(
        "INSERT INTO attendance (task_id, user_id, kind) VALUES (?, ?, ?) \
         ON CONFLICT (task_id, user_id) DO UPDATE SET kind = excluded.kind",
    )
    .bind(task_id)
    .bind(user_id)
    .bind(kind)
    .execute(db)
    .await?;

    touch(db, task_id).await?;
    find_task(db, task_id).await
}

// === PREPARATION FLAG ===

pub async fn set_preparation_completed(
    db: &SqlitePool,
    task_id: &str,
    completed: bool,
) -> Result<Option<Task>, AppError> {
    let updated = sqlx::query(
        "UPDATE tasks SET is_preparation_completed = ?, version = version + 1 \
         WHERE id = ? AND state = 'active'",
    )
    .bind(completed)
    .bind(task_id)
    .execute(db)
    .await?
    .rows_affected();

    if updated == 0 {
        return Ok(None);
    }
    find_task(db, task_id).await
}

// === CHECKLIST ===

pub async fn add_checklist_item(
    db: &SqlitePool,
    task_id: &str,
    text: &str,
) -> Result<Option<Task>, AppError> {
    if find_active_record(db, task_id).await?.is_none() {
        return Ok(None);
    }
    if text.trim().is_empty() {
        return Err(AppError::BadRequest(
            "Checklist item text must not be empty".to_string(),
        ));
    }

    let position: i64 = sqlx::query_scalar(
        "SELECT COALESCE(MAX(position) + 1, 0) FROM checklist_items WHERE task_id = ?",
    )
    .bind(task_id)
    .fetch_one(db)
    .await?;

    insert_checklist_row(db, task_id, text.trim(), position).await?;
    touch(db, task_id).await?;
    find_task(db, task_id).await
}

async fn insert_checklist_row(
    db: &SqlitePool,
    task_id: &str,
    text: &str,
    position: i64,
) -> Result<(), AppError> {
    sqlx::query(
        "INSERT INTO checklist_items (id, task_id, text, is_completed, position) \
         VALUES (?, ?, ?, 0, ?)",
    )
    .bind(Uuid::new_v4().to_string())
    .bind(task_id)
    .bind(text)
    .bind(position)
    .execute(db)
    .await?;
    Ok(())
}

/// Flip an item's completion. Completing records the acting user as a
/// completer; un-completing clears the completer set. Toggling twice restores
/// the original state.
pub async fn toggle_checklist_item(
    db: &SqlitePool,
    task_id: &str,
    item_id: &str,
    user_id: i64,
) -> Result<Option<Task>, AppError> {
    if find_active_record(db, task_id).await?.is_none() {
        return Ok(None);
    }

    let item = sqlx::query_as::<_, ChecklistItemRecord>(
        "SELECT id, text, is_completed, position FROM checklist_items \
         WHERE id = ? AND task_id = ?",
    )
    .bind(item_id)
    .bind(task_id)
    .fetch_optional(db)
    .await?;

    let Some(item) = item else {
        return Ok(None);
    };

    let now_completed = !item.is_completed;
    sqlx::query("UPDATE checklist_items SET is_completed = ? WHERE id = ?")
        .bind(now_completed)
        .bind(item_id)
        .execute(db)
        .await?;

    if now_completed {
        sqlx::query(
            "INSERT OR IGNORE INTO checklist_completions (item_id, user_id) VALUES (?, ?)",
        )
        .bind(item_id)
        .bind(user_id)
        .execute(db)
        .await?;
    } else {
        sqlx::query("DELETE FROM checklist_completions WHERE item_id = ?")
            .bind(item_id)
            .execute(db)
            .await?;
    }

    touch(db, task_id).await?;
    find_task(db, task_id).await
}

// === PHOTOS ===

pub async fn add_photo(
    db: &SqlitePool,
    task_id: &str,
    url: &str,
) -> Result<Option<Task>, AppError> {
    if find_active_record(db, task_id).await?.is_none() {
        return Ok(None);
    }

    let position: i64 = sqlx::query_scalar(
        "SELECT COALESCE(MAX(position) + 1, 0) FROM task_photos WHERE task_id = ?",
    )
    .bind(task_id)
    .fetch_one(db)
    .await?;

    sqlx::query("INSERT INTO task_photos (task_id, position, url) VALUES (?, ?, ?)")
        .bind(task_id)
        .bind(position)
        .bind(url)
        .execute(db)
        .await?;

    touch(db, task_id).await?;
    find_task(db, task_id).await
}

/// Remove the photo at a display index and close the gap so later indices
/// stay dense.
pub async fn remove_photo(
    db: &SqlitePool,
    task_id: &str,
    index: usize,
) -> Result<Option<Task>, AppError> {
    if find_active_record(db, task_id).await?.is_none() {
        return Ok(None);
    }

    let positions: Vec<i64> =
        sqlx::query_scalar("SELECT position FROM task_photos WHERE task_id = ? ORDER BY position")
            .bind(task_id)
            .fetch_all(db)
            .await?;

    let Some(&target) = positions.get(index) else {
        return Err(AppError::BadRequest(format!(
            "Photo index out of range: {index}"
        )));
    };

    sqlx::query("DELETE FROM task_photos WHERE task_id = ? AND position = ?")
        .bind(task_id)
        .bind(target)
        .execute(db)
        .await?;

    let remaining: Vec<i64> =
        sqlx::query_scalar("SELECT position FROM task_photos WHERE task_id = ? ORDER BY position")
            .bind(task_id)
            .fetch_all(db)
            .await?;
    for (new_position, old_position) in remaining.into_iter().enumerate() {
        let new_position = new_position as i64;
        if new_position != old_position {
            sqlx::query(
                "UPDATE task_photos SET position = ? WHERE task_id = ? AND position = ?",
            )
            .bind(new_position)
            .bind(task_id)
            .bind(old_position)
            .execute(db)
            .await?;
        }
    }

    touch(db, task_id).await?;
    find_task(db, task_id).await
}

// === REMINDERS ===

/// Active tasks that still have a reminder left to fire.
pub async fn fetch_reminder_candidates(db: &SqlitePool) -> Result<Vec<TaskRecord>, AppError> {
    let records = sqlx::query_as::<_, TaskRecord>(&select_tasks(
        "WHERE state = 'active' AND (notified_week_before = 0 OR notified_day_before = 0) \
         ORDER BY event_date",
    ))
    .fetch_all(db)
    .await?;
    Ok(records)
}

pub async fn mark_notified_week_before(db: &SqlitePool, task_id: &str) -> Result<(), AppError> {
    sqlx::query("UPDATE tasks SET notified_week_before = 1 WHERE id = ?")
        .bind(task_id)
        .execute(db)
        .await?;
    Ok(())
}

pub async fn mark_notified_day_before(db: &SqlitePool, task_id: &str) -> Result<(), AppError> {
    sqlx::query("UPDATE tasks SET notified_day_before = 1 WHERE id = ?")
        .bind(task_id)
        .execute(db)
        .await?;
    Ok(())
}

// === MAINTENANCE ===

/// Permanently drop deleted-archive entries whose deletion is older than the
/// cutoff. Returns how many tasks were purged.
pub async fn purge_deleted_before(
    db: &SqlitePool,
    cutoff: DateTime<Utc>,
) -> Result<u64, AppError> {
    let cutoff = cutoff.to_rfc3339();
    let ids: Vec<String> = sqlx::query_scalar(
        "SELECT id FROM tasks WHERE state = 'deleted' AND COALESCE(deleted_at, created_at) < ?",
    )
    .bind(&cutoff)
    .fetch_all(db)
    .await?;

    for id in &ids {
        drop_task_rows(db, id).await?;
    }
    Ok(ids.len() as u64)
}

/// Evict completed-archive entries beyond `keep`, oldest completions first.
/// Returns how many tasks were evicted.
pub async fn trim_completed(db: &SqlitePool, keep: i64) -> Result<u64, AppError> {
    let ids: Vec<String> = sqlx::query_scalar(
        "SELECT id FROM tasks WHERE state = 'completed' \
         ORDER BY COALESCE(completed_at, created_at) DESC LIMIT -1 OFFSET ?",
    )
    .bind(keep)
    .fetch_all(db)
    .await?;

    for id in &ids {
        drop_task_rows(db, id).await?;
    }
    Ok(ids.len() as u64)
}

async fn drop_task_rows(db: &SqlitePool, id: &str) -> Result<(), AppError> {
    sqlx::query(
        "DELETE FROM checklist_completions WHERE item_id IN \
         (SELECT id FROM checklist_items WHERE task_id = ?)",
    )
    .bind(id)
    .execute(db)
    .await?;
    sqlx::query("DELETE FROM checklist_items WHERE task_id = ?")
        .bind(id)
        .execute(db)
        .await?;
    sqlx::query("DELETE FROM attendance WHERE task_id = ?")
        .bind(id)
        .execute(db)
        .await?;
    sqlx::query("DELETE FROM task_photos WHERE task_id = ?")
        .bind(id)
        .execute(db)
        .await?;
    sqlx::query("DELETE FROM tasks WHERE id = ?")
        .bind(id)
        .execute(db)
        .await?;
    Ok(())
}

// === ASSEMBLY ===

async fn touch(db: &SqlitePool, task_id: &str) -> Result<(), AppError> {
    sqlx::query("UPDATE tasks SET version = version + 1 WHERE id = ?")
        .bind(task_id)
        .execute(db)
        .await?;
    Ok(())
}

async fn assemble_all(db: &SqlitePool, records: Vec<TaskRecord>) -> Result<Vec<Task>, AppError> {
    let mut tasks = Vec::with_capacity(records.len());
    for record in records {
        tasks.push(assemble(db, record).await?);
    }
    Ok(tasks)
}

/// Join the flat row with its checklist, attendance sets and photo list, and
/// derive the display status.
async fn assemble(db: &SqlitePool, record: TaskRecord) -> Result<Task, AppError> {
    let item_records = sqlx::query_as::<_, ChecklistItemRecord>(
        "SELECT id, text, is_completed, position FROM checklist_items \
         WHERE task_id = ? ORDER BY position",
    )
    .bind(&record.id)
    .fetch_all(db)
    .await?;

    let mut checklist = Vec::with_capacity(item_records.len());
    for item in item_records {
        let completed_by: Vec<i64> = sqlx::query_scalar(
            "SELECT user_id FROM checklist_completions WHERE item_id = ? ORDER BY rowid",
        )
        .bind(&item.id)
        .fetch_all(db)
        .await?;
        checklist.push(ChecklistItem {
            id: item.id,
            text: item.text,
            is_completed: item.is_completed,
            completed_by,
        });
    }

    let attendance: Vec<(i64, String)> =
        sqlx::query_as("SELECT user_id, kind FROM attendance WHERE task_id = ? ORDER BY rowid")
            .bind(&record.id)
            .fetch_all(db)
            .await?;

    let mut ready_users = Vec::new();
    let mut not_going_users = Vec::new();
    for (user_id, kind) in attendance {
        if kind == ATTENDANCE_READY {
            ready_users.push(user_id);
        } else {
            not_going_users.push(user_id);
        }
    }

    let photos: Vec<String> =
        sqlx::query_scalar("SELECT url FROM task_photos WHERE task_id = ? ORDER BY position")
            .bind(&record.id)
            .fetch_all(db)
            .await?;

    let status = record.status_at(Utc::now());

    Ok(Task {
        id: record.id,
        title: record.title,
        description: record.description,
        event_date: record.event_date,
        preparation_date: record.preparation_date,
        status,
        is_preparation_completed: record.is_preparation_completed,
        ready_users,
        not_going_users,
        checklist,
        photos,
        created_by: record.created_by,
        created_by_username: record.created_by_username,
        created_at: record.created_at,
        deleted_at: record.deleted_at,
        completed_at: record.completed_at,
        version: record.version,
    })
}
