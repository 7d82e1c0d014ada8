use axum::Json;
use axum::extract::{Path, Query};
use axum::routing::{patch, post};
use axum::{Router, extract::State, http::StatusCode, routing::get};
use serde::Deserialize;

use crate::db::repository::{self, ATTENDANCE_NOT_GOING, ATTENDANCE_READY};
use crate::error::AppError;
use crate::models::*;
use crate::services::{ReminderService, ReminderStats};
use crate::state::AppState;

#[derive(Deserialize)]
struct TaskListParams {
    from: Option<String>,
    to: Option<String>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/tasks", get(list_tasks).post(create_task))
        .route(
            "/tasks/{id}",
            get(get_task).put(update_task).delete(delete_task),
        )
        .route("/tasks/{id}/finish", patch(finish_task))
        .route("/tasks/{id}/ready", post(mark_ready))
        .route("/tasks/{id}/not-going", post(mark_not_going))
        .route("/tasks/{id}/complete-preparation", patch(complete_preparation))
        .route(
            "/tasks/{id}/uncomplete-preparation",
            patch(uncomplete_preparation),
        )
        .route("/tasks/{id}/checklist", post(add_checklist_item))
        .route("/tasks/{id}/checklist/{item_id}", patch(toggle_checklist_item))
        .route("/tasks/{id}/photos", post(add_photo))
        .route("/tasks/{id}/photos/{index}", axum::routing::delete(remove_photo))
        .route("/archive/deleted", get(list_deleted))
        .route("/archive/completed", get(list_completed))
        .route("/archive/deleted/{id}/restore", post(restore_deleted))
        .route("/archive/completed/{id}/restore", post(restore_completed))
        .route("/users", get(list_users).post(register_user))
        .route("/users/{telegram_id}/language", patch(update_language))
        .route("/reminders/run", post(run_reminders))
        .with_state(state)
}

async fn health(State(state): State<AppState>) -> Result<StatusCode, AppError> {
    sqlx::query("select 1").execute(&state.db).await?;
    Ok(StatusCode::OK)
}

// === TASKS ===

async fn list_tasks(
    State(state): State<AppState>,
    Query(params): Query<TaskListParams>,
) -> Result<Json<Vec<Task>>, AppError> {
    let tasks = repository::fetch_active_tasks(
        &state.db,
        params.from.as_deref(),
        params.to.as_deref(),
    )
    .await?;
    Ok(Json(tasks))
}

async fn create_task(
    State(state): State<AppState>,
    Json(req): Json<NewTaskRequest>,
) -> Result<Json<Task>, AppError> {
    let task = repository::insert_task(&state.db, req).await?;
    Ok(Json(task))
}

async fn get_task(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Task>, AppError> {
    let task = repository::find_task(&state.db, &id)
        .await?
        .ok_or(AppError::NotFound)?;
    Ok(Json(task))
}

async fn update_task(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<UpdateTaskRequest>,
) -> Result<Json<Task>, AppError> {
    let task = repository::update_task(&state.db, &id, req)
        .await?
        .ok_or(AppError::NotFound)?;
    Ok(Json(task))
}

async fn delete_task(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, AppError> {
    let ok = repository::delete_task(&state.db, &id).await?;
    if ok {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(AppError::NotFound)
    }
}

async fn finish_task(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Task>, AppError> {
    let task = repository::finish_task(&state.db, &id)
        .await?
        .ok_or(AppError::NotFound)?;
    Ok(Json(task))
}

// === ATTENDANCE ===

async fn mark_ready(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<AttendanceRequest>,
) -> Result<Json<Task>, AppError> {
    let task = repository::mark_attendance(&state.db, &id, req.user_id, ATTENDANCE_READY)
        .await?
        .ok_or(AppError::NotFound)?;
    Ok(Json(task))
}

async fn mark_not_going(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<AttendanceRequest>,
) -> Result<Json<Task>, AppError> {
    let task = repository::mark_attendance(&state.db, &id, req.user_id, ATTENDANCE_NOT_GOING)
        .await?
        .ok_or(AppError::NotFound)?;
    Ok(Json(task))
}

// === PREPARATION ===

async fn complete_preparation(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Task>, AppError> {
    let task = repository::set_preparation_completed(&state.db, &id, true)
        .await?
        .ok_or(AppError::NotFound)?;
    Ok(Json(task))
}

async fn uncomplete_preparation(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Task>, AppError> {
    let task = repository::set_preparation_completed(&state.db, &id, false)
        .await?
        .ok_or(AppError::NotFound)?;
    Ok(Json(task))
}

// === CHECKLIST ===

async fn add_checklist_item(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<NewChecklistItemRequest>,
) -> Result<Json<Task>, AppError> {
    let task = repository::add_checklist_item(&state.db, &id, &req.text)
        .await?
        .ok_or(AppError::NotFound)?;
    Ok(Json(task))
}

async fn toggle_checklist_item(
    State(state): State<AppState>,
    Path((id, item_id)): Path<(String, String)>,
    Json(req): Json<ToggleChecklistItemRequest>,
) -> Result<Json<Task>, AppError> {
    let task = repository::toggle_checklist_item(&state.db, &id, &item_id, req.user_id)
        .await?
        .ok_or(AppError::NotFound)?;
    Ok(Json(task))
}

// === PHOTOS ===

async fn add_photo(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<NewPhotoRequest>,
) -> Result<Json<Task>, AppError> {
    let task = repository::add_photo(&state.db, &id, &req.url)
        .await?
        .ok_or(AppError::NotFound)?;
    Ok(Json(task))
}

async fn remove_photo(
    State(state): State<AppState>,
    Path((id, index)): Path<(String, usize)>,
) -> Result<Json<Task>, AppError> {
    let task = repository::remove_photo(&state.db, &id, index)
        .await?
        .ok_or(AppError::NotFound)?;
    Ok(Json(task))
}

// === ARCHIVES ===

async fn list_deleted(State(state): State<AppState>) -> Result<Json<Vec<Task>>, AppError> {
    let tasks = repository::fetch_deleted_tasks(&state.db).await?;
    Ok(Json(tasks))
}

async fn list_completed(State(state): State<AppState>) -> Result<Json<Vec<Task>>, AppError> {
    let tasks = repository::fetch_completed_tasks(&state.db).await?;
    Ok(Json(tasks))
}

async fn restore_deleted(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Task>, AppError> {
    let task = repository::restore_deleted_task(&state.db, &id)
        .await?
        .ok_or(AppError::NotFound)?;
    Ok(Json(task))
}

async fn restore_completed(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Task>, AppError> {
    let task = repository::restore_completed_task(&state.db, &id)
        .await?
        .ok_or(AppError::NotFound)?;
    Ok(Json(task))
}

// === USERS ===

async fn register_user(
    State(state): State<AppState>,
    Json(req): Json<RegisterUserRequest>,
) -> Result<Json<User>, AppError> {
    let user = repository::upsert_user(&state.db, req).await?;
    Ok(Json(user))
}

async fn list_users(State(state): State<AppState>) -> Result<Json<Vec<User>>, AppError> {
    let users = repository::fetch_users(&state.db).await?;
    Ok(Json(users))
}

async fn update_language(
    State(state): State<AppState>,
    Path(telegram_id): Path<i64>,
    Json(req): Json<UpdateLanguageRequest>,
) -> Result<Json<User>, AppError> {
    let user = repository::update_user_language(&state.db, telegram_id, req.language)
        .await?
        .ok_or(AppError::NotFound)?;
    Ok(Json(user))
}

// === REMINDERS ===

async fn run_reminders(State(state): State<AppState>) -> Result<Json<ReminderStats>, AppError> {
    let service = ReminderService::new(state.db.clone(), state.notifier.clone());
    let stats = service.run_sweep().await?;
    Ok(Json(stats))
}
