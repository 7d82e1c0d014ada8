use chrono::{Duration, Utc};
use sqlx::SqlitePool;
use sqlx::sqlite::SqlitePoolOptions;

use eventprep::db::repository;
use eventprep::models::NewTaskRequest;
use eventprep::services::maintenance;

async fn setup_test_db() -> SqlitePool {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .expect("Failed to create database");

    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .expect("Failed to run migrations");

    pool
}

fn task_request(title: &str) -> NewTaskRequest {
    NewTaskRequest {
        title: title.to_string(),
        description: String::new(),
        event_date: "2030-06-20T18:00:00+00:00".to_string(),
        preparation_date: "2030-06-18T10:00:00+00:00".to_string(),
        created_by: 1,
        created_by_username: "olena".to_string(),
        checklist: vec![],
        photos: vec![],
    }
}

#[tokio::test]
async fn delete_and_restore_round_trip() {
    let pool = setup_test_db().await;
    let task = repository::insert_task(&pool, task_request("Movie night"))
        .await
        .unwrap();

    assert!(repository::delete_task(&pool, &task.id).await.unwrap());

    let active = repository::fetch_active_tasks(&pool, None, None).await.unwrap();
    assert!(active.is_empty());
    let deleted = repository::fetch_deleted_tasks(&pool).await.unwrap();
    assert_eq!(deleted.len(), 1);
    assert!(deleted[0].deleted_at.is_some());

    // Deleting twice is a no-op: the task is no longer active.
    assert!(!repository::delete_task(&pool, &task.id).await.unwrap());

    let restored = repository::restore_deleted_task(&pool, &task.id)
        .await
        .unwrap()
        .expect("task should be restorable");
    assert!(restored.deleted_at.is_none());

    let active = repository::fetch_active_tasks(&pool, None, None).await.unwrap();
    assert_eq!(active.len(), 1);
    assert!(repository::fetch_deleted_tasks(&pool).await.unwrap().is_empty());
}

#[tokio::test]
async fn finish_and_restore_round_trip() {
    let pool = setup_test_db().await;
    let task = repository::insert_task(&pool, task_request("Movie night"))
        .await
        .unwrap();

    let finished = repository::finish_task(&pool, &task.id)
        .await
        .unwrap()
        .expect("task should be finishable");
    assert!(finished.is_preparation_completed);
    assert!(finished.completed_at.is_some());

    assert!(repository::fetch_active_tasks(&pool, None, None).await.unwrap().is_empty());
    assert_eq!(repository::fetch_completed_tasks(&pool).await.unwrap().len(), 1);
    // The two archives hold disjoint populations.
    assert!(repository::fetch_deleted_tasks(&pool).await.unwrap().is_empty());

    // A finished task is not in the deleted archive, so that restore misses.
    assert!(repository::restore_deleted_task(&pool, &task.id)
        .await
        .unwrap()
        .is_none());

    let restored = repository::restore_completed_task(&pool, &task.id)
        .await
        .unwrap()
        .expect("task should be restorable");
    assert!(!restored.is_preparation_completed);
    assert!(restored.completed_at.is_none());

    assert_eq!(repository::fetch_active_tasks(&pool, None, None).await.unwrap().len(), 1);
    assert!(repository::fetch_completed_tasks(&pool).await.unwrap().is_empty());
}

#[tokio::test]
async fn completed_archive_is_capped_at_ten() {
    let pool = setup_test_db().await;

    for i in 0..12 {
        let task = repository::insert_task(&pool, task_request(&format!("Event {i}")))
            .await
            .unwrap();
        repository::finish_task(&pool, &task.id).await.unwrap();
        // Backdate completions with increasing offsets so the eviction order
        // is explicit: Event 0 is the oldest completion.
        sqlx::query("UPDATE tasks SET completed_at = ? WHERE id = ?")
            .bind((Utc::now() - Duration::minutes(100 - i)).to_rfc3339())
            .bind(&task.id)
            .execute(&pool)
            .await
            .unwrap();
    }

    let completed = repository::fetch_completed_tasks(&pool).await.unwrap();
    assert_eq!(completed.len(), 10);
    // The two oldest completions were evicted.
    let titles: Vec<&str> = completed.iter().map(|t| t.title.as_str()).collect();
    assert!(!titles.contains(&"Event 0"));
    assert!(!titles.contains(&"Event 1"));
    assert_eq!(titles[0], "Event 11");
}

#[tokio::test]
async fn maintenance_purges_month_old_deletions() {
    let pool = setup_test_db().await;

    let stale = repository::insert_task(&pool, task_request("Forgotten"))
        .await
        .unwrap();
    let fresh = repository::insert_task(&pool, task_request("Recent"))
        .await
        .unwrap();
    repository::delete_task(&pool, &stale.id).await.unwrap();
    repository::delete_task(&pool, &fresh.id).await.unwrap();

    // Age one deletion past the retention window.
    let long_ago = (Utc::now() - Duration::days(45)).to_rfc3339();
    sqlx::query("UPDATE tasks SET deleted_at = ? WHERE id = ?")
        .bind(&long_ago)
        .bind(&stale.id)
        .execute(&pool)
        .await
        .unwrap();

    let stats = maintenance::run(&pool).await.unwrap();
    assert_eq!(stats.purged_deleted, 1);
    assert_eq!(stats.evicted_completed, 0);

    let deleted = repository::fetch_deleted_tasks(&pool).await.unwrap();
    assert_eq!(deleted.len(), 1);
    assert_eq!(deleted[0].title, "Recent");

    // Purged for good: not restorable either.
    assert!(repository::restore_deleted_task(&pool, &stale.id)
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn every_mutation_bumps_the_version() {
    let pool = setup_test_db().await;
    let task = repository::insert_task(&pool, task_request("Versioned"))
        .await
        .unwrap();
    assert_eq!(task.version, 0);

    let after_ready = repository::mark_attendance(&pool, &task.id, 5, repository::ATTENDANCE_READY)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(after_ready.version, 1);

    let after_prep = repository::set_preparation_completed(&pool, &task.id, true)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(after_prep.version, 2);

    let after_item = repository::add_checklist_item(&pool, &task.id, "Bring snacks")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(after_item.version, 3);
}
