/// Integration tests for repositories over the in-memory store
///
/// These exercise the flows the API handlers compose: id generation, timer
/// patches written through `Repository::update`, and cross-collection links
/// between features and QA tasks.
use chrono::{Duration, TimeZone, Utc};
use opsportal_shared::models::client::Client;
use opsportal_shared::models::feature::{Feature, FeatureFilter, FeatureStatus, NewFeature};
use opsportal_shared::models::qa_task::QaTask;
use opsportal_shared::models::team_task::{TeamTask, TeamTaskCategory, TeamTaskFilter, TeamTaskStatus};
use opsportal_shared::store::memory::MemoryStore;
use opsportal_shared::store::{DocumentStore, StoreError};
use opsportal_shared::time_tracking::{apply, Timed, TrackAction};
use serde_json::json;
use std::sync::Arc;

fn store() -> Arc<dyn DocumentStore> {
    Arc::new(MemoryStore::new())
}

fn new_feature(title: &str) -> NewFeature {
    serde_json::from_value(json!({ "epicTitle": "Auth", "title": title })).unwrap()
}

#[tokio::test]
async fn test_team_task_ids_are_sequential() {
    let repo = TeamTask::repository(store());

    for n in 1..=3 {
        let id = TeamTask::next_id(&repo).await.unwrap();
        assert_eq!(id, format!("TASK-{}", n));
        let task = TeamTask::new(format!("Tarea {}", n), TeamTaskCategory::Propuestas, "ops@x.com");
        repo.create_with_id(&id, &task).await.unwrap();
    }

    assert_eq!(repo.count().await.unwrap(), 3);
}

#[tokio::test]
async fn test_timer_cycle_through_repository() {
    let repo = TeamTask::repository(store());
    let task = TeamTask::new("Cotizar", TeamTaskCategory::Otra, "ops@x.com");
    let created = repo.create_with_id("TASK-1", &task).await.unwrap();

    let t0 = Utc.with_ymd_and_hms(2026, 3, 2, 9, 0, 0).unwrap();

    let start = apply(TrackAction::Start, &created.data.timer(), t0).unwrap();
    let running = repo
        .update("TASK-1", start.to_patch("in-progress", "completed"))
        .await
        .unwrap();
    assert_eq!(running.data.status, TeamTaskStatus::InProgress);
    assert!(running.data.timer().is_running());

    let pause = apply(TrackAction::Pause, &running.data.timer(), t0 + Duration::minutes(45)).unwrap();
    let paused = repo
        .update("TASK-1", pause.to_patch("in-progress", "completed"))
        .await
        .unwrap();
    assert!(paused.data.started_at.is_none());
    assert_eq!(paused.data.accumulated_time, 2700);
    assert_eq!(paused.data.status, TeamTaskStatus::InProgress);

    let complete = apply(TrackAction::Complete, &paused.data.timer(), t0 + Duration::hours(5)).unwrap();
    let done = repo
        .update("TASK-1", complete.to_patch("in-progress", "completed"))
        .await
        .unwrap();
    assert_eq!(done.data.status, TeamTaskStatus::Completed);
    assert_eq!(done.data.accumulated_time, 2700);
    assert_eq!(done.data.actual_hours, Some(0.8));
}

#[tokio::test]
async fn test_team_task_filters() {
    let repo = TeamTask::repository(store());
    let mut a = TeamTask::new("A", TeamTaskCategory::Propuestas, "x");
    a.assignee = Some("ana@x.com".to_string());
    let mut b = TeamTask::new("B", TeamTaskCategory::Otra, "x");
    b.assignee = Some("beto@x.com".to_string());
    repo.create(&a).await.unwrap();
    repo.create(&b).await.unwrap();

    let filter = TeamTaskFilter {
        assignee: Some("beto@x.com".to_string()),
        ..Default::default()
    };
    let tasks = TeamTask::list(&repo, &filter).await.unwrap();
    assert_eq!(tasks.len(), 1);
    assert_eq!(tasks[0].data.title, "B");
}

#[tokio::test]
async fn test_feature_ids_and_qa_link() {
    let store = store();
    let features = Feature::repository(store.clone(), "proj42");
    let qa_tasks = QaTask::repository(store.clone(), "proj42");

    for title in ["Login", "Logout"] {
        let id = Feature::next_id(&features, "proj42", Some("Acme Billing")).await.unwrap();
        let feature = Feature::from_request("proj42", new_feature(title), "pm@x.com");
        features.create_with_id(&id, &feature).await.unwrap();
    }

    let listed = Feature::list(&features, &FeatureFilter::default()).await.unwrap();
    let ids: Vec<_> = listed.iter().map(|f| f.id.as_str()).collect();
    assert_eq!(ids, vec!["AB-P42-1", "AB-P42-2"]);

    let login = &listed[0];
    let qa = qa_tasks
        .create(&login.data.qa_task(&login.id, "pm@x.com"))
        .await
        .unwrap();
    let mut patch = opsportal_shared::store::Fields::new();
    patch.insert("qaTaskId".to_string(), json!(qa.id));
    patch.insert("status".to_string(), json!(FeatureStatus::Completed.as_str()));
    let updated = features.update(&login.id, patch).await.unwrap();

    assert_eq!(updated.data.qa_task_id.as_deref(), Some(qa.id.as_str()));
    assert_eq!(qa.data.feature_id.as_deref(), Some("AB-P42-1"));
    assert_eq!(qa.data.feature_title.as_deref(), Some("Login"));
}

#[tokio::test]
async fn test_client_lookup_and_delete() {
    let repo = Client::repository(store());
    let client: Client = serde_json::from_value(json!({
        "empresa": "Acme",
        "rfc": "ACM010101AAA",
        "notas": "cliente preferente"
    }))
    .unwrap();
    let created = repo.create_with_id("abc", &client).await.unwrap();

    let found = Client::find_by_tax_id(&repo, "ACM010101AAA").await.unwrap().unwrap();
    assert_eq!(found.id, "abc");
    assert_eq!(found.data.extra["notas"], "cliente preferente");

    repo.delete(&created.id).await.unwrap();
    assert!(matches!(
        repo.delete(&created.id).await,
        Err(StoreError::NotFound { .. })
    ));
}
