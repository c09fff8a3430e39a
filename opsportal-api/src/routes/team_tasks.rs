/// Team task endpoints (internal access)
///
/// - `GET /api/team-tasks` - List, filtered by `status`, `assignee`,
///   `projectId` and `category`, newest first
/// - `POST /api/team-tasks` - Create; ids are `TASK-{n}` unless the body
///   carries one
/// - `GET|PUT|DELETE /api/team-tasks/:task_id`
/// - `POST /api/team-tasks/:task_id/time-tracking` - `{ "action": "start" | "pause" | "complete" }`
use axum::{
    extract::{rejection::JsonRejection, Path, Query, State},
    http::StatusCode,
    Extension, Json,
};
use opsportal_shared::auth::identity::Identity;
use opsportal_shared::models::team_task::{NewTeamTask, TeamTask, TeamTaskFilter, TeamTaskStatus};
use opsportal_shared::repository::Stored;
use serde_json::{json, Value};
use validator::Validate;

use super::{
    check_patch, created, object_body, ok, ok_with_message, parse_body, take_id, track_time,
    Envelope, TrackRequest,
};
use crate::{
    app::AppState,
    error::{ApiError, ApiResult},
};

fn creator(identity: &Identity) -> &str {
    identity.email.as_deref().unwrap_or("unknown")
}

pub async fn list_team_tasks(
    State(state): State<AppState>,
    Query(filter): Query<TeamTaskFilter>,
) -> ApiResult<Json<Envelope<Vec<Stored<TeamTask>>>>> {
    let repo = TeamTask::repository(state.store.clone());
    let tasks = TeamTask::list(&repo, &filter).await?;

    tracing::debug!(count = tasks.len(), ?filter, "Listed team tasks");
    Ok(ok(tasks))
}

/// Creates a team task
///
/// The creator's email is the default assignee and `createdBy`.
pub async fn create_team_task(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    payload: Result<Json<Value>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<Envelope<Stored<TeamTask>>>)> {
    let Json(body) = payload?;
    let mut fields = object_body(body)?;
    let id = take_id(&mut fields)?;

    let req: NewTeamTask = parse_body(Value::Object(fields))?;
    req.validate()?;

    let task = TeamTask::from_request(req, creator(&identity));
    let repo = TeamTask::repository(state.store.clone());
    let stored = match id {
        Some(id) => repo.create_with_id(&id, &task).await?,
        None => {
            let id = TeamTask::next_id(&repo).await?;
            repo.insert_with_id(&id, &task).await?
        }
    };

    tracing::info!(
        task_id = %stored.id,
        created_by = %stored.data.created_by,
        assignee = ?stored.data.assignee,
        "Team task created"
    );
    Ok(created(stored))
}

pub async fn get_team_task(
    State(state): State<AppState>,
    Path(task_id): Path<String>,
) -> ApiResult<Json<Envelope<Stored<TeamTask>>>> {
    let task = TeamTask::repository(state.store.clone())
        .get_by_id(&task_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Task not found".to_string()))?;
    Ok(ok(task))
}

pub async fn update_team_task(
    State(state): State<AppState>,
    Path(task_id): Path<String>,
    payload: Result<Json<Value>, JsonRejection>,
) -> ApiResult<Json<Envelope<Stored<TeamTask>>>> {
    let Json(body) = payload?;
    let patch = object_body(body)?;

    let repo = TeamTask::repository(state.store.clone());
    let current = repo
        .get_by_id(&task_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Task not found".to_string()))?;
    check_patch(&current, &patch)?;

    let updated = repo.update(&task_id, patch).await?;
    if updated.data.assignee != current.data.assignee {
        tracing::info!(task_id = %task_id, assignee = ?updated.data.assignee, "Team task reassigned");
    }
    Ok(ok(updated))
}

pub async fn delete_team_task(
    State(state): State<AppState>,
    Path(task_id): Path<String>,
) -> ApiResult<Json<Envelope<Value>>> {
    TeamTask::repository(state.store.clone())
        .delete(&task_id)
        .await?;
    Ok(ok_with_message(json!({ "id": task_id }), "Task deleted"))
}

/// Starts, pauses or completes the task's timer
///
/// Start moves the task to `in-progress`; complete moves it to `completed`
/// and records `actualHours`.
pub async fn track_team_task_time(
    State(state): State<AppState>,
    Path(task_id): Path<String>,
    payload: Result<Json<Value>, JsonRejection>,
) -> ApiResult<Json<Envelope<Stored<TeamTask>>>> {
    let Json(body) = payload?;
    let req: TrackRequest = parse_body(body)?;

    let repo = TeamTask::repository(state.store.clone());
    track_time(
        &repo,
        &task_id,
        &req.action,
        TeamTaskStatus::InProgress.as_str(),
        TeamTaskStatus::Completed.as_str(),
    )
    .await
}
