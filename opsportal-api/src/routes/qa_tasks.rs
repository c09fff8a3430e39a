/// Project QA task endpoints (internal access)
///
/// - `GET /api/projects/:project_id/qa-tasks` - List, filtered by `category`
///   or `status` (stored `categoria` / `estado` values)
/// - `POST /api/projects/:project_id/qa-tasks` - Create
/// - `GET|PUT|DELETE /api/projects/:project_id/qa-tasks/:task_id`
///
/// A task links to a feature through `featureId` (which must exist) or
/// describes it with a free-text `featureNote`, never both.
use axum::{
    extract::{rejection::JsonRejection, Path, Query, State},
    http::StatusCode,
    Extension, Json,
};
use opsportal_shared::auth::identity::Identity;
use opsportal_shared::models::feature::Feature;
use opsportal_shared::models::qa_task::{NewQaTask, QaTask};
use opsportal_shared::models::wire_name;
use opsportal_shared::repository::Stored;
use opsportal_shared::store::Fields;
use serde::Deserialize;
use serde_json::{json, Value};
use validator::Validate;

use super::{check_patch, created, object_body, ok, ok_with_message, parse_body, Envelope};
use crate::{
    app::AppState,
    error::{ApiError, ApiResult},
};

/// List filters; `category` wins when both are given
#[derive(Debug, Default, Deserialize)]
pub struct QaTaskFilter {
    pub category: Option<String>,
    pub status: Option<String>,
}

impl QaTaskFilter {
    fn matches(&self, task: &QaTask) -> bool {
        match (self.category.as_deref(), self.status.as_deref()) {
            (Some(category), _) if !category.is_empty() => wire_name(&task.category) == category,
            (_, Some(status)) if !status.is_empty() => wire_name(&task.status) == status,
            _ => true,
        }
    }
}

fn present(patch: &Fields, key: &str) -> bool {
    patch.get(key).map_or(false, |v| !v.is_null())
}

fn not_found() -> ApiError {
    ApiError::NotFound("QA task not found".to_string())
}

/// Title of the feature a QA task links to; 400 when it does not exist
async fn linked_feature_title(
    state: &AppState,
    project_id: &str,
    feature_id: &str,
) -> ApiResult<String> {
    Feature::repository(state.store.clone(), project_id)
        .get_by_id(feature_id)
        .await?
        .map(|feature| feature.data.title)
        .ok_or_else(|| ApiError::BadRequest(format!("Feature {} does not exist", feature_id)))
}

pub async fn list_qa_tasks(
    State(state): State<AppState>,
    Path(project_id): Path<String>,
    Query(filter): Query<QaTaskFilter>,
) -> ApiResult<Json<Envelope<Vec<Stored<QaTask>>>>> {
    let tasks = QaTask::repository(state.store.clone(), &project_id)
        .get_all()
        .await?
        .into_iter()
        .filter(|task| filter.matches(&task.data))
        .collect();
    Ok(ok(tasks))
}

pub async fn create_qa_task(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Path(project_id): Path<String>,
    payload: Result<Json<Value>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<Envelope<Stored<QaTask>>>)> {
    let Json(body) = payload?;
    let req: NewQaTask = parse_body(body)?;
    req.validate()?;

    let feature_title = match req.feature_id.as_deref() {
        Some(feature_id) => Some(linked_feature_title(&state, &project_id, feature_id).await?),
        None => None,
    };

    let creator = identity.email.as_deref().unwrap_or(identity.uid.as_str());
    let task = QaTask::from_request(&project_id, req, feature_title, creator);
    let stored = QaTask::repository(state.store.clone(), &project_id)
        .create(&task)
        .await?;

    tracing::info!(project_id = %project_id, qa_task_id = %stored.id, "QA task created");
    Ok(created(stored))
}

pub async fn get_qa_task(
    State(state): State<AppState>,
    Path((project_id, task_id)): Path<(String, String)>,
) -> ApiResult<Json<Envelope<Stored<QaTask>>>> {
    let task = QaTask::repository(state.store.clone(), &project_id)
        .get_by_id(&task_id)
        .await?
        .ok_or_else(not_found)?;
    Ok(ok(task))
}

pub async fn update_qa_task(
    State(state): State<AppState>,
    Path((project_id, task_id)): Path<(String, String)>,
    payload: Result<Json<Value>, JsonRejection>,
) -> ApiResult<Json<Envelope<Stored<QaTask>>>> {
    let Json(body) = payload?;
    let mut patch: Fields = object_body(body)?;

    if present(&patch, "featureId") && present(&patch, "featureNote") {
        return Err(ApiError::BadRequest(
            "featureId and featureNote cannot both be set".to_string(),
        ));
    }

    let repo = QaTask::repository(state.store.clone(), &project_id);
    let current = repo.get_by_id(&task_id).await?.ok_or_else(not_found)?;
    check_patch(&current, &patch)?;

    if let Some(feature_id) = patch.get("featureId").and_then(Value::as_str).map(str::to_string) {
        let title = linked_feature_title(&state, &project_id, &feature_id).await?;
        patch.insert("featureTitle".to_string(), json!(title));
        patch.insert("featureNote".to_string(), Value::Null);
    } else if present(&patch, "featureNote") {
        patch.insert("featureId".to_string(), Value::Null);
        patch.insert("featureTitle".to_string(), Value::Null);
    }

    let task = repo.update(&task_id, patch).await?;
    Ok(ok(task))
}

pub async fn delete_qa_task(
    State(state): State<AppState>,
    Path((project_id, task_id)): Path<(String, String)>,
) -> ApiResult<Json<Envelope<Value>>> {
    QaTask::repository(state.store.clone(), &project_id)
        .delete(&task_id)
        .await?;
    Ok(ok_with_message(json!({ "id": task_id }), "QA task deleted"))
}
