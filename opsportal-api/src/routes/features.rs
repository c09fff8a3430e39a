/// Project feature endpoints (internal access)
///
/// - `GET /api/projects/:project_id/features` - List, filtered by `epic`,
///   `status` and `priority`, in id sequence order
/// - `POST /api/projects/:project_id/features` - Create with an
///   `{INITIALS}-P{n}-{seq}` id
/// - `GET|PUT|DELETE /api/projects/:project_id/features/:feature_id`
/// - `POST /api/projects/:project_id/features/:feature_id/time-tracking`
///
/// Moving a feature to `done` or `completed` for the first time opens a QA
/// task for it, and a `done` status is stored as `completed`. Deleting a
/// feature deletes its QA task.
use axum::{
    extract::{rejection::JsonRejection, Path, Query, State},
    http::StatusCode,
    Extension, Json,
};
use opsportal_shared::auth::identity::Identity;
use opsportal_shared::models::feature::{Feature, FeatureFilter, FeatureStatus, NewFeature};
use opsportal_shared::models::project::COLLECTION as PROJECTS;
use opsportal_shared::models::qa_task::QaTask;
use opsportal_shared::repository::Stored;
use opsportal_shared::store::{DocumentStore, Fields, StoreResult};
use opsportal_shared::time_tracking::TrackAction;
use serde::Serialize;
use serde_json::{json, Value};
use validator::Validate;

use super::{
    check_patch, created, object_body, ok, ok_with_message, parse_body, track_time, Envelope,
    TrackRequest,
};
use crate::{
    app::AppState,
    error::{ApiError, ApiResult},
};

/// Result of a feature update
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FeatureUpdate {
    #[serde(flatten)]
    pub feature: Stored<Feature>,
    pub qa_task_created: bool,
}

fn actor(identity: &Identity) -> &str {
    identity
        .email
        .as_deref()
        .or(Some(identity.uid.as_str()).filter(|uid| !uid.is_empty()))
        .unwrap_or("unknown")
}

fn not_found() -> ApiError {
    ApiError::NotFound("Feature not found".to_string())
}

/// Name of the project document, when it has one
async fn project_name(store: &dyn DocumentStore, project_id: &str) -> StoreResult<Option<String>> {
    Ok(store.get(PROJECTS, project_id).await?.and_then(|doc| {
        doc.fields
            .get("name")
            .and_then(Value::as_str)
            .map(str::to_string)
    }))
}

/// Adds a finished feature's hours to the assignee's total on the project
///
/// Best effort: failures are logged and the update goes ahead.
async fn credit_assignee_hours(store: &dyn DocumentStore, project_id: &str, feature: &Feature) {
    let (Some(assignee), Some(hours)) = (feature.assignee.as_deref(), feature.actual_hours) else {
        return;
    };

    if let Err(e) = add_user_hours(store, project_id, assignee, hours).await {
        tracing::warn!(project_id, assignee, error = %e, "Could not credit assignee hours");
    }
}

async fn add_user_hours(
    store: &dyn DocumentStore,
    project_id: &str,
    assignee: &str,
    hours: f64,
) -> StoreResult<()> {
    let Some(project) = store.get(PROJECTS, project_id).await? else {
        return Ok(());
    };
    let mut user_hours = project
        .fields
        .get("userHours")
        .and_then(Value::as_object)
        .cloned()
        .unwrap_or_default();
    let current = user_hours.get(assignee).and_then(Value::as_f64).unwrap_or(0.0);
    let total = ((current + hours) * 10.0).round() / 10.0;
    user_hours.insert(assignee.to_string(), json!(total));

    let mut patch = Fields::new();
    patch.insert("userHours".to_string(), Value::Object(user_hours));
    store.update(PROJECTS, project_id, patch).await?;
    Ok(())
}

pub async fn list_features(
    State(state): State<AppState>,
    Path(project_id): Path<String>,
    Query(filter): Query<FeatureFilter>,
) -> ApiResult<Json<Envelope<Vec<Stored<Feature>>>>> {
    let repo = Feature::repository(state.store.clone(), &project_id);
    let features = Feature::list(&repo, &filter).await?;
    Ok(ok(features))
}

pub async fn create_feature(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Path(project_id): Path<String>,
    payload: Result<Json<Value>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<Envelope<Stored<Feature>>>)> {
    let Json(body) = payload?;
    let req: NewFeature = parse_body(body)?;
    req.validate()?;

    let name = match project_name(state.store.as_ref(), &project_id).await? {
        Some(name) => Some(name),
        None => req.project_name.clone(),
    };

    let repo = Feature::repository(state.store.clone(), &project_id);
    let id = Feature::next_id(&repo, &project_id, name.as_deref()).await?;
    let feature = Feature::from_request(&project_id, req, actor(&identity));
    let stored = repo.insert_with_id(&id, &feature).await?;

    tracing::info!(project_id = %project_id, feature_id = %stored.id, "Feature created");
    Ok(created(stored))
}

pub async fn get_feature(
    State(state): State<AppState>,
    Path((project_id, feature_id)): Path<(String, String)>,
) -> ApiResult<Json<Envelope<Stored<Feature>>>> {
    let feature = Feature::repository(state.store.clone(), &project_id)
        .get_by_id(&feature_id)
        .await?
        .ok_or_else(not_found)?;
    Ok(ok(feature))
}

/// Partial update
///
/// The first transition into `done`/`completed` of a feature without a QA
/// task creates one, links it through `qaTaskId` and credits the assignee's
/// hours on the project.
pub async fn update_feature(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Path((project_id, feature_id)): Path<(String, String)>,
    payload: Result<Json<Value>, JsonRejection>,
) -> ApiResult<Json<Envelope<FeatureUpdate>>> {
    let Json(body) = payload?;
    let mut patch = object_body(body)?;

    let repo = Feature::repository(state.store.clone(), &project_id);
    let current = repo.get_by_id(&feature_id).await?.ok_or_else(not_found)?;
    check_patch(&current, &patch)?;

    let new_status: Option<FeatureStatus> = match patch.get("status") {
        Some(value) if !value.is_null() => Some(parse_body(value.clone())?),
        _ => None,
    };
    let was_finished = current.data.status.is_finished();
    let finishing = !was_finished && new_status.map_or(false, |s| s.is_finished());

    let mut qa_task_created = false;
    if finishing && current.data.qa_task_id.is_none() {
        let qa_repo = QaTask::repository(state.store.clone(), &project_id);
        let qa_task = qa_repo
            .create(&current.data.qa_task(&feature_id, actor(&identity)))
            .await?;

        tracing::info!(
            project_id = %project_id,
            feature_id = %feature_id,
            qa_task_id = %qa_task.id,
            "QA task opened for finished feature"
        );
        patch.insert("qaTaskId".to_string(), json!(qa_task.id));
        if new_status == Some(FeatureStatus::Done) {
            patch.insert("status".to_string(), json!(FeatureStatus::Completed.as_str()));
        }
        qa_task_created = true;
    }

    if finishing {
        credit_assignee_hours(state.store.as_ref(), &project_id, &current.data).await;
    }

    let feature = repo.update(&feature_id, patch).await?;
    Ok(ok(FeatureUpdate {
        feature,
        qa_task_created,
    }))
}

/// Deletes the feature and, when linked, its QA task
pub async fn delete_feature(
    State(state): State<AppState>,
    Path((project_id, feature_id)): Path<(String, String)>,
) -> ApiResult<Json<Envelope<Value>>> {
    let repo = Feature::repository(state.store.clone(), &project_id);
    let feature = repo.get_by_id(&feature_id).await?.ok_or_else(not_found)?;

    if let Some(qa_task_id) = &feature.data.qa_task_id {
        let qa_repo = QaTask::repository(state.store.clone(), &project_id);
        if let Err(e) = qa_repo.delete(qa_task_id).await {
            tracing::warn!(
                project_id = %project_id,
                qa_task_id = %qa_task_id,
                error = %e,
                "Could not delete linked QA task"
            );
        }
    }

    repo.delete(&feature_id).await?;
    Ok(ok_with_message(
        json!({ "id": feature_id }),
        "Feature deleted",
    ))
}

/// Starts, pauses or completes the feature's timer
///
/// Complete moves the feature to `done` and credits its `actualHours` to the
/// assignee on the project.
pub async fn track_feature_time(
    State(state): State<AppState>,
    Path((project_id, feature_id)): Path<(String, String)>,
    payload: Result<Json<Value>, JsonRejection>,
) -> ApiResult<Json<Envelope<Stored<Feature>>>> {
    let Json(body) = payload?;
    let req: TrackRequest = parse_body(body)?;

    let repo = Feature::repository(state.store.clone(), &project_id);
    let response = track_time(
        &repo,
        &feature_id,
        &req.action,
        FeatureStatus::InProgress.as_str(),
        FeatureStatus::Done.as_str(),
    )
    .await?;

    if matches!(req.action.parse::<TrackAction>(), Ok(TrackAction::Complete)) {
        credit_assignee_hours(state.store.as_ref(), &project_id, &response.0.data.data).await;
    }
    Ok(response)
}
