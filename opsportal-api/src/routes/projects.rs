/// Project endpoints (internal access)
///
/// - `GET /api/projects` - List, filtered by `clientId` and `status`
/// - `POST /api/projects` - Create; an `id` in the body picks the key
/// - `GET /api/projects/:project_id` - One project with feature totals
/// - `PUT /api/projects/:project_id` - Partial update
/// - `DELETE /api/projects/:project_id` - Delete the project document
///
/// Reading a single project is limited to superadmins and the project's
/// `teamMembers`.
use axum::{
    extract::{rejection::JsonRejection, Path, Query, State},
    http::StatusCode,
    Extension, Json,
};
use opsportal_shared::auth::identity::Identity;
use opsportal_shared::models::feature::Feature;
use opsportal_shared::models::project::{Project, ProjectFilter, ProjectMetrics};
use opsportal_shared::repository::Stored;
use opsportal_shared::store::Fields;
use serde_json::{json, Value};

use super::{check_patch, created, object_body, ok, ok_with_message, parse_body, take_id, Envelope};
use crate::{
    app::AppState,
    error::{ApiError, ApiResult},
};

pub async fn list_projects(
    State(state): State<AppState>,
    Query(filter): Query<ProjectFilter>,
) -> ApiResult<Json<Envelope<Vec<Stored<Project>>>>> {
    let repo = Project::repository(state.store.clone());
    let projects = Project::list(&repo, &filter).await?;

    tracing::debug!(count = projects.len(), ?filter, "Listed projects");
    Ok(ok(projects))
}

/// Creates a project
///
/// `name` is required. The caller's email becomes `createdBy` unless the
/// body names someone else.
pub async fn create_project(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    payload: Result<Json<Value>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<Envelope<Stored<Project>>>)> {
    let Json(body) = payload?;
    let mut fields = object_body(body)?;
    let id = take_id(&mut fields)?;

    let mut project: Project = parse_body(Value::Object(fields))?;
    if project.name.as_deref().map_or(true, |name| name.trim().is_empty()) {
        return Err(ApiError::BadRequest("Project name is required".to_string()));
    }
    if project.created_by.is_none() {
        project.created_by = identity.email.clone();
    }

    let repo = Project::repository(state.store.clone());
    let stored = match id {
        Some(id) => repo.create_with_id(&id, &project).await?,
        None => repo.create(&project).await?,
    };

    tracing::info!(uid = %identity.uid, project_id = %stored.id, "Project created");
    Ok(created(stored))
}

/// One project, with feature-derived totals
///
/// A project without `createdBy` is claimed by the first caller with an
/// email. When the features cannot be read the stored totals are returned.
pub async fn get_project(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Path(project_id): Path<String>,
) -> ApiResult<Json<Envelope<Stored<Project>>>> {
    let repo = Project::repository(state.store.clone());
    let mut project = repo.require(&project_id).await?;

    if let (false, Some(email)) = (identity.superadmin, identity.email.as_deref()) {
        if !project.data.has_member(email) {
            tracing::info!(project_id = %project_id, email, "Project access denied");
            return Err(ApiError::Forbidden(
                "You must be on the project's team to open it".to_string(),
            ));
        }
    }

    let unclaimed = project.data.created_by.is_none();
    if let (true, Some(email)) = (unclaimed, &identity.email) {
        let mut patch = Fields::new();
        patch.insert("createdBy".to_string(), json!(email));
        match repo.update(&project_id, patch).await {
            Ok(updated) => project = updated,
            Err(e) => tracing::warn!(project_id = %project_id, error = %e, "Could not set createdBy"),
        }
    }

    match Feature::repository(state.store.clone(), &project_id).get_all().await {
        Ok(features) => {
            let metrics = ProjectMetrics::from_features(features.iter().map(|f| &f.data));
            project.data.apply_metrics(&metrics);
        }
        Err(e) => {
            tracing::warn!(project_id = %project_id, error = %e, "Could not compute project totals");
        }
    }

    Ok(ok(project))
}

pub async fn update_project(
    State(state): State<AppState>,
    Path(project_id): Path<String>,
    payload: Result<Json<Value>, JsonRejection>,
) -> ApiResult<Json<Envelope<Stored<Project>>>> {
    let Json(body) = payload?;
    let patch = object_body(body)?;

    let repo = Project::repository(state.store.clone());
    let current = repo.require(&project_id).await?;
    check_patch(&current, &patch)?;

    let updated = repo.update(&project_id, patch).await?;
    Ok(ok(updated))
}

/// Deletes the project document; its subcollections are left in place
pub async fn delete_project(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Path(project_id): Path<String>,
) -> ApiResult<Json<Envelope<Value>>> {
    Project::repository(state.store.clone())
        .delete(&project_id)
        .await?;

    tracing::info!(uid = %identity.uid, project_id = %project_id, "Project deleted");
    Ok(ok_with_message(json!({ "id": project_id }), "Project deleted"))
}
