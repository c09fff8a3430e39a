/// API route handlers
///
/// This module contains all route handlers organized by resource:
///
/// - `health`: Health check endpoint
/// - `permissions`: Permission matrix and identity validation
/// - `clients`: Billing clients (finance)
/// - `hourly_rates`: Per-person hourly pricing (finance)
/// - `expenses`: Expense ledger and hours-based generation (finance)
/// - `projects`: Projects and their feature totals
/// - `team_tasks`: Internal team tasks and their timers
/// - `features`: Project features and their timers
/// - `qa_tasks`: Project QA tasks
/// - `integrations`: Gmail and Trello connectivity checks
///
/// Successful responses are wrapped in [`Envelope`]:
///
/// ```json
/// { "success": true, "data": { ... } }
/// ```
use axum::{http::StatusCode, Json};
use chrono::Utc;
use opsportal_shared::repository::{Repository, Stored};
use opsportal_shared::store::Fields;
use opsportal_shared::time_tracking::{self, InvalidAction, Timed, TrackAction};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::Value;

use crate::error::{ApiError, ApiResult};

pub mod clients;
pub mod expenses;
pub mod features;
pub mod health;
pub mod hourly_rates;
pub mod integrations;
pub mod permissions;
pub mod projects;
pub mod qa_tasks;
pub mod team_tasks;

/// Success envelope
#[derive(Debug, Serialize)]
pub struct Envelope<T> {
    pub success: bool,

    pub data: T,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// `200 { success: true, data }`
pub fn ok<T: Serialize>(data: T) -> Json<Envelope<T>> {
    Json(Envelope {
        success: true,
        data,
        message: None,
    })
}

/// `200 { success: true, data, message }`
pub fn ok_with_message<T: Serialize>(data: T, message: impl Into<String>) -> Json<Envelope<T>> {
    Json(Envelope {
        success: true,
        data,
        message: Some(message.into()),
    })
}

/// `201 { success: true, data }`
pub fn created<T: Serialize>(data: T) -> (StatusCode, Json<Envelope<T>>) {
    (StatusCode::CREATED, ok(data))
}

/// Requires a JSON object body, for partial updates
pub(crate) fn object_body(body: Value) -> ApiResult<Fields> {
    match body {
        Value::Object(fields) => Ok(fields),
        _ => Err(ApiError::BadRequest("Request body must be a JSON object".to_string())),
    }
}

/// Parses a typed request from an already extracted JSON value
pub(crate) fn parse_body<T: DeserializeOwned>(body: Value) -> ApiResult<T> {
    serde_json::from_value(body).map_err(|e| ApiError::BadRequest(format!("Invalid request body: {}", e)))
}

/// Removes a caller-chosen `id` from a create body
///
/// A missing, `null` or blank id means "generate one".
pub(crate) fn take_id(fields: &mut Fields) -> ApiResult<Option<String>> {
    match fields.remove("id") {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(id)) => Ok(Some(id.trim().to_string()).filter(|id| !id.is_empty())),
        Some(other) => Err(ApiError::BadRequest(format!("Invalid id: {}", other))),
    }
}

/// Checks that `patch` applied to `current` still decodes as `T`
///
/// Catches bad enum values and wrong types before anything is written.
pub(crate) fn check_patch<T>(current: &Stored<T>, patch: &Fields) -> ApiResult<()>
where
    T: Serialize + DeserializeOwned,
{
    let mut merged = match serde_json::to_value(current) {
        Ok(Value::Object(fields)) => fields,
        _ => return Err(ApiError::InternalError("Stored record is not an object".to_string())),
    };
    for (key, value) in patch {
        if value.is_null() {
            merged.remove(key);
        } else {
            merged.insert(key.clone(), value.clone());
        }
    }

    serde_json::from_value::<T>(Value::Object(merged))
        .map(|_| ())
        .map_err(|e| ApiError::BadRequest(format!("Invalid update: {}", e)))
}

/// Body of a time-tracking call
#[derive(Debug, Deserialize)]
pub struct TrackRequest {
    pub action: String,
}

/// Applies a timer action to one record and writes the result
///
/// An action that would not change the timer (start while running, pause
/// while idle) answers 200 with the unchanged record.
pub(crate) async fn track_time<T>(
    repo: &Repository<T>,
    id: &str,
    action: &str,
    running_status: &str,
    completed_status: &str,
) -> ApiResult<Json<Envelope<Stored<T>>>>
where
    T: Serialize + DeserializeOwned + Timed,
{
    let action: TrackAction = action
        .parse()
        .map_err(|e: InvalidAction| ApiError::BadRequest(e.to_string()))?;

    let current = repo
        .get_by_id(id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("{} not found", id)))?;

    match time_tracking::apply(action, &current.data.timer(), Utc::now()) {
        Ok(update) => {
            let stored = repo
                .update(id, update.to_patch(running_status, completed_status))
                .await?;
            tracing::info!(
                collection = repo.collection(),
                id,
                %action,
                accumulated = update.accumulated_time,
                "Timer updated"
            );
            Ok(ok_with_message(stored, update.message()))
        }
        Err(noop) => Ok(ok_with_message(current, noop.to_string())),
    }
}
