//! HTTP client for the portal API

use serde::Deserialize;
use serde_json::{json, Value};
use thiserror::Error;

use crate::time_tracking::TrackAction;

/// Client errors
#[derive(Error, Debug)]
pub enum ClientError {
    /// No bearer token was configured
    #[error("No token available")]
    MissingToken,

    #[error("Network error: {0}")]
    Http(#[from] reqwest::Error),

    /// The API answered with an error envelope
    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },
}

/// Item whose timer an action applies to
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TrackTarget {
    TeamTask { task_id: String },
    Feature { project_id: String, feature_id: String },
}

impl TrackTarget {
    /// Route path of the target's time-tracking endpoint
    pub fn path(&self) -> String {
        match self {
            TrackTarget::TeamTask { task_id } => {
                format!("/api/team-tasks/{}/time-tracking", task_id)
            }
            TrackTarget::Feature {
                project_id,
                feature_id,
            } => format!(
                "/api/projects/{}/features/{}/time-tracking",
                project_id, feature_id
            ),
        }
    }
}

/// Success envelope of a time-tracking call
#[derive(Debug, Clone, Deserialize)]
pub struct TrackResponse {
    pub success: bool,
    #[serde(default)]
    pub message: String,
    pub data: Value,
}

/// Portal API client
#[derive(Debug, Clone)]
pub struct PortalClient {
    http: reqwest::Client,
    base_url: String,
    token: Option<String>,
}

impl PortalClient {
    pub fn new(base_url: impl Into<String>, token: Option<String>) -> Self {
        Self::with_http(reqwest::Client::new(), base_url, token)
    }

    pub fn with_http(http: reqwest::Client, base_url: impl Into<String>, token: Option<String>) -> Self {
        Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token,
        }
    }

    /// Forwards `action` for `target`
    pub async fn track_action(
        &self,
        target: &TrackTarget,
        action: TrackAction,
    ) -> Result<TrackResponse, ClientError> {
        let token = self.token.as_deref().ok_or(ClientError::MissingToken)?;
        let url = format!("{}{}", self.base_url, target.path());

        let response = self
            .http
            .post(&url)
            .bearer_auth(token)
            .json(&json!({ "action": action.as_str() }))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body: Value = response.json().await.unwrap_or(Value::Null);
            let message = body
                .get("message")
                .or_else(|| body.get("error"))
                .and_then(Value::as_str)
                .unwrap_or("Time tracking request failed")
                .to_string();

            tracing::warn!(%url, status = status.as_u16(), %message, "Time tracking call failed");
            return Err(ClientError::Api {
                status: status.as_u16(),
                message,
            });
        }

        Ok(response.json::<TrackResponse>().await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        extract::Path,
        http::{HeaderMap, StatusCode},
        routing::post,
        Json, Router,
    };

    async fn api_stub() -> String {
        async fn track(
            Path(task_id): Path<String>,
            headers: HeaderMap,
            Json(body): Json<Value>,
        ) -> (StatusCode, Json<Value>) {
            if headers.get("authorization").and_then(|v| v.to_str().ok()) != Some("Bearer t0k") {
                return (
                    StatusCode::UNAUTHORIZED,
                    Json(json!({ "error": "Unauthorized", "message": "Missing bearer token" })),
                );
            }
            if task_id == "missing" {
                return (
                    StatusCode::NOT_FOUND,
                    Json(json!({ "error": "Not found", "message": "Task not found" })),
                );
            }
            (
                StatusCode::OK,
                Json(json!({
                    "success": true,
                    "message": "Timer started",
                    "data": { "id": task_id, "action": body["action"] }
                })),
            )
        }

        let app = Router::new().route("/api/team-tasks/:task_id/time-tracking", post(track));
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move { axum::serve(listener, app).await.unwrap() });
        format!("http://{}/", addr)
    }

    fn team_task(id: &str) -> TrackTarget {
        TrackTarget::TeamTask {
            task_id: id.to_string(),
        }
    }

    #[test]
    fn test_target_paths() {
        assert_eq!(team_task("TASK-3").path(), "/api/team-tasks/TASK-3/time-tracking");
        let feature = TrackTarget::Feature {
            project_id: "p1".to_string(),
            feature_id: "AB-P1-2".to_string(),
        };
        assert_eq!(feature.path(), "/api/projects/p1/features/AB-P1-2/time-tracking");
    }

    #[tokio::test]
    async fn test_forwards_action_with_bearer_token() {
        let client = PortalClient::new(api_stub().await, Some("t0k".to_string()));
        let response = client
            .track_action(&team_task("TASK-1"), TrackAction::Start)
            .await
            .unwrap();

        assert!(response.success);
        assert_eq!(response.message, "Timer started");
        assert_eq!(response.data["action"], "start");
        assert_eq!(response.data["id"], "TASK-1");
    }

    #[tokio::test]
    async fn test_error_envelope_is_surfaced() {
        let client = PortalClient::new(api_stub().await, Some("t0k".to_string()));
        let err = client
            .track_action(&team_task("missing"), TrackAction::Pause)
            .await
            .unwrap_err();

        match err {
            ClientError::Api { status, message } => {
                assert_eq!(status, 404);
                assert_eq!(message, "Task not found");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_missing_token() {
        let client = PortalClient::new("http://127.0.0.1:9", None);
        let err = client
            .track_action(&team_task("TASK-1"), TrackAction::Complete)
            .await
            .unwrap_err();
        assert!(matches!(err, ClientError::MissingToken));
    }
}
