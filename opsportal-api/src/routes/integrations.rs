/// Integration status endpoints
///
/// - `GET /api/gmail/verify` (internal) - Can the platform send as the admin
///   mailbox? Failures answer 500 with `{ connected: false, error, message }`.
/// - `GET /api/trello/status` (authenticated) - Is the caller's Trello token
///   still accepted?
use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    Extension, Json,
};
use opsportal_shared::auth::identity::Identity;
use opsportal_shared::integrations::ConnectionStatus;
use serde_json::json;

use super::{ok, Envelope};
use crate::{app::AppState, error::ApiResult};

pub async fn gmail_verify(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
) -> Response {
    match state.gmail.check(&identity).await {
        Ok(status) => ok(status).into_response(),
        Err(e) => {
            tracing::error!(check = state.gmail.name(), error = %e, "Gmail verification failed");
            let message = e.to_string();
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "connected": false, "error": message, "message": message })),
            )
                .into_response()
        }
    }
}

pub async fn trello_status(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
) -> ApiResult<Json<Envelope<ConnectionStatus>>> {
    let status = state.trello.check(&identity).await?;

    tracing::debug!(uid = %identity.uid, connected = status.connected, "Trello status checked");
    Ok(ok(status))
}
