//! Third-party connectivity checks

pub mod gmail;
pub mod trello;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::auth::identity::Identity;
use crate::google::GoogleAuthError;
use crate::store::StoreError;

/// Outcome of a connectivity check
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionStatus {
    pub connected: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub board_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ConnectionStatus {
    pub fn disconnected() -> Self {
        Self::default()
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            error: Some(error.into()),
            ..Self::default()
        }
    }
}

/// Integration errors
#[derive(Error, Debug)]
pub enum IntegrationError {
    /// Credentials or settings missing from the config collection
    #[error("{0}")]
    NotConfigured(String),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Credentials(#[from] GoogleAuthError),

    /// The remote service rejected the call or could not be reached
    #[error("{0}")]
    Request(String),
}

/// A check against one external service
#[async_trait]
pub trait ConnectivityCheck: Send + Sync {
    /// Service name for logs
    fn name(&self) -> &'static str;

    /// Runs the check for `identity`
    async fn check(&self, identity: &Identity) -> Result<ConnectionStatus, IntegrationError>;
}

/// Extracts the remote error message from a Google or Trello error body
pub(crate) fn remote_message(status: reqwest::StatusCode, body: &str) -> String {
    let parsed: Option<serde_json::Value> = serde_json::from_str(body).ok();
    parsed
        .as_ref()
        .and_then(|v| v.pointer("/error/message").or_else(|| v.get("message")))
        .and_then(|m| m.as_str())
        .map(str::to_string)
        .or_else(|| Some(body.trim().to_string()).filter(|b| !b.is_empty() && b.len() < 200))
        .unwrap_or_else(|| {
            format!(
                "HTTP {}: {}",
                status.as_u16(),
                status.canonical_reason().unwrap_or("Unknown")
            )
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::StatusCode;

    #[test]
    fn test_status_serialization_skips_empty_fields() {
        assert_eq!(
            serde_json::to_value(ConnectionStatus::disconnected()).unwrap(),
            serde_json::json!({ "connected": false })
        );

        let status = ConnectionStatus {
            connected: true,
            board_id: Some("b1".to_string()),
            ..Default::default()
        };
        assert_eq!(
            serde_json::to_value(status).unwrap(),
            serde_json::json!({ "connected": true, "boardId": "b1" })
        );
    }

    #[test]
    fn test_remote_message() {
        assert_eq!(
            remote_message(
                StatusCode::FORBIDDEN,
                r#"{"error":{"code":403,"message":"Delegation denied"}}"#
            ),
            "Delegation denied"
        );
        assert_eq!(remote_message(StatusCode::UNAUTHORIZED, "invalid token"), "invalid token");
        assert_eq!(
            remote_message(StatusCode::BAD_GATEWAY, ""),
            "HTTP 502: Bad Gateway"
        );
    }
}
