use async_trait::async_trait;
use serde::Deserialize;
use std::sync::Arc;

use super::{ConnectionStatus, ConnectivityCheck, IntegrationError};
use crate::auth::identity::Identity;
use crate::store::DocumentStore;

pub const TRELLO_API_BASE: &str = "https://api.trello.com/1";

pub const TOKENS_COLLECTION: &str = "user-trello-tokens";

/// Reported when Trello rejects the stored token
pub const INVALID_TOKEN_MESSAGE: &str = "Invalid or expired token";

/// Per-user Trello credentials
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrelloTokens {
    pub token: String,
    #[serde(default)]
    pub token_secret: Option<String>,
    #[serde(default)]
    pub board_id: Option<String>,
}

/// [`ConnectivityCheck`] for the caller's Trello account
pub struct TrelloCheck {
    store: Arc<dyn DocumentStore>,
    http: reqwest::Client,
    api_base: String,
}

impl TrelloCheck {
    pub fn new(store: Arc<dyn DocumentStore>, http: reqwest::Client) -> Self {
        Self::with_api_base(store, http, TRELLO_API_BASE)
    }

    pub fn with_api_base(
        store: Arc<dyn DocumentStore>,
        http: reqwest::Client,
        api_base: impl Into<String>,
    ) -> Self {
        Self {
            store,
            http,
            api_base: api_base.into(),
        }
    }

    /// Stored tokens for `user_id`, if the user connected Trello
    pub async fn user_tokens(&self, user_id: &str) -> Result<Option<TrelloTokens>, IntegrationError> {
        let Some(doc) = self.store.get(TOKENS_COLLECTION, user_id).await? else {
            return Ok(None);
        };

        match serde_json::from_value::<TrelloTokens>(serde_json::Value::Object(doc.fields)) {
            Ok(tokens) if !tokens.token.is_empty() => Ok(Some(tokens)),
            Ok(_) => Ok(None),
            Err(e) => {
                tracing::warn!(user_id, error = %e, "Malformed Trello token document");
                Ok(None)
            }
        }
    }

    async fn api_key(&self) -> Result<String, IntegrationError> {
        self.store
            .get("config", "trello")
            .await?
            .and_then(|doc| doc.fields.get("apiKey").and_then(|v| v.as_str()).map(str::to_string))
            .filter(|key| !key.is_empty())
            .ok_or_else(|| {
                IntegrationError::NotConfigured(
                    "Trello is not configured: set apiKey in config/trello".to_string(),
                )
            })
    }
}

/// Document id under which a user's tokens are stored
fn user_key(identity: &Identity) -> &str {
    if !identity.uid.is_empty() {
        &identity.uid
    } else {
        identity.email.as_deref().unwrap_or("unknown")
    }
}

#[async_trait]
impl ConnectivityCheck for TrelloCheck {
    fn name(&self) -> &'static str {
        "trello"
    }

    async fn check(&self, identity: &Identity) -> Result<ConnectionStatus, IntegrationError> {
        let user_id = user_key(identity);
        let Some(tokens) = self.user_tokens(user_id).await? else {
            return Ok(ConnectionStatus::disconnected());
        };
        let api_key = self.api_key().await?;

        let result = self
            .http
            .get(format!("{}/members/me/boards", self.api_base))
            .query(&[
                ("key", api_key.as_str()),
                ("token", tokens.token.as_str()),
                ("filter", "open"),
                ("fields", "id,name"),
            ])
            .send()
            .await
            .and_then(|r| r.error_for_status());

        match result {
            Ok(_) => Ok(ConnectionStatus {
                connected: true,
                board_id: tokens.board_id,
                ..ConnectionStatus::default()
            }),
            Err(e) => {
                tracing::warn!(user_id, error = %e, "Trello token check failed");
                Ok(ConnectionStatus::failed(INVALID_TOKEN_MESSAGE))
            }
        }
    }
}
