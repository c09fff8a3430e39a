//! Gmail connectivity check
//!
//! Credentials come from `config/gmail.serviceAccountJson`, falling back to
//! `config/googleCalendar.serviceAccountJson`.

use async_trait::async_trait;
use serde::Deserialize;
use std::sync::Arc;
use tokio::sync::OnceCell;

use super::{remote_message, ConnectionStatus, ConnectivityCheck, IntegrationError};
use crate::auth::identity::Identity;
use crate::google::{ServiceAccountKey, TokenSource, GMAIL_SCOPES};
use crate::store::DocumentStore;

pub const GMAIL_PROFILE_URL: &str = "https://www.googleapis.com/gmail/v1/users/me/profile";

const CONFIG_COLLECTION: &str = "config";
const CREDENTIALS_FIELD: &str = "serviceAccountJson";

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct Profile {
    email_address: String,
}

/// [`ConnectivityCheck`] for the admin Gmail mailbox
pub struct GmailCheck {
    store: Arc<dyn DocumentStore>,
    http: reqwest::Client,
    admin_email: String,
    profile_url: String,
    tokens: OnceCell<TokenSource>,
}

impl GmailCheck {
    pub fn new(store: Arc<dyn DocumentStore>, http: reqwest::Client, admin_email: impl Into<String>) -> Self {
        Self {
            store,
            http,
            admin_email: admin_email.into(),
            profile_url: GMAIL_PROFILE_URL.to_string(),
            tokens: OnceCell::new(),
        }
    }

    /// Points the profile call somewhere else (tests, proxies)
    pub fn with_profile_url(mut self, url: impl Into<String>) -> Self {
        self.profile_url = url.into();
        self
    }

    /// Service account key from the config collection
    pub async fn load_key(&self) -> Result<ServiceAccountKey, IntegrationError> {
        if let Some(doc) = self.store.get(CONFIG_COLLECTION, "gmail").await? {
            if let Some(value) = doc.fields.get(CREDENTIALS_FIELD) {
                match ServiceAccountKey::from_value(value) {
                    Ok(key) => return Ok(key),
                    Err(e) => tracing::warn!(
                        error = %e,
                        "Unusable Gmail service account, falling back to calendar credentials"
                    ),
                }
            }
        }

        let doc = self.store.get(CONFIG_COLLECTION, "googleCalendar").await?;
        let value = doc
            .as_ref()
            .and_then(|d| d.fields.get(CREDENTIALS_FIELD))
            .ok_or_else(|| {
                IntegrationError::NotConfigured(
                    "Gmail service account is not configured".to_string(),
                )
            })?;

        Ok(ServiceAccountKey::from_value(value)?)
    }

    async fn token_source(&self) -> Result<&TokenSource, IntegrationError> {
        self.tokens
            .get_or_try_init(|| async {
                let key = self.load_key().await?;
                Ok::<_, IntegrationError>(
                    TokenSource::new(self.http.clone(), key, &GMAIL_SCOPES)
                        .with_subject(self.admin_email.clone()),
                )
            })
            .await
    }
}

#[async_trait]
impl ConnectivityCheck for GmailCheck {
    fn name(&self) -> &'static str {
        "gmail"
    }

    async fn check(&self, _identity: &Identity) -> Result<ConnectionStatus, IntegrationError> {
        if self.admin_email.is_empty() {
            return Err(IntegrationError::NotConfigured(
                "Gmail admin mailbox is not configured".to_string(),
            ));
        }
        let token = self.token_source().await?.access_token().await?;

        let response = self
            .http
            .get(&self.profile_url)
            .bearer_auth(token)
            .send()
            .await
            .map_err(|e| IntegrationError::Request(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(IntegrationError::Request(remote_message(status, &body)));
        }

        let profile = response
            .json::<Profile>()
            .await
            .map_err(|e| IntegrationError::Request(e.to_string()))?;

        tracing::info!(email = %profile.email_address, "Gmail connection verified");

        Ok(ConnectionStatus {
            connected: true,
            email: Some(profile.email_address),
            ..ConnectionStatus::default()
        })
    }
}
