//! Google service-account credentials (JWT bearer grant)

use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use thiserror::Error;
use tokio::sync::Mutex;

/// Default OAuth token endpoint
pub const TOKEN_URI: &str = "https://oauth2.googleapis.com/token";

/// Firestore read/write scope
pub const DATASTORE_SCOPE: &str = "https://www.googleapis.com/auth/datastore";

/// Gmail scopes granted to the mailer through domain-wide delegation
pub const GMAIL_SCOPES: [&str; 2] = [
    "https://www.googleapis.com/auth/gmail.send",
    "https://www.googleapis.com/auth/gmail.compose",
];

const JWT_BEARER_GRANT: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";

/// Assertion lifetime accepted by Google (max one hour)
const ASSERTION_LIFETIME_SECS: i64 = 3600;

/// Tokens are refreshed this long before they expire
const REFRESH_MARGIN_SECS: i64 = 60;

/// Service-account credential errors
#[derive(Error, Debug)]
pub enum GoogleAuthError {
    /// Key material missing or unparseable
    #[error("Invalid service account key: {0}")]
    InvalidKey(String),

    /// Assertion could not be signed
    #[error("Failed to sign assertion: {0}")]
    Signing(String),

    /// Token endpoint refused the assertion or was unreachable
    #[error("Token exchange failed: {0}")]
    Exchange(String),
}

/// The fields of a service-account JSON key file that matter here
#[derive(Clone, Deserialize)]
pub struct ServiceAccountKey {
    pub client_email: String,
    pub private_key: String,
    #[serde(default = "default_token_uri")]
    pub token_uri: String,
    #[serde(default)]
    pub project_id: Option<String>,
}

fn default_token_uri() -> String {
    TOKEN_URI.to_string()
}

impl fmt::Debug for ServiceAccountKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceAccountKey")
            .field("client_email", &self.client_email)
            .field("token_uri", &self.token_uri)
            .field("project_id", &self.project_id)
            .finish_non_exhaustive()
    }
}

impl ServiceAccountKey {
    /// Parses the JSON key file contents
    pub fn from_json(json: &str) -> Result<Self, GoogleAuthError> {
        let key: Self =
            serde_json::from_str(json).map_err(|e| GoogleAuthError::InvalidKey(e.to_string()))?;
        key.check()
    }

    /// Parses a key stored in a document field
    ///
    /// The field may hold the key file as a JSON string or as an object.
    pub fn from_value(value: &Value) -> Result<Self, GoogleAuthError> {
        match value {
            Value::String(json) => Self::from_json(json),
            Value::Object(_) => serde_json::from_value::<Self>(value.clone())
                .map_err(|e| GoogleAuthError::InvalidKey(e.to_string()))?
                .check(),
            _ => Err(GoogleAuthError::InvalidKey(
                "expected a JSON string or object".to_string(),
            )),
        }
    }

    /// Loads a key from inline JSON or from a file path
    pub fn load(source: &str) -> Result<Self, GoogleAuthError> {
        let source = source.trim();
        if source.starts_with('{') {
            return Self::from_json(source);
        }

        let contents = std::fs::read_to_string(source)
            .map_err(|e| GoogleAuthError::InvalidKey(format!("{}: {}", source, e)))?;
        Self::from_json(&contents)
    }

    fn check(self) -> Result<Self, GoogleAuthError> {
        if self.client_email.trim().is_empty() || self.private_key.trim().is_empty() {
            return Err(GoogleAuthError::InvalidKey(
                "client_email and private_key are required".to_string(),
            ));
        }
        Ok(self)
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct AssertionClaims {
    iss: String,
    scope: String,
    aud: String,
    iat: i64,
    exp: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    sub: Option<String>,
}

/// Signs a JWT bearer-grant assertion
///
/// `subject` is the mailbox to impersonate with domain-wide delegation.
pub fn sign_assertion(
    key: &ServiceAccountKey,
    scopes: &[String],
    subject: Option<&str>,
    now: DateTime<Utc>,
) -> Result<String, GoogleAuthError> {
    let claims = AssertionClaims {
        iss: key.client_email.clone(),
        scope: scopes.join(" "),
        aud: key.token_uri.clone(),
        iat: now.timestamp(),
        exp: now.timestamp() + ASSERTION_LIFETIME_SECS,
        sub: subject.map(str::to_string),
    };

    let signing_key = EncodingKey::from_rsa_pem(key.private_key.as_bytes())
        .map_err(|e| GoogleAuthError::InvalidKey(e.to_string()))?;

    encode(&Header::new(Algorithm::RS256), &claims, &signing_key)
        .map_err(|e| GoogleAuthError::Signing(e.to_string()))
}

/// An OAuth access token and its expiry
#[derive(Debug, Clone)]
pub struct AccessToken {
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

impl AccessToken {
    fn is_fresh(&self, now: DateTime<Utc>) -> bool {
        self.expires_at - Duration::seconds(REFRESH_MARGIN_SECS) > now
    }
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default = "default_expires_in")]
    expires_in: i64,
}

fn default_expires_in() -> i64 {
    ASSERTION_LIFETIME_SECS
}

#[derive(Deserialize)]
struct TokenErrorResponse {
    error: String,
    #[serde(default)]
    error_description: Option<String>,
}

/// Exchanges a freshly signed assertion for an access token
pub async fn fetch_access_token(
    http: &reqwest::Client,
    key: &ServiceAccountKey,
    scopes: &[String],
    subject: Option<&str>,
) -> Result<AccessToken, GoogleAuthError> {
    let now = Utc::now();
    let assertion = sign_assertion(key, scopes, subject, now)?;

    let response = http
        .post(&key.token_uri)
        .form(&[("grant_type", JWT_BEARER_GRANT), ("assertion", assertion.as_str())])
        .send()
        .await
        .map_err(|e| GoogleAuthError::Exchange(e.to_string()))?;

    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        let message = match serde_json::from_str::<TokenErrorResponse>(&body) {
            Ok(err) => err.error_description.unwrap_or(err.error),
            Err(_) => format!("HTTP {}", status.as_u16()),
        };
        return Err(GoogleAuthError::Exchange(message));
    }

    let token = response
        .json::<TokenResponse>()
        .await
        .map_err(|e| GoogleAuthError::Exchange(e.to_string()))?;

    Ok(AccessToken {
        token: token.access_token,
        expires_at: now + Duration::seconds(token.expires_in),
    })
}

/// Caching access-token provider for one service account and scope set
pub struct TokenSource {
    http: reqwest::Client,
    key: ServiceAccountKey,
    scopes: Vec<String>,
    subject: Option<String>,
    cached: Mutex<Option<AccessToken>>,
}

impl TokenSource {
    pub fn new(http: reqwest::Client, key: ServiceAccountKey, scopes: &[&str]) -> Self {
        Self {
            http,
            key,
            scopes: scopes.iter().map(|s| s.to_string()).collect(),
            subject: None,
            cached: Mutex::new(None),
        }
    }

    /// Impersonates `subject` (domain-wide delegation)
    pub fn with_subject(mut self, subject: impl Into<String>) -> Self {
        self.subject = Some(subject.into());
        self
    }

    pub fn key(&self) -> &ServiceAccountKey {
        &self.key
    }

    /// Returns a valid bearer token, exchanging a new one when needed
    pub async fn access_token(&self) -> Result<String, GoogleAuthError> {
        let mut cached = self.cached.lock().await;

        if let Some(token) = cached.as_ref().filter(|t| t.is_fresh(Utc::now())) {
            return Ok(token.token.clone());
        }

        tracing::debug!(
            client_email = %self.key.client_email,
            "Refreshing service account access token"
        );

        let token = fetch_access_token(
            &self.http,
            &self.key,
            &self.scopes,
            self.subject.as_deref(),
        )
        .await?;
        let bearer = token.token.clone();
        *cached = Some(token);
        Ok(bearer)
    }
}
