//! Bearer token verification
//!
//! [`FirebaseTokenVerifier`] checks RS256 ID tokens against the provider's
//! signing keys. [`SharedSecretVerifier`] checks HS256 tokens for local runs.

use async_trait::async_trait;
use jsonwebtoken::{
    decode, decode_header, encode, errors::ErrorKind, jwk::JwkSet, Algorithm, DecodingKey,
    EncodingKey, Header, Validation,
};
use reqwest::header::CACHE_CONTROL;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

use super::identity::IdentityClaims;

/// Public JWK set for the identity provider's ID tokens
pub const FIREBASE_JWKS_URL: &str =
    "https://www.googleapis.com/service_accounts/v1/jwk/securetoken@system.gserviceaccount.com";

/// Used when the key endpoint sends no usable max-age
const DEFAULT_KEY_TTL: Duration = Duration::from_secs(3600);

/// Minimum spacing between refetches triggered by an unknown key id
const MIN_REFETCH_INTERVAL: Duration = Duration::from_secs(60);

/// Error type for token verification
#[derive(Debug, thiserror::Error)]
pub enum VerifyError {
    /// Token has expired
    #[error("Token has expired")]
    Expired,

    /// Signature, format, audience, or issuer check failed
    #[error("Invalid token: {0}")]
    Invalid(String),

    /// Token references a key id the provider does not publish
    #[error("Unknown signing key: {0}")]
    UnknownKey(String),

    /// Signing keys could not be fetched
    #[error("Failed to fetch signing keys: {0}")]
    KeyFetch(String),
}

impl From<jsonwebtoken::errors::Error> for VerifyError {
    fn from(err: jsonwebtoken::errors::Error) -> Self {
        match err.kind() {
            ErrorKind::ExpiredSignature => VerifyError::Expired,
            _ => VerifyError::Invalid(err.to_string()),
        }
    }
}

/// Validates a bearer credential and returns its claims
#[async_trait]
pub trait TokenVerifier: Send + Sync {
    /// Verifies `token` and decodes its claims
    async fn verify(&self, token: &str) -> Result<IdentityClaims, VerifyError>;
}

/// HS256 verifier backed by a shared secret
#[derive(Clone)]
pub struct SharedSecretVerifier {
    key: DecodingKey,
}

impl SharedSecretVerifier {
    /// Creates a verifier for tokens signed with `secret`
    pub fn new(secret: &str) -> Self {
        Self {
            key: DecodingKey::from_secret(secret.as_bytes()),
        }
    }
}

#[async_trait]
impl TokenVerifier for SharedSecretVerifier {
    async fn verify(&self, token: &str) -> Result<IdentityClaims, VerifyError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = true;
        validation.required_spec_claims.insert("sub".to_string());

        let data = decode::<IdentityClaims>(token, &self.key, &validation)?;
        require_subject(data.claims)
    }
}

/// Signs `claims` with HS256
///
/// Counterpart of [`SharedSecretVerifier`].
pub fn mint_token(claims: &IdentityClaims, secret: &str) -> Result<String, VerifyError> {
    let key = EncodingKey::from_secret(secret.as_bytes());
    encode(&Header::new(Algorithm::HS256), claims, &key)
        .map_err(|e| VerifyError::Invalid(format!("Token encoding failed: {}", e)))
}

struct CachedKeys {
    set: JwkSet,
    fetched_at: Instant,
    expires_at: Instant,
}

/// RS256 verifier for identity-provider ID tokens
pub struct FirebaseTokenVerifier {
    project_id: String,
    jwks_url: String,
    http: reqwest::Client,
    keys: RwLock<Option<CachedKeys>>,
}

impl FirebaseTokenVerifier {
    /// Creates a verifier for tokens issued to `project_id`
    pub fn new(project_id: impl Into<String>, http: reqwest::Client) -> Self {
        Self::with_jwks_url(project_id, http, FIREBASE_JWKS_URL)
    }

    /// Creates a verifier that reads keys from a custom JWK endpoint
    pub fn with_jwks_url(
        project_id: impl Into<String>,
        http: reqwest::Client,
        jwks_url: impl Into<String>,
    ) -> Self {
        Self {
            project_id: project_id.into(),
            jwks_url: jwks_url.into(),
            http,
            keys: RwLock::new(None),
        }
    }

    /// Expected `iss` claim
    pub fn issuer(&self) -> String {
        format!("https://securetoken.google.com/{}", self.project_id)
    }

    async fn decoding_key(&self, kid: &str) -> Result<DecodingKey, VerifyError> {
        {
            let cached = self.keys.read().await;
            if let Some(keys) = cached.as_ref().filter(|k| k.expires_at > Instant::now()) {
                if let Some(jwk) = keys.set.find(kid) {
                    return Ok(DecodingKey::from_jwk(jwk)?);
                }
                // Unknown kid on a fresh set: refetch at most once a minute
                if keys.fetched_at.elapsed() < MIN_REFETCH_INTERVAL {
                    tracing::debug!(kid, "Unknown key id, skipping refetch");
                    return Err(VerifyError::UnknownKey(kid.to_string()));
                }
            }
        }

        let fresh = self.fetch_keys().await?;
        let key = fresh
            .set
            .find(kid)
            .map(DecodingKey::from_jwk)
            .transpose()?
            .ok_or_else(|| VerifyError::UnknownKey(kid.to_string()));

        *self.keys.write().await = Some(fresh);
        key
    }

    async fn fetch_keys(&self) -> Result<CachedKeys, VerifyError> {
        tracing::debug!(url = %self.jwks_url, "Fetching identity provider signing keys");

        let response = self
            .http
            .get(&self.jwks_url)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| VerifyError::KeyFetch(e.to_string()))?;

        let ttl = response
            .headers()
            .get(CACHE_CONTROL)
            .and_then(|v| v.to_str().ok())
            .and_then(parse_max_age)
            .unwrap_or(DEFAULT_KEY_TTL);

        let set = response
            .json::<JwkSet>()
            .await
            .map_err(|e| VerifyError::KeyFetch(e.to_string()))?;

        let now = Instant::now();
        Ok(CachedKeys {
            set,
            fetched_at: now,
            expires_at: now + ttl,
        })
    }
}

#[async_trait]
impl TokenVerifier for FirebaseTokenVerifier {
    async fn verify(&self, token: &str) -> Result<IdentityClaims, VerifyError> {
        let header = decode_header(token)?;
        if header.alg != Algorithm::RS256 {
            return Err(VerifyError::Invalid(format!(
                "Unexpected algorithm {:?}",
                header.alg
            )));
        }
        let kid = header
            .kid
            .ok_or_else(|| VerifyError::Invalid("Missing key id".to_string()))?;

        let key = self.decoding_key(&kid).await?;

        let mut validation = Validation::new(Algorithm::RS256);
        validation.set_audience(&[&self.project_id]);
        validation.set_issuer(&[self.issuer()]);
        validation.validate_exp = true;

        let data = decode::<IdentityClaims>(token, &key, &validation)?;
        require_subject(data.claims)
    }
}

fn require_subject(claims: IdentityClaims) -> Result<IdentityClaims, VerifyError> {
    if claims.sub.trim().is_empty() {
        return Err(VerifyError::Invalid("Empty subject".to_string()));
    }
    Ok(claims)
}

/// Extracts `max-age` from a `Cache-Control` header value
fn parse_max_age(value: &str) -> Option<Duration> {
    value
        .split(',')
        .filter_map(|directive| directive.trim().strip_prefix("max-age="))
        .find_map(|secs| secs.trim().parse::<u64>().ok())
        .map(Duration::from_secs)
}
