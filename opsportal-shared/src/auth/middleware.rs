//! Authentication middleware for Axum
//!
//! # Flow
//!
//! 1. Extract `Authorization: Bearer <token>`; absent or malformed → 401
//! 2. Verify the token; any verification failure → 401
//! 3. Apply the route's [`AccessPolicy`]; not satisfied → 403
//! 4. Insert the [`Identity`] into request extensions and run the handler

use axum::{
    extract::{Request, State},
    http::{header, HeaderMap, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use std::sync::Arc;

use super::identity::Identity;
use super::verifier::{TokenVerifier, VerifyError};

/// Access requirement of a route group
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessPolicy {
    /// Any verified identity
    Authenticated,

    /// Superadmin or `internal` claim
    Internal,

    /// Internal access plus membership in the finance allow-list.
    /// Superadmins bypass the list.
    Finance,
}

/// Process-wide settings consulted by the access policies
#[derive(Debug, Clone, Default)]
pub struct AccessSettings {
    /// Mailbox treated as superadmin regardless of claims
    pub superadmin_email: Option<String>,

    /// Lowercased emails allowed into finance routes
    pub finance_emails: Vec<String>,
}

impl AccessSettings {
    pub fn new(superadmin_email: Option<String>, finance_emails: Vec<String>) -> Self {
        Self {
            superadmin_email,
            finance_emails: finance_emails
                .into_iter()
                .map(|e| e.trim().to_lowercase())
                .filter(|e| !e.is_empty())
                .collect(),
        }
    }

    /// Checks the finance allow-list
    pub fn has_finance_access(&self, email: Option<&str>) -> bool {
        match email {
            Some(email) => {
                let email = email.to_lowercase();
                self.finance_emails.iter().any(|allowed| *allowed == email)
            }
            None => false,
        }
    }

    /// Applies `policy` to an already verified identity
    pub fn authorize(&self, policy: AccessPolicy, identity: &Identity) -> Result<(), AuthError> {
        match policy {
            AccessPolicy::Authenticated => Ok(()),
            AccessPolicy::Internal => {
                if identity.has_elevated_access() {
                    Ok(())
                } else {
                    Err(AuthError::Forbidden("Internal access required".to_string()))
                }
            }
            AccessPolicy::Finance => {
                if identity.superadmin {
                    return Ok(());
                }
                if !identity.internal {
                    return Err(AuthError::Forbidden("Internal access required".to_string()));
                }
                if !self.has_finance_access(identity.email.as_deref()) {
                    return Err(AuthError::Forbidden("Finance access required".to_string()));
                }
                Ok(())
            }
        }
    }
}

/// Error type for authentication middleware
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    /// Missing or non-bearer authorization header
    #[error("Missing credentials")]
    MissingCredentials,

    /// Token could not be verified
    #[error("{0}")]
    InvalidToken(String),

    /// Verified identity does not satisfy the route's policy
    #[error("{0}")]
    Forbidden(String),
}

impl AuthError {
    pub fn status(&self) -> StatusCode {
        match self {
            AuthError::MissingCredentials | AuthError::InvalidToken(_) => StatusCode::UNAUTHORIZED,
            AuthError::Forbidden(_) => StatusCode::FORBIDDEN,
        }
    }

    fn code(&self) -> &'static str {
        match self {
            AuthError::MissingCredentials | AuthError::InvalidToken(_) => "unauthorized",
            AuthError::Forbidden(_) => "forbidden",
        }
    }
}

impl From<VerifyError> for AuthError {
    fn from(err: VerifyError) -> Self {
        match err {
            VerifyError::Expired => AuthError::InvalidToken("Token expired".to_string()),
            VerifyError::KeyFetch(msg) => {
                // Still a 401 for the caller; the outage is only logged
                tracing::error!("Signing key fetch failed: {}", msg);
                AuthError::InvalidToken("Invalid token".to_string())
            }
            _ => AuthError::InvalidToken("Invalid token".to_string()),
        }
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let body = Json(json!({
            "error": self.code(),
            "message": self.to_string(),
        }));
        (self.status(), body).into_response()
    }
}

/// State handed to [`require_identity`]
#[derive(Clone)]
pub struct AuthGuard {
    verifier: Arc<dyn TokenVerifier>,
    settings: Arc<AccessSettings>,
    policy: AccessPolicy,
}

impl AuthGuard {
    pub fn new(
        verifier: Arc<dyn TokenVerifier>,
        settings: Arc<AccessSettings>,
        policy: AccessPolicy,
    ) -> Self {
        Self {
            verifier,
            settings,
            policy,
        }
    }

    /// Same verifier and settings, different policy
    pub fn with_policy(&self, policy: AccessPolicy) -> Self {
        Self {
            policy,
            ..self.clone()
        }
    }

    pub fn policy(&self) -> AccessPolicy {
        self.policy
    }

    /// Runs steps 1-3 of the middleware without touching a request
    pub async fn authenticate(&self, headers: &HeaderMap) -> Result<Identity, AuthError> {
        let token = bearer_token(headers).ok_or(AuthError::MissingCredentials)?;

        let claims = self.verifier.verify(token).await.map_err(|e| {
            tracing::warn!("Token verification failed: {}", e);
            AuthError::from(e)
        })?;

        let identity = Identity::from_claims(claims, self.settings.superadmin_email.as_deref());
        self.settings.authorize(self.policy, &identity).map_err(|e| {
            tracing::warn!(uid = %identity.uid, policy = ?self.policy, "Access denied: {}", e);
            e
        })?;

        Ok(identity)
    }
}

/// Extracts the bearer token from an `Authorization` header
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

/// Authentication middleware
///
/// Use with `axum::middleware::from_fn_with_state(guard, require_identity)`.
/// On success the handler can extract `Extension<Identity>`.
pub async fn require_identity(
    State(guard): State<AuthGuard>,
    mut req: Request,
    next: Next,
) -> Result<Response, AuthError> {
    let identity = guard.authenticate(req.headers()).await?;

    tracing::debug!(uid = %identity.uid, "Authenticated request");
    req.extensions_mut().insert(identity);

    Ok(next.run(req).await)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::identity::IdentityClaims;
    use crate::auth::verifier::{mint_token, SharedSecretVerifier};
    use axum::http::HeaderValue;

    const SECRET: &str = "middleware-test-secret-32-bytes-long";

    fn identity(internal: bool, superadmin: bool, email: &str) -> Identity {
        Identity {
            uid: "u1".to_string(),
            email: Some(email.to_string()),
            role: None,
            internal,
            superadmin,
            allowed_routes: vec![],
        }
    }

    fn settings() -> AccessSettings {
        AccessSettings::new(
            Some("root@example.com".to_string()),
            vec![" Finance@Example.com ".to_string()],
        )
    }

    fn headers_with(value: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, HeaderValue::from_str(value).unwrap());
        headers
    }

    fn guard(policy: AccessPolicy) -> AuthGuard {
        AuthGuard::new(
            Arc::new(SharedSecretVerifier::new(SECRET)),
            Arc::new(settings()),
            policy,
        )
    }

    fn token(internal: bool, email: &str) -> String {
        let now = chrono::Utc::now().timestamp();
        mint_token(
            &IdentityClaims {
                sub: "u1".to_string(),
                exp: now + 600,
                iat: now,
                email: Some(email.to_string()),
                internal,
                superadmin: false,
                role: None,
                allowed_routes: vec![],
            },
            SECRET,
        )
        .unwrap()
    }

    #[test]
    fn test_bearer_token_extraction() {
        assert_eq!(bearer_token(&headers_with("Bearer abc")), Some("abc"));
        assert_eq!(bearer_token(&headers_with("Basic abc")), None);
        assert_eq!(bearer_token(&headers_with("Bearer   ")), None);
        assert_eq!(bearer_token(&HeaderMap::new()), None);
    }

    #[test]
    fn test_internal_policy() {
        let s = settings();
        assert!(s.authorize(AccessPolicy::Internal, &identity(true, false, "a@x.com")).is_ok());
        assert!(s.authorize(AccessPolicy::Internal, &identity(false, true, "a@x.com")).is_ok());
        assert!(matches!(
            s.authorize(AccessPolicy::Internal, &identity(false, false, "a@x.com")),
            Err(AuthError::Forbidden(_))
        ));
    }

    #[test]
    fn test_finance_policy() {
        let s = settings();
        assert!(s
            .authorize(AccessPolicy::Finance, &identity(true, false, "finance@example.com"))
            .is_ok());
        assert!(s
            .authorize(AccessPolicy::Finance, &identity(true, false, "dev@example.com"))
            .is_err());
        assert!(s
            .authorize(AccessPolicy::Finance, &identity(false, false, "finance@example.com"))
            .is_err());
        assert!(s
            .authorize(AccessPolicy::Finance, &identity(false, true, "root@example.com"))
            .is_ok());
    }

    #[tokio::test]
    async fn test_authenticate_missing_header() {
        let err = guard(AccessPolicy::Authenticated)
            .authenticate(&HeaderMap::new())
            .await
            .unwrap_err();
        assert_eq!(err.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_authenticate_bad_token_is_unauthorized_not_forbidden() {
        let err = guard(AccessPolicy::Internal)
            .authenticate(&headers_with("Bearer eyJhbGciOiJIUzI1NiJ9.e30.c2lnbmF0dXJl"))
            .await
            .unwrap_err();
        assert_eq!(err.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_authenticate_forbidden_for_external_identity() {
        let bearer = format!("Bearer {}", token(false, "someone@example.com"));
        let err = guard(AccessPolicy::Internal)
            .authenticate(&headers_with(&bearer))
            .await
            .unwrap_err();
        assert_eq!(err.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn test_authenticate_success() {
        let bearer = format!("Bearer {}", token(true, "dev@example.com"));
        let identity = guard(AccessPolicy::Internal)
            .authenticate(&headers_with(&bearer))
            .await
            .unwrap();
        assert_eq!(identity.uid, "u1");
        assert!(identity.internal);
    }

    #[test]
    fn test_auth_error_into_response() {
        assert_eq!(
            AuthError::MissingCredentials.into_response().status(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            AuthError::Forbidden("no".into()).into_response().status(),
            StatusCode::FORBIDDEN
        );
    }
}
