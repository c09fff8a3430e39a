//! Common test utilities for integration tests
//!
//! Builds the full router over an in-memory store with a shared-secret
//! token verifier, so tests run without Firestore or Firebase:
//! - Token minting for each kind of caller
//! - Canned integration checks
//! - Request helpers returning status and JSON body
#![allow(dead_code)]

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use opsportal_api::app::{build_router, AppState};
use opsportal_api::config::Config;
use opsportal_shared::auth::identity::{Identity, IdentityClaims};
use opsportal_shared::auth::verifier::{mint_token, SharedSecretVerifier};
use opsportal_shared::integrations::{ConnectionStatus, ConnectivityCheck, IntegrationError};
use opsportal_shared::store::memory::MemoryStore;
use opsportal_shared::store::DocumentStore;
use serde_json::Value;
use std::sync::Arc;
use tower::Service as _;

pub const SECRET: &str = "integration-test-secret-32-bytes!!";
pub const FINANCE_EMAIL: &str = "finanzas@example.com";
pub const SUPERADMIN_EMAIL: &str = "root@example.com";

/// Integration check returning a fixed outcome
pub struct FakeCheck {
    pub name: &'static str,
    pub outcome: Result<ConnectionStatus, String>,
}

#[async_trait]
impl ConnectivityCheck for FakeCheck {
    fn name(&self) -> &'static str {
        self.name
    }

    async fn check(&self, _identity: &Identity) -> Result<ConnectionStatus, IntegrationError> {
        self.outcome.clone().map_err(IntegrationError::Request)
    }
}

/// Test context containing all necessary resources
pub struct TestContext {
    pub store: Arc<MemoryStore>,
    pub app: axum::Router,
}

impl TestContext {
    pub fn new() -> Self {
        Self::with_checks(
            FakeCheck {
                name: "gmail",
                outcome: Ok(ConnectionStatus {
                    connected: true,
                    email: Some("admin@example.com".to_string()),
                    ..Default::default()
                }),
            },
            FakeCheck {
                name: "trello",
                outcome: Ok(ConnectionStatus::disconnected()),
            },
        )
    }

    pub fn with_checks(gmail: FakeCheck, trello: FakeCheck) -> Self {
        let config = Config::from_lookup(|key| {
            match key {
                "STORE_BACKEND" => Some("memory"),
                "AUTH_MODE" => Some("shared-secret"),
                "AUTH_SHARED_SECRET" => Some(SECRET),
                "SUPERADMIN_EMAIL" => Some(SUPERADMIN_EMAIL),
                "FINANCE_EMAILS" => Some(FINANCE_EMAIL),
                _ => None,
            }
            .map(str::to_string)
        })
        .unwrap();

        let store = Arc::new(MemoryStore::new());
        let state = AppState::new(
            config,
            store.clone() as Arc<dyn DocumentStore>,
            Arc::new(SharedSecretVerifier::new(SECRET)),
            Arc::new(gmail),
            Arc::new(trello),
        );

        TestContext {
            store,
            app: build_router(state),
        }
    }

    /// Sends a request and returns status plus parsed JSON body
    pub async fn send(
        &self,
        method: &str,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header("authorization", format!("Bearer {}", token));
        }
        let request = match body {
            Some(body) => builder
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let response = self.app.clone().call(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let json = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or_else(|_| {
                Value::String(String::from_utf8_lossy(&bytes).to_string())
            })
        };
        (status, json)
    }
}

/// Token for a caller with the given email and flags
pub fn token(email: &str, internal: bool, superadmin: bool, role: Option<&str>) -> String {
    let now = chrono::Utc::now().timestamp();
    let claims = IdentityClaims {
        sub: format!("uid-{}", email.split('@').next().unwrap_or("user")),
        exp: now + 3600,
        iat: now,
        email: Some(email.to_string()),
        internal,
        superadmin,
        role: role.map(str::to_string),
        allowed_routes: vec![],
    };
    mint_token(&claims, SECRET).unwrap()
}

/// Internal team member
pub fn internal_token() -> String {
    token("dev@example.com", true, false, Some("developer"))
}

/// Verified user without internal access
pub fn external_token() -> String {
    token("cliente@example.com", false, false, Some("client"))
}

/// Internal user on the finance allow-list
pub fn finance_token() -> String {
    token(FINANCE_EMAIL, true, false, Some("admin"))
}
