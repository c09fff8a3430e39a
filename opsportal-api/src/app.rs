/// Application state and router builder
///
/// This module defines the shared application state and provides
/// a function to build the Axum router with all routes and middleware.
///
/// # Example
///
/// ```no_run
/// use opsportal_api::{app::{build_router, AppState}, config::Config};
///
/// # async fn example() -> anyhow::Result<()> {
/// let config = Config::from_env()?;
/// let state = AppState::from_config(config).await?;
/// let app = build_router(state);
/// # Ok(())
/// # }
/// ```

use crate::config::{AuthMode, Config, StoreBackend};
use axum::{
    http::{header, HeaderValue, Method},
    middleware::from_fn_with_state,
    routing::{get, post},
    Router,
};
use opsportal_shared::auth::middleware::{require_identity, AccessPolicy, AccessSettings, AuthGuard};
use opsportal_shared::auth::verifier::{FirebaseTokenVerifier, SharedSecretVerifier, TokenVerifier};
use opsportal_shared::google::{ServiceAccountKey, TokenSource, DATASTORE_SCOPE};
use opsportal_shared::integrations::gmail::GmailCheck;
use opsportal_shared::integrations::trello::TrelloCheck;
use opsportal_shared::integrations::ConnectivityCheck;
use opsportal_shared::store::firestore::FirestoreStore;
use opsportal_shared::store::memory::MemoryStore;
use opsportal_shared::store::DocumentStore;
use std::sync::Arc;
use tower_http::{
    cors::CorsLayer,
    trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer},
};
use tracing::Level;

/// Shared application state
///
/// This is cloned for each request handler via Axum's `State` extractor.
/// Every field is an `Arc` or holds one.
#[derive(Clone)]
pub struct AppState {
    /// Document store behind every repository
    pub store: Arc<dyn DocumentStore>,

    /// Verifier and access settings; each route group applies its own policy
    pub auth: AuthGuard,

    pub gmail: Arc<dyn ConnectivityCheck>,

    pub trello: Arc<dyn ConnectivityCheck>,

    /// Application configuration
    pub config: Arc<Config>,
}

impl AppState {
    /// Assembles state from already constructed parts
    pub fn new(
        config: Config,
        store: Arc<dyn DocumentStore>,
        verifier: Arc<dyn TokenVerifier>,
        gmail: Arc<dyn ConnectivityCheck>,
        trello: Arc<dyn ConnectivityCheck>,
    ) -> Self {
        let settings = AccessSettings::new(
            config.auth.superadmin_email.clone(),
            config.auth.finance_emails.clone(),
        );
        Self {
            store,
            auth: AuthGuard::new(verifier, Arc::new(settings), AccessPolicy::Authenticated),
            gmail,
            trello,
            config: Arc::new(config),
        }
    }

    /// Builds the store, verifier and integration checks `config` selects
    pub async fn from_config(config: Config) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()?;

        let store = build_store(&config, &http)?;
        let verifier = build_verifier(&config, &http)?;

        let admin_email = config
            .integrations
            .gmail_admin_email
            .clone()
            .or_else(|| config.auth.superadmin_email.clone())
            .unwrap_or_default();
        if admin_email.is_empty() {
            tracing::warn!("GMAIL_ADMIN_EMAIL not set; Gmail verification will fail");
        }
        let gmail: Arc<dyn ConnectivityCheck> =
            Arc::new(GmailCheck::new(store.clone(), http.clone(), admin_email));
        let trello: Arc<dyn ConnectivityCheck> = Arc::new(TrelloCheck::new(store.clone(), http));

        Ok(Self::new(config, store, verifier, gmail, trello))
    }

    fn guard(&self, policy: AccessPolicy) -> AuthGuard {
        self.auth.with_policy(policy)
    }
}

fn build_store(config: &Config, http: &reqwest::Client) -> anyhow::Result<Arc<dyn DocumentStore>> {
    match config.store.backend {
        StoreBackend::Memory => {
            tracing::warn!("Using in-memory document store; data is lost on restart");
            Ok(Arc::new(MemoryStore::new()))
        }
        StoreBackend::Firestore => {
            let project_id = config
                .store
                .project_id
                .as_deref()
                .ok_or_else(|| anyhow::anyhow!("FIRESTORE_PROJECT_ID is required"))?;

            if let Some(host) = &config.store.emulator_host {
                tracing::info!(%host, "Using Firestore emulator");
                return Ok(Arc::new(FirestoreStore::emulator(http.clone(), host, project_id)));
            }

            let raw = config
                .store
                .service_account
                .as_deref()
                .ok_or_else(|| anyhow::anyhow!("FIRESTORE_SERVICE_ACCOUNT is required"))?;
            let key = ServiceAccountKey::load(raw)?;
            tracing::info!(project_id, client_email = %key.client_email, "Using Firestore");

            let tokens = TokenSource::new(http.clone(), key, &[DATASTORE_SCOPE]);
            Ok(Arc::new(FirestoreStore::new(http.clone(), project_id, Arc::new(tokens))))
        }
    }
}

fn build_verifier(config: &Config, http: &reqwest::Client) -> anyhow::Result<Arc<dyn TokenVerifier>> {
    match config.auth.mode {
        AuthMode::Firebase => {
            let project_id = config
                .auth
                .firebase_project_id
                .clone()
                .ok_or_else(|| anyhow::anyhow!("FIREBASE_PROJECT_ID is required"))?;
            Ok(Arc::new(FirebaseTokenVerifier::new(project_id, http.clone())))
        }
        AuthMode::SharedSecret => {
            let secret = config
                .auth
                .shared_secret
                .as_deref()
                .ok_or_else(|| anyhow::anyhow!("AUTH_SHARED_SECRET is required"))?;
            tracing::warn!("Verifying bearer tokens with a shared secret");
            Ok(Arc::new(SharedSecretVerifier::new(secret)))
        }
    }
}

/// Builds the complete Axum router with all routes and middleware
///
/// # Architecture
///
/// ```text
/// /
/// ├── /health                                   # public
/// └── /api/
///     ├── /permissions[/check]                  # authenticated
///     ├── /trello/status                        # authenticated
///     ├── /internal/validate-access             # internal
///     ├── /gmail/verify                         # internal
///     ├── /team-tasks[/:task_id[/time-tracking]]                 # internal
///     ├── /projects[/:project_id]                                # internal
///     ├── /projects/:project_id/features[/:feature_id[/time-tracking]]  # internal
///     ├── /projects/:project_id/qa-tasks[/:task_id]              # internal
///     ├── /clients[/:id]                        # finance
///     ├── /hourly-rates[/:id]                   # finance
///     └── /expenses[/generate | /:id]           # finance
/// ```
///
/// # Middleware Stack
///
/// Applied in order (bottom to top):
/// 1. Logging (tower-http TraceLayer)
/// 2. CORS (tower-http CorsLayer)
/// 3. Authentication (per route group, by [`AccessPolicy`])
pub fn build_router(state: AppState) -> Router {
    use crate::routes;

    let health_routes = Router::new().route("/health", get(routes::health::health_check));

    let authenticated_routes = Router::new()
        .route("/permissions", get(routes::permissions::get_permissions))
        .route("/permissions/check", get(routes::permissions::check_permission))
        .route("/trello/status", get(routes::integrations::trello_status))
        .layer(from_fn_with_state(
            state.guard(AccessPolicy::Authenticated),
            require_identity,
        ));

    let internal_routes = Router::new()
        .route("/internal/validate-access", post(routes::permissions::validate_access))
        .route("/gmail/verify", get(routes::integrations::gmail_verify))
        .route(
            "/team-tasks",
            get(routes::team_tasks::list_team_tasks).post(routes::team_tasks::create_team_task),
        )
        .route(
            "/team-tasks/:task_id",
            get(routes::team_tasks::get_team_task)
                .put(routes::team_tasks::update_team_task)
                .delete(routes::team_tasks::delete_team_task),
        )
        .route(
            "/team-tasks/:task_id/time-tracking",
            post(routes::team_tasks::track_team_task_time),
        )
        .route(
            "/projects",
            get(routes::projects::list_projects).post(routes::projects::create_project),
        )
        .route(
            "/projects/:project_id",
            get(routes::projects::get_project)
                .put(routes::projects::update_project)
                .delete(routes::projects::delete_project),
        )
        .route(
            "/projects/:project_id/features",
            get(routes::features::list_features).post(routes::features::create_feature),
        )
        .route(
            "/projects/:project_id/features/:feature_id",
            get(routes::features::get_feature)
                .put(routes::features::update_feature)
                .delete(routes::features::delete_feature),
        )
        .route(
            "/projects/:project_id/features/:feature_id/time-tracking",
            post(routes::features::track_feature_time),
        )
        .route(
            "/projects/:project_id/qa-tasks",
            get(routes::qa_tasks::list_qa_tasks).post(routes::qa_tasks::create_qa_task),
        )
        .route(
            "/projects/:project_id/qa-tasks/:task_id",
            get(routes::qa_tasks::get_qa_task)
                .put(routes::qa_tasks::update_qa_task)
                .delete(routes::qa_tasks::delete_qa_task),
        )
        .layer(from_fn_with_state(
            state.guard(AccessPolicy::Internal),
            require_identity,
        ));

    let finance_routes = Router::new()
        .route(
            "/clients",
            get(routes::clients::list_clients).post(routes::clients::create_client),
        )
        .route(
            "/clients/:id",
            get(routes::clients::get_client)
                .put(routes::clients::update_client)
                .delete(routes::clients::delete_client),
        )
        .route(
            "/hourly-rates",
            get(routes::hourly_rates::list_hourly_rates)
                .post(routes::hourly_rates::create_hourly_rate),
        )
        .route(
            "/hourly-rates/:id",
            get(routes::hourly_rates::get_hourly_rate)
                .put(routes::hourly_rates::update_hourly_rate)
                .delete(routes::hourly_rates::delete_hourly_rate),
        )
        .route(
            "/expenses",
            get(routes::expenses::list_expenses).post(routes::expenses::create_expense),
        )
        .route("/expenses/generate", post(routes::expenses::generate_expenses))
        .route(
            "/expenses/:id",
            get(routes::expenses::get_expense)
                .put(routes::expenses::update_expense)
                .delete(routes::expenses::delete_expense),
        )
        .layer(from_fn_with_state(
            state.guard(AccessPolicy::Finance),
            require_identity,
        ));

    let api_routes = Router::new()
        .merge(authenticated_routes)
        .merge(internal_routes)
        .merge(finance_routes);

    let cors = cors_layer(&state.config.api.cors_origins);

    Router::new()
        .merge(health_routes)
        .nest("/api", api_routes)
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        .layer(cors)
        .with_state(state)
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    if origins.iter().any(|o| o == "*") {
        return CorsLayer::permissive();
    }

    let origins: Vec<HeaderValue> = origins.iter().filter_map(|o| o.parse().ok()).collect();

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE])
        .allow_credentials(true)
        .max_age(std::time::Duration::from_secs(3600))
}

/// Resolves on Ctrl+C or SIGTERM
///
/// A handler that fails to install logs the error and never fires, so the
/// server keeps running on the remaining signal.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("Received Ctrl+C, shutting down"),
        _ = terminate => tracing::info!("Received SIGTERM, shutting down"),
    }
}
