/// Configuration management for the API server
///
/// Loads configuration from environment variables (and a `.env` file in
/// development) into a typed struct.
///
/// # Environment Variables
///
/// - `API_HOST`: Host to bind to (default: 0.0.0.0)
/// - `API_PORT`: Port to bind to (default: 8080)
/// - `CORS_ORIGINS`: Comma-separated allowed origins (default: *)
/// - `STORE_BACKEND`: `firestore` or `memory` (default: firestore)
/// - `FIRESTORE_PROJECT_ID`: Firestore project (required for firestore)
/// - `FIRESTORE_SERVICE_ACCOUNT`: Service account JSON or path to it
/// - `FIRESTORE_EMULATOR_HOST`: Talk to a local emulator without credentials
/// - `AUTH_MODE`: `firebase` or `shared-secret` (default: firebase)
/// - `FIREBASE_PROJECT_ID`: Identity provider project (default: Firestore project)
/// - `AUTH_SHARED_SECRET`: HS256 secret for `shared-secret` mode
/// - `SUPERADMIN_EMAIL`: Mailbox treated as superadmin
/// - `FINANCE_EMAILS`: Comma-separated finance allow-list
/// - `GMAIL_ADMIN_EMAIL`: Mailbox the Gmail check impersonates
///
/// # Example
///
/// ```no_run
/// use opsportal_api::config::Config;
///
/// # fn example() -> anyhow::Result<()> {
/// let config = Config::from_env()?;
/// println!("Server will listen on {}", config.bind_address());
/// # Ok(())
/// # }
/// ```

use serde::{Deserialize, Serialize};
use std::env;

/// Complete application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub api: ApiConfig,
    pub store: StoreConfig,
    pub auth: AuthConfig,
    pub integrations: IntegrationsConfig,
}

/// API server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    pub host: String,
    pub port: u16,
    /// `*` allows any origin
    pub cors_origins: Vec<String>,
}

/// Which document store backs the repositories
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    Firestore,
    Memory,
}

/// Document store configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    pub backend: StoreBackend,
    pub project_id: Option<String>,
    /// Inline JSON or a file path
    #[serde(skip_serializing)]
    pub service_account: Option<String>,
    pub emulator_host: Option<String>,
}

/// How bearer tokens are verified
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AuthMode {
    Firebase,
    SharedSecret,
}

/// Authentication configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    pub mode: AuthMode,
    pub firebase_project_id: Option<String>,
    #[serde(skip_serializing)]
    pub shared_secret: Option<String>,
    pub superadmin_email: Option<String>,
    pub finance_emails: Vec<String>,
}

/// Third-party integration settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntegrationsConfig {
    pub gmail_admin_email: Option<String>,
}

impl Config {
    /// Loads configuration from environment variables
    ///
    /// # Errors
    ///
    /// Returns an error if a value does not parse or a setting required by
    /// the selected store backend or auth mode is missing.
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds the configuration from any key lookup
    pub fn from_lookup<F>(lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let host = var("API_HOST").unwrap_or_else(|| "0.0.0.0".to_string());
        let port = var("API_PORT")
            .unwrap_or_else(|| "8080".to_string())
            .parse::<u16>()?;
        let cors_origins = var("CORS_ORIGINS")
            .map(|v| split_list(&v))
            .unwrap_or_else(|| vec!["*".to_string()]);

        let backend = match var("STORE_BACKEND").as_deref() {
            None | Some("firestore") => StoreBackend::Firestore,
            Some("memory") => StoreBackend::Memory,
            Some(other) => anyhow::bail!("Unknown STORE_BACKEND: {}", other),
        };
        let project_id = var("FIRESTORE_PROJECT_ID");
        let service_account = var("FIRESTORE_SERVICE_ACCOUNT");
        let emulator_host = var("FIRESTORE_EMULATOR_HOST");

        if backend == StoreBackend::Firestore {
            if project_id.is_none() {
                anyhow::bail!("FIRESTORE_PROJECT_ID environment variable is required");
            }
            if service_account.is_none() && emulator_host.is_none() {
                anyhow::bail!(
                    "FIRESTORE_SERVICE_ACCOUNT is required unless FIRESTORE_EMULATOR_HOST is set"
                );
            }
        }

        let mode = match var("AUTH_MODE").as_deref() {
            None | Some("firebase") => AuthMode::Firebase,
            Some("shared-secret") => AuthMode::SharedSecret,
            Some(other) => anyhow::bail!("Unknown AUTH_MODE: {}", other),
        };
        let firebase_project_id = var("FIREBASE_PROJECT_ID").or_else(|| project_id.clone());
        let shared_secret = var("AUTH_SHARED_SECRET");

        match mode {
            AuthMode::Firebase if firebase_project_id.is_none() => {
                anyhow::bail!("FIREBASE_PROJECT_ID environment variable is required")
            }
            AuthMode::SharedSecret => match &shared_secret {
                None => anyhow::bail!("AUTH_SHARED_SECRET environment variable is required"),
                Some(secret) if secret.len() < 32 => {
                    anyhow::bail!("AUTH_SHARED_SECRET must be at least 32 characters long")
                }
                Some(_) => {}
            },
            _ => {}
        }

        Ok(Self {
            api: ApiConfig {
                host,
                port,
                cors_origins,
            },
            store: StoreConfig {
                backend,
                project_id,
                service_account,
                emulator_host,
            },
            auth: AuthConfig {
                mode,
                firebase_project_id,
                shared_secret,
                superadmin_email: var("SUPERADMIN_EMAIL"),
                finance_emails: var("FINANCE_EMAILS").map(|v| split_list(&v)).unwrap_or_default(),
            },
            integrations: IntegrationsConfig {
                gmail_admin_email: var("GMAIL_ADMIN_EMAIL"),
            },
        })
    }

    /// Returns the server bind address
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.api.host, self.api.port)
    }
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn load(pairs: &[(&str, &str)]) -> anyhow::Result<Config> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    const SECRET: &str = "config-test-secret-with-32-bytes!";

    #[test]
    fn test_memory_backend_with_shared_secret() {
        let config = load(&[
            ("STORE_BACKEND", "memory"),
            ("AUTH_MODE", "shared-secret"),
            ("AUTH_SHARED_SECRET", SECRET),
            ("FINANCE_EMAILS", "a@x.com, b@x.com,,"),
            ("API_PORT", "3001"),
        ])
        .unwrap();

        assert_eq!(config.store.backend, StoreBackend::Memory);
        assert_eq!(config.auth.mode, AuthMode::SharedSecret);
        assert_eq!(config.auth.finance_emails, vec!["a@x.com", "b@x.com"]);
        assert_eq!(config.api.cors_origins, vec!["*"]);
        assert_eq!(config.bind_address(), "0.0.0.0:3001");
    }

    #[test]
    fn test_firestore_requires_project_and_credentials() {
        assert!(load(&[]).is_err());
        assert!(load(&[("FIRESTORE_PROJECT_ID", "demo")]).is_err());

        let config = load(&[
            ("FIRESTORE_PROJECT_ID", "demo"),
            ("FIRESTORE_EMULATOR_HOST", "localhost:8081"),
        ])
        .unwrap();
        assert_eq!(config.store.backend, StoreBackend::Firestore);
        assert_eq!(config.auth.mode, AuthMode::Firebase);
        assert_eq!(config.auth.firebase_project_id.as_deref(), Some("demo"));
    }

    #[test]
    fn test_short_shared_secret_is_rejected() {
        let result = load(&[
            ("STORE_BACKEND", "memory"),
            ("AUTH_MODE", "shared-secret"),
            ("AUTH_SHARED_SECRET", "short"),
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn test_unknown_backend() {
        assert!(load(&[("STORE_BACKEND", "postgres")]).is_err());
    }
}
