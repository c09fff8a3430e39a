//! # OpsPortal Shared Library
//!
//! Types, storage and business rules shared by the OpsPortal API server and
//! its clients.
//!
//! ## Module Organization
//!
//! - `auth`: Permission matrix, token verification and request guards
//! - `store`: Document store trait with Firestore and in-memory backends
//! - `repository`: Typed collection access on top of a store
//! - `models`: Clients, rates, expenses, projects, tasks, features and QA
//! - `time_tracking`: Start/pause/complete timer transitions
//! - `google`: Service account credentials and OAuth token exchange
//! - `integrations`: Gmail and Trello connectivity checks
//! - `client`: HTTP client for the portal API

pub mod auth;
pub mod client;
pub mod google;
pub mod integrations;
pub mod models;
pub mod repository;
pub mod store;
pub mod time_tracking;

/// Current version of the OpsPortal shared library
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_is_set() {
        assert!(!VERSION.is_empty());
    }
}
