//! Per-person hourly pricing (`precios-por-hora`)

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;

use crate::repository::{Repository, Stored};
use crate::store::{DocumentStore, Fields, StoreResult};

pub const COLLECTION: &str = "precios-por-hora";

/// Hourly rate charged for one team member
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HourlyRate {
    #[serde(rename = "personaEmail", skip_serializing_if = "Option::is_none")]
    pub person_email: Option<String>,

    #[serde(rename = "personaNombre", skip_serializing_if = "Option::is_none")]
    pub person_name: Option<String>,

    #[serde(rename = "precioPorHora", skip_serializing_if = "Option::is_none")]
    pub rate: Option<f64>,

    #[serde(flatten)]
    pub extra: Fields,
}

impl HourlyRate {
    pub fn repository(store: Arc<dyn DocumentStore>) -> Repository<HourlyRate> {
        Repository::new(store, COLLECTION)
    }

    pub async fn find_by_person_email(
        repo: &Repository<HourlyRate>,
        email: &str,
    ) -> StoreResult<Option<Stored<HourlyRate>>> {
        repo.find_one_by("personaEmail", Value::String(email.to_string()))
            .await
    }

    /// Cost of `hours` at this rate, when a rate is set
    pub fn cost(&self, hours: f64) -> Option<f64> {
        self.rate.map(|rate| rate * hours)
    }
}
