//! Client project model (`projects`)

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

use super::feature::Feature;
use crate::repository::{Repository, Stored};
use crate::store::{DocumentStore, Fields, StoreResult};

pub const COLLECTION: &str = "projects";

/// Project lifecycle stage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProjectStatus {
    #[serde(rename = "En desarrollo")]
    InDevelopment,
    #[serde(rename = "QA")]
    Qa,
    #[serde(rename = "Garantía")]
    Warranty,
    #[serde(rename = "Finalizado")]
    Finished,
}

/// Project document
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Project {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Client display name
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<ProjectStatus>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub progress: Option<f64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_date: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_date: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub responsible: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub features: Option<u32>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_features: Option<u32>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub budget: Option<f64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub hours_estimated: Option<f64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub hours_worked: Option<f64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub cotizacion_id: Option<String>,

    /// Emails allowed to open the project besides superadmins
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub team_members: Vec<String>,

    /// Hours credited per assignee as features finish
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub user_hours: BTreeMap<String, f64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_by: Option<String>,

    #[serde(flatten)]
    pub extra: Fields,
}

/// List filters
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectFilter {
    pub client_id: Option<String>,
    pub status: Option<String>,
}

impl ProjectFilter {
    pub fn matches(&self, project: &Project) -> bool {
        let client_ok = self
            .client_id
            .as_deref()
            .map_or(true, |id| project.client_id.as_deref() == Some(id));
        let status_ok = self.status.as_deref().map_or(true, |status| {
            project.status.map(|s| super::wire_name(&s)).as_deref() == Some(status)
        });

        client_ok && status_ok
    }
}

/// Totals derived from a project's features
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ProjectMetrics {
    pub features: u32,
    pub completed_features: u32,
    /// Percent of features finished, rounded
    pub progress: Option<f64>,
    /// `actualHours` of finished features, one decimal
    pub hours_worked: f64,
    /// `estimatedHours` of every feature, one decimal
    pub hours_estimated: f64,
}

impl ProjectMetrics {
    pub fn from_features<'a>(features: impl IntoIterator<Item = &'a Feature>) -> Self {
        let mut metrics = ProjectMetrics::default();
        for feature in features {
            metrics.features += 1;
            metrics.hours_estimated += feature.estimated_hours.unwrap_or(0.0);
            if feature.status.is_finished() {
                metrics.completed_features += 1;
                metrics.hours_worked += feature.actual_hours.unwrap_or(0.0);
            }
        }

        if metrics.features > 0 {
            let ratio = f64::from(metrics.completed_features) / f64::from(metrics.features);
            metrics.progress = Some((ratio * 100.0).round());
        }
        metrics.hours_worked = one_decimal(metrics.hours_worked);
        metrics.hours_estimated = one_decimal(metrics.hours_estimated);
        metrics
    }
}

fn one_decimal(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

impl Project {
    pub fn repository(store: Arc<dyn DocumentStore>) -> Repository<Project> {
        Repository::new(store, COLLECTION)
    }

    /// Projects matching `filter`
    pub async fn list(
        repo: &Repository<Project>,
        filter: &ProjectFilter,
    ) -> StoreResult<Vec<Stored<Project>>> {
        Ok(repo
            .get_all()
            .await?
            .into_iter()
            .filter(|p| filter.matches(&p.data))
            .collect())
    }

    /// Whether `email` is on the project's team
    pub fn has_member(&self, email: &str) -> bool {
        self.team_members
            .iter()
            .any(|member| member.eq_ignore_ascii_case(email))
    }

    /// Overwrites the stored totals with computed ones
    ///
    /// Stored progress and hours are kept where the features give nothing
    /// (no features, or zero hours).
    pub fn apply_metrics(&mut self, metrics: &ProjectMetrics) {
        self.features = Some(metrics.features);
        self.completed_features = Some(metrics.completed_features);
        if let Some(progress) = metrics.progress {
            self.progress = Some(progress);
        }
        if metrics.hours_worked > 0.0 {
            self.hours_worked = Some(metrics.hours_worked);
        }
        if metrics.hours_estimated > 0.0 {
            self.hours_estimated = Some(metrics.hours_estimated);
        }
    }

    /// Name used when a project shows up on other records
    pub fn display_name(&self) -> &str {
        self.name
            .as_deref()
            .or(self.client.as_deref())
            .unwrap_or("Sin nombre")
    }
}
