//! Project backlog feature model
//!
//! Ids look like `SGAC-P12-7`: project name initials, the project number and
//! a sequence that never reuses a deleted feature's number.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use validator::Validate;

use super::qa_task::{QaStatus, QaTask};
use super::{wire_name, Priority, WorkCategory, WorkType};
use crate::repository::{Repository, Stored};
use crate::store::{DocumentStore, StoreResult};
use crate::time_tracking::{Timed, TimerState};

/// Path of a project's feature collection
pub fn collection(project_id: &str) -> String {
    format!("projects/{}/features", project_id)
}

/// Feature status
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FeatureStatus {
    #[default]
    Backlog,
    Todo,
    InProgress,
    Review,
    Done,
    Completed,
}

impl FeatureStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            FeatureStatus::Backlog => "backlog",
            FeatureStatus::Todo => "todo",
            FeatureStatus::InProgress => "in-progress",
            FeatureStatus::Review => "review",
            FeatureStatus::Done => "done",
            FeatureStatus::Completed => "completed",
        }
    }

    pub fn is_finished(&self) -> bool {
        matches!(self, FeatureStatus::Done | FeatureStatus::Completed)
    }
}

/// Feature document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Feature {
    #[serde(default)]
    pub project_id: String,

    #[serde(default)]
    pub epic_title: String,

    pub title: String,

    #[serde(default)]
    pub description: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub criterios_aceptacion: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comentarios: Option<String>,

    #[serde(default, rename = "tipo", skip_serializing_if = "Option::is_none")]
    pub kind: Option<WorkType>,

    #[serde(default, rename = "categoria", skip_serializing_if = "Option::is_none")]
    pub category: Option<WorkCategory>,

    #[serde(default)]
    pub status: FeatureStatus,

    #[serde(default)]
    pub priority: Priority,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assignee: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub estimated_hours: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actual_hours: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,

    #[serde(default)]
    pub accumulated_time: u64,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub github_branch: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub commits: Option<u32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub story_points: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sprint: Option<String>,

    #[serde(default)]
    pub created_by: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub qa_task_id: Option<String>,
}

impl Timed for Feature {
    fn timer(&self) -> TimerState {
        TimerState {
            started_at: self.started_at,
            accumulated_time: self.accumulated_time,
        }
    }
}

/// Body of a feature create request
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct NewFeature {
    #[validate(length(min = 1, message = "Epic is required"))]
    pub epic_title: String,
    #[validate(length(min = 1, message = "Title is required"))]
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub criterios_aceptacion: Option<String>,
    pub comentarios: Option<String>,
    pub tipo: Option<WorkType>,
    pub categoria: Option<WorkCategory>,
    pub status: Option<FeatureStatus>,
    pub priority: Option<Priority>,
    pub assignee: Option<String>,
    #[validate(range(min = 0.0, message = "Estimated hours cannot be negative"))]
    pub estimated_hours: Option<f64>,
    #[validate(range(min = 0.0, message = "Actual hours cannot be negative"))]
    pub actual_hours: Option<f64>,
    pub github_branch: Option<String>,
    pub commits: Option<u32>,
    pub story_points: Option<f64>,
    pub sprint: Option<String>,
    /// Used for the id prefix when the project document has no name
    pub project_name: Option<String>,
}

/// List filters for features
#[derive(Debug, Clone, Default, Deserialize)]
pub struct FeatureFilter {
    pub epic: Option<String>,
    pub status: Option<String>,
    pub priority: Option<String>,
}

impl FeatureFilter {
    pub fn matches(&self, feature: &Feature) -> bool {
        let epic_ok = self
            .epic
            .as_deref()
            .map_or(true, |epic| feature.epic_title == epic);
        let status_ok = self
            .status
            .as_deref()
            .map_or(true, |status| feature.status.as_str() == status);
        let priority_ok = self
            .priority
            .as_deref()
            .map_or(true, |priority| wire_name(&feature.priority) == priority);

        epic_ok && status_ok && priority_ok
    }
}

impl Feature {
    pub fn from_request(project_id: &str, req: NewFeature, creator: &str) -> Self {
        Self {
            project_id: project_id.to_string(),
            epic_title: req.epic_title,
            title: req.title,
            description: req.description,
            criterios_aceptacion: req.criterios_aceptacion,
            comentarios: req.comentarios,
            kind: req.tipo,
            category: req.categoria,
            status: req.status.unwrap_or_default(),
            priority: req.priority.unwrap_or_default(),
            assignee: req.assignee,
            estimated_hours: req.estimated_hours,
            actual_hours: req.actual_hours,
            started_at: None,
            accumulated_time: 0,
            github_branch: req.github_branch,
            commits: req.commits,
            story_points: req.story_points,
            sprint: req.sprint,
            created_by: creator.to_string(),
            qa_task_id: None,
        }
    }

    pub fn repository(store: Arc<dyn DocumentStore>, project_id: &str) -> Repository<Feature> {
        Repository::new(store, collection(project_id))
    }

    /// Next readable id for a feature of this project
    pub async fn next_id(
        repo: &Repository<Feature>,
        project_id: &str,
        project_name: Option<&str>,
    ) -> StoreResult<String> {
        let features = repo.get_all().await?;
        let highest = features
            .iter()
            .map(|f| sequence_number(&f.id))
            .filter(|&n| n != UNSEQUENCED)
            .max()
            .unwrap_or(0);
        let taken = highest.max(features.len() as u64);
        Ok(format_feature_id(project_id, project_name, taken as usize))
    }

    /// Every feature of the project matching `filter`, in id sequence order
    pub async fn list(
        repo: &Repository<Feature>,
        filter: &FeatureFilter,
    ) -> StoreResult<Vec<Stored<Feature>>> {
        let mut features: Vec<_> = repo
            .get_all()
            .await?
            .into_iter()
            .filter(|f| filter.matches(&f.data))
            .collect();

        features.sort_by_key(|f| sequence_number(&f.id));
        Ok(features)
    }

    /// QA task created when this feature is marked done
    ///
    /// Category and type fall back to `Funcionalidad`; the comments fall back
    /// to the feature description.
    pub fn qa_task(&self, feature_id: &str, created_by: &str) -> QaTask {
        let comments = self
            .comentarios
            .clone()
            .filter(|c| !c.is_empty())
            .unwrap_or_else(|| self.description.clone());

        QaTask {
            title: self.title.clone(),
            category: self.category.unwrap_or(WorkCategory::Functionality),
            kind: wire_name(&self.kind.unwrap_or(WorkType::Functionality)),
            acceptance_criteria: self.criterios_aceptacion.clone().unwrap_or_default(),
            comments,
            images: Vec::new(),
            status: QaStatus::Pending,
            created_by: created_by.to_string(),
            project_id: self.project_id.clone(),
            feature_id: Some(feature_id.to_string()),
            feature_title: Some(self.title.clone()),
            feature_note: None,
        }
    }
}

/// Uppercase word initials, at most four, `PROJ` when there are none
pub fn project_initials(name: &str) -> String {
    let initials: String = name
        .split_whitespace()
        .filter_map(|word| word.chars().next())
        .flat_map(char::to_uppercase)
        .filter(|c| c.is_ascii_uppercase())
        .take(4)
        .collect();

    if initials.is_empty() {
        "PROJ".to_string()
    } else {
        initials
    }
}

/// Short numeric tag derived from a project id
pub fn project_number(project_id: &str) -> String {
    let digits: String = project_id
        .chars()
        .skip_while(|c| !c.is_ascii_digit())
        .take_while(|c| c.is_ascii_digit())
        .take(3)
        .collect();

    if !digits.is_empty() {
        return digits;
    }

    let sum: u64 = project_id.encode_utf16().map(u64::from).sum();
    (sum % 999 + 1).to_string()
}

/// `{INITIALS}-P{projectNum}-{taken + 1}`
pub fn format_feature_id(project_id: &str, project_name: Option<&str>, taken: usize) -> String {
    let initials = project_name
        .map(project_initials)
        .unwrap_or_else(|| "PROJ".to_string());
    format!("{}-P{}-{}", initials, project_number(project_id), taken + 1)
}

/// Sequence number given to ids without a numeric suffix
pub const UNSEQUENCED: u64 = 999_999;

/// Trailing `-{n}` of a feature id; ids without one sort last
pub fn sequence_number(feature_id: &str) -> u64 {
    feature_id
        .rsplit_once('-')
        .and_then(|(_, n)| n.parse().ok())
        .unwrap_or(UNSEQUENCED)
}
