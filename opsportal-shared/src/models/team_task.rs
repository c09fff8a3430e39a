//! Internal team task model
//!
//! ```text
//! pending → in-progress → review → completed
//!                                → cancelled
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use validator::Validate;

use super::{date_or_datetime, wire_name, Priority};
use crate::repository::{Repository, Stored};
use crate::store::{DocumentStore, StoreResult};
use crate::time_tracking::{Timed, TimerState};

pub const COLLECTION: &str = "team-tasks";

/// Team task status
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TeamTaskStatus {
    #[default]
    Pending,
    InProgress,
    Review,
    Completed,
    Cancelled,
}

impl TeamTaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TeamTaskStatus::Pending => "pending",
            TeamTaskStatus::InProgress => "in-progress",
            TeamTaskStatus::Review => "review",
            TeamTaskStatus::Completed => "completed",
            TeamTaskStatus::Cancelled => "cancelled",
        }
    }
}

/// Area of work a team task belongs to
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum TeamTaskCategory {
    Propuestas,
    Startups,
    Evolution,
    Pathway,
    Desarrollo,
    #[serde(rename = "QA")]
    Qa,
    #[serde(rename = "Portal Admin")]
    PortalAdmin,
    Aura,
    #[serde(rename = "Redes Sociales")]
    RedesSociales,
    Conferencias,
    #[serde(rename = "Inversión")]
    Inversion,
    Pagos,
    /// Anything else; the task's `customCategory` names it
    #[default]
    Otra,
}

impl TeamTaskCategory {
    pub const ALL: [TeamTaskCategory; 13] = [
        TeamTaskCategory::Propuestas,
        TeamTaskCategory::Startups,
        TeamTaskCategory::Evolution,
        TeamTaskCategory::Pathway,
        TeamTaskCategory::Desarrollo,
        TeamTaskCategory::Qa,
        TeamTaskCategory::PortalAdmin,
        TeamTaskCategory::Aura,
        TeamTaskCategory::RedesSociales,
        TeamTaskCategory::Conferencias,
        TeamTaskCategory::Inversion,
        TeamTaskCategory::Pagos,
        TeamTaskCategory::Otra,
    ];
}

/// Team task document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TeamTask {
    pub title: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    #[serde(default)]
    pub category: TeamTaskCategory,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom_category: Option<String>,

    #[serde(default)]
    pub status: TeamTaskStatus,

    #[serde(default)]
    pub priority: Priority,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assignee: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project_name: Option<String>,

    #[serde(
        default,
        deserialize_with = "date_or_datetime",
        skip_serializing_if = "Option::is_none"
    )]
    pub due_date: Option<DateTime<Utc>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub estimated_hours: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actual_hours: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,

    /// Seconds banked by finished timer intervals
    #[serde(default)]
    pub accumulated_time: u64,

    #[serde(default, rename = "comentarios", skip_serializing_if = "Option::is_none")]
    pub comments: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trello_card_id: Option<String>,

    #[serde(default)]
    pub created_by: String,
}

impl Timed for TeamTask {
    fn timer(&self) -> TimerState {
        TimerState {
            started_at: self.started_at,
            accumulated_time: self.accumulated_time,
        }
    }
}

/// Body of a team task create request
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct NewTeamTask {
    #[validate(length(min = 1, message = "Title is required"))]
    pub title: String,
    pub description: Option<String>,
    pub category: TeamTaskCategory,
    pub custom_category: Option<String>,
    pub status: Option<TeamTaskStatus>,
    pub priority: Option<Priority>,
    #[validate(email(message = "Assignee must be an email address"))]
    pub assignee: Option<String>,
    pub project_id: Option<String>,
    pub project_name: Option<String>,
    #[serde(default, deserialize_with = "date_or_datetime")]
    pub due_date: Option<DateTime<Utc>>,
    #[validate(range(min = 0.0, message = "Estimated hours cannot be negative"))]
    pub estimated_hours: Option<f64>,
    #[validate(range(min = 0.0, message = "Actual hours cannot be negative"))]
    pub actual_hours: Option<f64>,
    pub comentarios: Option<String>,
}

/// List filters, each matched exactly when present
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TeamTaskFilter {
    pub status: Option<String>,
    pub assignee: Option<String>,
    pub project_id: Option<String>,
    pub category: Option<String>,
}

impl TeamTaskFilter {
    pub fn matches(&self, task: &TeamTask) -> bool {
        fn check(filter: &Option<String>, value: Option<&str>) -> bool {
            match filter.as_deref().filter(|f| !f.is_empty()) {
                Some(expected) => value == Some(expected),
                None => true,
            }
        }

        check(&self.status, Some(task.status.as_str()))
            && check(&self.assignee, task.assignee.as_deref())
            && check(&self.project_id, task.project_id.as_deref())
            && check(&self.category, Some(wire_name(&task.category).as_str()))
    }
}

impl TeamTask {
    /// A pending, medium-priority task with no timer
    pub fn new(title: impl Into<String>, category: TeamTaskCategory, created_by: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            description: None,
            category,
            custom_category: None,
            status: TeamTaskStatus::default(),
            priority: Priority::default(),
            assignee: None,
            project_id: None,
            project_name: None,
            due_date: None,
            estimated_hours: None,
            actual_hours: None,
            started_at: None,
            accumulated_time: 0,
            comments: None,
            trello_card_id: None,
            created_by: created_by.into(),
        }
    }

    /// Builds a task from a create request
    ///
    /// The creator is the default assignee. An `Otra` task without a custom
    /// category uses its title as the category name.
    pub fn from_request(req: NewTeamTask, creator: &str) -> Self {
        let custom_category = match (req.category, req.custom_category) {
            (TeamTaskCategory::Otra, None) => Some(req.title.clone()),
            (_, custom) => custom,
        };

        Self {
            description: req.description,
            custom_category,
            status: req.status.unwrap_or_default(),
            priority: req.priority.unwrap_or_default(),
            assignee: req.assignee.or_else(|| Some(creator.to_string())),
            project_id: req.project_id,
            project_name: req.project_name,
            due_date: req.due_date,
            estimated_hours: req.estimated_hours,
            actual_hours: req.actual_hours,
            comments: req.comentarios,
            ..Self::new(req.title, req.category, creator)
        }
    }

    pub fn repository(store: Arc<dyn DocumentStore>) -> Repository<TeamTask> {
        Repository::new(store, COLLECTION)
    }

    /// Next sequential id, one past the highest `TASK-{n}` in use
    pub async fn next_id(repo: &Repository<TeamTask>) -> StoreResult<String> {
        let tasks = repo.get_all().await?;
        let highest = tasks
            .iter()
            .filter_map(|task| task_number(&task.id))
            .max()
            .unwrap_or(0);
        Ok(format_task_id(highest.max(tasks.len())))
    }

    /// Tasks matching `filter`, newest first
    pub async fn list(
        repo: &Repository<TeamTask>,
        filter: &TeamTaskFilter,
    ) -> StoreResult<Vec<Stored<TeamTask>>> {
        let mut tasks: Vec<_> = repo
            .get_all()
            .await?
            .into_iter()
            .filter(|task| filter.matches(&task.data))
            .collect();

        tasks.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(tasks)
    }
}

/// `TASK-{taken + 1}`
pub fn format_task_id(taken: usize) -> String {
    format!("TASK-{}", taken + 1)
}

/// `n` of a `TASK-{n}` id
pub fn task_number(task_id: &str) -> Option<usize> {
    task_id.strip_prefix("TASK-")?.parse().ok()
}
