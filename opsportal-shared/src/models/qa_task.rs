//! QA task model (`projects/{projectId}/qa-tasks`)

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use validator::{Validate, ValidationError};

use super::WorkCategory;
use crate::repository::Repository;
use crate::store::DocumentStore;

pub fn collection(project_id: &str) -> String {
    format!("projects/{}/qa-tasks", project_id)
}

/// QA task status
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum QaStatus {
    #[default]
    #[serde(rename = "Pendiente")]
    Pending,
    #[serde(rename = "En Progreso")]
    InProgress,
    #[serde(rename = "Completado")]
    Completed,
    #[serde(rename = "Bloqueado")]
    Blocked,
    #[serde(rename = "Cancelado")]
    Cancelled,
}

/// Screenshot attached to a QA task
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QaImage {
    pub url: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uploaded_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub size: u64,
}

/// QA task document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QaTask {
    #[serde(rename = "titulo")]
    pub title: String,

    #[serde(rename = "categoria", default = "default_category")]
    pub category: WorkCategory,

    #[serde(rename = "tipo", default)]
    pub kind: String,

    #[serde(rename = "criterios_aceptacion", default)]
    pub acceptance_criteria: String,

    #[serde(rename = "comentarios", default)]
    pub comments: String,

    #[serde(rename = "imagenes", default)]
    pub images: Vec<QaImage>,

    #[serde(rename = "estado", default)]
    pub status: QaStatus,

    #[serde(default)]
    pub created_by: String,

    #[serde(default)]
    pub project_id: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub feature_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub feature_title: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub feature_note: Option<String>,
}

fn default_category() -> WorkCategory {
    WorkCategory::Functionality
}

/// Body of a QA task create request
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
#[validate(schema(function = "feature_link_is_exclusive", skip_on_field_errors = false))]
pub struct NewQaTask {
    #[validate(length(min = 1, message = "Title is required"))]
    pub titulo: String,
    pub categoria: Option<WorkCategory>,
    pub tipo: Option<String>,
    #[serde(rename = "criterios_aceptacion")]
    pub criterios_aceptacion: Option<String>,
    pub comentarios: Option<String>,
    pub estado: Option<QaStatus>,
    #[serde(default)]
    pub imagenes: Vec<QaImage>,
    pub feature_id: Option<String>,
    pub feature_note: Option<String>,
}

fn feature_link_is_exclusive(req: &NewQaTask) -> Result<(), ValidationError> {
    if req.feature_id.is_some() && req.feature_note.is_some() {
        let mut err = ValidationError::new("feature_link");
        err.message = Some("featureId and featureNote cannot both be set".into());
        return Err(err);
    }
    Ok(())
}

impl QaTask {
    /// Builds a task from a create request
    ///
    /// `feature_title` is the title of the linked feature, looked up by the
    /// caller.
    pub fn from_request(
        project_id: &str,
        req: NewQaTask,
        feature_title: Option<String>,
        creator: &str,
    ) -> Self {
        Self {
            title: req.titulo,
            category: req.categoria.unwrap_or(WorkCategory::Functionality),
            kind: req.tipo.unwrap_or_default(),
            acceptance_criteria: req.criterios_aceptacion.unwrap_or_default(),
            comments: req.comentarios.unwrap_or_default(),
            images: req.imagenes,
            status: req.estado.unwrap_or_default(),
            created_by: creator.to_string(),
            project_id: project_id.to_string(),
            feature_id: req.feature_id,
            feature_title,
            feature_note: req.feature_note,
        }
    }

    pub fn repository(store: Arc<dyn DocumentStore>, project_id: &str) -> Repository<QaTask> {
        Repository::new(store, collection(project_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::memory::MemoryStore;
    use serde_json::json;

    #[test]
    fn test_feature_id_and_note_are_exclusive() {
        let req: NewQaTask = serde_json::from_value(json!({
            "titulo": "Probar login",
            "featureId": "AB-P1-1",
            "featureNote": "sin funcionalidad"
        }))
        .unwrap();
        assert!(req.validate().is_err());

        let req: NewQaTask = serde_json::from_value(json!({
            "titulo": "Probar login",
            "featureNote": "sin funcionalidad"
        }))
        .unwrap();
        assert!(req.validate().is_ok());
    }

    #[test]
    fn test_spanish_keys_on_the_wire() {
        let req: NewQaTask = serde_json::from_value(json!({
            "titulo": "Revisar export",
            "criterios_aceptacion": "Descarga CSV",
            "estado": "En Progreso",
            "imagenes": [{ "url": "https://x/a.png", "name": "a.png", "size": 120 }]
        }))
        .unwrap();
        let task = QaTask::from_request("p1", req, None, "qa@x.com");
        let value = serde_json::to_value(&task).unwrap();

        assert_eq!(value["titulo"], "Revisar export");
        assert_eq!(value["criterios_aceptacion"], "Descarga CSV");
        assert_eq!(value["estado"], "En Progreso");
        assert_eq!(value["categoria"], "Funcionalidad");
        assert_eq!(value["imagenes"][0]["size"], 120);
        assert_eq!(value["projectId"], "p1");
    }

    #[tokio::test]
    async fn test_create_under_project() {
        let store: Arc<dyn DocumentStore> = Arc::new(MemoryStore::new());
        let repo = QaTask::repository(store.clone(), "p1");
        let req: NewQaTask = serde_json::from_value(json!({ "titulo": "t" })).unwrap();

        let created = repo
            .create(&QaTask::from_request("p1", req, None, "qa@x.com"))
            .await
            .unwrap();

        assert_eq!(created.data.status, QaStatus::Pending);
        assert!(QaTask::repository(store, "p2").get_all().await.unwrap().is_empty());
        assert_eq!(repo.get_all().await.unwrap()[0].id, created.id);
    }
}
