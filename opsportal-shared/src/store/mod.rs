//! Document store abstraction
//!
//! Collections are addressed by slash-separated paths, so nested collections
//! such as `projects/p1/features` work the same as top-level ones.

pub mod codec;
pub mod firestore;
pub mod memory;

use async_trait::async_trait;
use rand::{distributions::Alphanumeric, Rng};
use serde_json::{Map, Value};
use thiserror::Error;

/// Field map of a stored document
pub type Fields = Map<String, Value>;

/// Length of generated document ids
pub const GENERATED_ID_LEN: usize = 20;

/// Store errors
#[derive(Error, Debug)]
pub enum StoreError {
    /// Document does not exist
    #[error("Document {collection}/{id} not found")]
    NotFound { collection: String, id: String },

    /// A create-if-absent write found an existing document
    #[error("Document {collection}/{id} already exists")]
    AlreadyExists { collection: String, id: String },

    /// Collection path or document id is malformed
    #[error("Invalid document path: {0}")]
    InvalidPath(String),

    /// Backend answered with an error status
    #[error("{message}")]
    Upstream { status: u16, message: String },

    /// Backend could not be reached
    #[error("Store transport error: {0}")]
    Transport(String),

    /// Document could not be converted to or from its stored form
    #[error("Document encoding error: {0}")]
    Codec(String),

    /// Credentials for the backend could not be obtained
    #[error("Store authentication error: {0}")]
    Auth(String),
}

/// Result alias for store operations
pub type StoreResult<T> = Result<T, StoreError>;

/// A stored document: its id plus its fields
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub id: String,
    pub fields: Fields,
}

impl Document {
    pub fn new(id: impl Into<String>, fields: Fields) -> Self {
        Self {
            id: id.into(),
            fields,
        }
    }

    /// Fields with the id merged in under `"id"`
    pub fn into_value(self) -> Value {
        let mut fields = self.fields;
        fields.insert("id".to_string(), Value::String(self.id));
        Value::Object(fields)
    }
}

/// Async document database
///
/// Writes are last-writer-wins; there are no transactions.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Short backend name for logs and health output
    fn backend(&self) -> &'static str;

    /// Every document in `collection`
    async fn list(&self, collection: &str) -> StoreResult<Vec<Document>>;

    /// One document, or `None` when it does not exist
    async fn get(&self, collection: &str, id: &str) -> StoreResult<Option<Document>>;

    /// Inserts a document under a generated id
    async fn create(&self, collection: &str, fields: Fields) -> StoreResult<Document>;

    /// Writes a document under `id`, failing with
    /// [`StoreError::AlreadyExists`] when one is already there
    async fn insert(&self, collection: &str, id: &str, fields: Fields) -> StoreResult<Document>;

    /// Writes a document under `id`, replacing any existing one
    async fn set(&self, collection: &str, id: &str, fields: Fields) -> StoreResult<Document>;

    /// Merges `patch` into an existing document
    ///
    /// A `null` value removes that field. Fails with
    /// [`StoreError::NotFound`] when the document does not exist.
    async fn update(&self, collection: &str, id: &str, patch: Fields) -> StoreResult<Document>;

    /// Deletes a document; deleting a missing document succeeds
    async fn delete(&self, collection: &str, id: &str) -> StoreResult<()>;

    /// Documents whose top-level `field` equals `value`
    ///
    /// The default implementation scans the collection.
    async fn find_by_field(
        &self,
        collection: &str,
        field: &str,
        value: &Value,
    ) -> StoreResult<Vec<Document>> {
        let docs = self.list(collection).await?;
        Ok(docs
            .into_iter()
            .filter(|doc| doc.fields.get(field) == Some(value))
            .collect())
    }

    /// Cheap round trip used by the health endpoint
    async fn ping(&self) -> StoreResult<()>;
}

/// Random alphanumeric id, same shape as Firestore auto ids
pub fn generate_document_id() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(GENERATED_ID_LEN)
        .map(char::from)
        .collect()
}

/// Checks a collection path has an odd number of non-empty segments
pub fn validate_collection(collection: &str) -> StoreResult<()> {
    let segments: Vec<&str> = collection.split('/').collect();
    if segments.iter().any(|s| s.trim().is_empty()) || segments.len() % 2 == 0 {
        return Err(StoreError::InvalidPath(format!(
            "'{}' is not a collection path",
            collection
        )));
    }
    Ok(())
}

/// Checks a document id is a single non-empty segment
pub fn validate_id(id: &str) -> StoreResult<()> {
    if id.trim().is_empty() || id.contains('/') || id == "." || id == ".." {
        return Err(StoreError::InvalidPath(format!(
            "'{}' is not a document id",
            id
        )));
    }
    Ok(())
}
