use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::Value;
use std::marker::PhantomData;
use std::sync::Arc;

use crate::store::{Document, DocumentStore, Fields, StoreError, StoreResult};

/// Keys owned by the record envelope rather than the entity
const ENVELOPE_KEYS: [&str; 3] = ["id", "createdAt", "updatedAt"];

/// An entity as stored: id and timestamps around the entity's own fields
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Stored<T> {
    pub id: String,

    #[serde(flatten)]
    pub data: T,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

/// Collection-bound access to one entity type
pub struct Repository<T> {
    store: Arc<dyn DocumentStore>,
    collection: String,
    _entity: PhantomData<fn() -> T>,
}

impl<T> Clone for Repository<T> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            collection: self.collection.clone(),
            _entity: PhantomData,
        }
    }
}

impl<T> Repository<T>
where
    T: Serialize + DeserializeOwned,
{
    pub fn new(store: Arc<dyn DocumentStore>, collection: impl Into<String>) -> Self {
        Self {
            store,
            collection: collection.into(),
            _entity: PhantomData,
        }
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }

    /// Every record in the collection
    pub async fn get_all(&self) -> StoreResult<Vec<Stored<T>>> {
        let docs = self.store.list(&self.collection).await?;
        docs.into_iter().map(|doc| self.decode(doc)).collect()
    }

    pub async fn get_by_id(&self, id: &str) -> StoreResult<Option<Stored<T>>> {
        match self.store.get(&self.collection, id).await? {
            Some(doc) => self.decode(doc).map(Some),
            None => Ok(None),
        }
    }

    /// Like [`Repository::get_by_id`], but absence is an error
    pub async fn require(&self, id: &str) -> StoreResult<Stored<T>> {
        self.get_by_id(id).await?.ok_or_else(|| StoreError::NotFound {
            collection: self.collection.clone(),
            id: id.to_string(),
        })
    }

    /// Inserts under a generated id
    pub async fn create(&self, data: &T) -> StoreResult<Stored<T>> {
        let fields = self.encode_new(data)?;
        let doc = self.store.create(&self.collection, fields).await?;

        tracing::debug!(collection = %self.collection, id = %doc.id, "Created document");
        self.decode(doc)
    }

    /// Inserts under a caller-chosen id, replacing any existing record
    pub async fn create_with_id(&self, id: &str, data: &T) -> StoreResult<Stored<T>> {
        let fields = self.encode_new(data)?;
        let doc = self.store.set(&self.collection, id, fields).await?;

        tracing::debug!(collection = %self.collection, id = %doc.id, "Stored document");
        self.decode(doc)
    }

    /// Inserts under a caller-chosen id; fails with AlreadyExists when taken
    pub async fn insert_with_id(&self, id: &str, data: &T) -> StoreResult<Stored<T>> {
        let fields = self.encode_new(data)?;
        let doc = self.store.insert(&self.collection, id, fields).await?;

        tracing::debug!(collection = %self.collection, id = %doc.id, "Inserted document");
        self.decode(doc)
    }

    /// Applies a partial update
    ///
    /// Envelope keys in `patch` are ignored and `updatedAt` is refreshed. A
    /// `null` value removes the field.
    pub async fn update(&self, id: &str, mut patch: Fields) -> StoreResult<Stored<T>> {
        for key in ENVELOPE_KEYS {
            patch.remove(key);
        }
        patch.insert("updatedAt".to_string(), timestamp(Utc::now()));

        let doc = self.store.update(&self.collection, id, patch).await?;
        self.decode(doc)
    }

    /// Deletes a record; fails with NotFound when it does not exist
    pub async fn delete(&self, id: &str) -> StoreResult<()> {
        if self.store.get(&self.collection, id).await?.is_none() {
            return Err(StoreError::NotFound {
                collection: self.collection.clone(),
                id: id.to_string(),
            });
        }
        self.store.delete(&self.collection, id).await
    }

    /// First record whose top-level `field` equals `value`
    pub async fn find_one_by(&self, field: &str, value: Value) -> StoreResult<Option<Stored<T>>> {
        let docs = self
            .store
            .find_by_field(&self.collection, field, &value)
            .await?;

        match docs.into_iter().next() {
            Some(doc) => self.decode(doc).map(Some),
            None => Ok(None),
        }
    }

    pub async fn count(&self) -> StoreResult<usize> {
        Ok(self.store.list(&self.collection).await?.len())
    }

    fn encode_new(&self, data: &T) -> StoreResult<Fields> {
        let mut fields = match serde_json::to_value(data) {
            Ok(Value::Object(fields)) => fields,
            Ok(other) => {
                return Err(StoreError::Codec(format!(
                    "{} entity must serialize to an object, got {}",
                    self.collection, other
                )))
            }
            Err(e) => return Err(StoreError::Codec(e.to_string())),
        };

        for key in ENVELOPE_KEYS {
            fields.remove(key);
        }
        fields.retain(|_, v| !v.is_null());

        let now = timestamp(Utc::now());
        fields.insert("createdAt".to_string(), now.clone());
        fields.insert("updatedAt".to_string(), now);
        Ok(fields)
    }

    fn decode(&self, doc: Document) -> StoreResult<Stored<T>> {
        let id = doc.id.clone();
        serde_json::from_value(doc.into_value()).map_err(|e| {
            StoreError::Codec(format!("{}/{}: {}", self.collection, id, e))
        })
    }
}

fn timestamp(at: DateTime<Utc>) -> Value {
    Value::String(at.to_rfc3339_opts(chrono::SecondsFormat::Millis, true))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::memory::MemoryStore;
    use serde_json::json;

    #[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
    #[serde(rename_all = "camelCase")]
    struct Note {
        title: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        owner_email: Option<String>,
    }

    fn repo() -> Repository<Note> {
        Repository::new(Arc::new(MemoryStore::new()), "notes")
    }

    fn note(title: &str) -> Note {
        Note {
            title: title.to_string(),
            owner_email: None,
        }
    }

    #[tokio::test]
    async fn test_create_sets_id_and_timestamps() {
        let repo = repo();
        let created = repo.create(&note("a")).await.unwrap();

        assert_eq!(created.id.len(), 20);
        assert_eq!(created.data.title, "a");
        assert!(created.created_at.is_some());
        assert_eq!(created.created_at, created.updated_at);
    }

    #[tokio::test]
    async fn test_create_with_id_and_get() {
        let repo = repo();
        repo.create_with_id("n1", &note("first")).await.unwrap();

        let fetched = repo.get_by_id("n1").await.unwrap().unwrap();
        assert_eq!(fetched.id, "n1");
        assert_eq!(fetched.data, note("first"));
        assert!(repo.get_by_id("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_insert_with_id_keeps_existing_record() {
        let repo = repo();
        repo.insert_with_id("n1", &note("first")).await.unwrap();

        let result = repo.insert_with_id("n1", &note("second")).await;
        assert!(matches!(result, Err(StoreError::AlreadyExists { .. })));
        assert_eq!(repo.require("n1").await.unwrap().data.title, "first");
    }

    #[tokio::test]
    async fn test_update_patches_and_keeps_created_at() {
        let repo = repo();
        let created = repo.create_with_id("n1", &note("first")).await.unwrap();

        let patch = json!({ "title": "second", "id": "hijack", "createdAt": null })
            .as_object()
            .cloned()
            .unwrap();
        let updated = repo.update("n1", patch).await.unwrap();

        assert_eq!(updated.id, "n1");
        assert_eq!(updated.data.title, "second");
        assert_eq!(updated.created_at, created.created_at);
        assert!(updated.updated_at >= created.updated_at);
    }

    #[tokio::test]
    async fn test_update_missing_is_not_found() {
        let result = repo().update("nope", Fields::new()).await;
        assert!(matches!(result, Err(StoreError::NotFound { .. })));
    }

    #[tokio::test]
    async fn test_delete() {
        let repo = repo();
        repo.create_with_id("n1", &note("x")).await.unwrap();

        repo.delete("n1").await.unwrap();
        assert!(repo.get_by_id("n1").await.unwrap().is_none());
        assert!(matches!(
            repo.delete("n1").await,
            Err(StoreError::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_find_one_by() {
        let repo = repo();
        let mut owned = note("owned");
        owned.owner_email = Some("a@x.com".to_string());
        repo.create_with_id("n1", &note("other")).await.unwrap();
        repo.create_with_id("n2", &owned).await.unwrap();

        let found = repo
            .find_one_by("ownerEmail", json!("a@x.com"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found.id, "n2");
        assert!(repo
            .find_one_by("ownerEmail", json!("b@x.com"))
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_decode_error_names_document() {
        let store = Arc::new(MemoryStore::new());
        store
            .set("notes", "bad", json!({ "title": 5 }).as_object().cloned().unwrap())
            .await
            .unwrap();

        let repo: Repository<Note> = Repository::new(store, "notes");
        let err = repo.get_by_id("bad").await.unwrap_err();
        assert!(err.to_string().contains("notes/bad"));
    }

    #[test]
    fn test_stored_serializes_flat() {
        let stored = Stored {
            id: "n1".to_string(),
            data: note("flat"),
            created_at: None,
            updated_at: None,
        };
        assert_eq!(
            serde_json::to_value(&stored).unwrap(),
            json!({ "id": "n1", "title": "flat" })
        );
    }
}
