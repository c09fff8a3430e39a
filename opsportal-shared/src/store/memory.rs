use async_trait::async_trait;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use tokio::sync::RwLock;

use super::{
    generate_document_id, validate_collection, validate_id, Document, DocumentStore, Fields,
    StoreError, StoreResult,
};

/// Process-local [`DocumentStore`]
#[derive(Default)]
pub struct MemoryStore {
    collections: RwLock<HashMap<String, BTreeMap<String, Fields>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    fn backend(&self) -> &'static str {
        "memory"
    }

    async fn list(&self, collection: &str) -> StoreResult<Vec<Document>> {
        validate_collection(collection)?;
        let collections = self.collections.read().await;

        Ok(collections
            .get(collection)
            .map(|docs| {
                docs.iter()
                    .map(|(id, fields)| Document::new(id.clone(), fields.clone()))
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn get(&self, collection: &str, id: &str) -> StoreResult<Option<Document>> {
        validate_collection(collection)?;
        validate_id(id)?;
        let collections = self.collections.read().await;

        Ok(collections
            .get(collection)
            .and_then(|docs| docs.get(id))
            .map(|fields| Document::new(id, fields.clone())))
    }

    async fn create(&self, collection: &str, fields: Fields) -> StoreResult<Document> {
        validate_collection(collection)?;
        let mut collections = self.collections.write().await;
        let docs = collections.entry(collection.to_string()).or_default();

        let mut id = generate_document_id();
        while docs.contains_key(&id) {
            id = generate_document_id();
        }

        let fields = strip_nulls(fields);
        docs.insert(id.clone(), fields.clone());
        Ok(Document::new(id, fields))
    }

    async fn insert(&self, collection: &str, id: &str, fields: Fields) -> StoreResult<Document> {
        validate_collection(collection)?;
        validate_id(id)?;
        let mut collections = self.collections.write().await;
        let docs = collections.entry(collection.to_string()).or_default();

        if docs.contains_key(id) {
            return Err(StoreError::AlreadyExists {
                collection: collection.to_string(),
                id: id.to_string(),
            });
        }

        let fields = strip_nulls(fields);
        docs.insert(id.to_string(), fields.clone());
        Ok(Document::new(id, fields))
    }

    async fn set(&self, collection: &str, id: &str, fields: Fields) -> StoreResult<Document> {
        validate_collection(collection)?;
        validate_id(id)?;
        let mut collections = self.collections.write().await;

        let fields = strip_nulls(fields);
        collections
            .entry(collection.to_string())
            .or_default()
            .insert(id.to_string(), fields.clone());
        Ok(Document::new(id, fields))
    }

    async fn update(&self, collection: &str, id: &str, patch: Fields) -> StoreResult<Document> {
        validate_collection(collection)?;
        validate_id(id)?;
        let mut collections = self.collections.write().await;

        let fields = collections
            .get_mut(collection)
            .and_then(|docs| docs.get_mut(id))
            .ok_or_else(|| StoreError::NotFound {
                collection: collection.to_string(),
                id: id.to_string(),
            })?;

        for (key, value) in patch {
            if value.is_null() {
                fields.remove(&key);
            } else {
                fields.insert(key, value);
            }
        }

        Ok(Document::new(id, fields.clone()))
    }

    async fn delete(&self, collection: &str, id: &str) -> StoreResult<()> {
        validate_collection(collection)?;
        validate_id(id)?;
        let mut collections = self.collections.write().await;

        if let Some(docs) = collections.get_mut(collection) {
            docs.remove(id);
        }
        Ok(())
    }

    async fn ping(&self) -> StoreResult<()> {
        Ok(())
    }
}

fn strip_nulls(fields: Fields) -> Fields {
    fields.into_iter().filter(|(_, v)| !v.is_null()).collect()
}
