//! Firestore REST store
//!
//! Talks to the Firestore v1 REST API with `reqwest`. Requests carry a
//! service-account access token from a [`TokenSource`]; against the local
//! emulator no token is sent.
//!
//! # Request mapping
//!
//! | Operation | Request |
//! |-----------|---------|
//! | list | `GET {collection}?pageSize=300`, following `nextPageToken` |
//! | get | `GET {collection}/{id}` |
//! | create | `POST {collection}` (server-assigned id) |
//! | insert | `POST {collection}?documentId={id}` (409 when it exists) |
//! | set | `PATCH {collection}/{id}` without a field mask |
//! | update | `PATCH {collection}/{id}?updateMask.fieldPaths=...&currentDocument.exists=true` |
//! | delete | `DELETE {collection}/{id}` |
//! | find_by_field | `POST {parent}:runQuery` with an `EQUAL` field filter |
//!
//! A `null` value in an update patch stays in the field mask but is left out
//! of the body, which deletes the field. Collection segments and document
//! ids are percent-encoded as URL path segments.

use async_trait::async_trait;
use reqwest::{Method, RequestBuilder, StatusCode, Url};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;

use super::codec::{decode_fields, encode_fields, encode_value};
use super::{
    validate_collection, validate_id, Document, DocumentStore, Fields, StoreError, StoreResult,
};
use crate::google::TokenSource;

/// Production Firestore endpoint
pub const FIRESTORE_BASE_URL: &str = "https://firestore.googleapis.com/v1";

const PAGE_SIZE: u32 = 300;

/// [`DocumentStore`] backed by Firestore
pub struct FirestoreStore {
    http: reqwest::Client,
    documents_url: String,
    database_path: String,
    tokens: Option<Arc<TokenSource>>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawDocument {
    name: String,
    #[serde(default)]
    fields: Option<Value>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListResponse {
    #[serde(default)]
    documents: Vec<RawDocument>,
    #[serde(default)]
    next_page_token: Option<String>,
}

#[derive(Deserialize)]
struct QueryRow {
    #[serde(default)]
    document: Option<RawDocument>,
}

#[derive(Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Deserialize)]
struct ErrorBody {
    #[serde(default)]
    message: String,
}

impl FirestoreStore {
    /// Store for the default database of `project_id`
    pub fn new(http: reqwest::Client, project_id: &str, tokens: Arc<TokenSource>) -> Self {
        Self::with_base_url(http, FIRESTORE_BASE_URL, project_id, Some(tokens))
    }

    /// Store against the local emulator at `host` (`localhost:8080`)
    pub fn emulator(http: reqwest::Client, host: &str, project_id: &str) -> Self {
        Self::with_base_url(http, &format!("http://{}/v1", host), project_id, None)
    }

    pub fn with_base_url(
        http: reqwest::Client,
        base_url: &str,
        project_id: &str,
        tokens: Option<Arc<TokenSource>>,
    ) -> Self {
        let database_path = format!("projects/{}/databases/(default)/documents", project_id);
        Self {
            http,
            documents_url: format!("{}/{}", base_url.trim_end_matches('/'), database_path),
            database_path,
            tokens,
        }
    }

    /// `documents_url` with each of `segments` appended as an encoded path segment
    fn url<'a>(&self, segments: impl IntoIterator<Item = &'a str>) -> StoreResult<Url> {
        let mut url = Url::parse(&self.documents_url)
            .map_err(|e| StoreError::InvalidPath(format!("{}: {}", self.documents_url, e)))?;
        url.path_segments_mut()
            .map_err(|_| StoreError::InvalidPath(self.documents_url.clone()))?
            .extend(segments);
        Ok(url)
    }

    fn collection_url(&self, collection: &str) -> StoreResult<Url> {
        self.url(collection.split('/'))
    }

    fn document_url(&self, collection: &str, id: &str) -> StoreResult<Url> {
        self.url(collection.split('/').chain(std::iter::once(id)))
    }

    async fn request(&self, method: Method, url: Url) -> StoreResult<RequestBuilder> {
        let builder = self.http.request(method, url);
        match &self.tokens {
            Some(tokens) => {
                let token = tokens
                    .access_token()
                    .await
                    .map_err(|e| StoreError::Auth(e.to_string()))?;
                Ok(builder.bearer_auth(token))
            }
            None => Ok(builder),
        }
    }

    async fn send(&self, builder: RequestBuilder) -> StoreResult<reqwest::Response> {
        builder
            .send()
            .await
            .map_err(|e| StoreError::Transport(e.to_string()))
    }

    fn to_document(&self, raw: RawDocument) -> StoreResult<Document> {
        let id = raw
            .name
            .rsplit('/')
            .next()
            .filter(|id| !id.is_empty())
            .ok_or_else(|| StoreError::Codec(format!("Bad document name: {}", raw.name)))?
            .to_string();

        let fields = match raw.fields {
            Some(fields) => decode_fields(&fields)?,
            None => Fields::new(),
        };
        Ok(Document::new(id, fields))
    }

    async fn read_document(&self, response: reqwest::Response) -> StoreResult<Document> {
        let raw = response
            .json::<RawDocument>()
            .await
            .map_err(|e| StoreError::Codec(e.to_string()))?;
        self.to_document(raw)
    }
}

/// Turns a non-success response into a [`StoreError`]
async fn upstream_error(
    response: reqwest::Response,
    collection: &str,
    id: Option<&str>,
) -> StoreError {
    let status = response.status();
    if let Some(id) = id {
        match status {
            StatusCode::NOT_FOUND => {
                return StoreError::NotFound {
                    collection: collection.to_string(),
                    id: id.to_string(),
                }
            }
            StatusCode::CONFLICT => {
                return StoreError::AlreadyExists {
                    collection: collection.to_string(),
                    id: id.to_string(),
                }
            }
            _ => {}
        }
    }

    let body = response.text().await.unwrap_or_default();
    let message = serde_json::from_str::<ErrorEnvelope>(&body)
        .map(|e| e.error.message)
        .ok()
        .filter(|m| !m.is_empty())
        .unwrap_or_else(|| format!("Firestore request failed with HTTP {}", status.as_u16()));

    tracing::warn!(
        status = status.as_u16(),
        collection,
        error = %message,
        "Firestore request failed"
    );

    StoreError::Upstream {
        status: status.as_u16(),
        message,
    }
}

/// Quotes a field name for use in a field path
///
/// Simple names (letters, digits, underscore, not starting with a digit) are
/// used as is; anything else is wrapped in backticks.
pub fn field_path(name: &str) -> String {
    let simple = name
        .chars()
        .next()
        .map(|c| c.is_ascii_alphabetic() || c == '_')
        .unwrap_or(false)
        && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');

    if simple {
        name.to_string()
    } else {
        format!("`{}`", name.replace('\\', "\\\\").replace('`', "\\`"))
    }
}

#[async_trait]
impl DocumentStore for FirestoreStore {
    fn backend(&self) -> &'static str {
        "firestore"
    }

    async fn list(&self, collection: &str) -> StoreResult<Vec<Document>> {
        validate_collection(collection)?;
        let url = self.collection_url(collection)?;
        let mut documents = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let mut query = vec![("pageSize", PAGE_SIZE.to_string())];
            if let Some(token) = page_token.take() {
                query.push(("pageToken", token));
            }

            let builder = self.request(Method::GET, url.clone()).await?.query(&query);
            let response = self.send(builder).await?;
            if !response.status().is_success() {
                return Err(upstream_error(response, collection, None).await);
            }

            let page = response
                .json::<ListResponse>()
                .await
                .map_err(|e| StoreError::Codec(e.to_string()))?;

            for raw in page.documents {
                documents.push(self.to_document(raw)?);
            }

            match page.next_page_token.filter(|t| !t.is_empty()) {
                Some(token) => page_token = Some(token),
                None => break,
            }
        }

        Ok(documents)
    }

    async fn get(&self, collection: &str, id: &str) -> StoreResult<Option<Document>> {
        validate_collection(collection)?;
        validate_id(id)?;

        let builder = self
            .request(Method::GET, self.document_url(collection, id)?)
            .await?;
        let response = self.send(builder).await?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !response.status().is_success() {
            return Err(upstream_error(response, collection, Some(id)).await);
        }
        self.read_document(response).await.map(Some)
    }

    async fn create(&self, collection: &str, fields: Fields) -> StoreResult<Document> {
        validate_collection(collection)?;

        let body = json!({ "fields": encode_fields(&strip_nulls(fields)) });
        let builder = self
            .request(Method::POST, self.collection_url(collection)?)
            .await?
            .json(&body);
        let response = self.send(builder).await?;

        if !response.status().is_success() {
            return Err(upstream_error(response, collection, None).await);
        }
        self.read_document(response).await
    }

    async fn insert(&self, collection: &str, id: &str, fields: Fields) -> StoreResult<Document> {
        validate_collection(collection)?;
        validate_id(id)?;

        let body = json!({ "fields": encode_fields(&strip_nulls(fields)) });
        let builder = self
            .request(Method::POST, self.collection_url(collection)?)
            .await?
            .query(&[("documentId", id)])
            .json(&body);
        let response = self.send(builder).await?;

        if !response.status().is_success() {
            return Err(upstream_error(response, collection, Some(id)).await);
        }
        self.read_document(response).await
    }

    async fn set(&self, collection: &str, id: &str, fields: Fields) -> StoreResult<Document> {
        validate_collection(collection)?;
        validate_id(id)?;

        let body = json!({ "fields": encode_fields(&strip_nulls(fields)) });
        let builder = self
            .request(Method::PATCH, self.document_url(collection, id)?)
            .await?
            .json(&body);
        let response = self.send(builder).await?;

        if !response.status().is_success() {
            return Err(upstream_error(response, collection, None).await);
        }
        self.read_document(response).await
    }

    async fn update(&self, collection: &str, id: &str, patch: Fields) -> StoreResult<Document> {
        validate_collection(collection)?;
        validate_id(id)?;

        let mut query: Vec<(&str, String)> = patch
            .keys()
            .map(|key| ("updateMask.fieldPaths", field_path(key)))
            .collect();
        query.push(("currentDocument.exists", "true".to_string()));

        let body = json!({ "fields": encode_fields(&strip_nulls(patch)) });
        let builder = self
            .request(Method::PATCH, self.document_url(collection, id)?)
            .await?
            .query(&query)
            .json(&body);
        let response = self.send(builder).await?;

        if !response.status().is_success() {
            return Err(upstream_error(response, collection, Some(id)).await);
        }
        self.read_document(response).await
    }

    async fn delete(&self, collection: &str, id: &str) -> StoreResult<()> {
        validate_collection(collection)?;
        validate_id(id)?;

        let builder = self
            .request(Method::DELETE, self.document_url(collection, id)?)
            .await?;
        let response = self.send(builder).await?;

        if !response.status().is_success() {
            return Err(upstream_error(response, collection, None).await);
        }
        Ok(())
    }

    async fn find_by_field(
        &self,
        collection: &str,
        field: &str,
        value: &Value,
    ) -> StoreResult<Vec<Document>> {
        validate_collection(collection)?;

        let (parent, collection_id) = match collection.rsplit_once('/') {
            Some((parent, id)) => (self.collection_url(parent)?.to_string(), id),
            None => (self.documents_url.clone(), collection),
        };

        let body = json!({
            "structuredQuery": {
                "from": [{ "collectionId": collection_id }],
                "where": {
                    "fieldFilter": {
                        "field": { "fieldPath": field_path(field) },
                        "op": "EQUAL",
                        "value": encode_value(value),
                    }
                }
            }
        });

        let builder = self
            .request(Method::POST, run_query_url(&parent)?)
            .await?
            .json(&body);
        let response = self.send(builder).await?;

        if !response.status().is_success() {
            return Err(upstream_error(response, collection, None).await);
        }

        let rows = response
            .json::<Vec<QueryRow>>()
            .await
            .map_err(|e| StoreError::Codec(e.to_string()))?;

        rows.into_iter()
            .filter_map(|row| row.document)
            .map(|raw| self.to_document(raw))
            .collect()
    }

    async fn ping(&self) -> StoreResult<()> {
        let builder = self
            .request(Method::GET, self.collection_url("config")?)
            .await?
            .query(&[("pageSize", "1")]);
        let response = self.send(builder).await?;

        if !response.status().is_success() {
            return Err(upstream_error(response, "config", None).await);
        }
        tracing::trace!(database = %self.database_path, "Firestore ping ok");
        Ok(())
    }
}

fn run_query_url(parent: &str) -> StoreResult<Url> {
    Url::parse(&format!("{}:runQuery", parent))
        .map_err(|e| StoreError::InvalidPath(format!("{}: {}", parent, e)))
}

fn strip_nulls(fields: Fields) -> Fields {
    fields.into_iter().filter(|(_, v)| !v.is_null()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        extract::{Path, Query, State},
        http::StatusCode as HttpStatus,
        routing::{get, post},
        Json, Router,
    };
    use std::collections::HashMap;
    use std::sync::Mutex;

    const PREFIX: &str = "/v1/projects/demo/databases/(default)/documents";

    #[derive(Default)]
    struct Recorded {
        queries: Vec<Vec<(String, String)>>,
        bodies: Vec<Value>,
    }

    type Shared = Arc<Mutex<Recorded>>;

    async fn spawn(app: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move { axum::serve(listener, app).await.unwrap() });
        format!("http://{}/v1", addr)
    }

    fn store(base: &str) -> FirestoreStore {
        FirestoreStore::with_base_url(reqwest::Client::new(), base, "demo", None)
    }

    #[test]
    fn test_field_path_quoting() {
        assert_eq!(field_path("personaEmail"), "personaEmail");
        assert_eq!(field_path("criterios_aceptacion"), "criterios_aceptacion");
        assert_eq!(field_path("2fa"), "`2fa`");
        assert_eq!(field_path("due-date"), "`due-date`");
        assert_eq!(field_path("a`b"), "`a\\`b`");
    }

    #[tokio::test]
    async fn test_list_follows_page_tokens() {
        async fn list(Query(q): Query<HashMap<String, String>>) -> Json<Value> {
            match q.get("pageToken").map(String::as_str) {
                None => Json(json!({
                    "documents": [{
                        "name": "projects/demo/databases/(default)/documents/clientes/a",
                        "fields": { "empresa": { "stringValue": "Acme" } }
                    }],
                    "nextPageToken": "p2"
                })),
                Some("p2") => Json(json!({
                    "documents": [{
                        "name": "projects/demo/databases/(default)/documents/clientes/b"
                    }]
                })),
                Some(_) => Json(json!({})),
            }
        }

        let base = spawn(Router::new().route(&format!("{}/clientes", PREFIX), get(list))).await;
        let docs = store(&base).list("clientes").await.unwrap();

        assert_eq!(docs.len(), 2);
        assert_eq!(docs[0].id, "a");
        assert_eq!(docs[0].fields["empresa"], "Acme");
        assert_eq!(docs[1].id, "b");
        assert!(docs[1].fields.is_empty());
    }

    #[tokio::test]
    async fn test_get_missing_document_is_none() {
        async fn missing() -> (HttpStatus, Json<Value>) {
            (
                HttpStatus::NOT_FOUND,
                Json(json!({ "error": { "code": 404, "message": "not found", "status": "NOT_FOUND" } })),
            )
        }

        let base = spawn(Router::new().route(&format!("{}/clientes/:id", PREFIX), get(missing))).await;
        assert!(store(&base).get("clientes", "zzz").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_update_sends_mask_and_drops_nulls() {
        async fn patch(
            State(rec): State<Shared>,
            Path(id): Path<String>,
            Query(q): Query<Vec<(String, String)>>,
            Json(body): Json<Value>,
        ) -> Json<Value> {
            rec.lock().unwrap().queries.push(q);
            rec.lock().unwrap().bodies.push(body.clone());
            Json(json!({
                "name": format!("projects/demo/databases/(default)/documents/team-tasks/{}", id),
                "fields": body["fields"].clone()
            }))
        }

        let rec: Shared = Arc::default();
        let app = Router::new()
            .route(
                &format!("{}/team-tasks/:id", PREFIX),
                axum::routing::patch(patch),
            )
            .with_state(rec.clone());
        let base = spawn(app).await;

        let patch_fields = json!({ "accumulatedTime": 90, "startedAt": null })
            .as_object()
            .cloned()
            .unwrap();
        let doc = store(&base)
            .update("team-tasks", "TASK-1", patch_fields)
            .await
            .unwrap();

        assert_eq!(doc.id, "TASK-1");
        assert_eq!(doc.fields["accumulatedTime"], 90);

        let recorded = rec.lock().unwrap();
        let query = &recorded.queries[0];
        assert!(query.contains(&("updateMask.fieldPaths".into(), "accumulatedTime".into())));
        assert!(query.contains(&("updateMask.fieldPaths".into(), "startedAt".into())));
        assert!(query.contains(&("currentDocument.exists".into(), "true".into())));
        assert!(recorded.bodies[0]["fields"].get("startedAt").is_none());
    }

    #[tokio::test]
    async fn test_update_missing_document_maps_to_not_found() {
        async fn missing() -> (HttpStatus, Json<Value>) {
            (
                HttpStatus::NOT_FOUND,
                Json(json!({ "error": { "code": 404, "message": "No document to update" } })),
            )
        }

        let base = spawn(
            Router::new().route(&format!("{}/clientes/:id", PREFIX), axum::routing::patch(missing)),
        )
        .await;
        let result = store(&base).update("clientes", "nope", Fields::new()).await;

        assert!(matches!(result, Err(StoreError::NotFound { .. })));
    }

    #[tokio::test]
    async fn test_upstream_error_message_is_surfaced() {
        async fn denied() -> (HttpStatus, Json<Value>) {
            (
                HttpStatus::FORBIDDEN,
                Json(json!({ "error": { "code": 403, "message": "Missing or insufficient permissions." } })),
            )
        }

        let base = spawn(
            Router::new().route(&format!("{}/clientes", PREFIX), post(denied)),
        )
        .await;
        let err = store(&base).create("clientes", Fields::new()).await.unwrap_err();

        match err {
            StoreError::Upstream { status, message } => {
                assert_eq!(status, 403);
                assert_eq!(message, "Missing or insufficient permissions.");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_find_by_field_runs_structured_query() {
        async fn run_query(
            State(rec): State<Shared>,
            uri: axum::http::Uri,
            Json(body): Json<Value>,
        ) -> Json<Value> {
            assert!(uri.path().ends_with("/documents/projects/p1:runQuery"));
            rec.lock().unwrap().bodies.push(body);
            Json(json!([
                {
                    "document": {
                        "name": "projects/demo/databases/(default)/documents/projects/p1/features/F-1",
                        "fields": { "status": { "stringValue": "todo" } }
                    },
                    "readTime": "2024-01-01T00:00:00Z"
                },
                { "readTime": "2024-01-01T00:00:00Z" }
            ]))
        }

        let rec: Shared = Arc::default();
        let app = Router::new()
            .fallback(post(run_query))
            .with_state(rec.clone());
        let base = spawn(app).await;

        let docs = store(&base)
            .find_by_field("projects/p1/features", "status", &json!("todo"))
            .await
            .unwrap();

        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0].id, "F-1");

        let recorded = rec.lock().unwrap();
        let body = &recorded.bodies[0];
        assert_eq!(body["structuredQuery"]["from"][0]["collectionId"], "features");
        assert_eq!(
            body["structuredQuery"]["where"]["fieldFilter"]["value"],
            json!({ "stringValue": "todo" })
        );
    }

    #[tokio::test]
    async fn test_document_ids_are_percent_encoded() {
        async fn echo(State(rec): State<Shared>, uri: axum::http::Uri) -> Json<Value> {
            rec.lock().unwrap().queries.push(vec![("path".into(), uri.path().to_string())]);
            Json(json!({
                "name": "projects/demo/databases/(default)/documents/clientes/x",
                "fields": {}
            }))
        }

        let rec: Shared = Arc::default();
        let base = spawn(Router::new().fallback(get(echo)).with_state(rec.clone())).await;

        store(&base).get("clientes", "a b?c#d%").await.unwrap();

        let recorded = rec.lock().unwrap();
        assert_eq!(
            recorded.queries[0][0].1,
            format!("{}/clientes/a%20b%3Fc%23d%25", PREFIX)
        );
    }

    #[tokio::test]
    async fn test_insert_passes_document_id_and_maps_conflict() {
        async fn conflict(Query(q): Query<HashMap<String, String>>) -> (HttpStatus, Json<Value>) {
            assert_eq!(q.get("documentId").map(String::as_str), Some("TASK-1"));
            (
                HttpStatus::CONFLICT,
                Json(json!({ "error": { "code": 409, "message": "Document already exists" } })),
            )
        }

        let base = spawn(Router::new().route(&format!("{}/team-tasks", PREFIX), post(conflict))).await;
        let result = store(&base).insert("team-tasks", "TASK-1", Fields::new()).await;

        match result {
            Err(StoreError::AlreadyExists { collection, id }) => {
                assert_eq!(collection, "team-tasks");
                assert_eq!(id, "TASK-1");
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }
}
