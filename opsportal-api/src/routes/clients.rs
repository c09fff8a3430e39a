/// Billing client endpoints (finance access)
///
/// - `GET /api/clients` - List clients; `rfc` or `empresa` narrows the list
///   to the matching client
/// - `POST /api/clients` - Create a client; an `id` in the body picks the key
/// - `GET /api/clients/:id` - Get one client
/// - `PUT /api/clients/:id` - Partial update
/// - `DELETE /api/clients/:id` - Delete
use axum::{
    extract::{rejection::JsonRejection, Path, Query, State},
    http::StatusCode,
    Extension, Json,
};
use opsportal_shared::auth::identity::Identity;
use opsportal_shared::models::client::Client;
use opsportal_shared::repository::Stored;
use serde::Deserialize;
use serde_json::{json, Value};

use super::{created, object_body, ok, ok_with_message, parse_body, take_id, Envelope};
use crate::{
    app::AppState,
    error::{ApiError, ApiResult},
};

/// Lookup keys for the client list
#[derive(Debug, Default, Deserialize)]
pub struct ClientLookup {
    pub rfc: Option<String>,
    pub empresa: Option<String>,
}

pub async fn list_clients(
    State(state): State<AppState>,
    Query(lookup): Query<ClientLookup>,
) -> ApiResult<Json<Envelope<Vec<Stored<Client>>>>> {
    let repo = Client::repository(state.store.clone());
    let clients = match (lookup.rfc.as_deref(), lookup.empresa.as_deref()) {
        (Some(rfc), _) => Client::find_by_tax_id(&repo, rfc).await?.into_iter().collect(),
        (None, Some(company)) => Client::find_by_company(&repo, company)
            .await?
            .into_iter()
            .collect(),
        (None, None) => repo.get_all().await?,
    };
    Ok(ok(clients))
}

/// Creates a client
///
/// # Request
///
/// ```json
/// { "id": "abc", "empresa": "Acme", "rfc": "ACM010101AAA" }
/// ```
///
/// Without `id` the store generates one. Keys outside the known client
/// fields are stored as sent.
pub async fn create_client(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    payload: Result<Json<Value>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<Envelope<Stored<Client>>>)> {
    let Json(body) = payload?;
    let mut fields = object_body(body)?;
    let id = take_id(&mut fields)?;

    let client: Client = parse_body(Value::Object(fields))?;
    let repo = Client::repository(state.store.clone());
    let stored = match id {
        Some(id) => repo.create_with_id(&id, &client).await?,
        None => repo.create(&client).await?,
    };

    tracing::info!(uid = %identity.uid, client_id = %stored.id, "Client created");
    Ok(created(stored))
}

pub async fn get_client(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<Envelope<Stored<Client>>>> {
    let client = Client::repository(state.store.clone())
        .get_by_id(&id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Client not found".to_string()))?;
    Ok(ok(client))
}

pub async fn update_client(
    State(state): State<AppState>,
    Path(id): Path<String>,
    payload: Result<Json<Value>, JsonRejection>,
) -> ApiResult<Json<Envelope<Stored<Client>>>> {
    let Json(body) = payload?;
    let patch = object_body(body)?;

    let client = Client::repository(state.store.clone())
        .update(&id, patch)
        .await?;
    Ok(ok(client))
}

pub async fn delete_client(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Path(id): Path<String>,
) -> ApiResult<Json<Envelope<Value>>> {
    Client::repository(state.store.clone()).delete(&id).await?;

    tracing::info!(uid = %identity.uid, client_id = %id, "Client deleted");
    Ok(ok_with_message(json!({ "id": id }), "Client deleted"))
}
