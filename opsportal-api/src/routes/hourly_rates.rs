/// Hourly rate endpoints (finance access)
///
/// - `GET /api/hourly-rates` - List rates; `personaEmail` narrows the list
///   to that person's rate
/// - `POST /api/hourly-rates` - Create; an `id` in the body picks the key
/// - `GET /api/hourly-rates/:id` - Get one rate
/// - `PUT /api/hourly-rates/:id` - Partial update
/// - `DELETE /api/hourly-rates/:id` - Delete
use axum::{
    extract::{rejection::JsonRejection, Path, Query, State},
    http::StatusCode,
    Extension, Json,
};
use opsportal_shared::auth::identity::Identity;
use opsportal_shared::models::hourly_rate::HourlyRate;
use opsportal_shared::repository::Stored;
use serde::Deserialize;
use serde_json::{json, Value};

use super::{created, object_body, ok, ok_with_message, parse_body, take_id, Envelope};
use crate::{
    app::AppState,
    error::{ApiError, ApiResult},
};

fn check_rate(value: Option<&Value>) -> ApiResult<()> {
    match value {
        None | Some(Value::Null) => Ok(()),
        Some(v) => match v.as_f64() {
            Some(rate) if rate >= 0.0 => Ok(()),
            _ => Err(ApiError::BadRequest(
                "precioPorHora must be a non-negative number".to_string(),
            )),
        },
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RateLookup {
    pub persona_email: Option<String>,
}

pub async fn list_hourly_rates(
    State(state): State<AppState>,
    Query(lookup): Query<RateLookup>,
) -> ApiResult<Json<Envelope<Vec<Stored<HourlyRate>>>>> {
    let repo = HourlyRate::repository(state.store.clone());
    let rates = match lookup.persona_email.as_deref() {
        Some(email) => HourlyRate::find_by_person_email(&repo, email)
            .await?
            .into_iter()
            .collect(),
        None => repo.get_all().await?,
    };
    Ok(ok(rates))
}

pub async fn create_hourly_rate(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    payload: Result<Json<Value>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<Envelope<Stored<HourlyRate>>>)> {
    let Json(body) = payload?;
    let mut fields = object_body(body)?;
    let id = take_id(&mut fields)?;
    check_rate(fields.get("precioPorHora"))?;

    let rate: HourlyRate = parse_body(Value::Object(fields))?;
    let repo = HourlyRate::repository(state.store.clone());
    let stored = match id {
        Some(id) => repo.create_with_id(&id, &rate).await?,
        None => repo.create(&rate).await?,
    };

    tracing::info!(uid = %identity.uid, rate_id = %stored.id, "Hourly rate created");
    Ok(created(stored))
}

pub async fn get_hourly_rate(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<Envelope<Stored<HourlyRate>>>> {
    let rate = HourlyRate::repository(state.store.clone())
        .get_by_id(&id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Hourly rate not found".to_string()))?;
    Ok(ok(rate))
}

pub async fn update_hourly_rate(
    State(state): State<AppState>,
    Path(id): Path<String>,
    payload: Result<Json<Value>, JsonRejection>,
) -> ApiResult<Json<Envelope<Stored<HourlyRate>>>> {
    let Json(body) = payload?;
    let patch = object_body(body)?;
    check_rate(patch.get("precioPorHora"))?;

    let rate = HourlyRate::repository(state.store.clone())
        .update(&id, patch)
        .await?;
    Ok(ok(rate))
}

pub async fn delete_hourly_rate(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<Envelope<Value>>> {
    HourlyRate::repository(state.store.clone()).delete(&id).await?;
    Ok(ok_with_message(json!({ "id": id }), "Hourly rate deleted"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rate_check() {
        assert!(check_rate(None).is_ok());
        assert!(check_rate(Some(&json!(null))).is_ok());
        assert!(check_rate(Some(&json!(450))).is_ok());
        assert!(check_rate(Some(&json!(-1))).is_err());
        assert!(check_rate(Some(&json!("450"))).is_err());
    }
}
