/// Expense ledger endpoints (finance access)
///
/// - `GET /api/expenses` - List, filtered by `status`, `tipo`, `mes`,
///   `categoria`, `lineaNegocio` and `tipoEgreso`
/// - `POST /api/expenses` - Create; an `id` in the body picks the key
/// - `GET|PUT|DELETE /api/expenses/:id`
/// - `POST /api/expenses/generate` - Expense a person's finished, unbilled
///   work for the current month
use axum::{
    extract::{rejection::JsonRejection, Path, Query, State},
    http::StatusCode,
    Extension, Json,
};
use chrono::Utc;
use opsportal_shared::auth::identity::Identity;
use opsportal_shared::models::expense::{
    expensed_work, hours_based_expenses, month_label, Expense, ExpenseFilter, ProjectFeature,
};
use opsportal_shared::models::feature::Feature;
use opsportal_shared::models::hourly_rate::HourlyRate;
use opsportal_shared::models::project::Project;
use opsportal_shared::models::team_task::{TeamTask, TeamTaskFilter, TeamTaskStatus};
use opsportal_shared::repository::Stored;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use validator::Validate;

use super::{check_patch, created, object_body, ok, ok_with_message, parse_body, take_id, Envelope};
use crate::{
    app::AppState,
    error::{ApiError, ApiResult},
};

/// Body of a generate call
///
/// Without `precioPorHora` the person's stored hourly rate is used.
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct GenerateExpenses {
    #[validate(email(message = "personaEmail must be an email address"))]
    pub persona_email: String,
    pub precio_por_hora: Option<f64>,
}

#[derive(Debug, Serialize)]
pub struct GeneratedExpenses {
    pub created: usize,
    pub expenses: Vec<Stored<Expense>>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<String>,
}

pub async fn list_expenses(
    State(state): State<AppState>,
    Query(filter): Query<ExpenseFilter>,
) -> ApiResult<Json<Envelope<Vec<Stored<Expense>>>>> {
    let expenses: Vec<_> = Expense::repository(state.store.clone())
        .get_all()
        .await?
        .into_iter()
        .filter(|e| filter.matches(&e.data))
        .collect();
    Ok(ok(expenses))
}

pub async fn create_expense(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    payload: Result<Json<Value>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<Envelope<Stored<Expense>>>)> {
    let Json(body) = payload?;
    let mut fields = object_body(body)?;
    let id = take_id(&mut fields)?;

    let expense: Expense = parse_body(Value::Object(fields))?;
    if expense.subtotal < 0.0 || expense.total < 0.0 {
        return Err(ApiError::BadRequest("Amounts cannot be negative".to_string()));
    }

    let repo = Expense::repository(state.store.clone());
    let stored = match id {
        Some(id) => repo.create_with_id(&id, &expense).await?,
        None => repo.create(&expense).await?,
    };

    tracing::info!(uid = %identity.uid, expense_id = %stored.id, total = stored.data.total, "Expense created");
    Ok(created(stored))
}

pub async fn get_expense(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<Envelope<Stored<Expense>>>> {
    let expense = Expense::repository(state.store.clone()).require(&id).await?;
    Ok(ok(expense))
}

pub async fn update_expense(
    State(state): State<AppState>,
    Path(id): Path<String>,
    payload: Result<Json<Value>, JsonRejection>,
) -> ApiResult<Json<Envelope<Stored<Expense>>>> {
    let Json(body) = payload?;
    let patch = object_body(body)?;

    let repo = Expense::repository(state.store.clone());
    let current = repo.require(&id).await?;
    check_patch(&current, &patch)?;

    Ok(ok(repo.update(&id, patch).await?))
}

pub async fn delete_expense(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<Envelope<Value>>> {
    Expense::repository(state.store.clone()).delete(&id).await?;
    Ok(ok_with_message(json!({ "id": id }), "Expense deleted"))
}

/// Creates hours-based expenses for one person's finished work
///
/// Covers completed team tasks and finished features assigned to the person
/// across every project. Work already expensed this month is skipped, so the
/// call can be repeated. A failed insert is reported in `errors` and does
/// not stop the rest.
pub async fn generate_expenses(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    payload: Result<Json<Value>, JsonRejection>,
) -> ApiResult<Json<Envelope<GeneratedExpenses>>> {
    let Json(body) = payload?;
    let req: GenerateExpenses = parse_body(body)?;
    req.validate()?;
    let person = req.persona_email.as_str();

    let rates = HourlyRate::repository(state.store.clone());
    let mut rate = HourlyRate::find_by_person_email(&rates, person)
        .await?
        .map(|stored| stored.data)
        .unwrap_or_default();
    if let Some(per_hour) = req.precio_por_hora {
        rate.rate = Some(per_hour);
    }
    if !rate.rate.map_or(false, |r| r > 0.0) {
        return Err(ApiError::BadRequest(format!(
            "No positive hourly rate for {}",
            person
        )));
    }

    let month = month_label(Utc::now());

    let task_filter = TeamTaskFilter {
        status: Some(TeamTaskStatus::Completed.as_str().to_string()),
        assignee: Some(person.to_string()),
        ..Default::default()
    };
    let tasks = TeamTask::list(&TeamTask::repository(state.store.clone()), &task_filter).await?;

    let mut features = Vec::new();
    for project in Project::repository(state.store.clone()).get_all().await? {
        let finished = Feature::repository(state.store.clone(), &project.id)
            .get_all()
            .await?
            .into_iter()
            .filter(|f| f.data.status.is_finished() && f.data.assignee.as_deref() == Some(person));
        for feature in finished {
            features.push(ProjectFeature {
                project_id: project.id.clone(),
                project_name: project.data.display_name().to_string(),
                feature,
            });
        }
    }

    let repo = Expense::repository(state.store.clone());
    let this_month: Vec<_> = repo
        .get_all()
        .await?
        .into_iter()
        .filter(|e| e.data.month.as_deref() == Some(month.as_str()))
        .collect();

    let pending = hours_based_expenses(
        person,
        &rate,
        &month,
        &tasks,
        &features,
        &expensed_work(&this_month),
    );

    let mut expenses = Vec::with_capacity(pending.len());
    let mut errors = Vec::new();
    for expense in pending {
        match repo.create(&expense).await {
            Ok(stored) => expenses.push(stored),
            Err(e) => {
                let work = expense
                    .task_id
                    .as_deref()
                    .or(expense.feature_id.as_deref())
                    .unwrap_or("unknown");
                tracing::warn!(person, work, error = %e, "Could not create expense");
                errors.push(format!("{}: {}", work, e));
            }
        }
    }

    tracing::info!(
        uid = %identity.uid,
        person,
        month = %month,
        created = expenses.len(),
        failed = errors.len(),
        "Generated hours-based expenses"
    );
    Ok(ok(GeneratedExpenses {
        created: expenses.len(),
        expenses,
        errors,
    }))
}
