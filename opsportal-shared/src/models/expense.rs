//! Expense ledger (`egresos`)
//!
//! Generation turns finished work with `actualHours` into hours-based
//! expenses, skipping work already expensed in the same month.

use chrono::{DateTime, Datelike, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;

use super::feature::Feature;
use super::hourly_rate::HourlyRate;
use super::team_task::TeamTask;
use super::wire_name;
use crate::repository::{Repository, Stored};
use crate::store::{DocumentStore, Fields};

pub const COLLECTION: &str = "egresos";

const MONTHS: [&str; 12] = [
    "Enero",
    "Febrero",
    "Marzo",
    "Abril",
    "Mayo",
    "Junio",
    "Julio",
    "Agosto",
    "Septiembre",
    "Octubre",
    "Noviembre",
    "Diciembre",
];

/// Ledger month label, e.g. `Octubre 2026`
pub fn month_label(at: DateTime<Utc>) -> String {
    format!("{} {}", MONTHS[at.month0() as usize], at.year())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExpenseStatus {
    #[serde(rename = "Pagado")]
    Paid,
    #[serde(rename = "Pendiente")]
    Pending,
    #[serde(rename = "Cancelado")]
    Cancelled,
}

/// Recurring or one-off
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExpenseKind {
    Variable,
    #[serde(rename = "Fijo")]
    Fixed,
}

/// How the amount was arrived at
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExpenseBasis {
    #[serde(rename = "basadoEnHoras")]
    Hours,
    #[serde(rename = "otro")]
    Other,
}

/// Kind of work an hours-based expense pays for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum WorkSource {
    TeamTask,
    Feature,
}

/// Expense document
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Expense {
    #[serde(rename = "lineaNegocio", skip_serializing_if = "Option::is_none")]
    pub business_line: Option<String>,

    #[serde(rename = "categoria", skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,

    #[serde(rename = "empresa", skip_serializing_if = "Option::is_none")]
    pub company: Option<String>,

    /// Person or team paid
    #[serde(rename = "equipo", skip_serializing_if = "Option::is_none")]
    pub team: Option<String>,

    #[serde(rename = "concepto", skip_serializing_if = "Option::is_none")]
    pub concept: Option<String>,

    pub subtotal: f64,

    /// VAT amount
    pub iva: f64,

    pub total: f64,

    #[serde(rename = "tipo", skip_serializing_if = "Option::is_none")]
    pub kind: Option<ExpenseKind>,

    /// Ledger month, see [`month_label`]
    #[serde(rename = "mes", skip_serializing_if = "Option::is_none")]
    pub month: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<ExpenseStatus>,

    /// Invoice document link
    #[serde(rename = "factura", skip_serializing_if = "Option::is_none")]
    pub invoice: Option<String>,

    /// Proof of payment link
    #[serde(rename = "comprobante", skip_serializing_if = "Option::is_none")]
    pub receipt: Option<String>,

    #[serde(rename = "fechaPago", skip_serializing_if = "Option::is_none")]
    pub paid_on: Option<String>,

    #[serde(rename = "tipoEgreso", skip_serializing_if = "Option::is_none")]
    pub basis: Option<ExpenseBasis>,

    #[serde(rename = "persona", skip_serializing_if = "Option::is_none")]
    pub person: Option<String>,

    #[serde(rename = "tarea", skip_serializing_if = "Option::is_none")]
    pub task_title: Option<String>,

    #[serde(rename = "horas", skip_serializing_if = "Option::is_none")]
    pub hours: Option<f64>,

    #[serde(rename = "precioPorHora", skip_serializing_if = "Option::is_none")]
    pub hourly_rate: Option<f64>,

    #[serde(rename = "tareaId", skip_serializing_if = "Option::is_none")]
    pub task_id: Option<String>,

    #[serde(rename = "featureId", skip_serializing_if = "Option::is_none")]
    pub feature_id: Option<String>,

    #[serde(rename = "tareaTipo", skip_serializing_if = "Option::is_none")]
    pub source: Option<WorkSource>,

    #[serde(rename = "aplicarIva")]
    pub apply_vat: bool,

    #[serde(rename = "proyectoIds", skip_serializing_if = "Vec::is_empty")]
    pub project_ids: Vec<String>,

    #[serde(flatten)]
    pub extra: Fields,
}

/// List filters; every filter given must match
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExpenseFilter {
    pub status: Option<String>,
    pub tipo: Option<String>,
    pub mes: Option<String>,
    pub categoria: Option<String>,
    pub linea_negocio: Option<String>,
    pub tipo_egreso: Option<String>,
}

impl ExpenseFilter {
    pub fn matches(&self, expense: &Expense) -> bool {
        fn check(filter: &Option<String>, value: Option<String>) -> bool {
            match filter.as_deref().filter(|f| !f.is_empty()) {
                Some(expected) => value.as_deref() == Some(expected),
                None => true,
            }
        }

        check(&self.status, expense.status.map(|s| wire_name(&s)))
            && check(&self.tipo, expense.kind.map(|k| wire_name(&k)))
            && check(&self.mes, expense.month.clone())
            && check(&self.categoria, expense.category.clone())
            && check(&self.linea_negocio, expense.business_line.clone())
            && check(&self.tipo_egreso, expense.basis.map(|b| wire_name(&b)))
    }
}

/// A finished feature together with the project it belongs to
#[derive(Debug, Clone)]
pub struct ProjectFeature {
    pub project_id: String,
    pub project_name: String,
    pub feature: Stored<Feature>,
}

/// Keys of the work already expensed, from existing expenses
pub fn expensed_work(existing: &[Stored<Expense>]) -> HashSet<(WorkSource, String)> {
    let mut keys = HashSet::new();
    for expense in existing {
        if let Some(id) = &expense.data.task_id {
            keys.insert((WorkSource::TeamTask, id.clone()));
        }
        if let Some(id) = &expense.data.feature_id {
            keys.insert((WorkSource::Feature, id.clone()));
        }
    }
    keys
}

fn handle(email: &str) -> &str {
    email.split('@').next().unwrap_or(email)
}

/// Hours-based expenses owed to `person` for finished work
///
/// `tasks` and `features` are expected to be the person's finished work.
/// Items without hours, or already in `expensed`, produce nothing. The
/// amount is `rate.cost(hours)`, with no VAT.
pub fn hours_based_expenses(
    person: &str,
    rate: &HourlyRate,
    month: &str,
    tasks: &[Stored<TeamTask>],
    features: &[ProjectFeature],
    expensed: &HashSet<(WorkSource, String)>,
) -> Vec<Expense> {
    let base = |title: &str, hours: f64, subtotal: f64| Expense {
        team: Some(person.to_string()),
        concept: Some(format!("{} - {}", handle(person), title)),
        subtotal,
        iva: 0.0,
        total: subtotal,
        kind: Some(ExpenseKind::Variable),
        month: Some(month.to_string()),
        status: Some(ExpenseStatus::Pending),
        basis: Some(ExpenseBasis::Hours),
        person: Some(person.to_string()),
        task_title: Some(title.to_string()),
        hours: Some(hours),
        hourly_rate: rate.rate,
        apply_vat: false,
        ..Default::default()
    };

    let mut expenses = Vec::new();

    for task in tasks {
        if expensed.contains(&(WorkSource::TeamTask, task.id.clone())) {
            continue;
        }
        let hours = task.data.actual_hours.unwrap_or(0.0);
        let Some(subtotal) = rate.cost(hours).filter(|_| hours > 0.0) else {
            continue;
        };

        expenses.push(Expense {
            business_line: Some(String::new()),
            category: Some(wire_name(&task.data.category)),
            company: Some(String::new()),
            task_id: Some(task.id.clone()),
            source: Some(WorkSource::TeamTask),
            ..base(&task.data.title, hours, subtotal)
        });
    }

    for item in features {
        if expensed.contains(&(WorkSource::Feature, item.feature.id.clone())) {
            continue;
        }
        let hours = item.feature.data.actual_hours.unwrap_or(0.0);
        let Some(subtotal) = rate.cost(hours).filter(|_| hours > 0.0) else {
            continue;
        };

        expenses.push(Expense {
            business_line: Some(String::new()),
            category: Some("Funcionalidades".to_string()),
            company: Some(item.project_name.clone()),
            feature_id: Some(item.feature.id.clone()),
            source: Some(WorkSource::Feature),
            project_ids: vec![item.project_id.clone()],
            ..base(&item.feature.data.title, hours, subtotal)
        });
    }

    expenses
}

impl Expense {
    pub fn repository(store: Arc<dyn DocumentStore>) -> Repository<Expense> {
        Repository::new(store, COLLECTION)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::feature::{FeatureStatus, NewFeature};
    use crate::models::team_task::{TeamTaskCategory, TeamTaskStatus};
    use chrono::TimeZone;
    use serde_json::json;

    fn stored<T>(id: &str, data: T) -> Stored<T> {
        Stored {
            id: id.to_string(),
            data,
            created_at: None,
            updated_at: None,
        }
    }

    fn task(id: &str, hours: Option<f64>) -> Stored<TeamTask> {
        let mut task = TeamTask::new("Conciliar pagos", TeamTaskCategory::Pagos, "pm@x.com");
        task.status = TeamTaskStatus::Completed;
        task.actual_hours = hours;
        stored(id, task)
    }

    fn feature(id: &str, hours: f64) -> ProjectFeature {
        let req: NewFeature =
            serde_json::from_value(json!({ "epicTitle": "E", "title": "Checkout" })).unwrap();
        let mut feature = Feature::from_request("p1", req, "pm@x.com");
        feature.status = FeatureStatus::Done;
        feature.actual_hours = Some(hours);
        ProjectFeature {
            project_id: "p1".to_string(),
            project_name: "Portal".to_string(),
            feature: stored(id, feature),
        }
    }

    fn rate(per_hour: f64) -> HourlyRate {
        HourlyRate {
            person_email: Some("ana@x.com".to_string()),
            rate: Some(per_hour),
            ..Default::default()
        }
    }

    #[test]
    fn test_month_label() {
        let at = Utc.with_ymd_and_hms(2026, 10, 19, 12, 0, 0).unwrap();
        assert_eq!(month_label(at), "Octubre 2026");
        let at = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
        assert_eq!(month_label(at), "Enero 2025");
    }

    #[test]
    fn test_hours_based_expenses() {
        let expenses = hours_based_expenses(
            "ana@x.com",
            &rate(300.0),
            "Octubre 2026",
            &[task("TASK-1", Some(2.5)), task("TASK-2", None)],
            &[feature("P-P1-1", 4.0)],
            &HashSet::new(),
        );

        assert_eq!(expenses.len(), 2);
        let from_task = &expenses[0];
        assert_eq!(from_task.total, 750.0);
        assert_eq!(from_task.iva, 0.0);
        assert_eq!(from_task.concept.as_deref(), Some("ana - Conciliar pagos"));
        assert_eq!(from_task.category.as_deref(), Some("Pagos"));
        assert_eq!(from_task.source, Some(WorkSource::TeamTask));
        assert_eq!(from_task.status, Some(ExpenseStatus::Pending));

        let from_feature = &expenses[1];
        assert_eq!(from_feature.total, 1200.0);
        assert_eq!(from_feature.company.as_deref(), Some("Portal"));
        assert_eq!(from_feature.project_ids, ["p1"]);
        assert_eq!(from_feature.feature_id.as_deref(), Some("P-P1-1"));
    }

    #[test]
    fn test_already_expensed_work_is_skipped() {
        let existing = vec![stored(
            "e1",
            Expense {
                task_id: Some("TASK-1".to_string()),
                ..Default::default()
            },
        )];
        let expenses = hours_based_expenses(
            "ana@x.com",
            &rate(300.0),
            "Octubre 2026",
            &[task("TASK-1", Some(2.5))],
            &[],
            &expensed_work(&existing),
        );
        assert!(expenses.is_empty());
    }

    #[test]
    fn test_wire_names_and_filter() {
        let expense: Expense = serde_json::from_value(json!({
            "concepto": "Licencias",
            "subtotal": 100,
            "iva": 16,
            "total": 116,
            "tipo": "Fijo",
            "mes": "Enero 2025",
            "status": "Pagado",
            "tipoEgreso": "otro",
            "aplicarIva": true
        }))
        .unwrap();

        assert_eq!(expense.kind, Some(ExpenseKind::Fixed));
        assert_eq!(expense.basis, Some(ExpenseBasis::Other));
        assert!(expense.apply_vat);

        let paid_fixed = ExpenseFilter {
            status: Some("Pagado".to_string()),
            tipo: Some("Fijo".to_string()),
            ..Default::default()
        };
        assert!(paid_fixed.matches(&expense));

        let hours_only = ExpenseFilter {
            tipo_egreso: Some("basadoEnHoras".to_string()),
            ..Default::default()
        };
        assert!(!hours_only.matches(&expense));
    }
}
