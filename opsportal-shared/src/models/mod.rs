//! Entity models, one module per collection

pub mod client;
pub mod expense;
pub mod feature;
pub mod hourly_rate;
pub mod project;
pub mod qa_task;
pub mod team_task;

use chrono::{DateTime, NaiveDate, NaiveTime, TimeZone, Utc};
use serde::{Deserialize, Deserializer, Serialize};

/// Work item priority
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    High,
    #[default]
    Medium,
    Low,
}

/// Category shared by features and QA tasks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WorkCategory {
    #[serde(rename = "Funcionalidad")]
    Functionality,
    #[serde(rename = "QA")]
    Qa,
    #[serde(rename = "Bugs Generales")]
    GeneralBugs,
    #[serde(rename = "Otra")]
    Other,
}

/// Kind of backlog item
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WorkType {
    #[serde(rename = "Funcionalidad")]
    Functionality,
    #[serde(rename = "QA")]
    Qa,
    #[serde(rename = "Bug")]
    Bug,
}

/// Wire name of a serde unit variant
///
/// Used where an enum value has to be compared against a query string or
/// written into an untyped patch.
pub fn wire_name<T: Serialize>(value: &T) -> String {
    match serde_json::to_value(value) {
        Ok(serde_json::Value::String(s)) => s,
        _ => String::new(),
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum DateInput {
    DateTime(DateTime<Utc>),
    Date(NaiveDate),
}

/// Deserializes an optional RFC 3339 timestamp or a `YYYY-MM-DD` date
///
/// Dates are taken as midnight UTC.
pub fn date_or_datetime<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<DateInput>::deserialize(deserializer)? {
        Some(DateInput::DateTime(at)) => Some(at),
        Some(DateInput::Date(date)) => Some(Utc.from_utc_datetime(&date.and_time(NaiveTime::MIN))),
        None => None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_names() {
        assert_eq!(wire_name(&Priority::High), "high");
        assert_eq!(wire_name(&WorkCategory::GeneralBugs), "Bugs Generales");
        assert_eq!(wire_name(&WorkType::Bug), "Bug");
    }

    #[derive(Deserialize)]
    struct Due {
        #[serde(default, deserialize_with = "date_or_datetime")]
        due: Option<DateTime<Utc>>,
    }

    #[test]
    fn test_date_or_datetime() {
        let midnight: Due = serde_json::from_str(r#"{ "due": "2024-05-01" }"#).unwrap();
        assert_eq!(
            midnight.due.map(|d| d.to_rfc3339()),
            Some("2024-05-01T00:00:00+00:00".to_string())
        );

        let exact: Due = serde_json::from_str(r#"{ "due": "2024-05-01T15:30:00-06:00" }"#).unwrap();
        assert_eq!(
            exact.due.map(|d| d.to_rfc3339()),
            Some("2024-05-01T21:30:00+00:00".to_string())
        );

        assert!(serde_json::from_str::<Due>(r#"{}"#).unwrap().due.is_none());
        assert!(serde_json::from_str::<Due>(r#"{ "due": null }"#).unwrap().due.is_none());
        assert!(serde_json::from_str::<Due>(r#"{ "due": "mañana" }"#).is_err());
    }

    #[test]
    fn test_priority_defaults_to_medium() {
        assert_eq!(Priority::default(), Priority::Medium);
    }
}
