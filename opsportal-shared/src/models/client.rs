//! Billing client model (`clientes`)

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;

use crate::repository::{Repository, Stored};
use crate::store::{DocumentStore, Fields, StoreResult};

/// Collection holding clients
pub const COLLECTION: &str = "clientes";

/// Billing client
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Client {
    #[serde(rename = "empresa", skip_serializing_if = "Option::is_none")]
    pub company: Option<String>,

    #[serde(rename = "personaCobranza", skip_serializing_if = "Option::is_none")]
    pub billing_contact: Option<String>,

    #[serde(rename = "correoCobranza", skip_serializing_if = "Option::is_none")]
    pub billing_email: Option<String>,

    /// Extra recipients copied on billing mail
    #[serde(rename = "ccCobranza", skip_serializing_if = "Option::is_none")]
    pub billing_cc: Option<String>,

    #[serde(rename = "cuentaPago", skip_serializing_if = "Option::is_none")]
    pub payment_account: Option<String>,

    #[serde(rename = "datosPago", skip_serializing_if = "Option::is_none")]
    pub payment_details: Option<String>,

    #[serde(rename = "razonSocial", skip_serializing_if = "Option::is_none")]
    pub legal_name: Option<String>,

    /// Mexican taxpayer id (RFC)
    #[serde(rename = "rfc", skip_serializing_if = "Option::is_none")]
    pub tax_id: Option<String>,

    #[serde(rename = "cp", skip_serializing_if = "Option::is_none")]
    pub postal_code: Option<String>,

    #[serde(rename = "regimenFiscal", skip_serializing_if = "Option::is_none")]
    pub tax_regime: Option<String>,

    /// CFDI usage code printed on invoices
    #[serde(rename = "usoCFDI", skip_serializing_if = "Option::is_none")]
    pub cfdi_use: Option<String>,

    #[serde(rename = "calle", skip_serializing_if = "Option::is_none")]
    pub street: Option<String>,

    #[serde(rename = "colonia", skip_serializing_if = "Option::is_none")]
    pub neighborhood: Option<String>,

    #[serde(rename = "localidad", skip_serializing_if = "Option::is_none")]
    pub locality: Option<String>,

    #[serde(rename = "noExterior", skip_serializing_if = "Option::is_none")]
    pub exterior_number: Option<String>,

    #[serde(rename = "noInterior", skip_serializing_if = "Option::is_none")]
    pub interior_number: Option<String>,

    #[serde(rename = "municipio", skip_serializing_if = "Option::is_none")]
    pub municipality: Option<String>,

    #[serde(rename = "estado", skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,

    #[serde(rename = "pais", skip_serializing_if = "Option::is_none")]
    pub country: Option<String>,

    /// Keys without a typed field
    #[serde(flatten)]
    pub extra: Fields,
}

impl Client {
    pub fn repository(store: Arc<dyn DocumentStore>) -> Repository<Client> {
        Repository::new(store, COLLECTION)
    }

    /// Looks a client up by taxpayer id
    pub async fn find_by_tax_id(
        repo: &Repository<Client>,
        tax_id: &str,
    ) -> StoreResult<Option<Stored<Client>>> {
        repo.find_one_by("rfc", Value::String(tax_id.to_string()))
            .await
    }

    /// Looks a client up by company name
    pub async fn find_by_company(
        repo: &Repository<Client>,
        company: &str,
    ) -> StoreResult<Option<Stored<Client>>> {
        repo.find_one_by("empresa", Value::String(company.to_string()))
            .await
    }
}
