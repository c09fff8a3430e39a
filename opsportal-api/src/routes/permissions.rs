/// Permission matrix and access validation endpoints
///
/// - `GET /api/permissions` - Roles, modules and the full matrix, plus the
///   caller's own capabilities
/// - `GET /api/permissions/check?role=&module=&permission=` - One cell of the
///   matrix; unknown names are denied
/// - `POST /api/internal/validate-access` - Echoes the verified identity of a
///   caller that holds internal access
use axum::{extract::Query, Extension, Json};
use opsportal_shared::auth::identity::Identity;
use opsportal_shared::auth::permissions::{
    has_permission, Capability, Module, Permission, PermissionMatrix, Role,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::{ok, Envelope};

/// Module descriptor for the settings screen
#[derive(Debug, Serialize)]
pub struct ModuleInfo {
    pub id: Module,
    pub label: &'static str,
    pub finance: bool,
}

#[derive(Debug, Serialize)]
pub struct PermissionsResponse {
    pub roles: Vec<Role>,
    pub modules: Vec<ModuleInfo>,
    /// `role -> module -> {view, edit}`
    pub matrix: BTreeMap<&'static str, BTreeMap<&'static str, Capability>>,
    /// The caller's capabilities; everything for a superadmin
    pub current: BTreeMap<&'static str, Capability>,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct PermissionCheck {
    pub role: String,
    pub module: String,
    pub permission: Permission,
}

#[derive(Debug, Serialize)]
pub struct PermissionCheckResponse {
    #[serde(flatten)]
    pub check: PermissionCheck,
    pub allowed: bool,
}

#[derive(Debug, Serialize)]
pub struct ValidateAccessResponse {
    pub valid: bool,
    pub user: Identity,
}

pub async fn get_permissions(
    Extension(identity): Extension<Identity>,
) -> Json<Envelope<PermissionsResponse>> {
    let mut matrix: BTreeMap<&'static str, BTreeMap<&'static str, Capability>> = BTreeMap::new();
    for (role, module, capability) in PermissionMatrix::entries() {
        matrix
            .entry(role.as_str())
            .or_default()
            .insert(module.as_str(), capability);
    }

    let current = Module::ALL
        .into_iter()
        .map(|module| {
            let capability = Capability {
                view: identity.can(module, Permission::View),
                edit: identity.can(module, Permission::Edit),
            };
            (module.as_str(), capability)
        })
        .collect();

    ok(PermissionsResponse {
        roles: Role::ALL.to_vec(),
        modules: Module::ALL
            .into_iter()
            .map(|module| ModuleInfo {
                id: module,
                label: module.label(),
                finance: module.is_finance(),
            })
            .collect(),
        matrix,
        current,
    })
}

pub async fn check_permission(
    Query(check): Query<PermissionCheck>,
) -> Json<Envelope<PermissionCheckResponse>> {
    let allowed = has_permission(&check.role, &check.module, check.permission);
    ok(PermissionCheckResponse { check, allowed })
}

pub async fn validate_access(
    Extension(identity): Extension<Identity>,
) -> Json<Envelope<ValidateAccessResponse>> {
    tracing::info!(uid = %identity.uid, superadmin = identity.superadmin, "Internal access validated");

    ok(ValidateAccessResponse {
        valid: true,
        user: identity,
    })
}
