use serde::{Deserialize, Serialize};

use super::permissions::{Module, Permission, Role};

/// Claims as they appear in a verified ID token
///
/// Unknown claims are ignored. Custom flags default to `false` when absent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdentityClaims {
    /// Subject (provider user id)
    pub sub: String,

    /// Expiration (Unix timestamp)
    pub exp: i64,

    /// Issued at (Unix timestamp)
    #[serde(default)]
    pub iat: i64,

    /// Email address, when the provider has one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,

    /// Internal access flag
    #[serde(default)]
    pub internal: bool,

    /// Superadmin flag
    #[serde(default)]
    pub superadmin: bool,

    /// Platform role name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,

    /// UI routes the identity may open
    #[serde(default, rename = "allowedRoutes", skip_serializing_if = "Vec::is_empty")]
    pub allowed_routes: Vec<String>,
}

/// Authenticated identity added to request extensions
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Identity {
    pub uid: String,
    pub email: Option<String>,
    pub role: Option<Role>,
    pub internal: bool,
    pub superadmin: bool,
    pub allowed_routes: Vec<String>,
}

impl Identity {
    /// Builds an identity from verified claims
    ///
    /// `superadmin_email` is the single privileged mailbox; an identity whose
    /// email matches it (case-insensitively) is a superadmin even without the
    /// claim. An unrecognised role claim is dropped rather than rejected.
    pub fn from_claims(claims: IdentityClaims, superadmin_email: Option<&str>) -> Self {
        let email_match = match (claims.email.as_deref(), superadmin_email) {
            (Some(email), Some(expected)) => email.eq_ignore_ascii_case(expected),
            _ => false,
        };

        Self {
            uid: claims.sub,
            role: claims.role.as_deref().and_then(|r| r.parse().ok()),
            email: claims.email,
            internal: claims.internal,
            superadmin: claims.superadmin || email_match,
            allowed_routes: claims.allowed_routes,
        }
    }

    /// Superadmin or internal-access holder
    pub fn has_elevated_access(&self) -> bool {
        self.superadmin || self.internal
    }

    /// Checks the permission matrix for this identity's role
    ///
    /// Superadmins pass every check; identities without a role pass none.
    pub fn can(&self, module: Module, permission: Permission) -> bool {
        if self.superadmin {
            return true;
        }

        self.role
            .map(|role| role.can(module, permission))
            .unwrap_or(false)
    }
}
