//! Role/module permission matrix
//!
//! Lookups by free-form strings are total: anything that does not parse to a
//! known role or module is denied.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Platform roles assigned to identities out-of-band
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Full access to every module
    Admin,

    /// Project manager
    Pm,

    /// Developer
    Developer,

    /// Quality assurance
    Qa,

    /// External client with read access to deliverables
    Client,
}

impl Role {
    /// Every role, in display order
    pub const ALL: [Role; 5] = [Role::Admin, Role::Pm, Role::Developer, Role::Qa, Role::Client];

    /// Converts role to its wire name
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Pm => "pm",
            Role::Developer => "developer",
            Role::Qa => "qa",
            Role::Client => "client",
        }
    }

    /// Shorthand for [`PermissionMatrix::allows`] against the compiled table
    pub fn can(&self, module: Module, permission: Permission) -> bool {
        PermissionMatrix::allows(*self, module, permission)
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when a role or module name is not recognised
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Unknown {kind}: {value}")]
pub struct UnknownName {
    kind: &'static str,
    value: String,
}

impl FromStr for Role {
    type Err = UnknownName;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Role::ALL
            .into_iter()
            .find(|role| role.as_str() == s)
            .ok_or_else(|| UnknownName {
                kind: "role",
                value: s.to_string(),
            })
    }
}

/// Functional areas of the platform guarded by the matrix
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Module {
    Backlog,
    GithubMetrics,
    TogglHours,
    TaskAssignment,
    QaManagement,
    StatusReports,
    Warranty,
    Documentation,
    CalendarSync,
    ProjectSettings,
    AiGenerator,
    FinanceDashboard,
    FinanceClients,
    FinanceInvoices,
    FinanceComplements,
    FinanceExpenses,
    FinancePayroll,
    FinanceReports,
}

impl Module {
    /// Every module, in matrix column order
    pub const ALL: [Module; 18] = [
        Module::Backlog,
        Module::GithubMetrics,
        Module::TogglHours,
        Module::TaskAssignment,
        Module::QaManagement,
        Module::StatusReports,
        Module::Warranty,
        Module::Documentation,
        Module::CalendarSync,
        Module::ProjectSettings,
        Module::AiGenerator,
        Module::FinanceDashboard,
        Module::FinanceClients,
        Module::FinanceInvoices,
        Module::FinanceComplements,
        Module::FinanceExpenses,
        Module::FinancePayroll,
        Module::FinanceReports,
    ];

    /// Wire name (camelCase, as stored in role documents and sent to the UI)
    pub fn as_str(&self) -> &'static str {
        match self {
            Module::Backlog => "backlog",
            Module::GithubMetrics => "githubMetrics",
            Module::TogglHours => "togglHours",
            Module::TaskAssignment => "taskAssignment",
            Module::QaManagement => "qaManagement",
            Module::StatusReports => "statusReports",
            Module::Warranty => "warranty",
            Module::Documentation => "documentation",
            Module::CalendarSync => "calendarSync",
            Module::ProjectSettings => "projectSettings",
            Module::AiGenerator => "aiGenerator",
            Module::FinanceDashboard => "financeDashboard",
            Module::FinanceClients => "financeClients",
            Module::FinanceInvoices => "financeInvoices",
            Module::FinanceComplements => "financeComplements",
            Module::FinanceExpenses => "financeExpenses",
            Module::FinancePayroll => "financePayroll",
            Module::FinanceReports => "financeReports",
        }
    }

    /// Human-readable label shown in the settings screen
    pub fn label(&self) -> &'static str {
        match self {
            Module::Backlog => "Backlog Scrum",
            Module::GithubMetrics => "Métricas GitHub",
            Module::TogglHours => "Horas Toggl",
            Module::TaskAssignment => "Asignación de Tasks",
            Module::QaManagement => "Gestión QA",
            Module::StatusReports => "Status Reports",
            Module::Warranty => "Garantía",
            Module::Documentation => "Documentación",
            Module::CalendarSync => "Sincronización Calendar",
            Module::ProjectSettings => "Configuración Proyecto",
            Module::AiGenerator => "Generador IA",
            Module::FinanceDashboard => "Dashboard Finanzas",
            Module::FinanceClients => "Clientes",
            Module::FinanceInvoices => "Facturas",
            Module::FinanceComplements => "Complementos de Pago",
            Module::FinanceExpenses => "Egresos",
            Module::FinancePayroll => "Nómina",
            Module::FinanceReports => "Reportes Financieros",
        }
    }

    /// Whether the module belongs to the finance area
    pub fn is_finance(&self) -> bool {
        matches!(
            self,
            Module::FinanceDashboard
                | Module::FinanceClients
                | Module::FinanceInvoices
                | Module::FinanceComplements
                | Module::FinanceExpenses
                | Module::FinancePayroll
                | Module::FinanceReports
        )
    }
}

impl fmt::Display for Module {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Module {
    type Err = UnknownName;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Module::ALL
            .into_iter()
            .find(|module| module.as_str() == s)
            .ok_or_else(|| UnknownName {
                kind: "module",
                value: s.to_string(),
            })
    }
}

/// Permission being checked
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Permission {
    /// Read access
    View,

    /// Write access
    Edit,
}

/// Capability bits granted to a role on a module
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Capability {
    pub view: bool,
    pub edit: bool,
}

impl Capability {
    const NONE: Capability = Capability { view: false, edit: false };
    const VIEW: Capability = Capability { view: true, edit: false };
    const EDIT: Capability = Capability { view: true, edit: true };

    /// Checks a single bit
    pub fn grants(&self, permission: Permission) -> bool {
        match permission {
            Permission::View => self.view,
            Permission::Edit => self.edit,
        }
    }
}

const N: Capability = Capability::NONE;
const V: Capability = Capability::VIEW;
const E: Capability = Capability::EDIT;

// Rows follow `Role::ALL`, columns follow `Module::ALL`.
const MATRIX: [[Capability; 18]; 5] = [
    // admin
    [E, E, E, E, E, E, E, E, E, E, E, E, E, E, E, E, E, E],
    // pm
    [E, V, V, E, E, E, E, E, E, V, E, V, V, V, V, V, N, V],
    // developer
    [V, V, V, N, V, N, V, V, V, N, N, N, N, N, N, N, N, N],
    // qa
    [V, N, N, N, E, N, V, V, V, N, N, N, N, N, N, N, N, N],
    // client
    [N, N, N, N, N, V, V, V, N, N, N, N, N, N, N, N, N, N],
];

/// Read-only view over the compiled permission table
pub struct PermissionMatrix;

impl PermissionMatrix {
    /// Capability of `role` on `module`
    pub fn capability(role: Role, module: Module) -> Capability {
        let row = Role::ALL.iter().position(|r| *r == role);
        let col = Module::ALL.iter().position(|m| *m == module);

        match (row, col) {
            (Some(row), Some(col)) => MATRIX[row][col],
            _ => Capability::NONE,
        }
    }

    /// Typed permission check
    pub fn allows(role: Role, module: Module, permission: Permission) -> bool {
        Self::capability(role, module).grants(permission)
    }

    /// Every cell of the table as `(role, module, capability)`
    pub fn entries() -> impl Iterator<Item = (Role, Module, Capability)> {
        Role::ALL.into_iter().flat_map(|role| {
            Module::ALL
                .into_iter()
                .map(move |module| (role, module, Self::capability(role, module)))
        })
    }
}

/// String-level permission check
///
/// Unknown roles or modules are denied rather than reported as errors.
pub fn has_permission(role: &str, module: &str, permission: Permission) -> bool {
    match (role.parse::<Role>(), module.parse::<Module>()) {
        (Ok(role), Ok(module)) => PermissionMatrix::allows(role, module, permission),
        _ => false,
    }
}
