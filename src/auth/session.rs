use actix_session::Session;
use serde::{Deserialize, Serialize};

use crate::errors::AppError;
use crate::models::member;
use crate::store::DocumentStore;

/// Session key under which the external auth gateway stores the signed-in user id.
pub const USER_ID_KEY: &str = "user_id";

/// A single grantable permission flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Permission {
    Accounting,
    ManageTeam,
    ManageDepartments,
}

/// Closed set of permission flags carried on a member document.
/// Missing flags deserialize as `false`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PermissionSet {
    pub accounting: bool,
    pub manage_team: bool,
    pub manage_departments: bool,
}

impl PermissionSet {
    pub fn has(&self, permission: Permission) -> bool {
        match permission {
            Permission::Accounting => self.accounting,
            Permission::ManageTeam => self.manage_team,
            Permission::ManageDepartments => self.manage_departments,
        }
    }
}

/// Role of a member within one project.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ProjectRole {
    Owner,
    Admin,
    Producer,
    #[default]
    Crew,
}

impl ProjectRole {
    /// Parse the free-form role stored on a member document. Anything
    /// unrecognised (or absent) is ordinary crew.
    pub fn parse(role: Option<&str>) -> Self {
        match role.map(|r| r.trim().to_ascii_lowercase()).as_deref() {
            Some("owner") => ProjectRole::Owner,
            Some("admin") => ProjectRole::Admin,
            Some("producer") => ProjectRole::Producer,
            _ => ProjectRole::Crew,
        }
    }

    pub fn is_elevated(self) -> bool {
        match self {
            ProjectRole::Owner | ProjectRole::Admin | ProjectRole::Producer => true,
            ProjectRole::Crew => false,
        }
    }
}

/// Who is acting, in which project, with what rights. Built once per request
/// at the handler boundary and passed down explicitly.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionContext {
    pub user_id: String,
    pub project_id: String,
    pub role: ProjectRole,
    pub permissions: PermissionSet,
}

impl SessionContext {
    /// Resolve the signed-in user's membership in `project_id`.
    /// Non-members are denied outright.
    pub async fn for_project(
        store: &dyn DocumentStore,
        session: &Session,
        project_id: &str,
    ) -> Result<Self, AppError> {
        let user_id = get_user_id(session)
            .ok_or_else(|| AppError::Session("Not authenticated".to_string()))?;
        let member = member::find_member(store, project_id, &user_id)
            .await?
            .ok_or_else(|| {
                AppError::PermissionDenied(format!("Not a member of project {project_id}"))
            })?;
        Ok(SessionContext {
            user_id,
            project_id: project_id.to_string(),
            role: ProjectRole::parse(member.role.as_deref()),
            permissions: member.permissions,
        })
    }

    /// Viewing or editing approval pipelines needs the accounting flag or an
    /// elevated project role.
    pub fn can_manage_approvals(&self) -> bool {
        self.permissions.has(Permission::Accounting) || self.role.is_elevated()
    }

    pub fn require_approvals_access(&self) -> Result<(), AppError> {
        if self.can_manage_approvals() {
            Ok(())
        } else {
            log::warn!(
                "User {} denied approval settings access in project {}",
                self.user_id,
                self.project_id
            );
            Err(AppError::PermissionDenied("accounting".to_string()))
        }
    }
}

pub fn get_user_id(session: &Session) -> Option<String> {
    session
        .get::<String>(USER_ID_KEY)
        .unwrap_or(None)
        .filter(|id| !id.is_empty())
}
