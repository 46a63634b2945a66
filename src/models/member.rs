use serde::{Deserialize, Serialize};

use crate::auth::session::PermissionSet;
use crate::store::{Document, DocumentStore, StoreError};

/// A project team member as stored at `projects/{projectId}/members/{memberId}`.
/// The document id is the member id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Member {
    #[serde(default, skip_serializing)]
    pub id: String,
    #[serde(default)]
    pub display_name: String,
    #[serde(default)]
    pub email: String,
    /// Project-level role ("owner", "admin", "producer", ...).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub department: Option<String>,
    /// Position inside the department ("HOD", "Coordinator", "1st AC", ...).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position: Option<String>,
    #[serde(default)]
    pub permissions: PermissionSet,
}

impl Member {
    pub fn from_document(doc: &Document) -> Result<Self, StoreError> {
        let mut member: Member = doc.decode()?;
        member.id = doc.id.clone();
        Ok(member)
    }
}

/// The live team of a project: its members and its department names.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Roster {
    pub members: Vec<Member>,
    pub departments: Vec<String>,
}

impl Roster {
    pub fn new(members: Vec<Member>, departments: Vec<String>) -> Self {
        Roster { members, departments }
    }

    pub fn find(&self, member_id: &str) -> Option<&Member> {
        self.members.iter().find(|m| m.id == member_id)
    }

    pub fn contains(&self, member_id: &str) -> bool {
        self.find(member_id).is_some()
    }

    /// Display name for a member id, falling back to the raw id for members
    /// that have left the project or never had a name set.
    pub fn display_name(&self, member_id: &str) -> String {
        match self.find(member_id) {
            Some(m) if !m.display_name.trim().is_empty() => m.display_name.clone(),
            _ => member_id.to_string(),
        }
    }

    pub fn has_department(&self, name: &str) -> bool {
        self.departments.iter().any(|d| same_name(d, name))
    }

    /// Members whose department matches `department` (case-insensitive).
    /// The iterator borrows only the roster, not the name being looked up.
    pub fn department_members<'a>(&'a self, department: &str) -> impl Iterator<Item = &'a Member> + use<'a> {
        let department = department.trim().to_string();
        self.members
            .iter()
            .filter(move |m| m.department.as_deref().is_some_and(|d| same_name(d, &department)))
    }
}

/// Case-insensitive, whitespace-trimmed comparison used for department names.
pub fn same_name(a: &str, b: &str) -> bool {
    a.trim().eq_ignore_ascii_case(b.trim())
}

pub fn project_path(project_id: &str) -> String {
    format!("projects/{project_id}")
}

pub fn members_collection(project_id: &str) -> String {
    format!("projects/{project_id}/members")
}

pub fn member_path(project_id: &str, member_id: &str) -> String {
    format!("projects/{project_id}/members/{member_id}")
}

/// Look up one member of a project.
pub async fn find_member(
    store: &dyn DocumentStore,
    project_id: &str,
    member_id: &str,
) -> Result<Option<Member>, StoreError> {
    match store.get(&member_path(project_id, member_id)).await? {
        Some(doc) => Ok(Some(Member::from_document(&doc)?)),
        None => Ok(None),
    }
}

/// Load the project's members and department list. A missing project
/// document simply means no departments have been defined yet.
pub async fn load_roster(store: &dyn DocumentStore, project_id: &str) -> Result<Roster, StoreError> {
    let departments = match store.get(&project_path(project_id)).await? {
        Some(doc) => doc
            .data
            .get("departments")
            .and_then(|v| v.as_array())
            .map(|items| {
                items
                    .iter()
                    .filter_map(|v| v.as_str())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default(),
        None => Vec::new(),
    };

    let members = store
        .list(&members_collection(project_id))
        .await?
        .iter()
        .map(Member::from_document)
        .collect::<Result<Vec<_>, _>>()?;

    Ok(Roster { members, departments })
}
