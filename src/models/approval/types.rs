use chrono::{DateTime, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

/// The two document types that carry an approval pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum DocumentType {
    PurchaseOrder,
    Invoice,
}

impl DocumentType {
    pub const ALL: [DocumentType; 2] = [DocumentType::PurchaseOrder, DocumentType::Invoice];

    pub fn as_str(self) -> &'static str {
        match self {
            DocumentType::PurchaseOrder => "purchaseOrder",
            DocumentType::Invoice => "invoice",
        }
    }
}

impl FromStr for DocumentType {
    type Err = String;

    /// Accepts the serialized names plus the short `po` form used in URLs.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "po" | "purchaseOrder" | "purchase-order" | "purchase_order" => Ok(DocumentType::PurchaseOrder),
            "invoice" => Ok(DocumentType::Invoice),
            other => Err(format!("Unknown document type '{other}'")),
        }
    }
}

impl fmt::Display for DocumentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Department-level roles that can be named as approvers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DepartmentRole {
    Hod,
    Coordinator,
}

impl DepartmentRole {
    pub fn as_str(self) -> &'static str {
        match self {
            DepartmentRole::Hod => "hod",
            DepartmentRole::Coordinator => "coordinator",
        }
    }

    /// Does a free-form position/role label name this department role?
    pub fn matches_label(self, label: &str) -> bool {
        let normalized = label.trim().to_ascii_lowercase().replace(['_', '-'], " ");
        match self {
            DepartmentRole::Hod => matches!(normalized.as_str(), "hod" | "head of department"),
            DepartmentRole::Coordinator => {
                matches!(normalized.as_str(), "coordinator" | "department coordinator")
            }
        }
    }
}

/// How a step finds its approvers. Serialized as `"fixed"`, `"hod"` or `"coordinator"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum ApproverType {
    #[default]
    Fixed,
    Role(DepartmentRole),
}

impl ApproverType {
    pub const HOD: ApproverType = ApproverType::Role(DepartmentRole::Hod);
    pub const COORDINATOR: ApproverType = ApproverType::Role(DepartmentRole::Coordinator);

    pub fn as_str(self) -> &'static str {
        match self {
            ApproverType::Fixed => "fixed",
            ApproverType::Role(role) => role.as_str(),
        }
    }

    pub fn department_role(self) -> Option<DepartmentRole> {
        match self {
            ApproverType::Fixed => None,
            ApproverType::Role(role) => Some(role),
        }
    }
}

impl TryFrom<String> for ApproverType {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        match value.as_str() {
            "fixed" => Ok(ApproverType::Fixed),
            "hod" => Ok(ApproverType::HOD),
            "coordinator" => Ok(ApproverType::COORDINATOR),
            other => Err(format!("unknown approver type '{other}'")),
        }
    }
}

impl From<ApproverType> for String {
    fn from(value: ApproverType) -> Self {
        value.as_str().to_string()
    }
}

/// Opaque step identifier, stable across reorders.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StepId(pub String);

impl StepId {
    /// Fresh random id of the form `step_<16 hex chars>`.
    pub fn generate() -> Self {
        let mut rng = rand::rng();
        let bytes: [u8; 8] = rng.random();
        StepId(format!("step_{}", hex::encode(bytes)))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for StepId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for StepId {
    fn from(value: &str) -> Self {
        StepId(value.to_string())
    }
}

/// One approval level in a pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApprovalStep {
    pub id: StepId,
    pub order: u32,
    #[serde(default)]
    pub approver_type: ApproverType,
    /// Member ids; only consulted when `approver_type` is `Fixed`.
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub approvers: BTreeSet<String>,
    /// Department name; only consulted for role-based approver types.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub department: Option<String>,
    #[serde(default)]
    pub require_all: bool,
}

impl ApprovalStep {
    /// A blank step: fixed approvers, nobody selected, any-one quorum.
    pub fn new(id: StepId, order: u32) -> Self {
        ApprovalStep {
            id,
            order,
            approver_type: ApproverType::Fixed,
            approvers: BTreeSet::new(),
            department: None,
            require_all: false,
        }
    }
}

/// Both pipelines of a project, each an ordered list of steps.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApprovalPipelines {
    #[serde(default)]
    pub purchase_order: Vec<ApprovalStep>,
    #[serde(default)]
    pub invoice: Vec<ApprovalStep>,
}

impl ApprovalPipelines {
    pub fn steps(&self, doc: DocumentType) -> &[ApprovalStep] {
        match doc {
            DocumentType::PurchaseOrder => &self.purchase_order,
            DocumentType::Invoice => &self.invoice,
        }
    }

    pub fn steps_mut(&mut self, doc: DocumentType) -> &mut Vec<ApprovalStep> {
        match doc {
            DocumentType::PurchaseOrder => &mut self.purchase_order,
            DocumentType::Invoice => &mut self.invoice,
        }
    }

    pub fn contains_step(&self, id: &StepId) -> bool {
        DocumentType::ALL
            .iter()
            .any(|doc| self.steps(*doc).iter().any(|s| &s.id == id))
    }

    /// Sort each pipeline by its stored `order` and rewrite `order` as 1..N.
    /// Ties keep their stored relative position.
    pub fn normalize(&mut self) {
        for doc in DocumentType::ALL {
            let steps = self.steps_mut(doc);
            steps.sort_by_key(|s| s.order);
            renumber(steps);
        }
    }
}

/// Rewrite `order` so it matches list position (1-based).
pub fn renumber(steps: &mut [ApprovalStep]) {
    for (index, step) in steps.iter_mut().enumerate() {
        step.order = index as u32 + 1;
    }
}

/// The persisted configuration record at `projects/{projectId}/settings/approvals`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApprovalConfig {
    #[serde(default)]
    pub po_approvals: Vec<ApprovalStep>,
    #[serde(default)]
    pub invoice_approvals: Vec<ApprovalStep>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub updated_by: Option<String>,
}

impl ApprovalConfig {
    pub fn into_pipelines(self) -> ApprovalPipelines {
        let mut pipelines = ApprovalPipelines {
            purchase_order: self.po_approvals,
            invoice: self.invoice_approvals,
        };
        pipelines.normalize();
        pipelines
    }
}
