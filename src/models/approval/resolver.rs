//! Turning configured steps into concrete approver sets.
//!
//! Resolution always runs against the live roster, so a step never carries
//! stale authority: members who left the project drop out of fixed steps, and
//! department roles are looked up afresh each time. Broken references degrade
//! to an empty approver set instead of an error; an empty set can never meet
//! its quorum, which leaves the step stuck.

use serde::Serialize;
use std::collections::BTreeSet;

use super::types::{ApprovalStep, ApproverType, DepartmentRole, StepId};
use crate::models::member::{Member, Roster};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Quorum {
    /// Every resolved approver must approve.
    All,
    /// One approval from any resolved approver is enough.
    Any,
}

impl Quorum {
    pub fn from_require_all(require_all: bool) -> Self {
        if require_all { Quorum::All } else { Quorum::Any }
    }
}

/// A step's approvers at one instant, with the rule for satisfying it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolvedStep {
    pub step_id: StepId,
    pub order: u32,
    pub approvers: BTreeSet<String>,
    pub quorum: Quorum,
}

impl ResolvedStep {
    /// No one can approve this step, so it can never be satisfied.
    pub fn is_stuck(&self) -> bool {
        self.approvers.is_empty()
    }

    pub fn can_approve(&self, member_id: &str) -> bool {
        self.approvers.contains(member_id)
    }

    /// Has the quorum been met by `approvals`? Approvals from people outside
    /// the resolved set do not count.
    pub fn is_satisfied(&self, approvals: &BTreeSet<String>) -> bool {
        if self.is_stuck() {
            return false;
        }
        match self.quorum {
            Quorum::All => self.approvers.iter().all(|a| approvals.contains(a)),
            Quorum::Any => self.approvers.iter().any(|a| approvals.contains(a)),
        }
    }
}

fn is_department_leader(member: &Member, role: DepartmentRole) -> bool {
    [member.position.as_deref(), member.role.as_deref()]
        .into_iter()
        .flatten()
        .any(|label| role.matches_label(label))
}

/// Members of `department` holding `role`. Zero, one or many may match;
/// leadership is not assumed to be unique.
fn department_leaders<'a>(roster: &'a Roster, department: &str, role: DepartmentRole) -> Vec<&'a Member> {
    if !roster.has_department(department) {
        return Vec::new();
    }
    roster
        .department_members(department)
        .filter(|m| is_department_leader(m, role))
        .collect()
}

pub fn resolve_step(step: &ApprovalStep, roster: &Roster) -> ResolvedStep {
    let approvers = match step.approver_type {
        ApproverType::Fixed => step
            .approvers
            .iter()
            .filter(|id| roster.contains(id))
            .cloned()
            .collect(),
        ApproverType::Role(role) => match step.department.as_deref() {
            Some(department) if !department.trim().is_empty() => department_leaders(roster, department, role)
                .into_iter()
                .map(|m| m.id.clone())
                .collect(),
            _ => BTreeSet::new(),
        },
    };
    ResolvedStep {
        step_id: step.id.clone(),
        order: step.order,
        approvers,
        quorum: Quorum::from_require_all(step.require_all),
    }
}

pub fn resolve_pipeline(steps: &[ApprovalStep], roster: &Roster) -> Vec<ResolvedStep> {
    steps.iter().map(|s| resolve_step(s, roster)).collect()
}

/// Advisory findings about a step's configuration. None of these block saving.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "issue", rename_all = "camelCase")]
pub enum StepIssue {
    #[serde(rename_all = "camelCase")]
    StaleApprover { member_id: String },
    NoApproversSelected,
    MissingDepartment,
    UnknownDepartment { department: String },
    NoDepartmentLeader { department: String, role: &'static str },
}

pub fn review_step(step: &ApprovalStep, roster: &Roster) -> Vec<StepIssue> {
    let mut issues = Vec::new();
    match step.approver_type {
        ApproverType::Fixed => {
            if step.approvers.is_empty() {
                issues.push(StepIssue::NoApproversSelected);
            }
            for id in step.approvers.iter().filter(|id| !roster.contains(id)) {
                issues.push(StepIssue::StaleApprover { member_id: id.clone() });
            }
        }
        ApproverType::Role(role) => match step.department.as_deref().map(str::trim) {
            None | Some("") => issues.push(StepIssue::MissingDepartment),
            Some(department) if !roster.has_department(department) => {
                issues.push(StepIssue::UnknownDepartment { department: department.to_string() });
            }
            Some(department) => {
                if department_leaders(roster, department, role).is_empty() {
                    issues.push(StepIssue::NoDepartmentLeader {
                        department: department.to_string(),
                        role: role.as_str(),
                    });
                }
            }
        },
    }
    issues
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApproverLabel {
    pub id: String,
    pub display_name: String,
}

/// A step as the editor shows it: the stored step, who it currently
/// resolves to, and what looks wrong with it.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StepPreview {
    #[serde(flatten)]
    pub step: ApprovalStep,
    pub selected: Vec<ApproverLabel>,
    pub resolved_approvers: Vec<ApproverLabel>,
    pub quorum: Quorum,
    pub issues: Vec<StepIssue>,
}

fn label(roster: &Roster, id: &str) -> ApproverLabel {
    ApproverLabel {
        id: id.to_string(),
        display_name: roster.display_name(id),
    }
}

pub fn preview_step(step: &ApprovalStep, roster: &Roster) -> StepPreview {
    let resolved = resolve_step(step, roster);
    StepPreview {
        step: step.clone(),
        selected: step.approvers.iter().map(|id| label(roster, id)).collect(),
        resolved_approvers: resolved.approvers.iter().map(|id| label(roster, id)).collect(),
        quorum: resolved.quorum,
        issues: review_step(step, roster),
    }
}

pub fn preview_pipeline(steps: &[ApprovalStep], roster: &Roster) -> Vec<StepPreview> {
    steps.iter().map(|s| preview_step(s, roster)).collect()
}
