//! Draft editing of approval pipelines.
//!
//! The editor is a permissive draft surface: it keeps `order` dense and
//! contiguous, but never validates cross-field consistency. A step switched
//! from `fixed` to `hod` keeps its approver list, and a role-based step may sit
//! without a department until someone picks one. Problems are reported by the
//! resolver's preview, not rejected here.

use serde::Deserialize;
use std::collections::BTreeSet;

use super::queries;
use super::types::{renumber, ApprovalPipelines, ApprovalStep, ApproverType, DocumentType, StepId};
use crate::store::{DocumentStore, StoreError};

/// A single-field edit of one step. Each variant carries exactly the type of
/// the field it targets.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "op", content = "value", rename_all = "camelCase")]
pub enum StepEdit {
    SetApproverType(ApproverType),
    SetDepartment(Option<String>),
    SetRequireAll(bool),
    SetApprovers(BTreeSet<String>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MoveDirection {
    Up,
    Down,
}

/// Working copy of both pipelines of one project.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PipelineEditor {
    pipelines: ApprovalPipelines,
    dirty: bool,
}

impl PipelineEditor {
    pub fn new(mut pipelines: ApprovalPipelines) -> Self {
        pipelines.normalize();
        PipelineEditor { pipelines, dirty: false }
    }

    pub fn pipelines(&self) -> &ApprovalPipelines {
        &self.pipelines
    }

    pub fn steps(&self, doc: DocumentType) -> &[ApprovalStep] {
        self.pipelines.steps(doc)
    }

    pub fn step(&self, doc: DocumentType, id: &StepId) -> Option<&ApprovalStep> {
        self.steps(doc).iter().find(|s| &s.id == id)
    }

    /// True when the draft has changes that have not been saved.
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn mark_saved(&mut self) {
        self.dirty = false;
    }

    fn position(&self, doc: DocumentType, id: &StepId) -> Option<usize> {
        self.steps(doc).iter().position(|s| &s.id == id)
    }

    /// Append a blank step and return its id.
    pub fn add_step(&mut self, doc: DocumentType) -> StepId {
        let id = loop {
            let candidate = StepId::generate();
            if !self.pipelines.contains_step(&candidate) {
                break candidate;
            }
        };
        let steps = self.pipelines.steps_mut(doc);
        let order = steps.len() as u32 + 1;
        steps.push(ApprovalStep::new(id.clone(), order));
        self.dirty = true;
        id
    }

    /// Delete a step; later steps move up one place. Unknown ids are ignored.
    pub fn remove_step(&mut self, doc: DocumentType, id: &StepId) -> bool {
        let Some(index) = self.position(doc, id) else {
            return false;
        };
        let steps = self.pipelines.steps_mut(doc);
        steps.remove(index);
        renumber(steps);
        self.dirty = true;
        true
    }

    pub fn move_step_up(&mut self, doc: DocumentType, id: &StepId) -> bool {
        match self.position(doc, id) {
            Some(index) if index > 0 => {
                self.swap(doc, index - 1, index);
                true
            }
            _ => false,
        }
    }

    pub fn move_step_down(&mut self, doc: DocumentType, id: &StepId) -> bool {
        match self.position(doc, id) {
            Some(index) if index + 1 < self.steps(doc).len() => {
                self.swap(doc, index, index + 1);
                true
            }
            _ => false,
        }
    }

    pub fn move_step(&mut self, doc: DocumentType, id: &StepId, direction: MoveDirection) -> bool {
        match direction {
            MoveDirection::Up => self.move_step_up(doc, id),
            MoveDirection::Down => self.move_step_down(doc, id),
        }
    }

    fn swap(&mut self, doc: DocumentType, a: usize, b: usize) {
        let steps = self.pipelines.steps_mut(doc);
        steps.swap(a, b);
        renumber(steps);
        self.dirty = true;
    }

    /// Replace one field of a step. Returns whether anything changed.
    pub fn update_field(&mut self, doc: DocumentType, id: &StepId, edit: StepEdit) -> bool {
        let Some(step) = self.pipelines.steps_mut(doc).iter_mut().find(|s| &s.id == id) else {
            return false;
        };
        let before = step.clone();
        match edit {
            StepEdit::SetApproverType(approver_type) => step.approver_type = approver_type,
            StepEdit::SetDepartment(department) => {
                step.department = department
                    .map(|d| d.trim().to_string())
                    .filter(|d| !d.is_empty());
            }
            StepEdit::SetRequireAll(require_all) => step.require_all = require_all,
            StepEdit::SetApprovers(approvers) => step.approvers = approvers,
        }
        let changed = *step != before;
        self.dirty |= changed;
        changed
    }

    /// Add the member to the step's approvers, or remove them if already there.
    /// Recorded even when the step is role-based; resolution ignores it then.
    pub fn toggle_approver(&mut self, doc: DocumentType, id: &StepId, member_id: &str) -> bool {
        let Some(step) = self.pipelines.steps_mut(doc).iter_mut().find(|s| &s.id == id) else {
            return false;
        };
        if !step.approvers.remove(member_id) {
            step.approvers.insert(member_id.to_string());
        }
        self.dirty = true;
        true
    }

    /// Persist both pipelines as the project's configuration record. On
    /// failure the draft is left exactly as it was.
    pub async fn save(
        &mut self,
        store: &dyn DocumentStore,
        project_id: &str,
        acting_user_id: &str,
    ) -> Result<(), StoreError> {
        queries::save(store, project_id, &self.pipelines, acting_user_id).await?;
        self.dirty = false;
        Ok(())
    }
}
