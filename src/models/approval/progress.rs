use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use super::resolver::ResolvedStep;
use super::types::StepId;

/// Approvals and rejections recorded against one step.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StepDecisions {
    pub approved: BTreeSet<String>,
    pub rejected: BTreeSet<String>,
}

/// Where a document stands in its approval pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "camelCase")]
pub enum PipelineStatus {
    Approved,
    #[serde(rename_all = "camelCase")]
    Rejected { order: u32, step_id: StepId, rejected_by: String },
    /// The current step resolves to nobody and can never be satisfied.
    #[serde(rename_all = "camelCase")]
    Stuck { order: u32, step_id: StepId },
    #[serde(rename_all = "camelCase")]
    Pending { order: u32, step_id: StepId, waiting_on: BTreeSet<String> },
}

/// Walk the steps strictly in order. A step is only looked at once every
/// step before it has met its quorum; decisions recorded against later steps
/// are ignored until then.
pub fn evaluate(steps: &[ResolvedStep], decisions: &BTreeMap<StepId, StepDecisions>) -> PipelineStatus {
    let none = StepDecisions::default();
    for step in steps {
        let recorded = decisions.get(&step.step_id).unwrap_or(&none);

        if let Some(rejecter) = recorded.rejected.iter().find(|m| step.can_approve(m)) {
            return PipelineStatus::Rejected {
                order: step.order,
                step_id: step.step_id.clone(),
                rejected_by: rejecter.clone(),
            };
        }
        if step.is_stuck() {
            return PipelineStatus::Stuck { order: step.order, step_id: step.step_id.clone() };
        }
        if !step.is_satisfied(&recorded.approved) {
            return PipelineStatus::Pending {
                order: step.order,
                step_id: step.step_id.clone(),
                waiting_on: step.approvers.difference(&recorded.approved).cloned().collect(),
            };
        }
    }
    PipelineStatus::Approved
}

/// First step that resolves to nobody, if any. A pipeline with such a step
/// can never reach `Approved`.
pub fn blocking_step(steps: &[ResolvedStep]) -> Option<&ResolvedStep> {
    steps.iter().find(|s| s.is_stuck())
}
