use serde_json::json;

use super::types::{ApprovalConfig, ApprovalPipelines};
use crate::store::{server_timestamp, DocumentStore, StoreError};

/// Fixed location of a project's approval configuration record.
pub fn config_path(project_id: &str) -> String {
    format!("projects/{project_id}/settings/approvals")
}

/// Fetch the full configuration record, audit fields included.
pub async fn load_record(
    store: &dyn DocumentStore,
    project_id: &str,
) -> Result<Option<ApprovalConfig>, StoreError> {
    match store.get(&config_path(project_id)).await? {
        Some(doc) => Ok(Some(doc.decode()?)),
        None => Ok(None),
    }
}

/// Load both pipelines. A project that never saved a configuration has two
/// empty pipelines.
pub async fn load(store: &dyn DocumentStore, project_id: &str) -> Result<ApprovalPipelines, StoreError> {
    Ok(load_record(store, project_id)
        .await?
        .map(ApprovalConfig::into_pipelines)
        .unwrap_or_default())
}

/// Overwrite the configuration record with both pipelines. Whatever was
/// stored before is replaced in full; concurrent saves are not reconciled.
pub async fn save(
    store: &dyn DocumentStore,
    project_id: &str,
    pipelines: &ApprovalPipelines,
    acting_user_id: &str,
) -> Result<(), StoreError> {
    let record = json!({
        "poApprovals": pipelines.purchase_order,
        "invoiceApprovals": pipelines.invoice,
        "updatedAt": server_timestamp(),
        "updatedBy": acting_user_id,
    });
    store.set(&config_path(project_id), record).await?;
    log::info!(
        "Approval config saved for project {} by {} ({} PO steps, {} invoice steps)",
        project_id,
        acting_user_id,
        pipelines.purchase_order.len(),
        pipelines.invoice.len()
    );
    Ok(())
}
