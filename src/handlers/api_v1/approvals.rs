use actix_session::Session;
use actix_web::{web, HttpResponse};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::auth::session::SessionContext;
use crate::errors::AppError;
use crate::models::approval::{
    self, blocking_step, evaluate, preview_pipeline, queries, resolve_pipeline, DocumentType,
    DraftRegistry, MoveDirection, PipelineEditor, PipelineStatus, ResolvedStep, StepDecisions,
    StepEdit, StepId, StepPreview,
};
use crate::models::member::{self, Roster};
use crate::store::DocumentStore;

#[derive(Serialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct PipelineView {
    pub steps: Vec<StepPreview>,
    /// Order of the first step that currently resolves to nobody.
    pub blocked_at: Option<u32>,
}

#[derive(Serialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct ApprovalsView {
    pub purchase_order: PipelineView,
    pub invoice: PipelineView,
    pub dirty: bool,
    pub updated_at: Option<DateTime<Utc>>,
    pub updated_by: Option<String>,
}

#[derive(Serialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct MutationResponse {
    pub changed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub step_id: Option<StepId>,
    pub approvals: ApprovalsView,
}

#[derive(Deserialize, Debug)]
pub struct MoveRequest {
    pub direction: MoveDirection,
}

#[derive(Deserialize, Debug, Default)]
pub struct SimulateRequest {
    #[serde(default)]
    pub decisions: BTreeMap<StepId, StepDecisions>,
}

#[derive(Serialize, Debug)]
pub struct SimulateResponse {
    pub status: PipelineStatus,
    pub steps: Vec<ResolvedStep>,
}

fn pipeline_view(editor: &PipelineEditor, doc: DocumentType, roster: &Roster) -> PipelineView {
    let steps = editor.steps(doc);
    let resolved = resolve_pipeline(steps, roster);
    PipelineView {
        steps: preview_pipeline(steps, roster),
        blocked_at: blocking_step(&resolved).map(|s| s.order),
    }
}

/// Everything a view needs from the store besides the draft itself.
struct ViewInputs {
    roster: Roster,
    updated_at: Option<DateTime<Utc>>,
    updated_by: Option<String>,
}

async fn load_view_inputs(store: &dyn DocumentStore, ctx: &SessionContext) -> Result<ViewInputs, AppError> {
    let roster = member::load_roster(store, &ctx.project_id).await?;
    let record = queries::load_record(store, &ctx.project_id).await?;
    let (updated_at, updated_by) = record
        .map(|r| (r.updated_at, r.updated_by))
        .unwrap_or((None, None));
    Ok(ViewInputs { roster, updated_at, updated_by })
}

fn build_view(editor: &PipelineEditor, inputs: &ViewInputs) -> ApprovalsView {
    ApprovalsView {
        purchase_order: pipeline_view(editor, DocumentType::PurchaseOrder, &inputs.roster),
        invoice: pipeline_view(editor, DocumentType::Invoice, &inputs.roster),
        dirty: editor.is_dirty(),
        updated_at: inputs.updated_at,
        updated_by: inputs.updated_by.clone(),
    }
}

/// Identify the caller and check approval-settings access before anything
/// about the pipeline is loaded.
async fn authorize(
    store: &dyn DocumentStore,
    session: &Session,
    project_id: &str,
) -> Result<SessionContext, AppError> {
    let ctx = SessionContext::for_project(store, session, project_id).await?;
    ctx.require_approvals_access()?;
    Ok(ctx)
}

fn parse_doc(raw: &str) -> Result<DocumentType, AppError> {
    raw.parse::<DocumentType>().map_err(AppError::BadRequest)
}

/// Apply one editor operation to the caller's draft and answer with the
/// refreshed view. The view's inputs are read first: a failed read leaves
/// the draft untouched.
async fn mutate(
    store: &dyn DocumentStore,
    drafts: &DraftRegistry,
    ctx: &SessionContext,
    op: impl FnOnce(&mut PipelineEditor) -> (bool, Option<StepId>),
) -> Result<HttpResponse, AppError> {
    let inputs = load_view_inputs(store, ctx).await?;
    let (changed, step_id, editor) = drafts
        .with_draft(store, ctx, |editor| {
            let (changed, step_id) = op(editor);
            (changed, step_id, editor.clone())
        })
        .await?;
    let approvals = build_view(&editor, &inputs);
    Ok(HttpResponse::Ok().json(MutationResponse { changed, step_id, approvals }))
}

/// GET /api/v1/projects/{project_id}/approvals
pub async fn show(
    store: web::Data<dyn DocumentStore>,
    drafts: web::Data<DraftRegistry>,
    session: Session,
    path: web::Path<String>,
) -> Result<HttpResponse, AppError> {
    let store = store.get_ref();
    let ctx = authorize(store, &session, &path.into_inner()).await?;
    let editor = drafts.with_draft(store, &ctx, |editor| editor.clone()).await?;
    let inputs = load_view_inputs(store, &ctx).await?;
    Ok(HttpResponse::Ok().json(build_view(&editor, &inputs)))
}

/// DELETE /api/v1/projects/{project_id}/approvals
///
/// Throws the caller's draft away.
pub async fn discard(
    store: web::Data<dyn DocumentStore>,
    drafts: web::Data<DraftRegistry>,
    session: Session,
    path: web::Path<String>,
) -> Result<HttpResponse, AppError> {
    let ctx = authorize(store.get_ref(), &session, &path.into_inner()).await?;
    let existed = drafts.discard(&ctx).await;
    Ok(HttpResponse::Ok().json(serde_json::json!({ "discarded": existed })))
}

/// POST /api/v1/projects/{project_id}/approvals/save
///
/// Once the record is written the answer is 200. If the audit fields cannot
/// be read back afterwards, the view reports the saver and no timestamp.
pub async fn save(
    store: web::Data<dyn DocumentStore>,
    drafts: web::Data<DraftRegistry>,
    session: Session,
    path: web::Path<String>,
) -> Result<HttpResponse, AppError> {
    let store = store.get_ref();
    let ctx = authorize(store, &session, &path.into_inner()).await?;
    let roster = member::load_roster(store, &ctx.project_id).await?;
    let editor = drafts.save(store, &ctx).await?;
    let (updated_at, updated_by) = match queries::load_record(store, &ctx.project_id).await {
        Ok(Some(record)) => (record.updated_at, record.updated_by),
        Ok(None) => (None, Some(ctx.user_id.clone())),
        Err(e) => {
            log::warn!("Approval config saved for project {} but reading it back failed: {}", ctx.project_id, e);
            (None, Some(ctx.user_id.clone()))
        }
    };
    let inputs = ViewInputs { roster, updated_at, updated_by };
    Ok(HttpResponse::Ok().json(build_view(&editor, &inputs)))
}

/// POST /api/v1/projects/{project_id}/approvals/{doc}/steps
pub async fn add_step(
    store: web::Data<dyn DocumentStore>,
    drafts: web::Data<DraftRegistry>,
    session: Session,
    path: web::Path<(String, String)>,
) -> Result<HttpResponse, AppError> {
    let (project_id, doc) = path.into_inner();
    let doc = parse_doc(&doc)?;
    let store = store.get_ref();
    let ctx = authorize(store, &session, &project_id).await?;
    mutate(store, &drafts, &ctx, |editor| (true, Some(editor.add_step(doc)))).await
}

/// DELETE /api/v1/projects/{project_id}/approvals/{doc}/steps/{step_id}
pub async fn remove_step(
    store: web::Data<dyn DocumentStore>,
    drafts: web::Data<DraftRegistry>,
    session: Session,
    path: web::Path<(String, String, String)>,
) -> Result<HttpResponse, AppError> {
    let (project_id, doc, step_id) = path.into_inner();
    let doc = parse_doc(&doc)?;
    let step_id = StepId(step_id);
    let store = store.get_ref();
    let ctx = authorize(store, &session, &project_id).await?;
    mutate(store, &drafts, &ctx, |editor| (editor.remove_step(doc, &step_id), None)).await
}

/// POST /api/v1/projects/{project_id}/approvals/{doc}/steps/{step_id}/move
pub async fn move_step(
    store: web::Data<dyn DocumentStore>,
    drafts: web::Data<DraftRegistry>,
    session: Session,
    path: web::Path<(String, String, String)>,
    body: web::Json<MoveRequest>,
) -> Result<HttpResponse, AppError> {
    let (project_id, doc, step_id) = path.into_inner();
    let doc = parse_doc(&doc)?;
    let step_id = StepId(step_id);
    let direction = body.into_inner().direction;
    let store = store.get_ref();
    let ctx = authorize(store, &session, &project_id).await?;
    mutate(store, &drafts, &ctx, |editor| (editor.move_step(doc, &step_id, direction), None)).await
}

/// PUT /api/v1/projects/{project_id}/approvals/{doc}/steps/{step_id}
/// Body is one edit command, e.g. `{"op": "setRequireAll", "value": true}`.
pub async fn update_step(
    store: web::Data<dyn DocumentStore>,
    drafts: web::Data<DraftRegistry>,
    session: Session,
    path: web::Path<(String, String, String)>,
    body: web::Json<StepEdit>,
) -> Result<HttpResponse, AppError> {
    let (project_id, doc, step_id) = path.into_inner();
    let doc = parse_doc(&doc)?;
    let step_id = StepId(step_id);
    let edit = body.into_inner();
    let store = store.get_ref();
    let ctx = authorize(store, &session, &project_id).await?;
    mutate(store, &drafts, &ctx, |editor| (editor.update_field(doc, &step_id, edit), None)).await
}

/// POST /api/v1/projects/{project_id}/approvals/{doc}/steps/{step_id}/approvers/{member_id}/toggle
pub async fn toggle_approver(
    store: web::Data<dyn DocumentStore>,
    drafts: web::Data<DraftRegistry>,
    session: Session,
    path: web::Path<(String, String, String, String)>,
) -> Result<HttpResponse, AppError> {
    let (project_id, doc, step_id, member_id) = path.into_inner();
    let doc = parse_doc(&doc)?;
    let step_id = StepId(step_id);
    let store = store.get_ref();
    let ctx = authorize(store, &session, &project_id).await?;
    mutate(store, &drafts, &ctx, |editor| {
        (editor.toggle_approver(doc, &step_id, &member_id), None)
    })
    .await
}

/// POST /api/v1/projects/{project_id}/approvals/{doc}/simulate
///
/// Dry-runs the draft pipeline against the live roster and the given
/// decisions, without recording anything.
pub async fn simulate(
    store: web::Data<dyn DocumentStore>,
    drafts: web::Data<DraftRegistry>,
    session: Session,
    path: web::Path<(String, String)>,
    body: web::Json<SimulateRequest>,
) -> Result<HttpResponse, AppError> {
    let (project_id, doc) = path.into_inner();
    let doc = parse_doc(&doc)?;
    let store = store.get_ref();
    let ctx = authorize(store, &session, &project_id).await?;
    let steps: Vec<approval::ApprovalStep> = drafts
        .with_draft(store, &ctx, |editor| editor.steps(doc).to_vec())
        .await?;
    let roster = member::load_roster(store, &ctx.project_id).await?;
    let resolved = resolve_pipeline(&steps, &roster);
    let status = evaluate(&resolved, &body.decisions);
    Ok(HttpResponse::Ok().json(SimulateResponse { status, steps: resolved }))
}
