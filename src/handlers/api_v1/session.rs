use actix_session::Session;
use actix_web::{web, HttpResponse};
use serde::Serialize;

use crate::auth::session::{get_user_id, SessionContext};
use crate::errors::AppError;
use crate::store::DocumentStore;

#[derive(Serialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct ProjectSessionResponse {
    #[serde(flatten)]
    pub context: SessionContext,
    pub can_manage_approvals: bool,
}

/// GET /api/v1/session
///
/// The identity established by the auth gateway.
pub async fn current(session: Session) -> Result<HttpResponse, AppError> {
    let user_id = get_user_id(&session)
        .ok_or_else(|| AppError::Session("Not authenticated".to_string()))?;
    Ok(HttpResponse::Ok().json(serde_json::json!({ "userId": user_id })))
}

/// POST /api/v1/session/logout
pub async fn logout(session: Session) -> HttpResponse {
    if let Some(user_id) = get_user_id(&session) {
        log::info!("User {user_id} signed out");
    }
    session.purge();
    HttpResponse::NoContent().finish()
}

/// GET /api/v1/projects/{project_id}/session
///
/// Role and permissions of the caller in one project.
pub async fn project_context(
    store: web::Data<dyn DocumentStore>,
    session: Session,
    path: web::Path<String>,
) -> Result<HttpResponse, AppError> {
    let context = SessionContext::for_project(store.get_ref(), &session, &path.into_inner()).await?;
    let can_manage_approvals = context.can_manage_approvals();
    Ok(HttpResponse::Ok().json(ProjectSessionResponse { context, can_manage_approvals }))
}
