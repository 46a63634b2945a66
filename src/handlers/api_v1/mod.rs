pub mod approvals;
pub mod session;

use actix_web::{
    web, Error, HttpResponse,
    body::MessageBody,
    dev::{ServiceRequest, ServiceResponse},
    middleware::{from_fn, Next},
};

use crate::auth::middleware::require_auth;

/// CSRF protection for mutation endpoints.
///
/// Rejects POST/PUT/DELETE requests that don't have Content-Type: application/json.
/// Browsers cannot send cross-origin JSON with cookies via simple form POST,
/// so the Content-Type check stands in for CSRF tokens.
/// GET requests are exempt (read-only, no state changes).
async fn require_json_content_type(
    req: ServiceRequest,
    next: Next<impl MessageBody + 'static>,
) -> Result<ServiceResponse<impl MessageBody>, Error> {
    let method = req.method().clone();

    if method == actix_web::http::Method::POST
        || method == actix_web::http::Method::PUT
        || method == actix_web::http::Method::DELETE
    {
        let content_type = req
            .headers()
            .get("content-type")
            .and_then(|v| v.to_str().ok())
            .unwrap_or("");

        if !content_type.starts_with("application/json") {
            let body = serde_json::json!({
                "error": "Content-Type must be application/json for mutation requests",
                "kind": "bad_request"
            });
            let response = HttpResponse::BadRequest().json(body);
            return Ok(req.into_response(response).map_into_right_body());
        }
    }

    next.call(req).await.map(|res| res.map_into_left_body())
}

/// Configure API v1 routes. Mount under `/api/v1`.
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/session")
            .wrap(from_fn(require_json_content_type))
            .route("", web::get().to(session::current))
            .route("/logout", web::post().to(session::logout))
    );
    cfg.service(
        web::scope("/projects/{project_id}")
            .wrap(from_fn(require_json_content_type))
            .wrap(from_fn(require_auth))
            .route("/session", web::get().to(session::project_context))
            .route("/approvals", web::get().to(approvals::show))
            .route("/approvals", web::delete().to(approvals::discard))
            .route("/approvals/save", web::post().to(approvals::save))
            .route("/approvals/{doc}/steps", web::post().to(approvals::add_step))
            .route("/approvals/{doc}/simulate", web::post().to(approvals::simulate))
            .route("/approvals/{doc}/steps/{step_id}", web::put().to(approvals::update_step))
            .route("/approvals/{doc}/steps/{step_id}", web::delete().to(approvals::remove_step))
            .route("/approvals/{doc}/steps/{step_id}/move", web::post().to(approvals::move_step))
            .route(
                "/approvals/{doc}/steps/{step_id}/approvers/{member_id}/toggle",
                web::post().to(approvals::toggle_approver),
            )
    );
}
