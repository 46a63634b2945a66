use actix_session::SessionExt;
use actix_web::{
    Error, HttpResponse,
    body::MessageBody,
    dev::{ServiceRequest, ServiceResponse},
    middleware::Next,
};

use crate::auth::session::USER_ID_KEY;

/// Middleware function that checks for an authenticated session.
/// Answers 401 with a JSON body if the auth gateway has not signed the user in.
pub async fn require_auth(
    req: ServiceRequest,
    next: Next<impl MessageBody + 'static>,
) -> Result<ServiceResponse<impl MessageBody>, Error> {
    let session = req.get_session();
    let has_user = session
        .get::<String>(USER_ID_KEY)
        .unwrap_or(None)
        .is_some_and(|id| !id.is_empty());

    if !has_user {
        let response = HttpResponse::Unauthorized().json(serde_json::json!({
            "error": "Not authenticated",
            "kind": "unauthenticated"
        }));
        return Ok(req.into_response(response).map_into_right_body());
    }

    next.call(req).await.map(|res| res.map_into_left_body())
}
