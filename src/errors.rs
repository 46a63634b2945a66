use actix_web::{HttpResponse, ResponseError, http::StatusCode};
use serde::Serialize;
use std::fmt;

use crate::store::StoreError;

/// How long the client should keep a persistence failure message on screen.
pub const PERSISTENCE_MESSAGE_TTL_MS: u64 = 5_000;

#[derive(Debug)]
pub enum AppError {
    Store(StoreError),
    Session(String),
    PermissionDenied(String),
    BadRequest(String),
    SaveInProgress,
    NotFound,
}

/// JSON error body returned by every API endpoint.
#[derive(Serialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct ApiErrorResponse {
    pub error: String,
    pub kind: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
    pub dismissable: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_in_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub redirect: Option<&'static str>,
}

impl AppError {
    pub fn kind(&self) -> &'static str {
        match self {
            AppError::Store(_) => "persistence",
            AppError::Session(_) => "unauthenticated",
            AppError::PermissionDenied(_) => "access_denied",
            AppError::BadRequest(_) => "bad_request",
            AppError::SaveInProgress => "save_in_progress",
            AppError::NotFound => "not_found",
        }
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::Store(e) => write!(f, "Store error: {e}"),
            AppError::Session(e) => write!(f, "Session error: {e}"),
            AppError::PermissionDenied(code) => write!(f, "Permission denied: {code}"),
            AppError::BadRequest(msg) => write!(f, "Bad request: {msg}"),
            AppError::SaveInProgress => write!(f, "A save is already in progress"),
            AppError::NotFound => write!(f, "Not found"),
        }
    }
}

impl ResponseError for AppError {
    fn status_code(&self) -> StatusCode {
        match self {
            AppError::Store(_) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::Session(_) => StatusCode::UNAUTHORIZED,
            AppError::PermissionDenied(_) => StatusCode::FORBIDDEN,
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::SaveInProgress => StatusCode::CONFLICT,
            AppError::NotFound => StatusCode::NOT_FOUND,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let body = match self {
            AppError::Store(e) => {
                log::error!("{self}");
                ApiErrorResponse {
                    error: "Could not reach the document store. Your changes are kept; try again.".to_string(),
                    kind: self.kind(),
                    details: Some(e.to_string()),
                    dismissable: true,
                    expires_in_ms: Some(PERSISTENCE_MESSAGE_TTL_MS),
                    redirect: None,
                }
            }
            AppError::PermissionDenied(code) => ApiErrorResponse {
                error: "You do not have access to approval settings for this project.".to_string(),
                kind: self.kind(),
                details: Some(code.clone()),
                dismissable: false,
                expires_in_ms: None,
                redirect: Some("/dashboard"),
            },
            AppError::Session(msg) | AppError::BadRequest(msg) => ApiErrorResponse {
                error: msg.clone(),
                kind: self.kind(),
                details: None,
                dismissable: true,
                expires_in_ms: None,
                redirect: None,
            },
            AppError::SaveInProgress | AppError::NotFound => ApiErrorResponse {
                error: self.to_string(),
                kind: self.kind(),
                details: None,
                dismissable: true,
                expires_in_ms: None,
                redirect: None,
            },
        };
        HttpResponse::build(self.status_code()).json(body)
    }
}

impl From<StoreError> for AppError {
    fn from(e: StoreError) -> Self {
        AppError::Store(e)
    }
}
