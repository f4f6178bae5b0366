use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::{Deserialize, Serialize};

use crate::session::StoreError;

pub mod documents;
pub mod sessions;

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    error: String,
    message: String,
}

impl ErrorResponse {
    pub fn new(error: &str, message: &str) -> Self {
        Self {
            error: error.to_string(),
            message: message.to_string(),
        }
    }
}

pub(crate) fn store_error_response(error: StoreError) -> Response {
    match error {
        StoreError::SessionNotFound(_) => (
            StatusCode::NOT_FOUND,
            Json(ErrorResponse::new("SessionNotFound", &error.to_string())),
        )
            .into_response(),
        _ => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ErrorResponse::new("InternalError", &error.to_string())),
        )
            .into_response(),
    }
}
