//! REST surface over the document snapshot store (the auto-save backend).

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;

use super::ErrorResponse;
use crate::DocumentId;
use crate::autosave::DocumentStore;
use crate::history::document::Document;
use crate::server::AppState;

/// GET /api/documents/{document_id}
pub async fn get_document(
    State(state): State<AppState>,
    Path(document_id): Path<DocumentId>,
) -> impl IntoResponse {
    match state.documents.load(&document_id).await {
        Ok(Some(document)) => Json(document).into_response(),
        Ok(None) => (
            StatusCode::NOT_FOUND,
            Json(ErrorResponse::new("DocumentNotFound", "Document not found")),
        )
            .into_response(),
        Err(error) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ErrorResponse::new("InternalError", &error.to_string())),
        )
            .into_response(),
    }
}

/// PUT /api/documents/{document_id}
///
/// Stores a snapshot. The payload must match the path id and carry at
/// least one slide; documents are never empty.
pub async fn put_document(
    State(state): State<AppState>,
    Path(document_id): Path<DocumentId>,
    Json(document): Json<Document>,
) -> impl IntoResponse {
    if document.id != document_id {
        return (
            StatusCode::BAD_REQUEST,
            Json(ErrorResponse::new(
                "DocumentIdMismatch",
                "Payload id does not match the path",
            )),
        )
            .into_response();
    }
    if document.slides.is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            Json(ErrorResponse::new(
                "EmptyDocument",
                "A document must contain at least one slide",
            )),
        )
            .into_response();
    }

    match state.documents.persist(document).await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(error) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ErrorResponse::new("InternalError", &error.to_string())),
        )
            .into_response(),
    }
}
