//! REST surface over the Session Store: session lifecycle plus the active
//! collaborator listing with the staleness filter applied server-side.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use ts_rs::TS;
use uuid::Uuid;

use super::store_error_response;
use crate::presence::{active_collaborators, color};
use crate::identity::Identity;
use crate::server::AppState;
use crate::session::{CursorPosition, NewSession, SessionStore};
use crate::{DocumentId, SessionId, UserId};

#[derive(Debug, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct JoinRequest {
    pub user_id: UserId,
    pub user_email: String,
    pub user_name: Option<String>,
    pub tab_id: Uuid,
}

#[derive(Debug, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct FocusRequest {
    pub slide_index: usize,
}

/// POST /api/documents/{document_id}/sessions
pub async fn create_session(
    State(state): State<AppState>,
    Path(document_id): Path<DocumentId>,
    Json(payload): Json<JoinRequest>,
) -> impl IntoResponse {
    let mut identity = Identity::new(payload.user_id, payload.user_email);
    if let Some(name) = payload.user_name {
        identity = identity.with_name(name);
    }

    let new = NewSession {
        document_id,
        user_id: identity.user_id.clone(),
        user_email: identity.email.clone(),
        user_name: identity.display_name(),
        tab_id: payload.tab_id,
        color: color::pick_color(),
    };
    match state.sessions.upsert(new).await {
        Ok(session) => (StatusCode::CREATED, Json(session)).into_response(),
        Err(error) => store_error_response(error),
    }
}

/// GET /api/documents/{document_id}/sessions
///
/// Every row, stale ones included; staleness is a read-time view concern.
pub async fn list_sessions(
    State(state): State<AppState>,
    Path(document_id): Path<DocumentId>,
) -> impl IntoResponse {
    match state.sessions.sessions_for_document(&document_id).await {
        Ok(rows) => Json(rows).into_response(),
        Err(error) => store_error_response(error),
    }
}

/// GET /api/documents/{document_id}/collaborators
///
/// Only sessions active within the staleness window.
pub async fn list_collaborators(
    State(state): State<AppState>,
    Path(document_id): Path<DocumentId>,
) -> impl IntoResponse {
    match state.sessions.sessions_for_document(&document_id).await {
        Ok(rows) => {
            let active = active_collaborators(&rows, None, Utc::now(), state.staleness_window);
            Json(active).into_response()
        }
        Err(error) => store_error_response(error),
    }
}

/// PATCH /api/sessions/{session_id}/cursor
pub async fn update_cursor(
    State(state): State<AppState>,
    Path(session_id): Path<SessionId>,
    Json(position): Json<CursorPosition>,
) -> impl IntoResponse {
    match state.sessions.update_cursor(session_id, position).await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(error) => store_error_response(error),
    }
}

/// PATCH /api/sessions/{session_id}/focus
pub async fn update_focus(
    State(state): State<AppState>,
    Path(session_id): Path<SessionId>,
    Json(payload): Json<FocusRequest>,
) -> impl IntoResponse {
    match state
        .sessions
        .update_focused_slide(session_id, payload.slide_index)
        .await
    {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(error) => store_error_response(error),
    }
}

/// POST /api/sessions/{session_id}/heartbeat
pub async fn heartbeat(
    State(state): State<AppState>,
    Path(session_id): Path<SessionId>,
) -> impl IntoResponse {
    match state.sessions.touch(session_id).await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(error) => store_error_response(error),
    }
}

/// DELETE /api/sessions/{session_id}
///
/// Idempotent: deleting an absent session is still a 204.
pub async fn delete_session(
    State(state): State<AppState>,
    Path(session_id): Path<SessionId>,
) -> impl IntoResponse {
    match state.sessions.delete(session_id).await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(error) => store_error_response(error),
    }
}
