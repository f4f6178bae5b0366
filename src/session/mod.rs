//! Session Store seam: one durable row per (document, user, tab) triple.

pub mod memory;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ts_rs::TS;
use uuid::Uuid;

use crate::{DocumentId, SessionId, UserId};

/// Last known pointer location inside the editor canvas. The optional slide
/// index disambiguates multi-slide canvases.
#[derive(Debug, Clone, Serialize, Deserialize, TS, PartialEq)]
#[ts(export)]
pub struct CursorPosition {
    pub x: f64,
    pub y: f64,
    pub slide_index: Option<usize>,
}

/// One user's live editing session within one document on one browser tab.
///
/// `last_active` is refreshed by heartbeats and by every presence write; it
/// is not a TTL column. Stale rows stay in storage and are filtered out at
/// read time by whoever lists collaborators.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct CollaborationSession {
    pub id: SessionId,
    pub document_id: DocumentId,
    pub user_id: UserId,
    pub user_email: String,
    pub user_name: String,
    pub tab_id: Uuid,
    pub cursor: Option<CursorPosition>,
    pub current_slide_index: usize,
    pub color: String,
    pub last_active: DateTime<Utc>,
}

/// Fields supplied when a client joins a document. The store generates the
/// row id; `color` is only honored on first creation and kept thereafter.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct NewSession {
    pub document_id: DocumentId,
    pub user_id: UserId,
    pub user_email: String,
    pub user_name: String,
    pub tab_id: Uuid,
    pub color: String,
}

#[derive(thiserror::Error, Debug)]
pub enum StoreError {
    #[error("session '{0}' not found")]
    SessionNotFound(SessionId),
    #[error("session store unavailable: {0}")]
    Unavailable(String),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Durable storage for collaboration sessions.
///
/// All methods are network round-trips from the caller's point of view.
/// Every write refreshes `last_active` on the touched row.
#[async_trait]
pub trait SessionStore: Send + Sync + 'static {
    /// Creates the row for `(document_id, user_id, tab_id)`, or overwrites
    /// the existing one. A duplicate-key race resolves to an overwrite that
    /// keeps the original id and color; it is never an error.
    async fn upsert(&self, new: NewSession) -> Result<CollaborationSession, StoreError>;

    async fn update_cursor(
        &self,
        id: SessionId,
        cursor: CursorPosition,
    ) -> Result<(), StoreError>;

    async fn update_focused_slide(&self, id: SessionId, slide_index: usize)
    -> Result<(), StoreError>;

    /// Heartbeat: refreshes `last_active` without touching cursor or focus.
    async fn touch(&self, id: SessionId) -> Result<(), StoreError>;

    /// Deletes the row. Deleting an absent row is a no-op.
    async fn delete(&self, id: SessionId) -> Result<(), StoreError>;

    /// Every row for the document, stale ones included.
    async fn sessions_for_document(
        &self,
        document_id: &DocumentId,
    ) -> Result<Vec<CollaborationSession>, StoreError>;
}
