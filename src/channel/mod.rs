//! Change Channel seam: pub/sub notifications for session-table changes.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use ts_rs::TS;

use crate::session::CollaborationSession;
use crate::{DocumentId, SessionId};

/// A change to the session table of one document, delivered to every
/// current subscriber. Consumers treat any event as a prompt to reload the
/// full active list rather than patching state from the payload.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(tag = "type", content = "data")]
pub enum SessionEvent {
    Created(CollaborationSession),
    Updated(CollaborationSession),
    Deleted {
        session_id: SessionId,
        document_id: DocumentId,
    },
}

impl SessionEvent {
    pub fn document_id(&self) -> &DocumentId {
        match self {
            SessionEvent::Created(s) | SessionEvent::Updated(s) => &s.document_id,
            SessionEvent::Deleted { document_id, .. } => document_id,
        }
    }
}

#[derive(thiserror::Error, Debug)]
pub enum ChannelError {
    #[error("change channel unavailable: {0}")]
    Unavailable(String),
}

/// Pub/sub facility over session-table changes, filtered per document.
/// Delivery latency and reconnection are the channel's responsibility, not
/// its subscribers'.
#[async_trait]
pub trait ChangeChannel: Send + Sync + 'static {
    async fn subscribe(&self, document_id: &DocumentId)
    -> Result<ChangeSubscription, ChannelError>;
}

/// A live subscription to one document's session changes.
///
/// Wraps a broadcast receiver: slow consumers may observe `Lagged` and
/// should simply reload, and a `Closed` error means the channel is gone and
/// the subscriber is offline.
#[derive(Debug)]
pub struct ChangeSubscription {
    document_id: DocumentId,
    receiver: broadcast::Receiver<SessionEvent>,
}

impl ChangeSubscription {
    pub fn new(document_id: DocumentId, receiver: broadcast::Receiver<SessionEvent>) -> Self {
        Self {
            document_id,
            receiver,
        }
    }

    pub fn document_id(&self) -> &DocumentId {
        &self.document_id
    }

    pub async fn recv(&mut self) -> Result<SessionEvent, broadcast::error::RecvError> {
        self.receiver.recv().await
    }

    pub fn try_recv(&mut self) -> Result<SessionEvent, broadcast::error::TryRecvError> {
        self.receiver.try_recv()
    }
}
