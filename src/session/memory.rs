//! In-memory Session Store with an attached change feed.
//!
//! Backs the reference server and the test suite. Rows live in a map keyed
//! by session id with a unique index over (document, user, tab); every
//! mutation is published to the document's broadcast feed, which is what
//! `ChangeChannel::subscribe` hands out.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::{RwLock, broadcast};
use uuid::Uuid;

use super::{CollaborationSession, CursorPosition, NewSession, SessionStore, StoreError};
use crate::channel::{ChangeChannel, ChangeSubscription, ChannelError, SessionEvent};
use crate::{DocumentId, SessionId, UserId};

const DEFAULT_CHANNEL_CAPACITY: usize = 100;

type SessionKey = (DocumentId, UserId, Uuid);

#[derive(Debug, Default)]
pub struct MemorySessionStore {
    rows: RwLock<HashMap<SessionId, CollaborationSession>>,
    index: RwLock<HashMap<SessionKey, SessionId>>,
    feeds: RwLock<HashMap<DocumentId, broadcast::Sender<SessionEvent>>>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    async fn publish(&self, event: SessionEvent) {
        let feeds = self.feeds.read().await;
        if let Some(sender) = feeds.get(event.document_id()) {
            // No subscribers is fine; the event is simply dropped.
            let _ = sender.send(event);
        }
    }

    async fn with_row<F>(&self, id: SessionId, mutate: F) -> Result<(), StoreError>
    where
        F: FnOnce(&mut CollaborationSession),
    {
        let updated = {
            let mut rows = self.rows.write().await;
            let row = rows
                .get_mut(&id)
                .ok_or(StoreError::SessionNotFound(id))?;
            mutate(row);
            row.last_active = Utc::now();
            row.clone()
        };
        self.publish(SessionEvent::Updated(updated)).await;
        Ok(())
    }

    /// Rewrites a row's `last_active`, bypassing the usual refresh. Lets
    /// tests and admin tooling age a session into the stale range.
    pub async fn set_last_active(&self, id: SessionId, when: chrono::DateTime<Utc>) {
        let mut rows = self.rows.write().await;
        if let Some(row) = rows.get_mut(&id) {
            row.last_active = when;
        }
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn upsert(&self, new: NewSession) -> Result<CollaborationSession, StoreError> {
        let key: SessionKey = (new.document_id.clone(), new.user_id.clone(), new.tab_id);

        let (session, created) = {
            let mut rows = self.rows.write().await;
            let mut index = self.index.write().await;

            let existing = index.get(&key).copied().and_then(|id| rows.remove(&id));
            match existing {
                Some(mut row) => {
                    // Overwrite in place: identity fields may have changed,
                    // but the row keeps its id and its color.
                    row.user_email = new.user_email;
                    row.user_name = new.user_name;
                    row.cursor = None;
                    row.current_slide_index = 0;
                    row.last_active = Utc::now();
                    rows.insert(row.id, row.clone());
                    (row, false)
                }
                None => {
                    let session = CollaborationSession {
                        id: Uuid::new_v4(),
                        document_id: new.document_id,
                        user_id: new.user_id,
                        user_email: new.user_email,
                        user_name: new.user_name,
                        tab_id: new.tab_id,
                        cursor: None,
                        current_slide_index: 0,
                        color: new.color,
                        last_active: Utc::now(),
                    };
                    index.insert(key, session.id);
                    rows.insert(session.id, session.clone());
                    (session, true)
                }
            }
        };

        let event = if created {
            SessionEvent::Created(session.clone())
        } else {
            SessionEvent::Updated(session.clone())
        };
        self.publish(event).await;
        Ok(session)
    }

    async fn update_cursor(
        &self,
        id: SessionId,
        cursor: CursorPosition,
    ) -> Result<(), StoreError> {
        self.with_row(id, |row| row.cursor = Some(cursor)).await
    }

    async fn update_focused_slide(
        &self,
        id: SessionId,
        slide_index: usize,
    ) -> Result<(), StoreError> {
        self.with_row(id, |row| row.current_slide_index = slide_index)
            .await
    }

    async fn touch(&self, id: SessionId) -> Result<(), StoreError> {
        self.with_row(id, |_| {}).await
    }

    async fn delete(&self, id: SessionId) -> Result<(), StoreError> {
        let removed = {
            let mut rows = self.rows.write().await;
            let removed = rows.remove(&id);
            if let Some(row) = &removed {
                let mut index = self.index.write().await;
                index.remove(&(row.document_id.clone(), row.user_id.clone(), row.tab_id));
            }
            removed
        };

        if let Some(row) = removed {
            self.publish(SessionEvent::Deleted {
                session_id: row.id,
                document_id: row.document_id,
            })
            .await;
        }
        Ok(())
    }

    async fn sessions_for_document(
        &self,
        document_id: &DocumentId,
    ) -> Result<Vec<CollaborationSession>, StoreError> {
        let rows = self.rows.read().await;
        Ok(rows
            .values()
            .filter(|row| &row.document_id == document_id)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl ChangeChannel for MemorySessionStore {
    async fn subscribe(
        &self,
        document_id: &DocumentId,
    ) -> Result<ChangeSubscription, ChannelError> {
        let mut feeds = self.feeds.write().await;
        let sender = feeds.entry(document_id.clone()).or_insert_with(|| {
            let (tx, _) = broadcast::channel(DEFAULT_CHANNEL_CAPACITY);
            tx
        });
        Ok(ChangeSubscription::new(
            document_id.clone(),
            sender.subscribe(),
        ))
    }
}
