//! Presence manager: owns the local client's session row and derives the
//! live "who else is here" list for a document.
//!
//! Presence is an enhancement, never a correctness requirement of editing:
//! every failure path here is logged and contained, and the worst outcome
//! is an `is_connected() == false` handle with an empty collaborator list.

pub mod broadcaster;
pub mod color;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use ts_rs::TS;
use uuid::Uuid;

use crate::channel::{ChangeChannel, ChangeSubscription};
use crate::identity::IdentityProvider;
use crate::session::{CollaborationSession, CursorPosition, NewSession, SessionStore};
use crate::{DocumentId, SessionId};

/// How often a joined session refreshes its `last_active` timestamp.
pub const HEARTBEAT_INTERVAL_SECONDS: u64 = 30;

/// Sessions silent for longer than this stop appearing in the active list.
/// Their rows stay in storage; eviction is computed at read time only.
pub const STALENESS_WINDOW_SECONDS: i64 = 300;

#[derive(Debug, Clone)]
pub struct PresenceConfig {
    pub heartbeat_interval: Duration,
    pub staleness_window: chrono::Duration,
}

impl Default for PresenceConfig {
    fn default() -> Self {
        Self {
            heartbeat_interval: Duration::from_secs(HEARTBEAT_INTERVAL_SECONDS),
            staleness_window: chrono::Duration::seconds(STALENESS_WINDOW_SECONDS),
        }
    }
}

/// What the cursor renderer consumes: one remote participant's visible
/// presence within the document.
#[derive(Debug, Clone, Serialize, Deserialize, TS, PartialEq)]
#[ts(export)]
pub struct Collaborator {
    pub session_id: SessionId,
    pub user_id: crate::UserId,
    pub user_name: String,
    pub user_email: String,
    pub color: String,
    pub cursor: Option<CursorPosition>,
    pub current_slide_index: usize,
    pub last_active: DateTime<Utc>,
}

impl Collaborator {
    fn from_session(session: &CollaborationSession) -> Self {
        Self {
            session_id: session.id,
            user_id: session.user_id.clone(),
            user_name: session.user_name.clone(),
            user_email: session.user_email.clone(),
            color: session.color.clone(),
            cursor: session.cursor.clone(),
            current_slide_index: session.current_slide_index,
            last_active: session.last_active,
        }
    }
}

/// Applies the read-time staleness window to a set of session rows,
/// optionally excluding one session (the caller's own). Output order is
/// stable so repeated reloads don't shuffle rendered cursors.
pub fn active_collaborators(
    rows: &[CollaborationSession],
    exclude: Option<SessionId>,
    now: DateTime<Utc>,
    window: chrono::Duration,
) -> Vec<Collaborator> {
    let cutoff = now - window;
    let mut list: Vec<Collaborator> = rows
        .iter()
        .filter(|row| Some(row.id) != exclude && row.last_active >= cutoff)
        .map(Collaborator::from_session)
        .collect();
    list.sort_by(|a, b| {
        a.user_name
            .cmp(&b.user_name)
            .then_with(|| a.session_id.cmp(&b.session_id))
    });
    list
}

pub struct PresenceManager<S, I> {
    store: Arc<S>,
    identity: Arc<I>,
    config: PresenceConfig,
}

impl<S, I> PresenceManager<S, I>
where
    S: SessionStore + ChangeChannel,
    I: IdentityProvider,
{
    pub fn new(store: Arc<S>, identity: Arc<I>) -> Self {
        Self::with_config(store, identity, PresenceConfig::default())
    }

    pub fn with_config(store: Arc<S>, identity: Arc<I>, config: PresenceConfig) -> Self {
        Self {
            store,
            identity,
            config,
        }
    }

    /// Joins a document: upserts the local session row, subscribes to the
    /// change feed and starts the heartbeat. Returns `None` when nobody is
    /// signed in or the row cannot be written; callers treat that as
    /// "presence unavailable", not as an editing failure.
    pub async fn join(&self, document_id: DocumentId) -> Option<SessionHandle<S>> {
        let identity = match self.identity.current_user().await {
            Some(identity) => identity,
            None => {
                tracing::warn!(%document_id, "no signed-in user; presence unavailable");
                return None;
            }
        };

        let tab_id = Uuid::new_v4();
        let session = match self
            .store
            .upsert(NewSession {
                document_id: document_id.clone(),
                user_id: identity.user_id.clone(),
                user_email: identity.email.clone(),
                user_name: identity.display_name(),
                tab_id,
                color: color::pick_color(),
            })
            .await
        {
            Ok(session) => session,
            Err(error) => {
                tracing::warn!(%document_id, %error, "failed to create presence session");
                return None;
            }
        };
        tracing::info!(session_id = %session.id, %document_id, "joined document");

        // Subscription failure degrades to a "not connected" handle; the
        // session row still exists and cursor writes stay best-effort.
        let subscription = match self.store.subscribe(&document_id).await {
            Ok(subscription) => Some(subscription),
            Err(error) => {
                tracing::warn!(%document_id, %error, "change channel unavailable");
                None
            }
        };

        let collaborators_tx = Arc::new(watch::channel(Vec::new()).0);
        let connected_tx = Arc::new(watch::channel(subscription.is_some()).0);

        let heartbeat = self.spawn_heartbeat(session.id);
        let listener = subscription.map(|subscription| {
            self.spawn_listener(
                subscription,
                session.id,
                Arc::clone(&collaborators_tx),
                Arc::clone(&connected_tx),
            )
        });

        Some(SessionHandle {
            session,
            store: Arc::clone(&self.store),
            staleness_window: self.config.staleness_window,
            collaborators_tx,
            connected_tx,
            heartbeat,
            listener,
            left: AtomicBool::new(false),
        })
    }

    fn spawn_heartbeat(&self, session_id: SessionId) -> JoinHandle<()> {
        let store = Arc::clone(&self.store);
        let interval = self.config.heartbeat_interval;
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            // The upsert just touched the row; skip the immediate tick.
            ticker.tick().await;
            loop {
                ticker.tick().await;
                if let Err(error) = store.touch(session_id).await {
                    tracing::debug!(%session_id, %error, "heartbeat write failed");
                }
            }
        })
    }

    fn spawn_listener(
        &self,
        mut subscription: ChangeSubscription,
        session_id: SessionId,
        collaborators_tx: Arc<watch::Sender<Vec<Collaborator>>>,
        connected_tx: Arc<watch::Sender<bool>>,
    ) -> JoinHandle<()> {
        let store = Arc::clone(&self.store);
        let window = self.config.staleness_window;
        tokio::spawn(async move {
            let document_id = subscription.document_id().clone();
            // First successful subscription triggers an immediate reload so
            // the UI doesn't wait for someone else to move.
            reload(&*store, &document_id, session_id, window, &collaborators_tx).await;

            loop {
                match subscription.recv().await {
                    Ok(_event) => {
                        reload(&*store, &document_id, session_id, window, &collaborators_tx).await;
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::debug!(%document_id, skipped, "change feed lagged; reloading");
                        reload(&*store, &document_id, session_id, window, &collaborators_tx).await;
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        tracing::warn!(%document_id, "change feed closed; presence offline");
                        connected_tx.send_replace(false);
                        break;
                    }
                }
            }
        })
    }
}

async fn reload<S: SessionStore + ?Sized>(
    store: &S,
    document_id: &DocumentId,
    session_id: SessionId,
    window: chrono::Duration,
    collaborators_tx: &watch::Sender<Vec<Collaborator>>,
) {
    match store.sessions_for_document(document_id).await {
        Ok(rows) => {
            let list = active_collaborators(&rows, Some(session_id), Utc::now(), window);
            collaborators_tx.send_replace(list);
        }
        Err(error) => {
            // Keep the previous list; the next change event retries.
            tracing::warn!(%document_id, %error, "failed to reload collaborator list");
        }
    }
}

/// The local client's live membership in one document.
///
/// Returned by [`PresenceManager::join`]; every subsequent presence call
/// goes through this handle, so there is no hidden per-tab global state.
pub struct SessionHandle<S: SessionStore> {
    session: CollaborationSession,
    store: Arc<S>,
    staleness_window: chrono::Duration,
    collaborators_tx: Arc<watch::Sender<Vec<Collaborator>>>,
    connected_tx: Arc<watch::Sender<bool>>,
    heartbeat: JoinHandle<()>,
    listener: Option<JoinHandle<()>>,
    left: AtomicBool,
}

impl<S: SessionStore> SessionHandle<S> {
    pub fn session_id(&self) -> SessionId {
        self.session.id
    }

    pub fn document_id(&self) -> &DocumentId {
        &self.session.document_id
    }

    pub fn color(&self) -> &str {
        &self.session.color
    }

    /// Continuously-updated list of the *other* active sessions.
    pub fn collaborators(&self) -> watch::Receiver<Vec<Collaborator>> {
        self.collaborators_tx.subscribe()
    }

    /// Distinguishes "offline" from "live with zero collaborators".
    pub fn connected(&self) -> watch::Receiver<bool> {
        self.connected_tx.subscribe()
    }

    pub fn is_connected(&self) -> bool {
        *self.connected_tx.subscribe().borrow()
    }

    /// Best-effort cursor write; also refreshes `last_active`. Failures are
    /// logged and swallowed so pointer movement can never break editing.
    pub async fn update_cursor(&self, position: CursorPosition) {
        if self.left.load(Ordering::SeqCst) {
            return;
        }
        if let Err(error) = self.store.update_cursor(self.session.id, position).await {
            tracing::debug!(session_id = %self.session.id, %error, "cursor update dropped");
        }
    }

    /// Best-effort focused-slide write; same contract as `update_cursor`.
    pub async fn update_focused_slide(&self, slide_index: usize) {
        if self.left.load(Ordering::SeqCst) {
            return;
        }
        if let Err(error) = self
            .store
            .update_focused_slide(self.session.id, slide_index)
            .await
        {
            tracing::debug!(session_id = %self.session.id, %error, "focus update dropped");
        }
    }

    /// Fresh read of the active collaborator list, staleness filter and
    /// self-exclusion applied. The watch output from [`collaborators`] is
    /// the cached equivalent.
    ///
    /// [`collaborators`]: Self::collaborators
    pub async fn list_active(&self) -> Vec<Collaborator> {
        match self.store.sessions_for_document(&self.session.document_id).await {
            Ok(rows) => active_collaborators(
                &rows,
                Some(self.session.id),
                Utc::now(),
                self.staleness_window,
            ),
            Err(error) => {
                tracing::warn!(
                    document_id = %self.session.document_id,
                    %error,
                    "failed to list active collaborators"
                );
                Vec::new()
            }
        }
    }

    /// Deletes the session row and stops the background tasks. Idempotent:
    /// calling it twice, or racing an in-flight update, is harmless.
    pub async fn leave(&self) {
        if self.left.swap(true, Ordering::SeqCst) {
            return;
        }
        self.heartbeat.abort();
        if let Some(listener) = &self.listener {
            listener.abort();
        }
        self.connected_tx.send_replace(false);
        if let Err(error) = self.store.delete(self.session.id).await {
            tracing::debug!(session_id = %self.session.id, %error, "session cleanup failed");
        }
        tracing::info!(
            session_id = %self.session.id,
            document_id = %self.session.document_id,
            "left document"
        );
    }
}

impl<S: SessionStore> Drop for SessionHandle<S> {
    fn drop(&mut self) {
        if self.left.swap(true, Ordering::SeqCst) {
            return;
        }
        self.heartbeat.abort();
        if let Some(listener) = &self.listener {
            listener.abort();
        }
        // Best-effort row cleanup; a missed delete only leaves a row that
        // the staleness window hides after five minutes.
        if let Ok(runtime) = tokio::runtime::Handle::try_current() {
            let store = Arc::clone(&self.store);
            let session_id = self.session.id;
            runtime.spawn(async move {
                let _ = store.delete(session_id).await;
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::{Identity, StaticIdentity};
    use crate::session::memory::MemorySessionStore;

    fn manager_for(
        store: &Arc<MemorySessionStore>,
        user: &str,
    ) -> PresenceManager<MemorySessionStore, StaticIdentity> {
        let identity = StaticIdentity::of(Identity::new(user, format!("{user}@example.com")));
        PresenceManager::new(Arc::clone(store), Arc::new(identity))
    }

    async fn wait_for_collaborator(
        rx: &mut watch::Receiver<Vec<Collaborator>>,
        user_id: &str,
    ) -> bool {
        let user_id = user_id.to_string();
        tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                let found = rx.borrow().iter().any(|c| c.user_id == user_id);
                if found {
                    break;
                }
                if rx.changed().await.is_err() {
                    break;
                }
            }
        })
        .await
        .is_ok()
    }

    #[tokio::test]
    async fn join_creates_session_with_palette_color() {
        let store = Arc::new(MemorySessionStore::new());
        let manager = manager_for(&store, "ada");

        let handle = manager.join("doc-1".to_string()).await.expect("handle");
        assert!(handle.is_connected());
        assert!(color::PALETTE.contains(&handle.color()));

        let rows = store.sessions_for_document(&"doc-1".to_string()).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].user_name, "ada");
    }

    #[tokio::test]
    async fn join_without_identity_degrades_to_none() {
        let store = Arc::new(MemorySessionStore::new());
        let manager = PresenceManager::new(
            Arc::clone(&store),
            Arc::new(StaticIdentity::anonymous()),
        );

        assert!(manager.join("doc-1".to_string()).await.is_none());
        let rows = store.sessions_for_document(&"doc-1".to_string()).await.unwrap();
        assert!(rows.is_empty());
    }

    #[tokio::test]
    async fn list_active_excludes_self_and_stale_sessions() {
        let store = Arc::new(MemorySessionStore::new());
        let ada = manager_for(&store, "ada").join("doc-1".to_string()).await.unwrap();
        let bea = manager_for(&store, "bea").join("doc-1".to_string()).await.unwrap();
        let cal = manager_for(&store, "cal").join("doc-1".to_string()).await.unwrap();

        // Age cal's row past the staleness window; the row still exists.
        store
            .set_last_active(cal.session_id(), Utc::now() - chrono::Duration::minutes(6))
            .await;

        let active = ada.list_active().await;
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].session_id, bea.session_id());

        let rows = store.sessions_for_document(&"doc-1".to_string()).await.unwrap();
        assert_eq!(rows.len(), 3, "stale rows are filtered, not deleted");
    }

    #[tokio::test]
    async fn collaborator_list_reloads_on_remote_changes() {
        let store = Arc::new(MemorySessionStore::new());
        let ada = manager_for(&store, "ada").join("doc-1".to_string()).await.unwrap();
        let mut collaborators = ada.collaborators();

        let bea = manager_for(&store, "bea").join("doc-1".to_string()).await.unwrap();
        assert!(wait_for_collaborator(&mut collaborators, "bea").await);

        bea.update_cursor(CursorPosition {
            x: 42.0,
            y: 7.0,
            slide_index: Some(1),
        })
        .await;
        let found = tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                let cursor = collaborators
                    .borrow()
                    .iter()
                    .find(|c| c.user_id == "bea")
                    .and_then(|c| c.cursor.clone());
                if cursor.map(|c| c.x) == Some(42.0) {
                    break;
                }
                collaborators.changed().await.expect("watch open");
            }
        })
        .await;
        assert!(found.is_ok());
    }

    #[tokio::test]
    async fn initial_reload_sees_existing_sessions() {
        let store = Arc::new(MemorySessionStore::new());
        let _bea = manager_for(&store, "bea").join("doc-1".to_string()).await.unwrap();

        let ada = manager_for(&store, "ada").join("doc-1".to_string()).await.unwrap();
        let mut collaborators = ada.collaborators();
        assert!(wait_for_collaborator(&mut collaborators, "bea").await);
    }

    #[tokio::test(start_paused = true)]
    async fn heartbeat_refreshes_last_active() {
        let store = Arc::new(MemorySessionStore::new());
        let ada = manager_for(&store, "ada").join("doc-1".to_string()).await.unwrap();

        let past = Utc::now() - chrono::Duration::minutes(10);
        store.set_last_active(ada.session_id(), past).await;

        tokio::time::sleep(Duration::from_secs(HEARTBEAT_INTERVAL_SECONDS + 1)).await;

        let rows = store.sessions_for_document(&"doc-1".to_string()).await.unwrap();
        assert!(rows[0].last_active > past);
    }

    #[tokio::test]
    async fn leave_is_idempotent_and_deletes_the_row() {
        let store = Arc::new(MemorySessionStore::new());
        let ada = manager_for(&store, "ada").join("doc-1".to_string()).await.unwrap();

        ada.leave().await;
        ada.leave().await;

        assert!(!ada.is_connected());
        let rows = store.sessions_for_document(&"doc-1".to_string()).await.unwrap();
        assert!(rows.is_empty());
    }

    #[tokio::test]
    async fn updates_after_leave_are_dropped() {
        let store = Arc::new(MemorySessionStore::new());
        let ada = manager_for(&store, "ada").join("doc-1".to_string()).await.unwrap();
        ada.leave().await;

        ada.update_cursor(CursorPosition {
            x: 1.0,
            y: 1.0,
            slide_index: None,
        })
        .await;
        ada.update_focused_slide(3).await;

        let rows = store.sessions_for_document(&"doc-1".to_string()).await.unwrap();
        assert!(rows.is_empty());
    }

    #[test]
    fn staleness_filter_is_a_pure_read_time_computation() {
        let now = Utc::now();
        let fresh = CollaborationSession {
            id: Uuid::new_v4(),
            document_id: "doc-1".to_string(),
            user_id: "ada".to_string(),
            user_email: "ada@example.com".to_string(),
            user_name: "ada".to_string(),
            tab_id: Uuid::new_v4(),
            cursor: None,
            current_slide_index: 0,
            color: "#fff".to_string(),
            last_active: now,
        };
        let mut stale = fresh.clone();
        stale.id = Uuid::new_v4();
        stale.user_id = "bea".to_string();
        stale.last_active = now - chrono::Duration::minutes(6);

        let window = chrono::Duration::seconds(STALENESS_WINDOW_SECONDS);
        let active = active_collaborators(&[fresh.clone(), stale], None, now, window);
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].session_id, fresh.id);
    }
}
