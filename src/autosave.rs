//! Auto-save scheduler: persists the edited document on a fixed cadence,
//! fully decoupled from the undo/redo stacks.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::{RwLock, watch};
use tokio::task::JoinHandle;

use crate::DocumentId;
use crate::history::CommandHistory;
use crate::history::document::Document;

/// Default cadence for snapshot persistence.
pub const AUTOSAVE_INTERVAL_SECONDS: u64 = 15;

#[derive(thiserror::Error, Debug)]
pub enum PersistError {
    #[error("document store unavailable: {0}")]
    Unavailable(String),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Durable storage for document snapshots.
#[async_trait]
pub trait DocumentStore: Send + Sync + 'static {
    async fn persist(&self, document: Document) -> Result<(), PersistError>;
    async fn load(&self, document_id: &DocumentId) -> Result<Option<Document>, PersistError>;
}

/// In-memory snapshot store holding documents in their serialized form,
/// the shape a durable backend would receive.
#[derive(Debug, Default)]
pub struct MemoryDocumentStore {
    documents: RwLock<HashMap<DocumentId, serde_json::Value>>,
}

impl MemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DocumentStore for MemoryDocumentStore {
    async fn persist(&self, document: Document) -> Result<(), PersistError> {
        let snapshot = serde_json::to_value(&document)?;
        self.documents
            .write()
            .await
            .insert(document.id.clone(), snapshot);
        Ok(())
    }

    async fn load(&self, document_id: &DocumentId) -> Result<Option<Document>, PersistError> {
        let documents = self.documents.read().await;
        match documents.get(document_id) {
            Some(snapshot) => Ok(Some(serde_json::from_value(snapshot.clone())?)),
            None => Ok(None),
        }
    }
}

/// Periodically snapshots a [`CommandHistory`]'s document into a
/// [`DocumentStore`].
///
/// A failed tick is logged and simply retried on the next one; one lost
/// cycle is recoverable by its successor, so there is no backoff and no
/// error surface toward the editor. Saving never touches undo/redo state.
pub struct AutoSaveScheduler {
    last_saved_tx: Arc<watch::Sender<Option<DateTime<Utc>>>>,
    task: JoinHandle<()>,
}

impl AutoSaveScheduler {
    pub fn start<D: DocumentStore>(
        history: Arc<RwLock<CommandHistory>>,
        store: Arc<D>,
        interval: Duration,
    ) -> Self {
        let last_saved_tx = Arc::new(watch::channel(None).0);
        let tx = Arc::clone(&last_saved_tx);

        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            // The first tick completes immediately; the document was just
            // loaded, so wait one full interval before the first save.
            ticker.tick().await;
            loop {
                ticker.tick().await;
                // Snapshot under a short read lock; serialization and the
                // write itself happen after the lock is released.
                let document = history.read().await.document().clone();
                let document_id = document.id.clone();
                match store.persist(document).await {
                    Ok(()) => {
                        tx.send_replace(Some(Utc::now()));
                        tracing::debug!(%document_id, "auto-save completed");
                    }
                    Err(error) => {
                        tracing::warn!(%document_id, %error, "auto-save failed; retrying next tick");
                    }
                }
            }
        });

        Self {
            last_saved_tx,
            task,
        }
    }

    /// Timestamp of the most recent successful save, for "saved N minutes
    /// ago" display.
    pub fn last_saved(&self) -> watch::Receiver<Option<DateTime<Utc>>> {
        self.last_saved_tx.subscribe()
    }

    pub fn stop(&self) {
        self.task.abort();
    }
}

impl Drop for AutoSaveScheduler {
    fn drop(&mut self) {
        self.task.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::history::document::SlideUpdate;
    use std::sync::atomic::{AtomicBool, Ordering};

    fn shared_history() -> Arc<RwLock<CommandHistory>> {
        Arc::new(RwLock::new(CommandHistory::new(Document::new(
            "doc-1", "Deck",
        ))))
    }

    #[tokio::test(start_paused = true)]
    async fn persists_on_cadence_and_updates_last_saved() {
        let history = shared_history();
        let store = Arc::new(MemoryDocumentStore::new());
        let scheduler = AutoSaveScheduler::start(
            Arc::clone(&history),
            Arc::clone(&store),
            Duration::from_secs(AUTOSAVE_INTERVAL_SECONDS),
        );

        assert!(scheduler.last_saved().borrow().is_none());
        tokio::time::sleep(Duration::from_secs(AUTOSAVE_INTERVAL_SECONDS + 1)).await;

        let saved = store.load(&"doc-1".to_string()).await.unwrap();
        assert!(saved.is_some());
        assert!(scheduler.last_saved().borrow().is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn snapshots_reflect_edits_between_ticks() {
        let history = shared_history();
        let store = Arc::new(MemoryDocumentStore::new());
        let _scheduler = AutoSaveScheduler::start(
            Arc::clone(&history),
            Arc::clone(&store),
            Duration::from_secs(AUTOSAVE_INTERVAL_SECONDS),
        );

        {
            let mut guard = history.write().await;
            let id = guard.selected_slide_id();
            guard.update_slide(id, &SlideUpdate::title("Edited"));
        }
        tokio::time::sleep(Duration::from_secs(AUTOSAVE_INTERVAL_SECONDS + 1)).await;

        let saved = store.load(&"doc-1".to_string()).await.unwrap().unwrap();
        assert_eq!(saved.slides[0].title, "Edited");

        // Saving never consumes undo state.
        assert!(history.read().await.can_undo());
    }

    struct FlakyStore {
        fail_next: AtomicBool,
        inner: MemoryDocumentStore,
    }

    #[async_trait]
    impl DocumentStore for FlakyStore {
        async fn persist(&self, document: Document) -> Result<(), PersistError> {
            if self.fail_next.swap(false, Ordering::SeqCst) {
                return Err(PersistError::Unavailable("connection reset".into()));
            }
            self.inner.persist(document).await
        }

        async fn load(&self, document_id: &DocumentId) -> Result<Option<Document>, PersistError> {
            self.inner.load(document_id).await
        }
    }

    #[tokio::test(start_paused = true)]
    async fn failed_tick_retries_on_the_next_one() {
        let history = shared_history();
        let store = Arc::new(FlakyStore {
            fail_next: AtomicBool::new(true),
            inner: MemoryDocumentStore::new(),
        });
        let scheduler = AutoSaveScheduler::start(
            Arc::clone(&history),
            Arc::clone(&store),
            Duration::from_secs(AUTOSAVE_INTERVAL_SECONDS),
        );

        tokio::time::sleep(Duration::from_secs(AUTOSAVE_INTERVAL_SECONDS + 1)).await;
        assert!(scheduler.last_saved().borrow().is_none());
        assert!(store.load(&"doc-1".to_string()).await.unwrap().is_none());

        tokio::time::sleep(Duration::from_secs(AUTOSAVE_INTERVAL_SECONDS)).await;
        assert!(scheduler.last_saved().borrow().is_some());
        assert!(store.load(&"doc-1".to_string()).await.unwrap().is_some());
    }
}
