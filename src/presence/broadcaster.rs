//! Throttling layer between pointer movement and the session store.
//!
//! Pointer events arrive far faster than a network round-trip per event can
//! absorb. Cursor writes are rate-limited to one per gap with the latest
//! position flushed on the trailing edge, so the last movement always wins.
//! Focused-slide changes are rare and pass through immediately.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;

use super::SessionHandle;
use crate::session::{CursorPosition, SessionStore};

/// Minimum gap between consecutive cursor writes.
pub const CURSOR_THROTTLE_MS: u64 = 100;

#[derive(Debug, Default)]
struct ThrottleState {
    last_sent: Option<Instant>,
    pending: Option<CursorPosition>,
    flush_scheduled: bool,
}

pub struct CursorBroadcaster<S: SessionStore> {
    handle: Arc<SessionHandle<S>>,
    min_gap: Duration,
    state: Arc<Mutex<ThrottleState>>,
}

impl<S: SessionStore> CursorBroadcaster<S> {
    pub fn new(handle: Arc<SessionHandle<S>>) -> Self {
        Self::with_min_gap(handle, Duration::from_millis(CURSOR_THROTTLE_MS))
    }

    pub fn with_min_gap(handle: Arc<SessionHandle<S>>, min_gap: Duration) -> Self {
        Self {
            handle,
            min_gap,
            state: Arc::new(Mutex::new(ThrottleState::default())),
        }
    }

    /// Records a pointer movement. Sends straight away when the gap since
    /// the last write has elapsed; otherwise keeps the newest position and
    /// schedules a single trailing flush. Fire-and-forget either way.
    pub async fn update_cursor(&self, position: CursorPosition) {
        let mut state = self.state.lock().await;
        let now = Instant::now();
        let due = state
            .last_sent
            .is_none_or(|sent| now.duration_since(sent) >= self.min_gap);

        if due && !state.flush_scheduled {
            state.last_sent = Some(now);
            drop(state);
            let handle = Arc::clone(&self.handle);
            tokio::spawn(async move {
                handle.update_cursor(position).await;
            });
            return;
        }

        state.pending = Some(position);
        if !state.flush_scheduled {
            state.flush_scheduled = true;
            let deadline = state
                .last_sent
                .map_or(now, |sent| sent + self.min_gap);
            drop(state);

            let handle = Arc::clone(&self.handle);
            let shared = Arc::clone(&self.state);
            tokio::spawn(async move {
                tokio::time::sleep_until(deadline).await;
                let position = {
                    let mut state = shared.lock().await;
                    state.flush_scheduled = false;
                    state.last_sent = Some(Instant::now());
                    state.pending.take()
                };
                if let Some(position) = position {
                    handle.update_cursor(position).await;
                }
            });
        }
    }

    /// Slide-focus changes bypass the throttle entirely.
    pub async fn update_focused_slide(&self, slide_index: usize) {
        let handle = Arc::clone(&self.handle);
        tokio::spawn(async move {
            handle.update_focused_slide(slide_index).await;
        });
    }
}
