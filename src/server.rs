use std::net::SocketAddr;
use std::sync::Arc;

use axum::http::{HeaderName, Method};
use axum::routing::{delete, get, patch, post};
use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tracing::{error, info};

use crate::autosave::MemoryDocumentStore;
use crate::presence::STALENESS_WINDOW_SECONDS;
use crate::session::memory::MemorySessionStore;
use crate::{api, ws};

/// Shared state behind every route: the session store (which is also the
/// change-feed producer) and the document snapshot store.
#[derive(Clone)]
pub struct AppState {
    pub sessions: Arc<MemorySessionStore>,
    pub documents: Arc<MemoryDocumentStore>,
    pub staleness_window: chrono::Duration,
}

pub struct App {
    pub state: AppState,
}

impl Default for App {
    fn default() -> Self {
        Self::new()
    }
}

impl App {
    pub fn new() -> Self {
        Self {
            state: AppState {
                sessions: Arc::new(MemorySessionStore::new()),
                documents: Arc::new(MemoryDocumentStore::new()),
                staleness_window: chrono::Duration::seconds(STALENESS_WINDOW_SECONDS),
            },
        }
    }

    pub async fn run(&self, port: u16) -> Result<(), Box<dyn std::error::Error>> {
        let cors = CorsLayer::new()
            .allow_methods([
                Method::GET,
                Method::POST,
                Method::DELETE,
                Method::PATCH,
                Method::PUT,
            ])
            .allow_headers([
                HeaderName::from_static("content-type"),
                HeaderName::from_static("upgrade"),
                HeaderName::from_static("connection"),
                HeaderName::from_static("sec-websocket-key"),
                HeaderName::from_static("sec-websocket-version"),
                HeaderName::from_static("sec-websocket-extensions"),
                HeaderName::from_static("sec-websocket-protocol"),
            ])
            .allow_origin(Any);

        let app = Router::new()
            // Change feed + presence write path
            .route("/ws/documents/{document_id}", get(ws::document_ws_handler))
            // Session rows
            .route(
                "/api/documents/{document_id}/sessions",
                get(api::sessions::list_sessions).post(api::sessions::create_session),
            )
            .route(
                "/api/documents/{document_id}/collaborators",
                get(api::sessions::list_collaborators),
            )
            .route(
                "/api/sessions/{session_id}/cursor",
                patch(api::sessions::update_cursor),
            )
            .route(
                "/api/sessions/{session_id}/focus",
                patch(api::sessions::update_focus),
            )
            .route(
                "/api/sessions/{session_id}/heartbeat",
                post(api::sessions::heartbeat),
            )
            .route(
                "/api/sessions/{session_id}",
                delete(api::sessions::delete_session),
            )
            // Document snapshots (auto-save backend)
            .route(
                "/api/documents/{document_id}",
                get(api::documents::get_document).put(api::documents::put_document),
            )
            .layer(cors)
            .with_state(self.state.clone());

        let addr: SocketAddr = SocketAddr::from(([127, 0, 0, 1], port));
        let listener = tokio::net::TcpListener::bind(addr).await?;

        info!("Server running on http://{}", addr);
        match axum::serve(listener, app).await {
            Ok(_) => info!("Server shut down gracefully"),
            Err(e) => error!("Server error: {}", e),
        }

        Ok(())
    }
}
