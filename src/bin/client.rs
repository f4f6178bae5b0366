//! Demo presence client: joins a document, wanders its cursor around and
//! prints every change event the server broadcasts.

use std::sync::Arc;
use std::time::Duration;

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use rand::Rng;
use slide_collab::session::CursorPosition;
use slide_collab::ws::{ClientMessage, ServerMessage};
use tokio::net::TcpStream;
use tokio::signal::ctrl_c;
use tokio::sync::{Mutex, watch};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async, tungstenite::protocol::Message};
use uuid::Uuid;

type WsWriter = Arc<Mutex<SplitSink<WebSocketStream<MaybeTlsStream<TcpStream>>, Message>>>;
type WsReader = SplitStream<WebSocketStream<MaybeTlsStream<TcpStream>>>;

const HEARTBEAT_INTERVAL_SECONDS: u64 = 30;
const CURSOR_INTERVAL_MILLIS: u64 = 2000;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .init();

    let document_id = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "demo-deck".to_string());
    let user = std::env::args().nth(2).unwrap_or_else(|| "guest".to_string());

    let url = url::Url::parse(&format!(
        "ws://127.0.0.1:8080/ws/documents/{document_id}"
    ))?;
    tracing::info!(%document_id, %user, "connecting to {url}");

    let (ws_stream, _response) = connect_async(url.as_str())
        .await
        .map_err(|e| format!("failed to connect: {e}"))?;
    tracing::info!(%document_id, "connected");

    let (write, read) = ws_stream.split();
    let writer: WsWriter = Arc::new(Mutex::new(write));

    send(&writer, &ClientMessage::Join {
        user_id: user.clone(),
        user_email: format!("{user}@example.com"),
        user_name: None,
        tab_id: Uuid::new_v4(),
    })
    .await?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let heartbeat_handle = tokio::spawn(heartbeat_task(writer.clone(), shutdown_rx.clone()));
    let cursor_handle = tokio::spawn(cursor_task(writer.clone(), shutdown_rx.clone()));
    let receiver_handle = tokio::spawn(receiver_task(read, shutdown_tx.clone()));

    let shutdown_tx_ctrlc = shutdown_tx.clone();
    let ctrl_c_handle = tokio::spawn(async move {
        if ctrl_c().await.is_ok() {
            tracing::info!("Ctrl+C received, leaving document");
            let _ = shutdown_tx_ctrlc.send(true);
        }
    });

    let mut shutdown_rx_main = shutdown_rx.clone();
    tokio::select! {
        result = heartbeat_handle => tracing::info!("heartbeat task finished: {result:?}"),
        result = cursor_handle => tracing::info!("cursor task finished: {result:?}"),
        result = receiver_handle => tracing::info!("receiver task finished: {result:?}"),
        result = ctrl_c_handle => tracing::info!("ctrl-c handler finished: {result:?}"),
        _ = shutdown_rx_main.changed() => {}
    }
    let _ = shutdown_tx.send(true);

    // Best-effort goodbye so the server drops our session row promptly.
    let _ = send(&writer, &ClientMessage::Leave).await;
    {
        let mut guard = writer.lock().await;
        let _ = guard.close().await;
    }

    tracing::info!("disconnected");
    Ok(())
}

async fn send(
    writer: &WsWriter,
    message: &ClientMessage,
) -> Result<(), Box<dyn std::error::Error>> {
    let frame = serde_json::to_string(message)?;
    let mut guard = writer.lock().await;
    guard.send(Message::Text(frame.into())).await?;
    Ok(())
}

async fn heartbeat_task(writer: WsWriter, mut shutdown: watch::Receiver<bool>) {
    let mut ticker = tokio::time::interval(Duration::from_secs(HEARTBEAT_INTERVAL_SECONDS));
    ticker.tick().await;
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                if send(&writer, &ClientMessage::Heartbeat).await.is_err() {
                    break;
                }
            }
            _ = shutdown.changed() => {
                if *shutdown.borrow() { break; }
            }
        }
    }
}

async fn cursor_task(writer: WsWriter, mut shutdown: watch::Receiver<bool>) {
    let mut ticker = tokio::time::interval(Duration::from_millis(CURSOR_INTERVAL_MILLIS));
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let position = CursorPosition {
                    x: rand::rng().random_range(0.0..1280.0),
                    y: rand::rng().random_range(0.0..720.0),
                    slide_index: Some(rand::rng().random_range(0..5)),
                };
                if send(&writer, &ClientMessage::Cursor { position }).await.is_err() {
                    break;
                }
            }
            _ = shutdown.changed() => {
                if *shutdown.borrow() { break; }
            }
        }
    }
}

async fn receiver_task(mut reader: WsReader, shutdown: watch::Sender<bool>) {
    while let Some(message) = reader.next().await {
        match message {
            Ok(Message::Text(text)) => match serde_json::from_str::<ServerMessage>(&text) {
                Ok(ServerMessage::Joined { session }) => {
                    tracing::info!(
                        session_id = %session.id,
                        color = %session.color,
                        "joined as {}",
                        session.user_name
                    );
                }
                Ok(ServerMessage::Change(event)) => {
                    tracing::info!(?event, "change event");
                }
                Err(error) => {
                    tracing::warn!(%error, raw = %text, "unparseable server message");
                }
            },
            Ok(Message::Close(_)) => {
                tracing::info!("server closed connection");
                break;
            }
            Ok(_) => {}
            Err(error) => {
                tracing::warn!(%error, "WebSocket receive error");
                break;
            }
        }
    }
    let _ = shutdown.send(true);
}
