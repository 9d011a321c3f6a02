//! Hot-reload channel.
//!
//! The dev server's own WebSocket endpoint. Clients select it by offering the
//! reserved sub-protocol; the proxy never forwards such upgrades.

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::response::Response;

/// Sub-protocol reserved for the hot-reload channel.
pub const HMR_PROTOCOL: &str = "vite-hmr";

/// Greeting sent as soon as a client connects.
pub const CONNECTED_MESSAGE: &str = r#"{"type":"connected"}"#;

/// Accept a hot-reload upgrade, negotiating `protocol`.
pub async fn upgrade(ws: WebSocketUpgrade, protocol: String) -> Response {
    ws.protocols([protocol]).on_upgrade(handle_socket)
}

async fn handle_socket(mut socket: WebSocket) {
    tracing::debug!("Hot-reload client connected");

    if socket.send(Message::Text(CONNECTED_MESSAGE.into())).await.is_err() {
        return;
    }

    while let Some(msg) = socket.recv().await {
        match msg {
            Ok(Message::Close(_)) | Err(_) => break,
            Ok(Message::Text(text)) => {
                tracing::trace!(message = %text.as_str(), "Hot-reload client message");
            }
            Ok(_) => {}
        }
    }

    tracing::debug!("Hot-reload client disconnected");
}
