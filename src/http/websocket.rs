//! WebSocket proxy handling.
//!
//! # Responsibilities
//! - Detect WebSocket upgrade requests
//! - Tunnel bytes between the upgraded client and upstream connections
//!
//! # Data Flow
//! ```text
//! Client ←──── upgraded TCP ────→ Proxy ←──── upgraded TCP ────→ Backend
//! ```
//!
//! # Design Decisions
//! - Byte-level tunnel (no frame parsing); close and ping/pong pass through
//! - The tunnel is detached from the request; it lives until either side closes

use axum::http::{header, HeaderMap};
use hyper::upgrade::OnUpgrade;
use hyper_util::rt::TokioIo;

/// True when the request asks to switch to the WebSocket protocol.
pub fn is_upgrade_request(headers: &HeaderMap) -> bool {
    let connection_upgrade = headers
        .get_all(header::CONNECTION)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .any(|token| token.trim().eq_ignore_ascii_case("upgrade"));

    let websocket = headers
        .get(header::UPGRADE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.trim().eq_ignore_ascii_case("websocket"));

    connection_upgrade && websocket
}

/// Wait for both sides to finish upgrading, then copy bytes until one closes.
pub async fn tunnel(client: OnUpgrade, upstream: OnUpgrade, addr: String) {
    let (client, upstream) = match tokio::try_join!(client, upstream) {
        Ok(pair) => pair,
        Err(e) => {
            tracing::warn!(upstream = %addr, error = %e, "WebSocket upgrade failed");
            return;
        }
    };

    tracing::debug!(upstream = %addr, "WebSocket tunnel open");
    let mut client = TokioIo::new(client);
    let mut upstream = TokioIo::new(upstream);

    match tokio::io::copy_bidirectional(&mut client, &mut upstream).await {
        Ok((to_upstream, to_client)) => {
            tracing::debug!(
                upstream = %addr,
                bytes_to_upstream = to_upstream,
                bytes_to_client = to_client,
                "WebSocket tunnel closed"
            );
        }
        Err(e) => {
            tracing::debug!(upstream = %addr, error = %e, "WebSocket tunnel closed with error");
        }
    }
}
