//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, request ID, tracing)
//!     → middleware/proxy.rs (dispatcher: proxy or pass)
//!     → hmr.rs (hot-reload upgrades) / static root / 404
//!     → Send to client
//! ```

pub mod hmr;
pub mod middleware;
pub mod server;
pub mod websocket;

pub use middleware::proxy_middleware;
pub use server::DevServer;
