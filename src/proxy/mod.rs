//! Proxy dispatch subsystem.
//!
//! # Data Flow
//! ```text
//! Request from the host
//!     → dispatcher.rs (rule lookup, resolution, options)
//!     → forward.rs (Forwarder: HTTP exchange or WebSocket tunnel, TLS via tls.rs)
//!     → error.rs (ProxyError → rule handler → default handler)
//!     → Response, or the request handed back to the host
//! ```
//!
//! # Design Decisions
//! - Forwarding sits behind a trait; the dispatcher never touches sockets
//! - Failures are values offered to handlers, never panics
//! - Handlers may shape the client response; otherwise 502

pub mod dispatcher;
pub mod error;
pub mod forward;
pub mod tls;

pub use dispatcher::{Dispatch, ProxyDispatcher};
pub use error::{
    ErrorChain, ErrorHandler, Handling, LogErrorHandler, ProxyError, RequestHead, SocketError,
    WebError,
};
pub use forward::{ForwardError, Forwarder, HyperForwarder};
