//! Axum middleware.

pub mod proxy;

pub use proxy::proxy_middleware;
