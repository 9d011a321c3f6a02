//! Development-server proxy library.
//!
//! Routes requests and WebSocket upgrades from a dev server to upstream
//! targets by path context, with per-rule rewrites, connection options and
//! error handlers.

pub mod config;
pub mod error;
pub mod http;
pub mod lifecycle;
pub mod observability;
pub mod proxy;
pub mod routing;

pub use config::schema::DevServerConfig;
pub use error::ConfigError;
pub use http::DevServer;
pub use lifecycle::Shutdown;
pub use proxy::{
    Dispatch, ErrorHandler, ForwardError, Forwarder, Handling, HyperForwarder, ProxyDispatcher,
    ProxyError,
};
pub use routing::{Rewrite, Rule, RuleOptions, RuleTable};
