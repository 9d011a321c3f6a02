//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create Axum Router with the hot-reload endpoint and the static fallback
//! - Install the proxy middleware in front of every route
//! - Wire up middleware (tracing, request ID)
//! - Bind server to listener and stop on the shutdown signal

use axum::{
    extract::ws::WebSocketUpgrade,
    http::{Request, StatusCode},
    middleware,
    response::IntoResponse,
    routing::get,
    Router,
};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tower_http::{
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    services::ServeDir,
    trace::TraceLayer,
};

use crate::config::{DevServerConfig, ServerConfig};
use crate::error::ConfigError;
use crate::http::hmr;
use crate::http::middleware::proxy_middleware;
use crate::proxy::{ErrorHandler, Forwarder, LogErrorHandler, ProxyDispatcher};
use crate::routing::RuleTable;

/// Development server: static files, hot reload, and the proxy in front.
pub struct DevServer {
    router: Router,
    config: ServerConfig,
    dispatcher: Arc<ProxyDispatcher>,
}

impl DevServer {
    /// Build the server from configuration.
    ///
    /// Rules come from `[proxy]`; forwarding failures nobody else handles are
    /// logged through [`LogErrorHandler`].
    pub fn new(config: &DevServerConfig, forwarder: Arc<dyn Forwarder>) -> Result<Self, ConfigError> {
        let default_handler: Arc<dyn ErrorHandler> = Arc::new(LogErrorHandler);
        let table = RuleTable::from_config(config.proxy.clone(), Some(default_handler))?;

        tracing::info!(rules = table.len(), "Proxy rules loaded");
        for rule in table.iter() {
            tracing::debug!(
                context = rule.context(),
                target = rule.target(),
                pattern = rule.is_pattern(),
                websocket = rule.is_websocket(),
                "Proxy rule"
            );
        }

        let dispatcher = ProxyDispatcher::new(table, forwarder);
        Ok(Self::with_dispatcher(config.server.clone(), dispatcher))
    }

    /// Build the server around an existing dispatcher (programmatic rules).
    ///
    /// The dispatcher takes `config.hmr_protocol`, so the hot-reload route and
    /// the upgrade filter always agree.
    pub fn with_dispatcher(config: ServerConfig, dispatcher: ProxyDispatcher) -> Self {
        let dispatcher = Arc::new(dispatcher.with_hmr_protocol(config.hmr_protocol.as_str()));
        let router = Self::build_router(&config, dispatcher.clone());
        Self {
            router,
            config,
            dispatcher,
        }
    }

    /// Build the Axum router with all middleware layers.
    fn build_router(config: &ServerConfig, dispatcher: Arc<ProxyDispatcher>) -> Router {
        let protocol = config.hmr_protocol.clone();
        let router = Router::new().route(
            &config.hmr_path,
            get(move |ws: WebSocketUpgrade| hmr::upgrade(ws, protocol.clone())),
        );

        let router = match &config.root {
            Some(root) => router.fallback_service(ServeDir::new(root)),
            None => router.fallback(not_found),
        };

        router
            .layer(middleware::from_fn_with_state(dispatcher, proxy_middleware))
            .layer(TraceLayer::new_for_http().make_span_with(|request: &Request<_>| {
                let request_id = request
                    .headers()
                    .get("x-request-id")
                    .and_then(|v| v.to_str().ok())
                    .unwrap_or("unknown");
                tracing::info_span!(
                    "request",
                    request_id = %request_id,
                    method = %request.method(),
                    path = %request.uri().path()
                )
            }))
            .layer(PropagateRequestIdLayer::x_request_id())
            .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
    }

    /// The fully layered router, for serving it elsewhere or driving it in tests.
    pub fn router(&self) -> Router {
        self.router.clone()
    }

    pub fn dispatcher(&self) -> &ProxyDispatcher {
        &self.dispatcher
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Run the server until `shutdown` fires.
    pub async fn run(
        self,
        listener: TcpListener,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(
            address = %addr,
            hmr_path = %self.config.hmr_path,
            root = ?self.config.root,
            "Dev server starting"
        );

        axum::serve(listener, self.router)
            .with_graceful_shutdown(async move {
                let _ = shutdown.recv().await;
                tracing::info!("Shutdown signal received");
            })
            .await?;

        tracing::info!("Dev server stopped");
        Ok(())
    }
}

async fn not_found() -> impl IntoResponse {
    (StatusCode::NOT_FOUND, "Not Found")
}
