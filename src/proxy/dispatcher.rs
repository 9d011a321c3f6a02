//! Request dispatch.
//!
//! # Responsibilities
//! - Pick the rule for a plain HTTP request or a WebSocket upgrade
//! - Resolve the destination and build the forwarding options
//! - Call the forwarding primitive and funnel failures into the rule's error chain
//!
//! # Data Flow
//! ```text
//! Request
//!     → RuleTable::find (websocket rules only for upgrades, hot-reload excluded)
//!     → miss: Dispatch::Pass (host handles it)
//!     → hit: resolve → ProxyOptions → Forwarder::web / Forwarder::ws
//!     → failure: ProxyError → ErrorChain → error response, or Dispatch::Pass
//! ```
//!
//! # Design Decisions
//! - No retries; a forwarding failure is terminal for that request
//! - A destination that cannot be resolved is a configuration error and goes
//!   back to the caller, never through the handler chain
//! - A miss hands the request back exactly once

use std::sync::Arc;
use std::time::Instant;

use axum::body::Body;
use axum::http::{header, HeaderMap, Request, Response};

use crate::error::ConfigError;
use crate::http::hmr::HMR_PROTOCOL;
use crate::http::websocket::is_upgrade_request;
use crate::observability::metrics;
use crate::proxy::error::{ProxyError, RequestHead, SocketError, WebError};
use crate::proxy::forward::Forwarder;
use crate::routing::{resolve, ProxyOptions, ResolvedTarget, Rule, RuleTable};

/// Outcome of dispatching one request.
#[derive(Debug)]
pub enum Dispatch {
    /// No rule matched; the request goes to the next handler untouched.
    Pass(Request<Body>),
    /// A rule matched; this is the client's response.
    Proxied(Response<Body>),
}

impl Dispatch {
    pub fn is_pass(&self) -> bool {
        matches!(self, Self::Pass(_))
    }
}

/// Routing engine front: rule table plus forwarding primitive.
#[derive(Clone)]
pub struct ProxyDispatcher {
    table: Arc<RuleTable>,
    forwarder: Arc<dyn Forwarder>,
    hmr_protocol: String,
}

impl ProxyDispatcher {
    pub fn new(table: RuleTable, forwarder: Arc<dyn Forwarder>) -> Self {
        Self {
            table: Arc::new(table),
            forwarder,
            hmr_protocol: HMR_PROTOCOL.to_string(),
        }
    }

    /// Override the sub-protocol reserved for the host's hot-reload channel.
    pub fn with_hmr_protocol(mut self, protocol: impl Into<String>) -> Self {
        self.hmr_protocol = protocol.into();
        self
    }

    pub fn hmr_protocol(&self) -> &str {
        &self.hmr_protocol
    }

    pub fn table(&self) -> &RuleTable {
        &self.table
    }

    /// Dispatch by request shape: upgrades take the WebSocket path.
    pub async fn dispatch(&self, request: Request<Body>) -> Result<Dispatch, ConfigError> {
        if is_upgrade_request(request.headers()) {
            self.handle_upgrade(request).await
        } else {
            self.handle_request(request).await
        }
    }

    /// HTTP path: any rule may match.
    pub async fn handle_request(&self, request: Request<Body>) -> Result<Dispatch, ConfigError> {
        let original = original_path(&request);
        let Some(rule) = self.route(&original, |_| true) else {
            metrics::record_dispatch("web", "pass");
            return Ok(Dispatch::Pass(request));
        };

        let (resolved, options) = prepare(rule, &original)?;
        let head = RequestHead::from_request(&request);

        let start = Instant::now();
        let result = self.forwarder.web(request, &options).await;
        metrics::record_upstream("web", start);

        match result {
            Ok(response) => {
                metrics::record_dispatch("web", "proxied");
                Ok(Dispatch::Proxied(response))
            }
            Err(error) => {
                metrics::record_dispatch("web", "error");
                let mut error = ProxyError::Web(WebError::new(
                    error,
                    head,
                    rule.context(),
                    resolved.url,
                ));
                rule.error_chain().handle(&mut error);
                match error {
                    ProxyError::Web(web) if web.is_passed() => {
                        tracing::debug!(context = rule.context(), "Failed request handed back to host");
                        Ok(Dispatch::Pass(web.request.into_request()))
                    }
                    error => Ok(Dispatch::Proxied(error.into_response())),
                }
            }
        }
    }

    /// WebSocket path: only websocket rules, and never the hot-reload channel.
    pub async fn handle_upgrade(&self, request: Request<Body>) -> Result<Dispatch, ConfigError> {
        if self.is_hmr(request.headers()) {
            metrics::record_dispatch("socket", "pass");
            return Ok(Dispatch::Pass(request));
        }

        let original = original_path(&request);
        let Some(rule) = self.route(&original, Rule::is_websocket) else {
            metrics::record_dispatch("socket", "pass");
            return Ok(Dispatch::Pass(request));
        };

        let (resolved, options) = prepare(rule, &original)?;
        let head = RequestHead::from_request(&request);

        let start = Instant::now();
        let result = self.forwarder.ws(request, &options).await;
        metrics::record_upstream("socket", start);

        match result {
            Ok(response) => {
                metrics::record_dispatch("socket", "proxied");
                Ok(Dispatch::Proxied(response))
            }
            Err(error) => {
                metrics::record_dispatch("socket", "error");
                let mut error = ProxyError::Socket(SocketError::new(
                    error,
                    head,
                    rule.context(),
                    resolved.url,
                ));
                rule.error_chain().handle(&mut error);
                Ok(Dispatch::Proxied(error.into_response()))
            }
        }
    }

    fn route<F>(&self, original: &str, filter: F) -> Option<&Rule>
    where
        F: FnMut(&Rule) -> bool,
    {
        let rule = self.table.find(original, filter, |skipped| {
            tracing::trace!(context = skipped.context(), path = original, "rule skipped");
        })?;

        tracing::debug!(
            context = rule.context(),
            "{} -> {}{}",
            original,
            if rule.is_websocket() { "ws " } else { "" },
            rule.target()
        );
        Some(rule)
    }

    fn is_hmr(&self, headers: &HeaderMap) -> bool {
        headers
            .get(header::SEC_WEBSOCKET_PROTOCOL)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|v| v == self.hmr_protocol)
    }
}

/// Path and query as received, the string every context is matched against.
fn original_path<B>(request: &Request<B>) -> String {
    request
        .uri()
        .path_and_query()
        .map(|pq| pq.as_str().to_string())
        .unwrap_or_else(|| "/".to_string())
}

fn prepare(rule: &Rule, original: &str) -> Result<(ResolvedTarget, ProxyOptions), ConfigError> {
    let resolved = resolve(rule, original)?;
    let options = ProxyOptions::build(&resolved, rule.options());
    Ok((resolved, options))
}
