//! Error funnel for forwarding failures.
//!
//! A [`ProxyError`] is built only when the forwarding primitive reports a
//! failure. It carries the failure together with the matched context, the
//! resolved destination and the original request head, and is handed to the
//! rule's [`ErrorChain`] before the request finishes.
//!
//! # Handler polarity
//! A handler returning [`Handling::Unhandled`] asks for the next handler in
//! the chain (normally the process-wide default) to run as well. Returning
//! [`Handling::Handled`] stops the chain.

use std::fmt;
use std::sync::Arc;

use axum::body::Body;
use axum::http::{header, HeaderMap, HeaderValue, Method, Request, Response, StatusCode, Uri, Version};
use axum::response::IntoResponse;
use url::Url;

use crate::proxy::forward::ForwardError;

/// Method, URI, version and headers of the request that failed.
#[derive(Debug, Clone)]
pub struct RequestHead {
    pub method: Method,
    pub uri: Uri,
    pub version: Version,
    pub headers: HeaderMap,
}

impl RequestHead {
    pub fn from_request<B>(request: &Request<B>) -> Self {
        Self {
            method: request.method().clone(),
            uri: request.uri().clone(),
            version: request.version(),
            headers: request.headers().clone(),
        }
    }

    /// Rebuild a bodiless request from the head.
    pub fn into_request(self) -> Request<Body> {
        let mut request = Request::new(Body::empty());
        *request.method_mut() = self.method;
        *request.uri_mut() = self.uri;
        *request.version_mut() = self.version;
        *request.headers_mut() = self.headers;
        request
    }
}

/// Failure while forwarding a plain HTTP request.
#[derive(Debug)]
pub struct WebError {
    pub error: ForwardError,
    pub request: RequestHead,
    pub context: String,
    pub target: Url,
    response: Option<Response<Body>>,
    pass: bool,
}

impl WebError {
    pub fn new(error: ForwardError, request: RequestHead, context: impl Into<String>, target: Url) -> Self {
        Self {
            error,
            request,
            context: context.into(),
            target,
            response: None,
            pass: false,
        }
    }

    /// Answer the client with this response instead of the default 502.
    pub fn respond(&mut self, response: Response<Body>) {
        self.response = Some(response);
        self.pass = false;
    }

    pub fn has_response(&self) -> bool {
        self.response.is_some()
    }

    /// Hand the request back to the host's next handler instead of answering.
    ///
    /// The body was consumed by the failed forward; the next handler sees the
    /// original head with an empty body.
    pub fn pass(&mut self) {
        self.pass = true;
        self.response = None;
    }

    pub fn is_passed(&self) -> bool {
        self.pass
    }
}

/// Failure while forwarding a WebSocket upgrade.
///
/// The client connection has not been switched yet when this is raised, so
/// the only thing left to do with it is to refuse the upgrade.
#[derive(Debug)]
pub struct SocketError {
    pub error: ForwardError,
    pub request: RequestHead,
    pub context: String,
    pub target: Url,
    status: Option<StatusCode>,
}

impl SocketError {
    pub fn new(error: ForwardError, request: RequestHead, context: impl Into<String>, target: Url) -> Self {
        Self {
            error,
            request,
            context: context.into(),
            target,
            status: None,
        }
    }

    /// Refuse the upgrade with this status instead of the default 502.
    pub fn reject(&mut self, status: StatusCode) {
        self.status = Some(status);
    }
}

/// Forwarding failure, by request shape.
#[derive(Debug)]
pub enum ProxyError {
    Web(WebError),
    Socket(SocketError),
}

impl ProxyError {
    pub fn error(&self) -> &ForwardError {
        match self {
            Self::Web(e) => &e.error,
            Self::Socket(e) => &e.error,
        }
    }

    pub fn request(&self) -> &RequestHead {
        match self {
            Self::Web(e) => &e.request,
            Self::Socket(e) => &e.request,
        }
    }

    /// Context of the rule that matched.
    pub fn context(&self) -> &str {
        match self {
            Self::Web(e) => &e.context,
            Self::Socket(e) => &e.context,
        }
    }

    /// Resolved destination the request was headed for.
    pub fn target(&self) -> &Url {
        match self {
            Self::Web(e) => &e.target,
            Self::Socket(e) => &e.target,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Web(_) => "web",
            Self::Socket(_) => "socket",
        }
    }

    /// The response the client gets once the handler chain is done.
    pub fn into_response(self) -> Response<Body> {
        match self {
            Self::Web(e) => e
                .response
                .unwrap_or_else(|| (StatusCode::BAD_GATEWAY, "Bad Gateway").into_response()),
            Self::Socket(e) => {
                let status = e.status.unwrap_or(StatusCode::BAD_GATEWAY);
                let mut response = status.into_response();
                response
                    .headers_mut()
                    .insert(header::CONNECTION, HeaderValue::from_static("close"));
                response
            }
        }
    }
}

impl fmt::Display for ProxyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} proxy error: {} {} ({} -> {}): {}",
            self.kind(),
            self.request().method,
            self.request().uri,
            self.context(),
            self.target(),
            self.error()
        )
    }
}

impl std::error::Error for ProxyError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(self.error())
    }
}

/// What a handler did with an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Handling {
    /// Stop here.
    Handled,
    /// Let the next handler in the chain run too.
    Unhandled,
}

/// Something that reacts to forwarding failures.
pub trait ErrorHandler: Send + Sync {
    fn handle(&self, error: &mut ProxyError) -> Handling;
}

impl<F> ErrorHandler for F
where
    F: Fn(&mut ProxyError) -> Handling + Send + Sync,
{
    fn handle(&self, error: &mut ProxyError) -> Handling {
        self(error)
    }
}

/// Ordered handlers for one rule: its own handler, then the default.
#[derive(Clone, Default)]
pub struct ErrorChain {
    handlers: Vec<Arc<dyn ErrorHandler>>,
}

impl ErrorChain {
    pub fn new(
        rule_handler: Option<Arc<dyn ErrorHandler>>,
        default_handler: Option<Arc<dyn ErrorHandler>>,
    ) -> Self {
        Self {
            handlers: rule_handler.into_iter().chain(default_handler).collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    /// Run handlers in order until one reports [`Handling::Handled`].
    ///
    /// Returns `Unhandled` when every handler passed, or there were none.
    pub fn handle(&self, error: &mut ProxyError) -> Handling {
        for handler in &self.handlers {
            if handler.handle(error) == Handling::Handled {
                return Handling::Handled;
            }
        }
        Handling::Unhandled
    }
}

impl fmt::Debug for ErrorChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ErrorChain")
            .field("handlers", &self.handlers.len())
            .finish()
    }
}

/// Default handler: logs the failure with its full source chain.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogErrorHandler;

impl ErrorHandler for LogErrorHandler {
    fn handle(&self, error: &mut ProxyError) -> Handling {
        let mut detail = error.error().to_string();
        let mut source = std::error::Error::source(error.error());
        while let Some(cause) = source {
            detail.push_str(": ");
            detail.push_str(&cause.to_string());
            source = cause.source();
        }

        tracing::error!(
            kind = error.kind(),
            method = %error.request().method,
            path = %error.request().uri,
            context = error.context(),
            target = %error.target(),
            error = %detail,
            "proxy error"
        );
        Handling::Handled
    }
}
