//! Proxy Middleware.
//! Hands matching requests and upgrades to the dispatcher, everything else to the next handler.

use axum::{
    body::Body,
    extract::State,
    http::{Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::sync::Arc;

use crate::proxy::{Dispatch, ProxyDispatcher};

pub async fn proxy_middleware(
    State(dispatcher): State<Arc<ProxyDispatcher>>,
    req: Request<Body>,
    next: Next,
) -> Response {
    let method = req.method().clone();
    let path = req.uri().path().to_string();

    match dispatcher.dispatch(req).await {
        Ok(Dispatch::Pass(req)) => next.run(req).await,
        Ok(Dispatch::Proxied(response)) => response,
        Err(e) => {
            // Bad target or rewrite: fail this request, keep serving.
            tracing::error!(method = %method, path = %path, error = %e, "Proxy configuration error");
            (StatusCode::INTERNAL_SERVER_ERROR, "Proxy configuration error").into_response()
        }
    }
}
