//! Forwarding primitives.
//!
//! The routing engine decides where a request goes; a [`Forwarder`] moves
//! the bytes. [`HyperForwarder`] is the bundled implementation: HTTP and
//! HTTPS over pooled hyper clients, WebSocket by upgrading an upstream
//! HTTP/1.1 connection (TLS-wrapped for `wss`) and tunnelling between the
//! two upgraded streams.

use std::sync::Arc;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{HeaderMap, Request, Response, StatusCode, Uri, Version};
use hyper::upgrade::OnUpgrade;
use hyper_rustls::{HttpsConnector, HttpsConnectorBuilder};
use hyper_util::client::legacy::{connect::HttpConnector, Client};
use hyper_util::rt::{TokioExecutor, TokioIo};
use rustls::ClientConfig;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio_rustls::TlsConnector;

use crate::http::websocket;
use crate::proxy::tls;
use crate::routing::{Protocol, ProxyOptions};

/// Failure reported by a forwarding primitive.
#[derive(Debug, Error)]
pub enum ForwardError {
    /// TCP connection to the upstream could not be established.
    #[error("failed to connect to {addr}")]
    Connect {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    /// The pooled client failed to complete the exchange.
    #[error("upstream request failed")]
    Client(#[from] hyper_util::client::legacy::Error),

    /// The upstream HTTP/1.1 connection failed.
    #[error("upstream connection failed")]
    Http(#[from] hyper::Error),

    /// The upstream request could not be built from the options.
    #[error("invalid upstream request")]
    Request(#[from] axum::http::Error),

    /// The upstream host is not usable as a TLS server name.
    #[error("invalid TLS server name: {host}")]
    ServerName { host: String },

    /// The TLS handshake with the upstream failed.
    #[error("TLS handshake with {addr} failed")]
    Tls {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    /// The client connection cannot be upgraded.
    #[error("client connection does not support upgrades")]
    NoUpgrade,
}

impl ForwardError {
    pub fn connect(addr: impl Into<String>, source: std::io::Error) -> Self {
        Self::Connect {
            addr: addr.into(),
            source,
        }
    }
}

/// Moves a request, or an upgraded connection, to the resolved upstream.
#[async_trait]
pub trait Forwarder: Send + Sync {
    /// Forward an HTTP request and return the upstream response.
    async fn web(
        &self,
        request: Request<Body>,
        options: &ProxyOptions,
    ) -> Result<Response<Body>, ForwardError>;

    /// Forward a WebSocket upgrade.
    ///
    /// Returns the response that answers the client's upgrade request. When
    /// it is a `101`, the forwarder owns the tunnel from then on.
    async fn ws(
        &self,
        request: Request<Body>,
        options: &ProxyOptions,
    ) -> Result<Response<Body>, ForwardError>;
}

/// Headers that describe one hop and are never forwarded.
const HOP_BY_HOP: [&str; 8] = [
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
];

fn strip_hop_by_hop(headers: &mut HeaderMap) {
    for name in HOP_BY_HOP {
        headers.remove(name);
    }
}

/// HTTP client type for forwarding requests. Picks TLS by URI scheme.
type HttpClient = Client<HttpsConnector<HttpConnector>, Body>;

/// One pooled client plus the TLS settings it was built with.
#[derive(Clone)]
struct Upstream {
    client: HttpClient,
    tls: Arc<ClientConfig>,
}

impl Upstream {
    fn new(tls: ClientConfig) -> Self {
        let mut http = HttpConnector::new();
        http.set_nodelay(true);
        http.enforce_http(false);

        let https = HttpsConnectorBuilder::new()
            .with_tls_config(tls.clone())
            .https_or_http()
            .enable_http1()
            .wrap_connector(http);

        Self {
            client: Client::builder(TokioExecutor::new()).build(https),
            tls: Arc::new(tls),
        }
    }
}

/// Forwarder backed by hyper.
#[derive(Clone)]
pub struct HyperForwarder {
    verified: Upstream,
    unverified: Upstream,
}

impl HyperForwarder {
    pub fn new() -> Self {
        Self {
            verified: Upstream::new(tls::client_config(true)),
            unverified: Upstream::new(tls::client_config(false)),
        }
    }

    fn upstream(&self, options: &ProxyOptions) -> &Upstream {
        if options.reject_unauthorized() {
            &self.verified
        } else {
            &self.unverified
        }
    }
}

impl Default for HyperForwarder {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Forwarder for HyperForwarder {
    async fn web(
        &self,
        request: Request<Body>,
        options: &ProxyOptions,
    ) -> Result<Response<Body>, ForwardError> {
        let (mut parts, body) = request.into_parts();
        parts.uri = Uri::builder()
            .scheme(options.protocol.as_str())
            .authority(options.authority())
            .path_and_query(options.path.as_str())
            .build()?;
        parts.version = Version::HTTP_11;
        strip_hop_by_hop(&mut parts.headers);

        let response = self.upstream(options).client.request(Request::from_parts(parts, body)).await?;

        let (mut parts, body) = response.into_parts();
        strip_hop_by_hop(&mut parts.headers);
        Ok(Response::from_parts(parts, Body::new(body)))
    }

    async fn ws(
        &self,
        mut request: Request<Body>,
        options: &ProxyOptions,
    ) -> Result<Response<Body>, ForwardError> {
        let client_upgrade = request
            .extensions_mut()
            .remove::<OnUpgrade>()
            .ok_or(ForwardError::NoUpgrade)?;

        let addr = options.authority();
        let stream = TcpStream::connect(&addr)
            .await
            .map_err(|e| ForwardError::connect(&addr, e))?;
        if let Err(e) = stream.set_nodelay(true) {
            tracing::debug!(upstream = %addr, error = %e, "Failed to set TCP_NODELAY");
        }

        // Upgrade headers stay: they are the point of this request.
        let (mut parts, _body) = request.into_parts();
        parts.uri = Uri::builder().path_and_query(options.path.as_str()).build()?;
        parts.version = Version::HTTP_11;
        let request = Request::from_parts(parts, Body::empty());

        let mut response = match options.protocol {
            Protocol::Http => send_upgrade(stream, request).await?,
            Protocol::Https => {
                let name = tls::server_name(&options.host).map_err(|_| ForwardError::ServerName {
                    host: options.host.clone(),
                })?;
                let connector = TlsConnector::from(self.upstream(options).tls.clone());
                let stream = connector
                    .connect(name, stream)
                    .await
                    .map_err(|e| ForwardError::Tls {
                        addr: addr.clone(),
                        source: e,
                    })?;
                send_upgrade(stream, request).await?
            }
        };

        if response.status() != StatusCode::SWITCHING_PROTOCOLS {
            tracing::debug!(
                upstream = %addr,
                status = %response.status(),
                "Upstream declined the upgrade"
            );
            let (parts, body) = response.into_parts();
            return Ok(Response::from_parts(parts, Body::new(body)));
        }

        let upstream_upgrade = hyper::upgrade::on(&mut response);
        tokio::spawn(websocket::tunnel(client_upgrade, upstream_upgrade, addr));

        let (parts, _body) = response.into_parts();
        Ok(Response::from_parts(parts, Body::empty()))
    }
}

/// Send an upgrade request over a fresh HTTP/1.1 connection on `io`.
async fn send_upgrade<S>(io: S, request: Request<Body>) -> Result<Response<hyper::body::Incoming>, ForwardError>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let (mut sender, connection) = hyper::client::conn::http1::handshake::<_, Body>(TokioIo::new(io)).await?;
    tokio::spawn(async move {
        if let Err(e) = connection.with_upgrades().await {
            tracing::debug!(error = %e, "Upstream upgrade connection closed with error");
        }
    });
    Ok(sender.send_request(request).await?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::routing::ResolvedTarget;
    use axum::http::header;
    use serde_json::Map;
    use url::Url;

    fn options(target: &str) -> ProxyOptions {
        let resolved = ResolvedTarget::from_url(Url::parse(target).unwrap()).unwrap();
        ProxyOptions::build(&resolved, &Map::new())
    }

    #[test]
    fn test_strip_hop_by_hop() {
        let mut headers = HeaderMap::new();
        headers.insert(header::CONNECTION, "keep-alive".parse().unwrap());
        headers.insert("keep-alive", "timeout=5".parse().unwrap());
        headers.insert(header::UPGRADE, "h2c".parse().unwrap());
        headers.insert(header::ACCEPT, "text/html".parse().unwrap());

        strip_hop_by_hop(&mut headers);
        assert_eq!(headers.len(), 1);
        assert!(headers.contains_key(header::ACCEPT));
    }

    #[tokio::test]
    async fn test_https_upstream_is_attempted() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let forwarder = HyperForwarder::new();
        let request = Request::get("/api").body(Body::empty()).unwrap();
        let err = forwarder
            .web(request, &options(&format!("https://{}/api", addr)))
            .await
            .unwrap_err();
        assert!(matches!(err, ForwardError::Client(_)));
    }

    #[test]
    fn test_reject_unauthorized_selects_client() {
        let forwarder = HyperForwarder::new();
        let verified = options("https://localhost:8443/");
        let mut unverified = verified.clone();
        unverified
            .connection
            .insert(crate::routing::rule::REJECT_UNAUTHORIZED.to_string(), false.into());

        assert!(Arc::ptr_eq(&forwarder.upstream(&verified).tls, &forwarder.verified.tls));
        assert!(Arc::ptr_eq(&forwarder.upstream(&unverified).tls, &forwarder.unverified.tls));
    }

    #[tokio::test]
    async fn test_ws_without_upgrade_support() {
        let forwarder = HyperForwarder::new();
        let request = Request::get("/socket").body(Body::empty()).unwrap();

        let err = forwarder
            .ws(request, &options("http://127.0.0.1:9/socket"))
            .await
            .unwrap_err();
        assert!(matches!(err, ForwardError::NoUpgrade));
    }

    #[tokio::test]
    async fn test_connection_refused() {
        // Bind then drop to get a port nobody listens on.
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let forwarder = HyperForwarder::new();
        let request = Request::get("/").body(Body::empty()).unwrap();
        let result = forwarder
            .web(request, &options(&format!("http://{}/", addr)))
            .await;
        assert!(matches!(result, Err(ForwardError::Client(_))));
    }
}
