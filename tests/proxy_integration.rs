//! End-to-end HTTP proxying through a running dev server.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use axum::http::StatusCode;
use axum::response::IntoResponse;
use dev_proxy::proxy::ProxyError;
use dev_proxy::{Handling, HyperForwarder, ProxyDispatcher, Rewrite, RuleOptions, RuleTable};

mod common;

#[tokio::test]
async fn test_prefix_rule_forwards_path_and_query() {
    let backend = common::start_http_backend("api").await;
    let server = common::start_server(&format!(
        r#"
[proxy]
"/api" = "http://{backend}"
"#
    ))
    .await;

    let response = reqwest::get(server.url("/api/users?page=2")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.text().await.unwrap(), "api /api/users?page=2");
}

#[tokio::test]
async fn test_declarative_rewrite() {
    let backend = common::start_http_backend("api").await;
    let server = common::start_server(&format!(
        r#"
[proxy]
"/api" = {{ target = "http://{backend}", rewrite = {{ pattern = "^/api", replacement = "" }} }}
"#
    ))
    .await;

    let body = reqwest::get(server.url("/api/users")).await.unwrap().text().await.unwrap();
    assert_eq!(body, "api /users");
}

#[tokio::test]
async fn test_first_declared_rule_wins() {
    let broad = common::start_http_backend("broad").await;
    let narrow = common::start_http_backend("narrow").await;
    let server = common::start_server(&format!(
        r#"
[proxy]
"/api" = "http://{broad}"
"/api/v2" = "http://{narrow}"
"^/v\\d+/" = "http://{narrow}"
"#
    ))
    .await;

    let body = reqwest::get(server.url("/api/v2/x")).await.unwrap().text().await.unwrap();
    assert_eq!(body, "broad /api/v2/x");

    let body = reqwest::get(server.url("/v3/items")).await.unwrap().text().await.unwrap();
    assert_eq!(body, "narrow /v3/items");
}

#[tokio::test]
async fn test_miss_falls_through_to_host() {
    let backend = common::start_http_backend("api").await;
    let server = common::start_server(&format!(
        r#"
[proxy]
"/api" = "http://{backend}"
"#
    ))
    .await;

    let response = reqwest::get(server.url("/assets/app.js")).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_unreachable_upstream_is_bad_gateway() {
    let dead = common::closed_port();
    let server = common::start_server(&format!(
        r#"
[proxy]
"/api" = "http://{dead}"
"#
    ))
    .await;

    let response = reqwest::get(server.url("/api/users")).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);

    // The server keeps serving after a failed forward.
    let response = reqwest::get(server.url("/api/users")).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
}

#[tokio::test]
async fn test_rule_handler_shapes_the_response() {
    let dead = common::closed_port();
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();

    let rule = RuleOptions::new(format!("http://{dead}")).on_error(move |error: &mut ProxyError| {
        counter.fetch_add(1, Ordering::SeqCst);
        if let ProxyError::Web(web) = error {
            web.respond((StatusCode::SERVICE_UNAVAILABLE, "backend is starting").into_response());
        }
        Handling::Handled
    });
    let table = RuleTable::new([("/api", rule)], None).unwrap();
    let server =
        common::start_server_with(ProxyDispatcher::new(table, Arc::new(HyperForwarder::new()))).await;

    let response = reqwest::get(server.url("/api/health")).await.unwrap();
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(response.text().await.unwrap(), "backend is starting");
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_closure_rewrite_to_other_origin() {
    let primary = common::start_http_backend("primary").await;
    let other = common::start_http_backend("other").await;

    let rule = RuleOptions::new(format!("http://{primary}"))
        .rewrite(Rewrite::custom(move |path: &str| format!("http://{other}/mirror{path}")));
    let table = RuleTable::new([("/data", rule)], None).unwrap();
    let server =
        common::start_server_with(ProxyDispatcher::new(table, Arc::new(HyperForwarder::new()))).await;

    let body = reqwest::get(server.url("/data/1")).await.unwrap().text().await.unwrap();
    assert_eq!(body, "other /mirror/data/1");
}

#[tokio::test]
async fn test_unsupported_rewritten_scheme_is_500() {
    let backend = common::start_http_backend("api").await;
    let rule = RuleOptions::new(format!("http://{backend}"))
        .rewrite(Rewrite::custom(|_: &str| "ftp://files.local/pub".to_string()));
    let table = RuleTable::new([("/files", rule)], None).unwrap();
    let server =
        common::start_server_with(ProxyDispatcher::new(table, Arc::new(HyperForwarder::new()))).await;

    let response = reqwest::get(server.url("/files/a")).await.unwrap();
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
}

#[tokio::test]
async fn test_request_id_is_propagated() {
    let backend = common::start_http_backend("api").await;
    let server = common::start_server(&format!(
        r#"
[proxy]
"/api" = "http://{backend}"
"#
    ))
    .await;

    let response = reqwest::get(server.url("/assets")).await.unwrap();
    assert!(response.headers().contains_key("x-request-id"));
}

#[tokio::test]
async fn test_https_upstream_without_verification() {
    let backend = common::start_https_backend("secure").await;
    let port = backend.port();
    let server = common::start_server(&format!(
        r#"
[proxy]
"/legacy" = {{ target = "https://localhost:{port}", secure = false }}
"#
    ))
    .await;

    let response = reqwest::get(server.url("/legacy/status?v=1")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.text().await.unwrap(), "secure /legacy/status?v=1");
}

#[tokio::test]
async fn test_untrusted_https_upstream_is_bad_gateway() {
    let backend = common::start_https_backend("secure").await;
    let port = backend.port();
    let server = common::start_server(&format!(
        r#"
[proxy]
"/legacy" = "https://localhost:{port}"
"#
    ))
    .await;

    let response = reqwest::get(server.url("/legacy/status")).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
}

#[tokio::test]
async fn test_rule_handler_hands_failed_request_to_host() {
    let dead = common::closed_port();
    let rule = RuleOptions::new(format!("http://{dead}")).on_error(|error: &mut ProxyError| {
        if let ProxyError::Web(web) = error {
            web.pass();
        }
        Handling::Handled
    });
    let table = RuleTable::new([("/api", rule)], None).unwrap();
    let server =
        common::start_server_with(ProxyDispatcher::new(table, Arc::new(HyperForwarder::new()))).await;

    // No static root, so the host's fallback answers.
    let response = reqwest::get(server.url("/api/health")).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(response.text().await.unwrap(), "Not Found");
}
