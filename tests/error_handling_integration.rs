//! Error-handling integration tests
//!
//! Covers configuration rejection, binding resolution, invalid path
//! expressions, and upstream failure propagation through `handle`.

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use http::{Request, Response, StatusCode};

use mfe_proxy::config::ROUTES_KEY;
use mfe_proxy::{handle, Env, ProxyError, UpstreamFetcher};

struct NullFetcher;

#[async_trait]
impl UpstreamFetcher for NullFetcher {
    async fn fetch(&self, _request: Request<Bytes>) -> Result<Response<Bytes>, ProxyError> {
        Ok(Response::builder()
            .status(StatusCode::OK)
            .body(Bytes::new())?)
    }
}

struct FailingFetcher;

#[async_trait]
impl UpstreamFetcher for FailingFetcher {
    async fn fetch(&self, _request: Request<Bytes>) -> Result<Response<Bytes>, ProxyError> {
        Err(ProxyError::upstream("connection refused"))
    }
}

fn get(url: &str) -> Request<Bytes> {
    Request::builder().uri(url).body(Bytes::new()).unwrap()
}

fn assert_config_error(result: Result<Response<Bytes>, ProxyError>, fragment: &str) {
    match result {
        Err(ProxyError::ConfigError(message)) => {
            assert!(
                message.contains(fragment),
                "expected '{}' in '{}'",
                fragment,
                message
            );
        }
        other => panic!("expected ConfigError, got {:?}", other.map(|r| r.status())),
    }
}

#[tokio::test]
async fn test_missing_routes_variable() {
    let env = Env::new();
    assert_config_error(
        handle(get("https://h/app"), &env).await,
        "ROUTES environment variable is required",
    );
}

#[tokio::test]
async fn test_malformed_routes_json() {
    let env = Env::new().with_var(ROUTES_KEY, "{broken");
    assert_config_error(
        handle(get("https://h/app"), &env).await,
        "Failed to parse ROUTES",
    );
}

#[tokio::test]
async fn test_routes_wrong_shape() {
    let env = Env::new().with_var(ROUTES_KEY, true);
    assert_config_error(
        handle(get("https://h/app"), &env).await,
        "ROUTES must be a JSON object or a JSON string",
    );
}

#[tokio::test]
async fn test_empty_route_list() {
    let env = Env::new().with_var(ROUTES_KEY, r#"{"routes":[]}"#);
    assert_config_error(
        handle(get("https://h/app"), &env).await,
        "at least one route",
    );
}

#[tokio::test]
async fn test_route_entry_missing_fields() {
    let env = Env::new().with_var(ROUTES_KEY, r#"[{"path":"/app"}]"#);
    assert_config_error(
        handle(get("https://h/app"), &env).await,
        "Invalid route entry",
    );
}

#[tokio::test]
async fn test_unresolved_binding() {
    let env = Env::new().with_var(ROUTES_KEY, r#"[{"binding":"APP","path":"/app"}]"#);
    assert_config_error(
        handle(get("https://h/app"), &env).await,
        "binding 'APP' is not present",
    );
}

#[tokio::test]
async fn test_invalid_path_expression() {
    let env = Env::new()
        .with_var(ROUTES_KEY, r#"[{"binding":"APP","path":"/app/:id("}]"#)
        .with_binding("APP", Arc::new(NullFetcher));
    let result = handle(get("https://h/app"), &env).await;
    match result {
        Err(ProxyError::InvalidPathExpression { expression, .. }) => {
            assert_eq!(expression, "/app/:id(");
        }
        other => panic!("expected InvalidPathExpression, got {:?}", other.map(|r| r.status())),
    }
}

#[tokio::test]
async fn test_upstream_failure_propagates_unchanged() {
    let env = Env::new()
        .with_var(ROUTES_KEY, r#"[{"binding":"APP","path":"/app"}]"#)
        .with_binding("APP", Arc::new(FailingFetcher));
    let result = handle(get("https://h/app/page"), &env).await;
    match result {
        Err(ProxyError::UpstreamError(message)) => {
            assert_eq!(message, "connection refused");
        }
        other => panic!("expected UpstreamError, got {:?}", other.map(|r| r.status())),
    }
}

#[tokio::test]
async fn test_config_errors_fail_before_fetch() {
    // A broken table rejects the request even when the path would not have
    // matched the faulty route.
    let env = Env::new()
        .with_var(
            ROUTES_KEY,
            r#"[{"binding":"APP","path":"/app"},{"binding":"MISSING","path":"/x"}]"#,
        )
        .with_binding("APP", Arc::new(NullFetcher));
    assert_config_error(
        handle(get("https://h/app/page"), &env).await,
        "binding 'MISSING' is not present",
    );
}

#[tokio::test]
async fn test_unmatched_path_is_not_an_error() {
    let env = Env::new()
        .with_var(ROUTES_KEY, r#"[{"binding":"APP","path":"/app"}]"#)
        .with_binding("APP", Arc::new(NullFetcher));
    let response = handle(get("https://h/nope"), &env).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(
        ProxyError::no_route_found("/nope").to_status_code(),
        StatusCode::NOT_FOUND
    );
}
