//! Microfrontend HTTP Proxy
//!
//! A mount-aware reverse proxy that dispatches each incoming request to one
//! of several independently deployed upstream services based on the request
//! path, strips the mount prefix, and rewrites redirects, cookie scopes,
//! and HTML/CSS bodies so every upstream behaves as if it were deployed at
//! its assigned sub-path.
//!
//! The primary entry point is [`handle`], which materializes the route
//! table and options from a per-request [`Env`] and proxies through the
//! selected upstream binding. No state is shared across requests.

pub mod components;
pub mod config;
pub mod error;
pub mod server;

pub use components::assets::AssetPrefixSet;
pub use components::proxy::ProxyOptions;
pub use components::router::RouteTable;
pub use config::{Env, RequestConfig, RouteEntry, UpstreamFetcher};
pub use error::ProxyError;

use bytes::Bytes;
use http::{Request, Response, StatusCode};
use tracing::{debug, info};

/// Dispatch one request through the environment's route table.
///
/// Configuration errors surface to the caller; an unmatched path with no
/// root route yields `404 Not Found`.
pub async fn handle(request: Request<Bytes>, env: &Env) -> Result<Response<Bytes>, ProxyError> {
    let config = RequestConfig::from_env(env)?;
    let url = components::proxy::request_url(&request)?;
    let path = url.path().to_string();

    let Some(selection) = config.routes.select(&path) else {
        debug!("no route matched {}", path);
        return not_found();
    };

    info!(
        "routing {} {} via '{}' (mount {})",
        request.method(),
        path,
        selection.route.expression(),
        selection.mount
    );

    let options = ProxyOptions {
        smooth_transitions: config.smooth_transitions,
        preload_mounts: config.routes.preload_mounts(&selection.mount),
    };

    components::proxy::proxy_request(
        request,
        selection.route.upstream().as_ref(),
        &selection.mount,
        &config.assets,
        &options,
    )
    .await
}

fn not_found() -> Result<Response<Bytes>, ProxyError> {
    Response::builder()
        .status(StatusCode::NOT_FOUND)
        .header(
            http::header::CONTENT_TYPE,
            "text/plain; charset=utf-8",
        )
        .body(Bytes::from_static(b"Not found"))
        .map_err(ProxyError::from)
}
