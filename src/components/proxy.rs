//! Proxy handler
//!
//! Composes the pipeline for one matched route: build the forwarding URL,
//! short-circuit the preload endpoint, fetch from the upstream binding,
//! then branch on status and content type to apply the header and body
//! rewrites.

use bytes::Bytes;
use http::header::{CONTENT_TYPE, USER_AGENT};
use http::{Request, Response, Uri};
use tracing::{debug, warn};
use url::Url;

use crate::components::assets::AssetPrefixSet;
use crate::components::css::rewrite_css;
use crate::components::headers;
use crate::components::html::{rewrite_html, HtmlRewriteSettings};
use crate::components::preload;
use crate::config::UpstreamFetcher;
use crate::error::ProxyError;

/// Per-request rendering options resolved by the configuration loader
#[derive(Debug, Clone, Default)]
pub struct ProxyOptions {
    /// Inject the view-transition style into HTML responses
    pub smooth_transitions: bool,
    /// Static mounts the served page should pre-fetch
    pub preload_mounts: Vec<String>,
}

/// Absolute URL of the incoming request.
///
/// Server-side request URIs are usually origin-form; the origin is then
/// recovered from the `Host` header, defaulting to plain HTTP.
pub fn request_url<B>(request: &Request<B>) -> Result<Url, ProxyError> {
    let uri = request.uri();
    let text = if uri.scheme().is_some() {
        uri.to_string()
    } else {
        let host = request
            .headers()
            .get(http::header::HOST)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("localhost");
        let path_and_query = uri.path_and_query().map(|pq| pq.as_str()).unwrap_or("/");
        format!("http://{}{}", host, path_and_query)
    };
    Url::parse(&text).map_err(|e| ProxyError::UriParse {
        uri: text,
        reason: e.to_string(),
    })
}

/// Strip the mount from the incoming URL to build the forwarding URL.
///
/// A request for exactly the mount forwards as `/`, as does an empty
/// remainder after the strip.
fn forward_url(incoming: &Url, mount: &str) -> Url {
    let mut url = incoming.clone();
    if mount == "/" {
        return url;
    }
    let path = url.path().to_string();
    if path == mount {
        url.set_path("/");
    } else if let Some(rest) = path.strip_prefix(&format!("{}/", mount)) {
        if rest.is_empty() {
            url.set_path("/");
        } else {
            url.set_path(&format!("/{}", rest));
        }
    }
    url
}

/// Proxy one request through the selected route.
pub async fn proxy_request(
    request: Request<Bytes>,
    upstream: &dyn UpstreamFetcher,
    mount: &str,
    assets: &AssetPrefixSet,
    options: &ProxyOptions,
) -> Result<Response<Bytes>, ProxyError> {
    let incoming_url = request_url(&request)?;
    let forward = forward_url(&incoming_url, mount);

    // The preload endpoint only exists for routes that have targets.
    if !options.preload_mounts.is_empty() && forward.path() == preload::PRELOAD_ENDPOINT {
        debug!("serving preload script for mount {}", mount);
        return preload::preload_response(&options.preload_mounts);
    }

    let user_agent = request
        .headers()
        .get(USER_AGENT)
        .and_then(|v| v.to_str().ok())
        .map(String::from);

    let (mut parts, body) = request.into_parts();
    parts.uri = forward
        .as_str()
        .parse::<Uri>()
        .map_err(|e| ProxyError::UriParse {
            uri: forward.as_str().to_string(),
            reason: e.to_string(),
        })?;
    let upstream_request = Request::from_parts(parts, body);

    debug!(
        "forwarding {} {} (mount {})",
        upstream_request.method(),
        forward.path(),
        mount
    );
    let response = upstream.fetch(upstream_request).await?;
    let status = response.status();

    // Redirects: rewrite the target and cookie scopes, drop the body.
    if status.is_redirection() {
        let mut headers = response.headers().clone();
        // the upstream's length no longer describes the emptied body
        headers.remove(http::header::CONTENT_LENGTH);
        headers::rewrite_location(&mut headers, &incoming_url, mount);
        headers::rewrite_set_cookie(&mut headers, mount);
        let mut redirect = Response::builder().status(status).body(Bytes::new())?;
        *redirect.headers_mut() = headers;
        return Ok(redirect);
    }

    let content_type = response
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("")
        .to_ascii_lowercase();

    if content_type.contains("text/html") {
        let (parts, body) = response.into_parts();
        let text = String::from_utf8_lossy(&body).into_owned();
        let mut headers = parts.headers;
        headers::strip_rewrite_sensitive(&mut headers);
        headers::rewrite_set_cookie(&mut headers, mount);

        let rewrite_settings = HtmlRewriteSettings {
            mount,
            assets,
            smooth_transitions: options.smooth_transitions,
            preload_mounts: &options.preload_mounts,
            user_agent: user_agent.as_deref(),
        };
        let body = match rewrite_html(&text, &rewrite_settings) {
            Ok(rewritten) => rewritten,
            Err(e) => {
                warn!("HTML rewrite failed, passing body through: {}", e);
                text
            }
        };

        let mut rewritten = Response::builder()
            .status(parts.status)
            .body(Bytes::from(body))?;
        *rewritten.headers_mut() = headers;
        return Ok(rewritten);
    }

    if content_type.contains("text/css") {
        let (parts, body) = response.into_parts();
        let text = String::from_utf8_lossy(&body).into_owned();
        let mut headers = parts.headers;
        headers::strip_rewrite_sensitive(&mut headers);
        headers::rewrite_set_cookie(&mut headers, mount);

        let body = rewrite_css(&text, assets, mount);
        let mut rewritten = Response::builder()
            .status(parts.status)
            .body(Bytes::from(body))?;
        *rewritten.headers_mut() = headers;
        return Ok(rewritten);
    }

    // Everything else passes through with scoped cookies.
    let (mut parts, body) = response.into_parts();
    headers::rewrite_set_cookie(&mut parts.headers, mount);
    Ok(Response::from_parts(parts, body))
}
