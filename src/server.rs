//! HTTP server runtime
//!
//! Binds the front door and serves [`handle`](crate::handle) over
//! HTTP/1.1, plus the HTTP upstream binding used by the standalone binary.
//! The core never touches sockets itself; everything here is host plumbing
//! around it.

use std::net::SocketAddr;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use http::header::HOST;
use http::{HeaderValue, Request, Response};
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use hyper::service::service_fn;
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::client::legacy::Client;
use hyper_util::rt::{TokioExecutor, TokioIo};
use tokio::net::TcpListener;
use tokio::signal;
use tracing::{debug, error, info};
use url::Url;

use crate::config::{Env, UpstreamFetcher};
use crate::error::ProxyError;

/// Upstream binding that forwards requests to a fixed base URL.
///
/// The forwarded request keeps its method, headers, path, and query; only
/// the origin (and `Host`) are swapped for the configured base.
pub struct HttpFetcher {
    base: Url,
    client: Client<HttpConnector, Full<Bytes>>,
}

impl HttpFetcher {
    /// Create a binding pointed at the given base URL
    pub fn new(base: Url) -> Self {
        Self {
            base,
            client: Client::builder(TokioExecutor::new()).build_http(),
        }
    }

    fn host_header(&self) -> String {
        let host = self.base.host_str().unwrap_or("localhost");
        match self.base.port() {
            Some(port) => format!("{}:{}", host, port),
            None => host.to_string(),
        }
    }
}

#[async_trait]
impl UpstreamFetcher for HttpFetcher {
    async fn fetch(&self, request: Request<Bytes>) -> Result<Response<Bytes>, ProxyError> {
        let (parts, body) = request.into_parts();
        let path_and_query = parts
            .uri
            .path_and_query()
            .map(|pq| pq.as_str())
            .unwrap_or("/");
        let target: http::Uri =
            format!("{}{}", self.base.as_str().trim_end_matches('/'), path_and_query)
                .parse()
                .map_err(|e: http::uri::InvalidUri| {
                    ProxyError::upstream(format!("invalid upstream URL: {}", e))
                })?;

        let mut upstream_request = Request::builder()
            .method(parts.method)
            .uri(target)
            .body(Full::new(body))?;
        *upstream_request.headers_mut() = parts.headers;
        if let Ok(value) = HeaderValue::from_str(&self.host_header()) {
            upstream_request.headers_mut().insert(HOST, value);
        }

        let response = self
            .client
            .request(upstream_request)
            .await
            .map_err(|e| ProxyError::upstream(e.to_string()))?;

        let (parts, body) = response.into_parts();
        let bytes = body
            .collect()
            .await
            .map_err(|e| ProxyError::upstream(format!("failed to read upstream body: {}", e)))?
            .to_bytes();
        let mut buffered = Response::builder().status(parts.status).body(bytes)?;
        *buffered.headers_mut() = parts.headers;
        Ok(buffered)
    }
}

/// The front-door HTTP server
pub struct ProxyServer {
    listen: SocketAddr,
    env: Arc<Env>,
}

impl ProxyServer {
    /// Create a server for the given listen address and environment
    pub fn new(listen: SocketAddr, env: Env) -> Self {
        Self {
            listen,
            env: Arc::new(env),
        }
    }

    /// Bind the listen address and serve until a shutdown signal arrives
    pub async fn run(self) -> Result<(), ProxyError> {
        let listener = TcpListener::bind(self.listen).await.map_err(|e| {
            ProxyError::config(format!("Failed to bind to {}: {}", self.listen, e))
        })?;
        let actual = listener.local_addr()?;
        info!("listening on {}", actual);
        self.serve(listener).await
    }

    /// Serve connections from an already-bound listener
    pub async fn serve(self, listener: TcpListener) -> Result<(), ProxyError> {
        let shutdown = Self::wait_for_shutdown_signal();
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                result = listener.accept() => {
                    match result {
                        Ok((stream, peer_addr)) => {
                            debug!("accepted connection from {}", peer_addr);
                            let env = Arc::clone(&self.env);
                            tokio::spawn(async move {
                                let io = TokioIo::new(stream);
                                let service = service_fn(move |request| {
                                    let env = Arc::clone(&env);
                                    async move { Self::serve_request(request, env).await }
                                });
                                if let Err(e) = hyper::server::conn::http1::Builder::new()
                                    .serve_connection(io, service)
                                    .await
                                {
                                    debug!("connection from {} ended: {}", peer_addr, e);
                                }
                            });
                        }
                        Err(e) => {
                            error!("failed to accept connection: {}", e);
                        }
                    }
                }
                _ = &mut shutdown => {
                    info!("shutdown signal received");
                    break;
                }
            }
        }

        info!("server shutdown complete");
        Ok(())
    }

    /// Buffer one request, run it through `handle`, and buffer the answer
    async fn serve_request(
        request: Request<Incoming>,
        env: Arc<Env>,
    ) -> Result<Response<Full<Bytes>>, hyper::Error> {
        let (parts, body) = request.into_parts();
        let bytes = body.collect().await?.to_bytes();
        let request = Request::from_parts(parts, bytes);

        let response = match crate::handle(request, &env).await {
            Ok(response) => response,
            Err(e) => {
                error!("request failed: {}", e);
                error_response(&e)
            }
        };

        let (parts, body) = response.into_parts();
        Ok(Response::from_parts(parts, Full::new(body)))
    }

    /// Wait for shutdown signals (SIGINT, SIGTERM)
    async fn wait_for_shutdown_signal() {
        let ctrl_c = async {
            signal::ctrl_c()
                .await
                .expect("Failed to install Ctrl+C handler");
        };

        #[cfg(unix)]
        let terminate = async {
            signal::unix::signal(signal::unix::SignalKind::terminate())
                .expect("Failed to install signal handler")
                .recv()
                .await;
        };

        #[cfg(not(unix))]
        let terminate = std::future::pending::<()>();

        tokio::select! {
            _ = ctrl_c => {
                info!("Received Ctrl+C signal");
            },
            _ = terminate => {
                info!("Received terminate signal");
            },
        }
    }
}

/// Map a proxy error to a plain-text status response
fn error_response(error: &ProxyError) -> Response<Bytes> {
    let mut response = Response::new(Bytes::from(error.to_string()));
    *response.status_mut() = error.to_status_code();
    response.headers_mut().insert(
        http::header::CONTENT_TYPE,
        HeaderValue::from_static("text/plain; charset=utf-8"),
    );
    response
}
