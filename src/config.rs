//! Configuration module
//!
//! Holds the per-request environment map and materializes the route table,
//! asset-prefix set, and rendering options from it. The environment is
//! request-scoped: nothing built here outlives the request that supplied it.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use http::{Request, Response};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

use crate::components::assets::AssetPrefixSet;
use crate::components::router::RouteTable;
use crate::error::ProxyError;

/// Environment key holding the route table definition.
pub const ROUTES_KEY: &str = "ROUTES";

/// Environment key holding extra asset path roots.
pub const ASSET_PREFIXES_KEY: &str = "ASSET_PREFIXES";

/// The one capability an upstream binding exposes to the proxy.
///
/// Bindings are owned by the host; the proxy borrows them for the duration
/// of a request and never closes them.
#[async_trait]
pub trait UpstreamFetcher: Send + Sync {
    /// Forward a request to the bound service and return its response.
    async fn fetch(&self, request: Request<Bytes>) -> Result<Response<Bytes>, ProxyError>;
}

/// Per-request environment map: JSON variables plus named upstream bindings.
#[derive(Default)]
pub struct Env {
    vars: HashMap<String, Value>,
    bindings: HashMap<String, Arc<dyn UpstreamFetcher>>,
}

impl Env {
    /// Create an empty environment
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a variable, replacing any previous value under the same key
    pub fn set_var<K: Into<String>, V: Into<Value>>(&mut self, key: K, value: V) {
        self.vars.insert(key.into(), value.into());
    }

    /// Set an upstream binding under the given name
    pub fn set_binding<K: Into<String>>(&mut self, name: K, fetcher: Arc<dyn UpstreamFetcher>) {
        self.bindings.insert(name.into(), fetcher);
    }

    /// Builder-style variant of [`set_var`](Self::set_var)
    pub fn with_var<K: Into<String>, V: Into<Value>>(mut self, key: K, value: V) -> Self {
        self.set_var(key, value);
        self
    }

    /// Builder-style variant of [`set_binding`](Self::set_binding)
    pub fn with_binding<K: Into<String>>(
        mut self,
        name: K,
        fetcher: Arc<dyn UpstreamFetcher>,
    ) -> Self {
        self.set_binding(name, fetcher);
        self
    }

    /// Look up a variable
    pub fn var(&self, key: &str) -> Option<&Value> {
        self.vars.get(key)
    }

    /// Look up an upstream binding
    pub fn binding(&self, name: &str) -> Option<&Arc<dyn UpstreamFetcher>> {
        self.bindings.get(name)
    }
}

/// A single route definition as it appears in the `ROUTES` document
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RouteEntry {
    /// Name of the environment binding serving this route
    pub binding: String,
    /// Path expression the route mounts at
    pub path: String,
    /// Whether other mounts should pre-fetch this one
    #[serde(default)]
    pub preload: bool,
}

/// Everything `handle` needs for one request, materialized from the
/// environment map.
#[derive(Debug)]
pub struct RequestConfig {
    /// Compiled, sorted route table
    pub routes: RouteTable,
    /// Default asset prefixes merged with any `ASSET_PREFIXES` extras
    pub assets: AssetPrefixSet,
    /// Whether HTML responses get the view-transition style injection
    pub smooth_transitions: bool,
}

impl RequestConfig {
    /// Build the per-request configuration from the environment map.
    ///
    /// `ROUTES` may be a JSON string, an object of shape
    /// `{ routes: [...], smoothTransitions?: bool }`, or a bare array of
    /// route entries. `smoothTransitions` is only honored on the object
    /// form. A malformed `ASSET_PREFIXES` silently falls back to the
    /// default prefix set.
    pub fn from_env(env: &Env) -> Result<Self, ProxyError> {
        let raw = env.var(ROUTES_KEY).ok_or_else(|| {
            ProxyError::config("ROUTES environment variable is required")
        })?;

        let document: Value = match raw {
            Value::String(text) => serde_json::from_str(text)
                .map_err(|e| ProxyError::config(format!("Failed to parse ROUTES: {}", e)))?,
            other => other.clone(),
        };

        let (entries, smooth_transitions) = match document {
            Value::Array(items) => (items, false),
            Value::Object(map) => {
                let smooth = map
                    .get("smoothTransitions")
                    .and_then(Value::as_bool)
                    .unwrap_or(false);
                let routes = match map.get("routes") {
                    Some(Value::Array(items)) => items.clone(),
                    _ => Vec::new(),
                };
                (routes, smooth)
            }
            _ => {
                return Err(ProxyError::config(
                    "ROUTES must be a JSON object or a JSON string",
                ))
            }
        };

        let entries = entries
            .into_iter()
            .map(|item| {
                serde_json::from_value::<RouteEntry>(item)
                    .map_err(|e| ProxyError::config(format!("Invalid route entry: {}", e)))
            })
            .collect::<Result<Vec<_>, _>>()?;

        let routes = RouteTable::build(entries, env)?;
        let assets = asset_prefixes_from_env(env);

        Ok(Self {
            routes,
            assets,
            smooth_transitions,
        })
    }
}

/// Materialize the asset-prefix set, merging `ASSET_PREFIXES` extras into
/// the defaults. Anything other than a JSON-string array of non-empty
/// strings falls back to the defaults.
fn asset_prefixes_from_env(env: &Env) -> AssetPrefixSet {
    let mut set = AssetPrefixSet::default();
    let Some(Value::String(raw)) = env.var(ASSET_PREFIXES_KEY) else {
        return set;
    };

    match serde_json::from_str::<Value>(raw) {
        Ok(Value::Array(items)) => {
            let extras: Vec<String> = items
                .iter()
                .filter_map(|item| item.as_str())
                .filter(|s| !s.is_empty())
                .map(String::from)
                .collect();
            if extras.len() == items.len() {
                set.extend(extras);
            } else {
                warn!("ASSET_PREFIXES contains non-string or empty entries, using defaults");
            }
        }
        Ok(_) => {
            warn!("ASSET_PREFIXES is not a JSON array, using defaults");
        }
        Err(e) => {
            warn!("Failed to parse ASSET_PREFIXES, using defaults: {}", e);
        }
    }
    set
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::StatusCode;

    struct NullFetcher;

    #[async_trait]
    impl UpstreamFetcher for NullFetcher {
        async fn fetch(&self, _request: Request<Bytes>) -> Result<Response<Bytes>, ProxyError> {
            Ok(Response::builder()
                .status(StatusCode::OK)
                .body(Bytes::new())?)
        }
    }

    fn env_with_binding(name: &str) -> Env {
        Env::new().with_binding(name, Arc::new(NullFetcher))
    }

    #[test]
    fn test_missing_routes_is_rejected() {
        let env = Env::new();
        let result = RequestConfig::from_env(&env);
        assert!(result.is_err());
        assert!(result
            .unwrap_err()
            .to_string()
            .contains("ROUTES environment variable is required"));
    }

    #[test]
    fn test_routes_as_json_string() {
        let env = env_with_binding("APP")
            .with_var(ROUTES_KEY, r#"{"routes":[{"binding":"APP","path":"/app"}]}"#);
        let config = RequestConfig::from_env(&env).unwrap();
        assert_eq!(config.routes.len(), 1);
        assert!(!config.smooth_transitions);
    }

    #[test]
    fn test_routes_as_bare_array() {
        let env = env_with_binding("APP")
            .with_var(ROUTES_KEY, r#"[{"binding":"APP","path":"/app"}]"#);
        let config = RequestConfig::from_env(&env).unwrap();
        assert_eq!(config.routes.len(), 1);
    }

    #[test]
    fn test_routes_as_structured_object() {
        let document = serde_json::json!({
            "routes": [{"binding": "APP", "path": "/app"}],
            "smoothTransitions": true,
        });
        let env = env_with_binding("APP").with_var(ROUTES_KEY, document);
        let config = RequestConfig::from_env(&env).unwrap();
        assert!(config.smooth_transitions);
    }

    #[test]
    fn test_smooth_transitions_ignored_on_bare_array() {
        // The array form has nowhere to carry the flag; it stays off.
        let env = env_with_binding("APP")
            .with_var(ROUTES_KEY, serde_json::json!([{"binding": "APP", "path": "/app"}]));
        let config = RequestConfig::from_env(&env).unwrap();
        assert!(!config.smooth_transitions);
    }

    #[test]
    fn test_malformed_routes_json() {
        let env = env_with_binding("APP").with_var(ROUTES_KEY, "{not json");
        let result = RequestConfig::from_env(&env);
        assert!(result.is_err());
        assert!(result
            .unwrap_err()
            .to_string()
            .contains("Failed to parse ROUTES"));
    }

    #[test]
    fn test_routes_wrong_shape() {
        let env = env_with_binding("APP").with_var(ROUTES_KEY, 42);
        let result = RequestConfig::from_env(&env);
        assert!(result.is_err());
        assert!(result
            .unwrap_err()
            .to_string()
            .contains("ROUTES must be a JSON object or a JSON string"));
    }

    #[test]
    fn test_empty_route_list_is_rejected() {
        let env = env_with_binding("APP").with_var(ROUTES_KEY, r#"{"routes":[]}"#);
        assert!(RequestConfig::from_env(&env).is_err());
    }

    #[test]
    fn test_route_entry_missing_path_is_rejected() {
        let env = env_with_binding("APP").with_var(ROUTES_KEY, r#"[{"binding":"APP"}]"#);
        let result = RequestConfig::from_env(&env);
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("Invalid route entry"));
    }

    #[test]
    fn test_asset_prefixes_merge() {
        let env = env_with_binding("APP")
            .with_var(ROUTES_KEY, r#"[{"binding":"APP","path":"/app"}]"#)
            .with_var(ASSET_PREFIXES_KEY, r#"["media","/img/"]"#);
        let config = RequestConfig::from_env(&env).unwrap();
        assert!(config.assets.matches("/media/logo.svg"));
        assert!(config.assets.matches("/img/logo.svg"));
        // defaults survive the merge
        assert!(config.assets.matches("/assets/app.js"));
    }

    #[test]
    fn test_asset_prefixes_malformed_falls_back() {
        let env = env_with_binding("APP")
            .with_var(ROUTES_KEY, r#"[{"binding":"APP","path":"/app"}]"#)
            .with_var(ASSET_PREFIXES_KEY, "{not an array}");
        let config = RequestConfig::from_env(&env).unwrap();
        assert!(config.assets.matches("/assets/app.js"));
        assert!(!config.assets.matches("/media/logo.svg"));
    }

    #[test]
    fn test_asset_prefixes_mixed_entries_fall_back() {
        let env = env_with_binding("APP")
            .with_var(ROUTES_KEY, r#"[{"binding":"APP","path":"/app"}]"#)
            .with_var(ASSET_PREFIXES_KEY, r#"["media", 7]"#);
        let config = RequestConfig::from_env(&env).unwrap();
        assert!(!config.assets.matches("/media/logo.svg"));
    }
}
