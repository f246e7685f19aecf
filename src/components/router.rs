//! Route table
//!
//! Compiles route entries against the environment, orders them
//! deterministically, and selects the longest-specific match for a request
//! path. The table is rebuilt per request from the environment map.

use std::sync::Arc;

use tracing::debug;

use crate::components::path_expr::CompiledPath;
use crate::config::{Env, RouteEntry, UpstreamFetcher};
use crate::error::ProxyError;

/// One compiled route: expression, matcher, and resolved upstream binding
pub struct CompiledRoute {
    binding: String,
    preload: bool,
    path: CompiledPath,
    upstream: Arc<dyn UpstreamFetcher>,
}

impl std::fmt::Debug for CompiledRoute {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompiledRoute")
            .field("binding", &self.binding)
            .field("preload", &self.preload)
            .field("path", &self.path)
            .finish()
    }
}

impl CompiledRoute {
    /// Name of the environment binding serving this route
    pub fn binding(&self) -> &str {
        &self.binding
    }

    /// Whether other mounts should pre-fetch this one
    pub fn preload(&self) -> bool {
        self.preload
    }

    /// The normalized path expression
    pub fn expression(&self) -> &str {
        self.path.expression()
    }

    /// The literal mount for static expressions
    pub fn static_mount(&self) -> Option<&str> {
        self.path.static_mount()
    }

    /// The resolved upstream binding
    pub fn upstream(&self) -> &Arc<dyn UpstreamFetcher> {
        &self.upstream
    }

    fn is_root(&self) -> bool {
        self.path.static_mount() == Some("/") || self.path.expression() == "/"
    }
}

/// A selected route together with the mount actual captured from the path
pub struct Selection<'t> {
    /// The winning route
    pub route: &'t CompiledRoute,
    /// Concrete mount path, `/` or a non-`/`-terminated prefix
    pub mount: String,
}

/// Ordered sequence of compiled routes
#[derive(Debug)]
pub struct RouteTable {
    routes: Vec<CompiledRoute>,
}

impl RouteTable {
    /// Compile and order the route table for one request.
    ///
    /// Every entry must name a binding present in the environment. The
    /// table is sorted descending by `(base specificity, expression
    /// length)` so iteration order is deterministic.
    pub fn build(entries: Vec<RouteEntry>, env: &Env) -> Result<Self, ProxyError> {
        if entries.is_empty() {
            return Err(ProxyError::config("ROUTES must define at least one route"));
        }

        let mut routes = Vec::with_capacity(entries.len());
        for entry in entries {
            if entry.binding.is_empty() || entry.path.is_empty() {
                return Err(ProxyError::config(
                    "route entries require both 'binding' and 'path'",
                ));
            }
            let upstream = env.binding(&entry.binding).cloned().ok_or_else(|| {
                ProxyError::config(format!(
                    "binding '{}' is not present in the environment",
                    entry.binding
                ))
            })?;
            let path = CompiledPath::compile(&entry.path)?;
            routes.push(CompiledRoute {
                binding: entry.binding,
                preload: entry.preload,
                path,
                upstream,
            });
        }

        routes.sort_by(|a, b| {
            b.path
                .base_specificity()
                .cmp(&a.path.base_specificity())
                .then_with(|| b.path.expression().len().cmp(&a.path.expression().len()))
        });

        Ok(Self { routes })
    }

    /// Select the route for an incoming path.
    ///
    /// All routes are scanned; among the matches the one with the highest
    /// `(mount length, base specificity, expression length)` score wins.
    /// When nothing matches, a root route (`/`) is selected with mount `/`
    /// if one exists.
    pub fn select(&self, path: &str) -> Option<Selection<'_>> {
        let mut best: Option<(usize, &CompiledRoute, &str)> = None;
        let mut root: Option<&CompiledRoute> = None;

        for route in &self.routes {
            if root.is_none() && route.is_root() {
                root = Some(route);
            }
            if let Some(mount) = route.path.match_mount(path) {
                let score = mount.len() * 1_000_000
                    + route.path.base_specificity() * 1_000
                    + route.path.expression().len();
                if best.map_or(true, |(existing, _, _)| score > existing) {
                    best = Some((score, route, mount));
                }
            }
        }

        match best {
            Some((score, route, mount)) => {
                debug!(
                    "route '{}' selected for {} (mount {}, score {})",
                    route.expression(),
                    path,
                    mount,
                    score
                );
                let mount = if mount.is_empty() {
                    "/".to_string()
                } else {
                    mount.to_string()
                };
                Some(Selection { route, mount })
            }
            None => root.map(|route| {
                debug!("falling back to root route for {}", path);
                Selection {
                    route,
                    mount: "/".to_string(),
                }
            }),
        }
    }

    /// Static mounts flagged for preloading, excluding the given mount
    pub fn preload_mounts(&self, exclude_mount: &str) -> Vec<String> {
        self.routes
            .iter()
            .filter(|route| route.preload)
            .filter_map(|route| route.static_mount())
            .filter(|mount| *mount != exclude_mount)
            .map(String::from)
            .collect()
    }

    /// Number of routes in the table
    pub fn len(&self) -> usize {
        self.routes.len()
    }

    /// Whether the table is empty
    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    /// Iterate routes in table order
    pub fn iter(&self) -> impl Iterator<Item = &CompiledRoute> {
        self.routes.iter()
    }
}
