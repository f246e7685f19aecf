//! Asset-prefix set
//!
//! Path roots that identify upstream asset references for mount rewriting.
//! Every stored prefix has the shape `/X/` with both anchors present.

use std::collections::BTreeSet;

/// Asset roots every deployment gets, regardless of configuration
pub const DEFAULT_ASSET_PREFIXES: [&str; 6] = [
    "/assets/", "/static/", "/build/", "/_astro/", "/_next/", "/fonts/",
];

/// Normalized set of asset path roots
#[derive(Debug, Clone)]
pub struct AssetPrefixSet {
    prefixes: BTreeSet<String>,
}

impl Default for AssetPrefixSet {
    fn default() -> Self {
        Self {
            prefixes: DEFAULT_ASSET_PREFIXES.iter().map(|p| p.to_string()).collect(),
        }
    }
}

impl AssetPrefixSet {
    /// The defaults plus the given user-supplied prefixes
    pub fn with_extra<I>(extra: I) -> Self
    where
        I: IntoIterator<Item = String>,
    {
        let mut set = Self::default();
        set.extend(extra);
        set
    }

    /// Normalize and merge user-supplied prefixes into the set
    pub fn extend<I>(&mut self, extra: I)
    where
        I: IntoIterator<Item = String>,
    {
        for raw in extra {
            self.prefixes.insert(Self::normalize(&raw));
        }
    }

    /// Normalize a prefix to the `/X/` shape
    pub fn normalize(raw: &str) -> String {
        let mut prefix = if raw.starts_with('/') {
            raw.to_string()
        } else {
            format!("/{}", raw)
        };
        if !prefix.ends_with('/') {
            prefix.push('/');
        }
        prefix
    }

    /// Whether the path starts with one of the asset prefixes
    pub fn matches(&self, path: &str) -> bool {
        self.prefixes.iter().any(|prefix| path.starts_with(prefix.as_str()))
    }

    /// Regex alternation of the prefix bodies (anchors stripped, escaped),
    /// for embedding between literal slashes
    pub fn alternation_body(&self) -> String {
        self.prefixes
            .iter()
            .map(|prefix| regex::escape(prefix.trim_matches('/')))
            .collect::<Vec<_>>()
            .join("|")
    }

    /// Number of prefixes in the set
    pub fn len(&self) -> usize {
        self.prefixes.len()
    }

    /// Whether the set is empty
    pub fn is_empty(&self) -> bool {
        self.prefixes.is_empty()
    }

    /// Iterate the normalized prefixes in sorted order
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.prefixes.iter().map(|p| p.as_str())
    }
}
