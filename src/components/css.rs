//! CSS rewriter
//!
//! Rewrites `url(...)` and `@import` targets that point at a known asset
//! root so they stay inside the mount. Operates on the full text; targets
//! without an asset prefix are left unchanged.

use regex::{Captures, Regex};
use tracing::warn;

use crate::components::assets::AssetPrefixSet;

/// Rewrite asset references in a CSS document against the mount.
///
/// At the root mount the prepended prefix is empty, so targets keep their
/// paths (the surrounding whitespace is still normalized by the
/// substitution).
pub fn rewrite_css(css: &str, assets: &AssetPrefixSet, mount: &str) -> String {
    let prefix = if mount == "/" { "" } else { mount };
    let alternation = assets.alternation_body();

    let url_pattern = format!(r#"url\(\s*(['"]?)(/(?:{})/)"#, alternation);
    let import_pattern = format!(r#"@import\s+(['"])(/(?:{})/)"#, alternation);

    let mut output = css.to_string();
    match Regex::new(&url_pattern) {
        Ok(re) => {
            output = re
                .replace_all(&output, |caps: &Captures| {
                    format!("url({}{}{}", &caps[1], prefix, &caps[2])
                })
                .into_owned();
        }
        Err(e) => warn!("skipping url() rewrite, pattern failed to compile: {}", e),
    }
    match Regex::new(&import_pattern) {
        Ok(re) => {
            output = re
                .replace_all(&output, |caps: &Captures| {
                    format!("@import {}{}{}", &caps[1], prefix, &caps[2])
                })
                .into_owned();
        }
        Err(e) => warn!("skipping @import rewrite, pattern failed to compile: {}", e),
    }
    output
}
