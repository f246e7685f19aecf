//! HTML streaming rewriter
//!
//! Rewrites asset-referencing attributes against the mount while the
//! response streams through `lol_html`, injects the base-path script and
//! `<base>` element into `<head>`, and conditionally injects the
//! view-transition style and preload hints. Injectors are one-shot and
//! fire on the first matching element.

use std::cell::Cell;

use lol_html::html_content::{ContentType, Element};
use lol_html::{element, rewrite_str, RewriteStrSettings};

use crate::components::assets::AssetPrefixSet;
use crate::error::ProxyError;

/// The closed set of attributes subject to mount rewriting
pub const REWRITE_ATTRIBUTES: [&str; 31] = [
    "href",
    "src",
    "poster",
    "content",
    "action",
    "cite",
    "formaction",
    "manifest",
    "ping",
    "archive",
    "code",
    "codebase",
    "data",
    "url",
    "srcset",
    "data-src",
    "data-href",
    "data-url",
    "data-srcset",
    "data-background",
    "data-image",
    "data-link",
    "data-poster",
    "data-video",
    "data-audio",
    "component-url",
    "astro-component-url",
    "sveltekit-url",
    "renderer-url",
    "background",
    "xlink:href",
];

/// Style block injected when smooth transitions are enabled
const SMOOTH_TRANSITIONS_STYLE: &str = r#"<style>
@supports (view-transition-name: none) {
  ::view-transition-old(root),
  ::view-transition-new(root) {
    animation-duration: 0.3s;
    animation-timing-function: ease-in-out;
  }
  main { view-transition-name: main-content; }
  nav { view-transition-name: navigation; }
}
</style>"#;

/// Everything the rewriter needs for one HTML response
pub struct HtmlRewriteSettings<'a> {
    /// Mount actual of the selected route
    pub mount: &'a str,
    /// Asset roots eligible for rewriting
    pub assets: &'a AssetPrefixSet,
    /// Whether to append the view-transition style to `<head>`
    pub smooth_transitions: bool,
    /// Static mounts to pre-fetch from this page
    pub preload_mounts: &'a [String],
    /// The request's `User-Agent`, used to pick the preload mechanism
    pub user_agent: Option<&'a str>,
}

/// A path is mount-scoped when prefixing it again would double the mount
pub fn is_mount_scoped(path: &str, mount: &str) -> bool {
    mount == "/" || path.starts_with(&format!("{}/", mount))
}

/// Chromium detection for speculation-rules support.
///
/// Safari ships `safari` without `chrome`; real Chromium UAs carry both,
/// so `safari` alone disqualifies.
pub fn is_chromium_user_agent(user_agent: &str) -> bool {
    let ua = user_agent.to_ascii_lowercase();
    let chromium_engine = ua.contains("chrome")
        || ua.contains("edg/")
        || ua.contains("opr/")
        || ua.contains("brave");
    let safari_without_chrome = ua.contains("safari") && !ua.contains("chrome");
    chromium_engine && !ua.contains("firefox") && !safari_without_chrome
}

/// Run the full rewrite pipeline over an HTML document.
///
/// Handler registration order fixes the observable sequence: attribute
/// rewrites, head script/base prepend, smooth-transitions append,
/// speculation-rules append, body preload append.
pub fn rewrite_html(html: &str, settings: &HtmlRewriteSettings<'_>) -> Result<String, ProxyError> {
    let mount = settings.mount;
    let assets = settings.assets;
    let chromium = settings.user_agent.map(is_chromium_user_agent).unwrap_or(false);

    let head_injected = Cell::new(false);
    let style_injected = Cell::new(false);
    let speculation_injected = Cell::new(false);
    let preload_injected = Cell::new(false);

    let mut handlers = vec![
        element!("*", |el| rewrite_element_attributes(el, mount, assets)),
        element!("head", |el| {
            if !head_injected.replace(true) {
                el.prepend(&head_injection(mount), ContentType::Html);
            }
            Ok(())
        }),
    ];

    if settings.smooth_transitions {
        handlers.push(element!("head", |el| {
            if !style_injected.replace(true) {
                el.append(SMOOTH_TRANSITIONS_STYLE, ContentType::Html);
            }
            Ok(())
        }));
    }

    if !settings.preload_mounts.is_empty() {
        if chromium {
            handlers.push(element!("head", |el| {
                if !speculation_injected.replace(true) {
                    el.append(&speculation_rules(settings.preload_mounts), ContentType::Html);
                }
                Ok(())
            }));
        } else {
            handlers.push(element!("body", |el| {
                if !preload_injected.replace(true) {
                    el.append(&preload_script_tag(mount), ContentType::Html);
                }
                Ok(())
            }));
        }
    }

    rewrite_str(
        html,
        RewriteStrSettings {
            element_content_handlers: handlers,
            ..RewriteStrSettings::default()
        },
    )
    .map_err(|e| ProxyError::RewriteError(e.to_string()))
}

/// Apply the per-element attribute rules
fn rewrite_element_attributes(
    el: &mut Element<'_, '_>,
    mount: &str,
    assets: &AssetPrefixSet,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    // Icon links are rewritten even without an asset prefix so favicons
    // resolve inside the mount.
    if el.tag_name().eq_ignore_ascii_case("link") {
        if let Some(rel) = el.get_attribute("rel") {
            let rel = rel.to_ascii_lowercase();
            if rel.contains("icon") || rel.contains("shortcut") {
                if let Some(href) = el.get_attribute("href") {
                    if href.starts_with('/') && !is_mount_scoped(&href, mount) {
                        el.set_attribute("href", &format!("{}{}", mount, href))?;
                    }
                }
            }
        }
    }

    for name in REWRITE_ATTRIBUTES {
        let Some(value) = el.get_attribute(name) else {
            continue;
        };
        if name == "srcset" {
            let rewritten = rewrite_srcset(&value, mount, assets);
            if rewritten != value {
                el.set_attribute(name, &rewritten)?;
            }
        } else if value.starts_with('/')
            && !is_mount_scoped(&value, mount)
            && assets.matches(&value)
        {
            el.set_attribute(name, &format!("{}{}", mount, value))?;
        }
    }

    Ok(())
}

/// Rewrite each candidate of a `srcset` value independently
fn rewrite_srcset(value: &str, mount: &str, assets: &AssetPrefixSet) -> String {
    value
        .split(',')
        .map(|candidate| {
            let candidate = candidate.trim();
            let (url, descriptor) = match candidate.split_once(char::is_whitespace) {
                Some((url, descriptor)) => (url, Some(descriptor.trim())),
                None => (candidate, None),
            };
            let url = if url.starts_with('/') && !is_mount_scoped(url, mount) && assets.matches(url)
            {
                format!("{}{}", mount, url)
            } else {
                url.to_string()
            };
            match descriptor {
                Some(descriptor) => format!("{} {}", url, descriptor),
                None => url,
            }
        })
        .collect::<Vec<_>>()
        .join(", ")
}

/// The base-path script plus `<base>` element prepended to `<head>`
fn head_injection(mount: &str) -> String {
    let mount_json = serde_json::to_string(mount).unwrap_or_else(|_| "\"/\"".to_string());
    let base_href = if mount == "/" {
        "/".to_string()
    } else {
        format!("{}/", mount)
    };
    let base_json = serde_json::to_string(&base_href).unwrap_or_else(|_| "\"/\"".to_string());
    format!(
        r#"<script>window.__BASE_PATH__ = {mount_json};(function () {{ var basePrefix = {base_json}; var originalFetch = globalThis.fetch; globalThis.fetch = function (input, init) {{ if (typeof input === "string" && input.indexOf("workerstack://") === 0) {{ input = basePrefix + input.slice("workerstack://".length); }} else if (input instanceof Request && input.url.indexOf("workerstack://") === 0) {{ input = new Request(basePrefix + input.url.slice("workerstack://".length), input); }} return originalFetch.call(this, input, init); }}; }})();</script><base href="{base_attr}">"#,
        mount_json = mount_json,
        base_json = base_json,
        base_attr = escape_attribute(&base_href),
    )
}

/// Speculation-rules prefetch block for Chromium browsers
fn speculation_rules(preload_mounts: &[String]) -> String {
    let rules = serde_json::json!({ "prefetch": [{ "urls": preload_mounts }] });
    format!(r#"<script type="speculationrules">{}</script>"#, rules)
}

/// Deferred preload script reference for non-Chromium browsers
fn preload_script_tag(mount: &str) -> String {
    let src = if mount == "/" {
        "/__mf-preload.js".to_string()
    } else {
        format!("{}/__mf-preload.js", mount)
    };
    format!(r#"<script src="{}" defer></script>"#, escape_attribute(&src))
}

fn escape_attribute(value: &str) -> String {
    value
        .replace('&', "&amp;")
        .replace('"', "&quot;")
        .replace('<', "&lt;")
}
