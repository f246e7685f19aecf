//! Preload endpoint
//!
//! Synthesizes the client script that warms other static mounts, served
//! from `<mount>/__mf-preload.js` when the selected route has preload
//! targets.

use bytes::Bytes;
use http::{header, Response, StatusCode};

use crate::error::ProxyError;

/// Forwarding path the proxy intercepts for the preload script
pub const PRELOAD_ENDPOINT: &str = "/__mf-preload.js";

/// Build the preload client script for the given target mounts.
///
/// The script fetches each target with same-origin credentials, either
/// immediately or once the document finishes parsing.
pub fn preload_script(preload_mounts: &[String]) -> String {
    let urls = serde_json::to_string(preload_mounts).unwrap_or_else(|_| "[]".to_string());
    format!(
        r#"(function () {{
  var targets = {urls};
  function preload() {{
    targets.forEach(function (url) {{
      fetch(url, {{ method: "GET", credentials: "same-origin", cache: "default" }});
    }});
  }}
  if (document.readyState === "loading") {{
    document.addEventListener("DOMContentLoaded", preload);
  }} else {{
    preload();
  }}
}})();
"#
    )
}

/// The short-circuit response serving the preload script
pub fn preload_response(preload_mounts: &[String]) -> Result<Response<Bytes>, ProxyError> {
    Response::builder()
        .status(StatusCode::OK)
        .header(
            header::CONTENT_TYPE,
            "application/javascript; charset=utf-8",
        )
        .header(header::CACHE_CONTROL, "public, max-age=300")
        .body(Bytes::from(preload_script(preload_mounts)))
        .map_err(ProxyError::from)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_script_lists_targets() {
        let script = preload_script(&["/shop".to_string(), "/docs".to_string()]);
        assert!(script.contains(r#"["/shop","/docs"]"#));
        assert!(script.contains("DOMContentLoaded"));
        assert!(script.contains(r#"credentials: "same-origin""#));
    }

    #[test]
    fn test_response_headers() {
        let response = preload_response(&["/shop".to_string()]).unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers().get(header::CONTENT_TYPE).unwrap(),
            "application/javascript; charset=utf-8"
        );
        assert_eq!(
            response.headers().get(header::CACHE_CONTROL).unwrap(),
            "public, max-age=300"
        );
    }
}
