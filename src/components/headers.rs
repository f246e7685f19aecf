//! Header rewriter
//!
//! Mount-scoped rewrites of `Location` and `Set-Cookie`, plus the header
//! hygiene applied before a body rewrite invalidates length and validators.

use std::sync::OnceLock;

use http::header::{
    HeaderMap, HeaderValue, CONTENT_ENCODING, CONTENT_LENGTH, ETAG, LOCATION, SET_COOKIE,
};
use regex::{NoExpand, Regex};
use url::Url;

/// Strip headers invalidated by rewriting the body
pub fn strip_rewrite_sensitive(headers: &mut HeaderMap) {
    headers.remove(CONTENT_LENGTH);
    headers.remove(ETAG);
    headers.remove(CONTENT_ENCODING);
}

/// Rewrite a `Location` header against the request origin.
///
/// The value is parsed relative to the incoming request's origin. Same-origin
/// targets get the mount prepended to their path (unless the mount is the
/// root) and the header is replaced with the serialized URL. Unparseable
/// values pass through unchanged.
pub fn rewrite_location(headers: &mut HeaderMap, request_url: &Url, mount: &str) {
    let Some(value) = headers
        .get(LOCATION)
        .and_then(|v| v.to_str().ok())
        .map(String::from)
    else {
        return;
    };

    let mut origin = request_url.clone();
    origin.set_path("/");
    origin.set_query(None);
    origin.set_fragment(None);

    let Ok(mut resolved) = origin.join(&value) else {
        return;
    };

    if resolved.origin() == request_url.origin() && mount != "/" {
        let scoped = format!("{}{}", mount, resolved.path());
        resolved.set_path(&scoped);
    }

    if let Ok(rewritten) = HeaderValue::from_str(resolved.as_str()) {
        headers.insert(LOCATION, rewritten);
    }
}

/// Rewrite the path scope of every `Set-Cookie` header.
///
/// A cookie containing a `; Path=/` segment (case-insensitive, optional
/// whitespace) gets the segment replaced with `; Path=<mount>/`. The header
/// list is rebuilt from scratch so ordering is preserved. At the root mount
/// cookies are left untouched.
pub fn rewrite_set_cookie(headers: &mut HeaderMap, mount: &str) {
    if mount == "/" {
        return;
    }

    let values: Vec<HeaderValue> = headers.get_all(SET_COOKIE).iter().cloned().collect();
    if values.is_empty() {
        return;
    }

    let replacement = format!("; Path={}/", mount);
    headers.remove(SET_COOKIE);
    for value in values {
        let rewritten = value
            .to_str()
            .ok()
            .map(|cookie| cookie_path_regex().replace(cookie, NoExpand(&replacement)))
            .and_then(|cow| HeaderValue::from_str(&cow).ok());
        headers.append(SET_COOKIE, rewritten.unwrap_or(value));
    }
}

fn cookie_path_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i);\s*path=/").expect("static cookie path pattern"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request_url() -> Url {
        Url::parse("https://host.example/app/page").unwrap()
    }

    fn headers_with(name: http::header::HeaderName, value: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(name, HeaderValue::from_str(value).unwrap());
        headers
    }

    #[test]
    fn test_location_same_origin_absolute_path() {
        let mut headers = headers_with(LOCATION, "/login");
        rewrite_location(&mut headers, &request_url(), "/app");
        assert_eq!(
            headers.get(LOCATION).unwrap(),
            "https://host.example/app/login"
        );
    }

    #[test]
    fn test_location_relative_resolves_against_origin() {
        let mut headers = headers_with(LOCATION, "login");
        rewrite_location(&mut headers, &request_url(), "/app");
        assert_eq!(
            headers.get(LOCATION).unwrap(),
            "https://host.example/app/login"
        );
    }

    #[test]
    fn test_location_cross_origin_is_serialized_unscoped() {
        let mut headers = headers_with(LOCATION, "https://other.example/login");
        rewrite_location(&mut headers, &request_url(), "/app");
        assert_eq!(headers.get(LOCATION).unwrap(), "https://other.example/login");
    }

    #[test]
    fn test_location_root_mount_keeps_path() {
        let mut headers = headers_with(LOCATION, "/login");
        rewrite_location(&mut headers, &request_url(), "/");
        assert_eq!(headers.get(LOCATION).unwrap(), "https://host.example/login");
    }

    #[test]
    fn test_missing_location_is_a_no_op() {
        let mut headers = HeaderMap::new();
        rewrite_location(&mut headers, &request_url(), "/app");
        assert!(headers.get(LOCATION).is_none());
    }

    #[test]
    fn test_set_cookie_path_is_scoped() {
        let mut headers = headers_with(SET_COOKIE, "session=abc; Path=/; HttpOnly");
        rewrite_set_cookie(&mut headers, "/app");
        assert_eq!(
            headers.get(SET_COOKIE).unwrap(),
            "session=abc; Path=/app/; HttpOnly"
        );
    }

    #[test]
    fn test_set_cookie_case_insensitive_and_whitespace() {
        let mut headers = headers_with(SET_COOKIE, "session=abc;  path=/sub");
        rewrite_set_cookie(&mut headers, "/app");
        assert_eq!(headers.get(SET_COOKIE).unwrap(), "session=abc; Path=/app/sub");
    }

    #[test]
    fn test_set_cookie_without_path_passes_through() {
        let mut headers = headers_with(SET_COOKIE, "session=abc; HttpOnly");
        rewrite_set_cookie(&mut headers, "/app");
        assert_eq!(headers.get(SET_COOKIE).unwrap(), "session=abc; HttpOnly");
    }

    #[test]
    fn test_set_cookie_root_mount_untouched() {
        let mut headers = headers_with(SET_COOKIE, "session=abc; Path=/");
        rewrite_set_cookie(&mut headers, "/");
        assert_eq!(headers.get(SET_COOKIE).unwrap(), "session=abc; Path=/");
    }

    #[test]
    fn test_set_cookie_ordering_preserved() {
        let mut headers = HeaderMap::new();
        headers.append(SET_COOKIE, HeaderValue::from_static("first=1; Path=/"));
        headers.append(SET_COOKIE, HeaderValue::from_static("second=2"));
        headers.append(SET_COOKIE, HeaderValue::from_static("third=3; Path=/"));
        rewrite_set_cookie(&mut headers, "/app");
        let values: Vec<&str> = headers
            .get_all(SET_COOKIE)
            .iter()
            .map(|v| v.to_str().unwrap())
            .collect();
        assert_eq!(
            values,
            vec!["first=1; Path=/app/", "second=2", "third=3; Path=/app/"]
        );
    }

    #[test]
    fn test_strip_rewrite_sensitive() {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_LENGTH, HeaderValue::from_static("120"));
        headers.insert(ETAG, HeaderValue::from_static("\"abc\""));
        headers.insert(CONTENT_ENCODING, HeaderValue::from_static("gzip"));
        headers.insert(
            http::header::CONTENT_TYPE,
            HeaderValue::from_static("text/html"),
        );
        strip_rewrite_sensitive(&mut headers);
        assert!(headers.get(CONTENT_LENGTH).is_none());
        assert!(headers.get(ETAG).is_none());
        assert!(headers.get(CONTENT_ENCODING).is_none());
        assert!(headers.get(http::header::CONTENT_TYPE).is_some());
    }
}
