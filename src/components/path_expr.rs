//! Path expression compiler
//!
//! Turns a declarative path expression into an anchored matcher whose first
//! capture group captures the mount actual, plus a base-specificity score
//! used for route ordering.
//!
//! Supported syntax:
//! - literal segments, with backslash escaping for `:`/`(`/`)`/`\`
//! - named parameters `:name` matching one path segment
//! - constrained parameters `:name(REGEX)` embedding the fragment verbatim
//!   after one level of unescaping
//! - trailing wildcards on the last parameter: `:name*` (zero or more
//!   further segments) and `:name+` (at least one)

use regex::Regex;

use crate::error::ProxyError;

/// Trailing wildcard kind on the last expression part
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TrailingWildcard {
    /// `:name*` — the mount also matches with no further segments
    Star,
    /// `:name+` — at least one further segment is required
    Plus,
}

/// A compiled path expression
#[derive(Debug, Clone)]
pub struct CompiledPath {
    expression: String,
    matcher: Regex,
    static_mount: Option<String>,
    base_specificity: usize,
}

impl CompiledPath {
    /// Compile a raw path expression.
    ///
    /// The expression is normalized first (leading `/`, no trailing `/`
    /// except at the root). Invalid syntax — a `:` without a name, an
    /// unclosed constraint group, a dangling escape — is a configuration
    /// error.
    pub fn compile(raw: &str) -> Result<Self, ProxyError> {
        let expression = normalize(raw);

        // Base specificity: literal prefix length before the first parameter.
        let base_specificity = expression.find(':').unwrap_or(expression.len());

        // Expressions without parameters or escapes are static mounts and
        // match as a literal prefix plus optional child path.
        if !expression.contains(|c| matches!(c, ':' | '(' | ')' | '\\')) {
            let pattern = format!("^({})(?:/.*)?$", regex::escape(&expression));
            let matcher = compile_pattern(&expression, &pattern)?;
            return Ok(Self {
                static_mount: Some(expression.clone()),
                expression,
                matcher,
                base_specificity,
            });
        }

        let parts: Vec<&str> = expression.split('/').filter(|p| !p.is_empty()).collect();
        let trailing = parts.last().copied().and_then(parse_trailing_wildcard);
        let mount_parts = if trailing.is_some() {
            &parts[..parts.len() - 1]
        } else {
            &parts[..]
        };

        let mut mount_pattern = String::new();
        for part in mount_parts {
            mount_pattern.push('/');
            mount_pattern.push_str(&translate_segment(part, &expression)?);
        }

        let pattern = match trailing {
            Some(TrailingWildcard::Plus) => format!("^({})/.+$", mount_pattern),
            _ => format!("^({})(?:/.*)?$", mount_pattern),
        };
        let matcher = compile_pattern(&expression, &pattern)?;

        Ok(Self {
            expression,
            matcher,
            static_mount: None,
            base_specificity,
        })
    }

    /// The normalized expression string
    pub fn expression(&self) -> &str {
        &self.expression
    }

    /// The literal mount for static expressions, `None` otherwise
    pub fn static_mount(&self) -> Option<&str> {
        self.static_mount.as_deref()
    }

    /// Length of the literal prefix before the first parameter marker
    pub fn base_specificity(&self) -> usize {
        self.base_specificity
    }

    /// Match a request path, returning the captured mount actual
    pub fn match_mount<'p>(&self, path: &'p str) -> Option<&'p str> {
        self.matcher
            .captures(path)
            .and_then(|captures| captures.get(1))
            .map(|m| m.as_str())
    }
}

/// Normalize an expression: leading `/`, no trailing `/` unless root
pub fn normalize(raw: &str) -> String {
    let mut expression = if raw.starts_with('/') {
        raw.to_string()
    } else {
        format!("/{}", raw)
    };
    while expression.len() > 1 && expression.ends_with('/') {
        expression.pop();
    }
    expression
}

fn compile_pattern(expression: &str, pattern: &str) -> Result<Regex, ProxyError> {
    Regex::new(pattern).map_err(|e| {
        ProxyError::invalid_path_expression(expression.to_string(), e.to_string())
    })
}

/// Detect `:NAME*` / `:NAME+` on the final expression part
fn parse_trailing_wildcard(part: &str) -> Option<TrailingWildcard> {
    let rest = part.strip_prefix(':')?;
    let (name, kind) = match rest.strip_suffix('*') {
        Some(name) => (name, TrailingWildcard::Star),
        None => (rest.strip_suffix('+')?, TrailingWildcard::Plus),
    };
    if !name.is_empty() && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        Some(kind)
    } else {
        None
    }
}

/// Translate one expression segment into regex syntax.
///
/// Backslash escapes the next character. `:` starts a parameter name; a
/// following `(` opens a balanced constraint group that is unescaped once
/// and embedded as a capture group. Everything else is a regex-escaped
/// literal.
fn translate_segment(segment: &str, expression: &str) -> Result<String, ProxyError> {
    let mut out = String::new();
    let mut chars = segment.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '\\' => {
                let escaped = chars.next().ok_or_else(|| {
                    ProxyError::invalid_path_expression(
                        expression.to_string(),
                        "dangling escape at end of segment".to_string(),
                    )
                })?;
                out.push_str(&regex::escape(&escaped.to_string()));
            }
            ':' => {
                let mut name = String::new();
                while let Some(&next) = chars.peek() {
                    if next.is_ascii_alphanumeric() || next == '_' {
                        name.push(next);
                        chars.next();
                    } else {
                        break;
                    }
                }
                if name.is_empty() {
                    return Err(ProxyError::invalid_path_expression(
                        expression.to_string(),
                        "parameter name expected after ':'".to_string(),
                    ));
                }
                if chars.peek() == Some(&'(') {
                    chars.next();
                    let fragment = consume_balanced(&mut chars).ok_or_else(|| {
                        ProxyError::invalid_path_expression(
                            expression.to_string(),
                            "unclosed constraint group".to_string(),
                        )
                    })?;
                    out.push('(');
                    out.push_str(&unescape_once(&fragment));
                    out.push(')');
                } else {
                    out.push_str("([^/]+)");
                }
            }
            other => out.push_str(&regex::escape(&other.to_string())),
        }
    }

    Ok(out)
}

/// Consume a balanced parenthesized fragment, honoring backslash escaping.
/// The opening `(` has already been consumed; the closing `)` is consumed
/// but not included. Returns `None` when the group never closes.
fn consume_balanced(chars: &mut std::iter::Peekable<std::str::Chars<'_>>) -> Option<String> {
    let mut fragment = String::new();
    let mut depth = 1usize;

    while let Some(c) = chars.next() {
        match c {
            '\\' => {
                fragment.push('\\');
                fragment.push(chars.next()?);
            }
            '(' => {
                depth += 1;
                fragment.push('(');
            }
            ')' => {
                depth -= 1;
                if depth == 0 {
                    return Some(fragment);
                }
                fragment.push(')');
            }
            other => fragment.push(other),
        }
    }

    None
}

/// Remove one level of backslash escaping
fn unescape_once(fragment: &str) -> String {
    let mut out = String::with_capacity(fragment.len());
    let mut chars = fragment.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            match chars.next() {
                Some(next) => out.push(next),
                None => out.push('\\'),
            }
        } else {
            out.push(c);
        }
    }
    out
}
