//! Request scope predicate for the gate.
//!
//! A request is in scope when its path is not under an excluded prefix and
//! none of the `missing` header conditions hold. Prefixes are compared
//! against the path with its leading `/` removed, so `_next/static` excludes
//! `/_next/static/chunks/app.js` but not `/docs/_next/static`.

use axum::http::{HeaderMap, HeaderName, HeaderValue, Request};

/// Header carried by client-router prefetches.
pub const ROUTER_PREFETCH_HEADER: &str = "next-router-prefetch";
/// Header carried by browser prefetches (`purpose: prefetch`).
pub const PURPOSE_HEADER: &str = "purpose";

/// A header that must be absent (or carry a different value) for a request
/// to match.
#[derive(Debug, Clone)]
pub struct HeaderCondition {
    name: HeaderName,
    value: Option<HeaderValue>,
}

impl HeaderCondition {
    /// Holds when the header is present, whatever its value.
    pub fn present(name: &'static str) -> Self {
        Self {
            name: HeaderName::from_static(name),
            value: None,
        }
    }

    /// Holds when the header is present with exactly this value.
    pub fn equals(name: &'static str, value: &'static str) -> Self {
        Self {
            name: HeaderName::from_static(name),
            value: Some(HeaderValue::from_static(value)),
        }
    }

    /// Whether the condition holds for the given headers.
    pub fn holds(&self, headers: &HeaderMap) -> bool {
        match &self.value {
            None => headers.contains_key(&self.name),
            Some(expected) => headers
                .get_all(&self.name)
                .iter()
                .any(|value| value == expected),
        }
    }
}

/// Decides whether the gate runs for a request.
#[derive(Debug, Clone)]
pub struct MatchRule {
    excluded_prefixes: Vec<String>,
    missing: Vec<HeaderCondition>,
}

impl MatchRule {
    /// A rule matching every request.
    pub fn all() -> Self {
        Self {
            excluded_prefixes: Vec::new(),
            missing: Vec::new(),
        }
    }

    /// Exclude paths whose remainder after the leading `/` starts with `prefix`.
    pub fn exclude_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.excluded_prefixes.push(prefix.into());
        self
    }

    /// Skip requests for which `condition` holds.
    pub fn missing(mut self, condition: HeaderCondition) -> Self {
        self.missing.push(condition);
        self
    }

    /// Path part of the predicate.
    pub fn matches_path(&self, path: &str) -> bool {
        let rest = path.strip_prefix('/').unwrap_or(path);
        !self
            .excluded_prefixes
            .iter()
            .any(|prefix| rest.starts_with(prefix.as_str()))
    }

    /// Header part of the predicate.
    pub fn matches_headers(&self, headers: &HeaderMap) -> bool {
        !self.missing.iter().any(|condition| condition.holds(headers))
    }

    /// Whether the gate should run for `request`.
    pub fn matches<B>(&self, request: &Request<B>) -> bool {
        self.matches_path(request.uri().path()) && self.matches_headers(request.headers())
    }
}

impl Default for MatchRule {
    /// Everything except static assets, image optimization and prefetches.
    fn default() -> Self {
        Self::all()
            .exclude_prefix("_next/static")
            .exclude_prefix("_next/image")
            .missing(HeaderCondition::present(ROUTER_PREFETCH_HEADER))
            .missing(HeaderCondition::equals(PURPOSE_HEADER, "prefetch"))
    }
}
