//! Route matching conditions.
//!
//! Path matching is case-sensitive except for the entry identifier check,
//! which follows the identifier rules (reserved names in any case never
//! match). No regex.

use axum::http::Method;

use crate::store::entry::is_valid_id;

/// Condition on a request's method and path.
pub trait Matcher: Send + Sync + std::fmt::Debug {
    fn matches(&self, method: &Method, path: &str) -> bool;
}

/// Matches any of a set of methods.
#[derive(Debug, Clone)]
pub struct MethodMatcher {
    methods: Vec<Method>,
}

impl MethodMatcher {
    pub fn new(methods: impl IntoIterator<Item = Method>) -> Self {
        Self {
            methods: methods.into_iter().collect(),
        }
    }
}

impl Matcher for MethodMatcher {
    fn matches(&self, method: &Method, _path: &str) -> bool {
        self.methods.contains(method)
    }
}

#[derive(Debug, Clone)]
pub struct ExactPathMatcher {
    path: String,
}

impl ExactPathMatcher {
    pub fn new(path: impl Into<String>) -> Self {
        Self { path: path.into() }
    }
}

impl Matcher for ExactPathMatcher {
    fn matches(&self, _method: &Method, path: &str) -> bool {
        path == self.path
    }
}

/// Matches paths strictly below a prefix (`/static/` alone does not match).
#[derive(Debug, Clone)]
pub struct PathPrefixMatcher {
    prefix: String,
}

impl PathPrefixMatcher {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }
}

impl Matcher for PathPrefixMatcher {
    fn matches(&self, _method: &Method, path: &str) -> bool {
        path.len() > self.prefix.len() && path.starts_with(&self.prefix)
    }
}

/// Matches `/<id>` for anything shaped like an entry identifier. Reserved
/// names still match and are refused later as invalid identifiers.
#[derive(Debug, Clone, Default)]
pub struct EntryIdMatcher;

impl Matcher for EntryIdMatcher {
    fn matches(&self, _method: &Method, path: &str) -> bool {
        path.strip_prefix('/')
            .is_some_and(is_valid_id)
    }
}

/// Combines multiple matchers with AND semantics.
#[derive(Debug)]
pub struct AndMatcher {
    matchers: Vec<Box<dyn Matcher>>,
}

impl AndMatcher {
    pub fn new(matchers: Vec<Box<dyn Matcher>>) -> Self {
        Self { matchers }
    }
}

impl Matcher for AndMatcher {
    fn matches(&self, method: &Method, path: &str) -> bool {
        self.matchers.iter().all(|m| m.matches(method, path))
    }
}
