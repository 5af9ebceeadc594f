//! Route table and lookup.
//!
//! Built once, immutable afterwards, so lookups need no lock. Lookup is a
//! linear scan in declaration order and the first match wins.

use axum::http::Method;

use crate::error::ClipError;
use crate::routing::matcher::{
    AndMatcher, EntryIdMatcher, ExactPathMatcher, Matcher, MethodMatcher, PathPrefixMatcher,
};

/// What a matched route does.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Handler {
    /// Usage page.
    Root,
    /// Upload under a random identifier.
    PutRandom,
    Static,
    Info,
    /// Credential check only.
    Verify,
    Get,
    Put,
}

#[derive(Debug)]
pub struct Route {
    pub handler: Handler,
    /// Subject to the per-visitor rate limit.
    pub limit: bool,
    /// Subject to authorization.
    pub auth: bool,
    matcher: AndMatcher,
}

impl Route {
    fn new(methods: &[Method], path: Box<dyn Matcher>, handler: Handler) -> Self {
        Self {
            handler,
            limit: false,
            auth: false,
            matcher: AndMatcher::new(vec![
                Box::new(MethodMatcher::new(methods.iter().cloned())),
                path,
            ]),
        }
    }

    fn limited(mut self) -> Self {
        self.limit = true;
        self
    }

    fn authorized(mut self) -> Self {
        self.auth = true;
        self
    }

    pub fn matches(&self, method: &Method, path: &str) -> bool {
        self.matcher.matches(method, path)
    }
}

#[derive(Debug)]
pub struct Router {
    routes: Vec<Route>,
}

impl Router {
    pub fn new() -> Self {
        let get = [Method::GET];
        let put = [Method::PUT, Method::POST];
        let routes = vec![
            Route::new(&get, Box::new(ExactPathMatcher::new("/")), Handler::Root),
            Route::new(&put, Box::new(ExactPathMatcher::new("/")), Handler::PutRandom)
                .limited()
                .authorized(),
            Route::new(&get, Box::new(PathPrefixMatcher::new("/static/")), Handler::Static),
            Route::new(&get, Box::new(ExactPathMatcher::new("/info")), Handler::Info).limited(),
            Route::new(&get, Box::new(ExactPathMatcher::new("/verify")), Handler::Verify)
                .limited()
                .authorized(),
            Route::new(&get, Box::new(EntryIdMatcher), Handler::Get)
                .limited()
                .authorized(),
            Route::new(&put, Box::new(EntryIdMatcher), Handler::Put)
                .limited()
                .authorized(),
        ];
        Self { routes }
    }

    /// First route matching `method` and `path`. Unmatched GETs are not
    /// found, anything else is a bad request.
    pub fn match_request(&self, method: &Method, path: &str) -> Result<&Route, ClipError> {
        self.routes
            .iter()
            .find(|route| route.matches(method, path))
            .ok_or(ClipError::NoRoute {
                get: method == Method::GET,
            })
    }

    pub fn routes(&self) -> &[Route] {
        &self.routes
    }
}

impl Default for Router {
    fn default() -> Self {
        Self::new()
    }
}
