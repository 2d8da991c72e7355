//! Route table and path matcher.
//!
//! One ordered route list per HTTP method. Lookup walks the list in
//! registration order and returns the first route whose pattern matches, so
//! precedence is decided by registration order, never by specificity.
//!
//! Patterns are split into segments on `/`. A segment starting with `:` binds
//! the request segment at the same position under the rest of its name;
//! every other segment must match byte for byte. There are no wildcards, and
//! `/users` and `/users/` are the same path after normalization.

use std::collections::HashMap;
use std::sync::Arc;

use http::Method;

use crate::handler::BoxedHandler;

const PARAM_MARKER: char = ':';

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Param(String),
}

struct Route {
    pattern: Vec<Segment>,
    handler: BoxedHandler,
}

impl Route {
    fn new(pattern: &str, handler: BoxedHandler) -> Self {
        let pattern = split_path(pattern)
            .map(|seg| match seg.strip_prefix(PARAM_MARKER) {
                Some(name) => Segment::Param(name.to_owned()),
                None => Segment::Literal(seg.to_owned()),
            })
            .collect();
        Self { pattern, handler }
    }

    fn matches(&self, segments: &[&str]) -> Option<HashMap<String, String>> {
        if self.pattern.len() != segments.len() {
            return None;
        }

        let mut params = HashMap::new();
        for (pattern, &segment) in self.pattern.iter().zip(segments) {
            match pattern {
                // A repeated name keeps the last binding.
                Segment::Param(name) => {
                    params.insert(name.clone(), segment.to_owned());
                }
                Segment::Literal(literal) if literal == segment => {}
                Segment::Literal(_) => return None,
            }
        }
        Some(params)
    }
}

/// The application's route table.
///
/// Append-only: built once at startup, then shared read-only by every
/// in-flight request.
#[derive(Default)]
pub(crate) struct Router {
    routes: HashMap<Method, Vec<Route>>,
}

impl Router {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Appends a route. An identical pattern registered earlier keeps
    /// precedence.
    pub(crate) fn add(&mut self, method: Method, pattern: &str, handler: BoxedHandler) {
        self.routes
            .entry(method)
            .or_default()
            .push(Route::new(pattern, handler));
    }

    /// The handler and parameters of the first route matching `path` under
    /// exactly `method`.
    pub(crate) fn lookup(
        &self,
        method: &Method,
        path: &str,
    ) -> Option<(BoxedHandler, HashMap<String, String>)> {
        let routes = self.routes.get(method)?;
        let segments: Vec<&str> = split_path(path).collect();
        routes.iter().find_map(|route| {
            route
                .matches(&segments)
                .map(|params| (Arc::clone(&route.handler), params))
        })
    }

    pub(crate) fn len(&self) -> usize {
        self.routes.values().map(Vec::len).sum()
    }
}

/// Trims every leading and trailing `/` and splits on the rest.
/// An empty path has no segments; interior empty segments are kept.
fn split_path(path: &str) -> impl Iterator<Item = &str> {
    let trimmed = path.trim_matches('/');
    trimmed.split('/').filter(move |_| !trimmed.is_empty())
}
