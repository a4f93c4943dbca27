// Copyright 2021-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use serde_json::Value;
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

/// A request as the routed handlers see it.
#[derive(Debug, Clone)]
pub struct RouteRequest {
    pub method: String,
    pub path: String,
    /// Captured `:name` segments from the matched pattern.
    pub params: HashMap<String, String>,
    pub query: HashMap<String, String>,
    pub body: Value,
    /// The request-scoped id every span of this request shares. Empty when
    /// tracing is disabled.
    pub correlation_id: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RouteResponse {
    pub status: u16,
    pub body: Value,
}

impl RouteResponse {
    pub fn json(status: u16, body: Value) -> Self {
        Self { status, body }
    }

    pub fn ok(body: Value) -> Self {
        Self::json(200, body)
    }

    pub fn not_found() -> Self {
        Self::json(404, Value::Null)
    }
}

pub type HandlerFuture = Pin<Box<dyn Future<Output = anyhow::Result<RouteResponse>> + Send>>;
pub type RouteHandler = Arc<dyn Fn(RouteRequest) -> HandlerFuture + Send + Sync>;

struct Route {
    method: String,
    pattern: Vec<Segment>,
    /// The pattern as registered, used in the route's span name.
    pattern_text: String,
    handler: RouteHandler,
}

enum Segment {
    Literal(String),
    Param(String),
}

/// Method + path-pattern routing with `:param` segments. Deliberately
/// minimal; the interesting part of this crate is the tracing around it.
#[derive(Default)]
pub struct Router {
    routes: Vec<Route>,
}

impl Router {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn route<F, Fut>(mut self, method: &str, pattern: &str, handler: F) -> Self
    where
        F: Fn(RouteRequest) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<RouteResponse>> + Send + 'static,
    {
        self.routes.push(Route {
            method: method.to_ascii_uppercase(),
            pattern: parse_pattern(pattern),
            pattern_text: pattern.to_string(),
            handler: Arc::new(move |request| Box::pin(handler(request))),
        });
        self
    }

    /// Returns the matched handler, the registered pattern text, and the
    /// captured params.
    pub(crate) fn find(
        &self,
        method: &str,
        path: &str,
    ) -> Option<(RouteHandler, &str, HashMap<String, String>)> {
        let segments: Vec<&str> = split_path(path);
        for route in &self.routes {
            if route.method != method {
                continue;
            }
            if let Some(params) = match_segments(&route.pattern, &segments) {
                return Some((route.handler.clone(), &route.pattern_text, params));
            }
        }
        None
    }
}

fn split_path(path: &str) -> Vec<&str> {
    path.split('/').filter(|s| !s.is_empty()).collect()
}

fn parse_pattern(pattern: &str) -> Vec<Segment> {
    split_path(pattern)
        .into_iter()
        .map(|segment| match segment.strip_prefix(':') {
            Some(name) => Segment::Param(name.to_string()),
            None => Segment::Literal(segment.to_string()),
        })
        .collect()
}

fn match_segments(pattern: &[Segment], path: &[&str]) -> Option<HashMap<String, String>> {
    if pattern.len() != path.len() {
        return None;
    }
    let mut params = HashMap::new();
    for (segment, actual) in pattern.iter().zip(path) {
        match segment {
            Segment::Literal(expected) if expected == actual => {}
            Segment::Literal(_) => return None,
            Segment::Param(name) => {
                params.insert(name.clone(), (*actual).to_string());
            }
        }
    }
    Some(params)
}

pub(crate) fn parse_query(query: &str) -> HashMap<String, String> {
    query
        .split('&')
        .filter(|pair| !pair.is_empty())
        .map(|pair| match pair.split_once('=') {
            Some((key, value)) => (key.to_string(), value.to_string()),
            None => (pair.to_string(), String::new()),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn router() -> Router {
        Router::new()
            .route("GET", "/users/:id", |req| async move {
                Ok(RouteResponse::ok(json!({"id": req.params["id"]})))
            })
            .route("POST", "/users", |_req| async move {
                Ok(RouteResponse::json(201, json!({"created": true})))
            })
    }

    #[test]
    fn patterns_capture_params() {
        let router = router();
        let (_, pattern, params) = router.find("GET", "/users/42").unwrap();
        assert_eq!(pattern, "/users/:id");
        assert_eq!(params["id"], "42");
    }

    #[test]
    fn method_and_arity_must_match() {
        let router = router();
        assert!(router.find("DELETE", "/users/42").is_none());
        assert!(router.find("GET", "/users").is_none());
        assert!(router.find("GET", "/users/42/posts").is_none());
    }

    #[test]
    fn queries_parse_into_pairs() {
        let query = parse_query("limit=10&verbose&name=A");
        assert_eq!(query["limit"], "10");
        assert_eq!(query["verbose"], "");
        assert_eq!(query["name"], "A");
    }
}
