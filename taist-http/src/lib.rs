// Copyright 2021-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! HTTP entry adapter.
//!
//! Each inbound request starts a fresh root context: depth 0, a new trace
//! id equal to the route span's id, and a new correlation id. The
//! correlation id is also stashed in the process-wide fallback slot for
//! the duration of the request (and cleared on completion), so frameworks
//! that lose the task-local can still attribute downstream spans. Exactly
//! one `exit` (or `error`) record named `Route.<METHOD> <path>` is emitted
//! per request, after the response settles, carrying the method, path,
//! params, query and status code.

mod router;
mod serve;

pub use router::{RouteHandler, RouteRequest, RouteResponse, Router};
pub use serve::serve;

use serde_json::json;
use std::sync::Arc;
use std::time::Instant;
use taist_common::id::{next_correlation_id, next_id};
use taist_common::time::{elapsed_millis, now_millis};
use taist_common::{ErrorInfo, RecordType, TraceRecord};
use taist_context::{fallback_correlation, scope, Frame};

/// Wraps a [`Router`] so handlers run inside a per-request root frame.
#[derive(Clone)]
pub struct EntryAdapter {
    router: Arc<Router>,
}

impl EntryAdapter {
    pub fn new(router: Router) -> Self {
        Self {
            router: Arc::new(router),
        }
    }

    /// Dispatches one request. This is the whole entry contract; the
    /// hyper plumbing in [`serve`] is just transport around it.
    pub async fn handle(&self, method: &str, uri: &str, body: serde_json::Value) -> RouteResponse {
        let method = method.to_ascii_uppercase();
        let (path, raw_query) = match uri.split_once('?') {
            Some((path, query)) => (path, query),
            None => (uri, ""),
        };
        let query = router::parse_query(raw_query);

        if !taist_runtime::is_enabled() {
            return self.dispatch(&method, path, query, body, "").await.1;
        }

        let root_id = next_id();
        let correlation_id = next_correlation_id();
        // The route span itself is observed at depth 0; everything the
        // handler calls is observed one deeper.
        let frame = Frame {
            depth: 1,
            trace_id: Some(root_id.clone()),
            parent_id: None,
            id: root_id.clone(),
            correlation_id: Some(correlation_id.clone()),
        };
        fallback_correlation::set(&correlation_id);

        let timestamp = now_millis();
        let start = Instant::now();
        let (outcome, response) = scope(
            frame,
            self.dispatch(&method, path, query.clone(), body, &correlation_id),
        )
        .await;
        let duration = elapsed_millis(start);
        fallback_correlation::clear();

        let (pattern, params, error) = outcome;
        let name = format!("Route.{method} {pattern}");
        let record = TraceRecord {
            id: root_id.clone(),
            name,
            record_type: if error.is_some() {
                RecordType::Error
            } else {
                RecordType::Exit
            },
            args: Some(json!({
                "method": method,
                "path": path,
                "params": params,
                "query": query,
            })),
            result: error
                .is_none()
                .then(|| json!({"statusCode": response.status})),
            error,
            duration: Some(duration),
            timestamp,
            depth: 0,
            parent_id: None,
            trace_id: root_id,
            correlation_id,
        };
        taist_runtime::emit_record(record);
        response
    }

    /// Runs the matched handler. Returns the span ingredients (pattern,
    /// params, error) alongside the response so the caller can compose
    /// the route record.
    async fn dispatch(
        &self,
        method: &str,
        path: &str,
        query: std::collections::HashMap<String, String>,
        body: serde_json::Value,
        correlation_id: &str,
    ) -> (RouteOutcome, RouteResponse) {
        let Some((handler, pattern, params)) = self.router.find(method, path) else {
            let outcome = (path.to_string(), serde_json::Map::new().into(), None);
            return (outcome, RouteResponse::not_found());
        };
        let request = RouteRequest {
            method: method.to_string(),
            path: path.to_string(),
            params: params.clone(),
            query,
            body,
            correlation_id: correlation_id.to_string(),
        };
        let pattern = pattern.to_string();
        let params_value = serde_json::to_value(&params).unwrap_or_default();
        match handler(request).await {
            Ok(response) => ((pattern, params_value, None), response),
            Err(error) => {
                let message = error.to_string();
                // The handler's own frames are gone by the time the error
                // reaches the adapter; no stack to attach.
                let info = ErrorInfo::new("HandlerError", message.clone());
                (
                    (pattern, params_value, Some(info)),
                    RouteResponse::json(500, json!({"error": message})),
                )
            }
        }
    }
}

type RouteOutcome = (String, serde_json::Value, Option<ErrorInfo>);
