// Copyright 2021-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use crate::sink;
use serde_json::Value;
use std::time::Instant;
use taist_common::id::{next_correlation_id, next_id};
use taist_common::time::{elapsed_millis, now_millis};
use taist_common::{ErrorInfo, RecordType, TraceRecord};
use taist_context::Frame;

/// An opened span: the enter record has been emitted and the paired
/// exit/error is still owed. Exactly one of [`exit`](PendingSpan::exit) or
/// [`error`](PendingSpan::error) must follow.
#[derive(Debug)]
pub(crate) struct PendingSpan {
    id: String,
    name: String,
    /// Depth at which the operation was observed: the caller's depth.
    depth: u32,
    parent_id: Option<String>,
    trace_id: String,
    correlation_id: String,
    start: Instant,
}

impl PendingSpan {
    /// Emits the enter record and returns the pending span together with
    /// the child frame the wrapped body must run in.
    pub(crate) fn enter(name: String, args: Option<Value>, caller: &Frame) -> (PendingSpan, Frame) {
        let mut child = caller.child(next_id());
        let correlation_id = child
            .correlation_id
            .get_or_insert_with(next_correlation_id)
            .clone();
        let trace_id = child
            .trace_id
            .clone()
            .unwrap_or_else(|| child.id.clone());
        let span = PendingSpan {
            id: child.id.clone(),
            name,
            depth: caller.depth,
            parent_id: child.parent_id.clone(),
            trace_id,
            correlation_id,
            start: Instant::now(),
        };
        sink::emit_record(TraceRecord {
            id: span.id.clone(),
            name: span.name.clone(),
            record_type: RecordType::Enter,
            args,
            result: None,
            error: None,
            duration: None,
            timestamp: now_millis(),
            depth: span.depth,
            parent_id: span.parent_id.clone(),
            trace_id: span.trace_id.clone(),
            correlation_id: span.correlation_id.clone(),
        });
        (span, child)
    }

    pub(crate) fn exit(self, result: Option<Value>) {
        let duration = elapsed_millis(self.start);
        sink::emit_record(self.settle(RecordType::Exit, result, None, duration));
    }

    pub(crate) fn error(self, error: ErrorInfo) {
        let duration = elapsed_millis(self.start);
        sink::emit_record(self.settle(RecordType::Error, None, Some(error), duration));
    }

    fn settle(
        self,
        record_type: RecordType,
        result: Option<Value>,
        error: Option<ErrorInfo>,
        duration: f64,
    ) -> TraceRecord {
        TraceRecord {
            id: self.id,
            name: self.name,
            record_type,
            args: None,
            result,
            error,
            duration: Some(duration),
            timestamp: now_millis(),
            depth: self.depth,
            parent_id: self.parent_id,
            trace_id: self.trace_id,
            correlation_id: self.correlation_id,
        }
    }
}

/// Settles a span as cancelled if it is still pending when dropped.
///
/// Wrapped futures own one of these; dropping the future between enter and
/// settle is the cancellation path, and the guard keeps the exactly-once
/// guarantee for the paired record.
pub(crate) struct CancelGuard {
    span: Option<PendingSpan>,
}

impl CancelGuard {
    pub(crate) fn new(span: PendingSpan) -> Self {
        Self { span: Some(span) }
    }

    pub(crate) fn defuse(&mut self) -> PendingSpan {
        #[allow(clippy::expect_used)]
        self.span.take().expect("span settled twice")
    }
}

impl Drop for CancelGuard {
    fn drop(&mut self) {
        if let Some(span) = self.span.take() {
            // No throw site to walk here, so the capture carries no stack.
            span.error(ErrorInfo::new(
                "Cancelled",
                "operation cancelled before completion",
            ));
        }
    }
}
