// Copyright 2021-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use crate::settings;
use crate::sink;
use crate::span::{CancelGuard, PendingSpan};
use serde::Serialize;
use serde_json::Value;
use std::any::Any;
use std::fmt::Display;
use std::future::Future;
use std::panic::{catch_unwind, resume_unwind, AssertUnwindSafe};
use taist_common::capture::{capture, capture_error};
use taist_common::id::{next_correlation_id, next_id};
use taist_common::time::now_millis;
use taist_common::{ErrorInfo, RecordType, TraceRecord};

fn pass_through(name: &str) -> bool {
    !settings::is_enabled() || settings::is_excluded(name)
}

fn panic_info(payload: &(dyn Any + Send)) -> ErrorInfo {
    let message = if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "panic".to_string()
    };
    capture_error("Panic", &message)
}

fn error_name<E>() -> String {
    std::any::type_name::<E>()
        .rsplit("::")
        .next()
        .unwrap_or("Error")
        .to_string()
}

/// Wraps a synchronous, infallible call.
///
/// Panics are reported as `error` records and resumed unchanged.
pub fn traced<R: Serialize>(name: impl Into<String>, args: Option<Value>, f: impl FnOnce() -> R) -> R {
    let name = name.into();
    if pass_through(&name) {
        return f();
    }
    let caller = taist_context::current();
    if caller.depth >= settings::max_depth() {
        return f();
    }
    let (span, frame) = PendingSpan::enter(name, args, &caller);
    match catch_unwind(AssertUnwindSafe(|| taist_context::scope_sync(frame, f))) {
        Ok(value) => {
            span.exit(Some(capture(&value)));
            value
        }
        Err(payload) => {
            span.error(panic_info(payload.as_ref()));
            resume_unwind(payload)
        }
    }
}

/// Wraps a synchronous, fallible call. `Err` emits an `error` record and is
/// returned unchanged.
pub fn traced_result<T, E>(
    name: impl Into<String>,
    args: Option<Value>,
    f: impl FnOnce() -> Result<T, E>,
) -> Result<T, E>
where
    T: Serialize,
    E: Display,
{
    let name = name.into();
    if pass_through(&name) {
        return f();
    }
    let caller = taist_context::current();
    if caller.depth >= settings::max_depth() {
        return f();
    }
    let (span, frame) = PendingSpan::enter(name, args, &caller);
    match catch_unwind(AssertUnwindSafe(|| taist_context::scope_sync(frame, f))) {
        Ok(Ok(value)) => {
            span.exit(Some(capture(&value)));
            Ok(value)
        }
        Ok(Err(error)) => {
            span.error(capture_error(error_name::<E>(), &error.to_string()));
            Err(error)
        }
        Err(payload) => {
            span.error(panic_info(payload.as_ref()));
            resume_unwind(payload)
        }
    }
}

/// Wraps a future. The enter record is emitted at first poll; the paired
/// exit is emitted when the future settles, with the duration measured
/// from entry rather than from the last resumption. Dropping the wrapped
/// future after entry emits a cancellation `error` record instead.
pub fn traced_async<R, F>(
    name: impl Into<String>,
    args: Option<Value>,
    fut: F,
) -> impl Future<Output = R>
where
    R: Serialize,
    F: Future<Output = R>,
{
    let name = name.into();
    async move {
        if pass_through(&name) {
            return fut.await;
        }
        let caller = taist_context::current();
        if caller.depth >= settings::max_depth() {
            return fut.await;
        }
        let (span, frame) = PendingSpan::enter(name, args, &caller);
        let mut guard = CancelGuard::new(span);
        let output = taist_context::scope(frame, fut).await;
        guard.defuse().exit(Some(capture(&output)));
        output
    }
}

/// Wraps a fallible future. See [`traced_async`] for settle semantics.
pub fn traced_result_async<T, E, F>(
    name: impl Into<String>,
    args: Option<Value>,
    fut: F,
) -> impl Future<Output = Result<T, E>>
where
    T: Serialize,
    E: Display,
    F: Future<Output = Result<T, E>>,
{
    let name = name.into();
    async move {
        if pass_through(&name) {
            return fut.await;
        }
        let caller = taist_context::current();
        if caller.depth >= settings::max_depth() {
            return fut.await;
        }
        let (span, frame) = PendingSpan::enter(name, args, &caller);
        let mut guard = CancelGuard::new(span);
        let result = taist_context::scope(frame, fut).await;
        let span = guard.defuse();
        match &result {
            Ok(value) => span.exit(Some(capture(value))),
            Err(error) => span.error(capture_error(error_name::<E>(), &error.to_string())),
        }
        result
    }
}

/// Emits a standalone `event` record at the current context.
pub fn emit_event(name: impl Into<String>, data: Option<Value>) {
    let name = name.into();
    if pass_through(&name) {
        return;
    }
    let caller = taist_context::current();
    let id = next_id();
    sink::emit_record(TraceRecord {
        id: id.clone(),
        name,
        record_type: RecordType::Event,
        args: data,
        result: None,
        error: None,
        duration: None,
        timestamp: now_millis(),
        depth: caller.depth,
        parent_id: (!caller.id.is_empty()).then(|| caller.id.clone()),
        trace_id: caller.trace_id.clone().unwrap_or_else(|| id.clone()),
        correlation_id: caller
            .correlation_id
            .clone()
            .unwrap_or_else(next_correlation_id),
    });
}
