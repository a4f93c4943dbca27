// Copyright 2021-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Bounded snapshots of arguments and return values.
//!
//! Captured values are rewritten so that no record exceeds the configured
//! size caps at any nesting level. Anything `serde::Serialize` can be
//! captured; `chrono` datetimes arrive as ISO-8601 strings and fall under
//! the string cap like any other string.

use crate::record::ErrorInfo;
use serde::Serialize;
use serde_json::{Map, Value};
use std::backtrace::{Backtrace, BacktraceStatus};

pub const TRUNCATION_MARKER: char = '…';

/// Size caps applied to captured values.
#[derive(Debug, Clone, Copy)]
pub struct CaptureLimits {
    /// Maximum string length in characters; longer strings are truncated
    /// with a marker appended.
    pub max_string: usize,
    /// Maximum array items kept; the remainder collapses to a `+N more`
    /// marker element.
    pub max_array: usize,
    /// Maximum object keys kept; the remainder collapses to a `…` marker
    /// entry.
    pub max_object: usize,
    /// Maximum recursion depth; containers nested deeper collapse to a
    /// type tag.
    pub max_depth: usize,
}

impl Default for CaptureLimits {
    fn default() -> Self {
        Self {
            max_string: 50,
            max_array: 3,
            max_object: 4,
            max_depth: 2,
        }
    }
}

/// Captures a serializable value under the default limits.
pub fn capture<T: Serialize>(value: &T) -> Value {
    capture_with(value, &CaptureLimits::default())
}

/// Captures a serializable value under explicit limits.
pub fn capture_with<T: Serialize>(value: &T, limits: &CaptureLimits) -> Value {
    match serde_json::to_value(value) {
        Ok(value) => sanitize(value, limits),
        Err(_) => Value::String("[Unserializable]".into()),
    }
}

/// Placeholder for function-valued leaves, which have no serializable form.
pub fn function_placeholder(name: &str) -> Value {
    Value::String(format!("[Function: {name}]"))
}

/// Captures an error at its observation site: name, capped message, and
/// the first two application stack frames. The stack comes from
/// `std::backtrace` and is empty when backtraces are disabled for the
/// process.
pub fn capture_error(name: impl Into<String>, message: &str) -> ErrorInfo {
    let limits = CaptureLimits::default();
    ErrorInfo {
        name: name.into(),
        message: truncate_str(message, limits.max_string),
        stack: top_frames(&Backtrace::capture()),
    }
}

fn top_frames(backtrace: &Backtrace) -> Vec<String> {
    if backtrace.status() != BacktraceStatus::Captured {
        return vec![];
    }
    frames_from_text(&backtrace.to_string())
}

/// Symbol lines of a rendered backtrace, minus the capture and unwind
/// machinery above the frame that actually failed.
fn frames_from_text(text: &str) -> Vec<String> {
    text.lines()
        .filter_map(|line| {
            let (index, symbol) = line.trim().split_once(": ")?;
            index.parse::<usize>().ok()?;
            Some(symbol.trim().to_string())
        })
        .filter(|symbol| !internal_frame(symbol))
        .take(2)
        .collect()
}

fn internal_frame(symbol: &str) -> bool {
    const MACHINERY: &[&str] = &[
        "std::backtrace",
        "core::panicking",
        "std::panicking",
        "rust_begin_unwind",
        "__rust",
        "taist_common::capture",
        "taist_runtime::",
    ];
    MACHINERY.iter().any(|prefix| symbol.contains(prefix))
}

/// Rewrites a value tree so every level respects `limits`.
pub fn sanitize(value: Value, limits: &CaptureLimits) -> Value {
    sanitize_at(value, limits, 0)
}

fn sanitize_at(value: Value, limits: &CaptureLimits, depth: usize) -> Value {
    match value {
        Value::String(s) => Value::String(truncate_str(&s, limits.max_string)),
        Value::Array(items) => {
            if depth >= limits.max_depth {
                return Value::String("[Array]".into());
            }
            let total = items.len();
            let mut kept: Vec<Value> = items
                .into_iter()
                .take(limits.max_array)
                .map(|item| sanitize_at(item, limits, depth + 1))
                .collect();
            if total > limits.max_array {
                kept.push(Value::String(format!("+{} more", total - limits.max_array)));
            }
            Value::Array(kept)
        }
        Value::Object(entries) => {
            if depth >= limits.max_depth {
                return Value::String("[Object]".into());
            }
            let total = entries.len();
            let mut kept = Map::new();
            for (key, item) in entries.into_iter().take(limits.max_object) {
                kept.insert(key, sanitize_at(item, limits, depth + 1));
            }
            if total > limits.max_object {
                kept.insert(TRUNCATION_MARKER.to_string(), Value::String(TRUNCATION_MARKER.to_string()));
            }
            Value::Object(kept)
        }
        other => other,
    }
}

fn truncate_str(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        return s.to_string();
    }
    let mut out: String = s.chars().take(max).collect();
    out.push(TRUNCATION_MARKER);
    out
}
