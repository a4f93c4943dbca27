// Copyright 2021-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Kind of a single trace emission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordType {
    Enter,
    Exit,
    Error,
    Event,
}

/// Captured error payload carried on `error` records.
///
/// The stack keeps at most the first two frames and is empty when no
/// throw site is available (cancellations, or backtraces disabled).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorInfo {
    pub name: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub stack: Vec<String>,
}

impl ErrorInfo {
    /// An error capture with no stack. Error sites that can see a throw
    /// point use `capture::capture_error` instead.
    pub fn new(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            message: message.into(),
            stack: vec![],
        }
    }
}

/// One enter/exit/error/event emission for a single instrumented operation.
///
/// Records are immutable once emitted. Optional fields are omitted from the
/// wire entirely when absent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TraceRecord {
    /// Unique span id. Shared between the paired enter and exit/error.
    pub id: String,
    /// Qualified operation name, e.g. `UserService.register`.
    pub name: String,
    #[serde(rename = "type")]
    pub record_type: RecordType,
    /// Sanitized argument snapshot.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub args: Option<Value>,
    /// Sanitized return-value snapshot, only on `exit`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    /// Only on `error`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorInfo>,
    /// Wall-clock milliseconds between the paired enter and exit/error.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<f64>,
    /// Wall-clock milliseconds at the event.
    pub timestamp: f64,
    /// Depth at which this operation executed. Roots are 0.
    pub depth: u32,
    /// Id of the enclosing operation, absent for roots.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
    /// Id of the root of this call tree.
    pub trace_id: String,
    /// Request-scoped identifier shared by every span of one logical
    /// request, even across async-context boundaries that lose `parent_id`.
    pub correlation_id: String,
}

impl TraceRecord {
    pub fn is_root(&self) -> bool {
        self.depth == 0
    }
}
