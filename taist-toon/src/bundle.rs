// Copyright 2021-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use serde::{Deserialize, Serialize};
use serde_json::Value;
use taist_common::TraceRecord;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestStats {
    pub total: u32,
    pub passed: u32,
    pub failed: u32,
    pub skipped: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceLocation {
    pub path: String,
    pub line: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub col: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestFailure {
    pub test: String,
    pub location: SourceLocation,
    pub error: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expected: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub got: Option<Value>,
    /// Failure stack, when the runner supplied one. The TOON renderer
    /// omits it to stay within its token target; `json` carries it
    /// verbatim.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stack: Option<Vec<String>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coverage {
    pub percent: f64,
    pub covered: u32,
    pub total: u32,
}

/// Everything a report is rendered from: test outcomes, failures with
/// their diffs, the collected trace, and optional coverage.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReportBundle {
    pub stats: TestStats,
    #[serde(default)]
    pub failures: Vec<TestFailure>,
    #[serde(default)]
    pub trace: Vec<TraceRecord>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub coverage: Option<Coverage>,
}

impl ReportBundle {
    /// A trace-only bundle, as rendered by the collector's output stage.
    pub fn from_traces(trace: Vec<TraceRecord>) -> Self {
        Self {
            trace,
            ..Self::default()
        }
    }
}
