// Copyright 2021-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Report rendering.
//!
//! The TOON renderer targets a small fraction of the token footprint of a
//! conventional test-runner report: abbreviated values, compressed paths,
//! two-space depth indentation, and hard caps on group counts. The `json`
//! and `compact` renderers share the same input bundle. Output is stable
//! across runs for identical inputs.

mod bundle;
mod clean;
mod compact;
mod toon;

use taist_common::config::OutputFormat;

pub use bundle::{Coverage, ReportBundle, SourceLocation, TestFailure, TestStats};
pub use clean::{abbreviate_path, abbreviate_words, clean_error_text, truncate};

/// Renderer knobs; the defaults match the driver's.
#[derive(Debug, Clone)]
pub struct ToonOptions {
    /// Apply the value-abbreviation dictionary.
    pub abbreviate: bool,
    /// Trace groups rendered before the remainder is summarized.
    pub max_trace_groups: usize,
    /// Spans at or above this duration carry a `SLOW` tag.
    pub slow_threshold_ms: f64,
}

impl Default for ToonOptions {
    fn default() -> Self {
        Self {
            abbreviate: true,
            max_trace_groups: 10,
            slow_threshold_ms: 100.0,
        }
    }
}

/// Renders a results bundle with the selected renderer.
pub fn render(format: OutputFormat, bundle: &ReportBundle, options: &ToonOptions) -> String {
    match format {
        OutputFormat::Toon => toon::render_toon(bundle, options),
        OutputFormat::Json => {
            serde_json::to_string_pretty(bundle).unwrap_or_else(|e| format!("{{\"error\":{e:?}}}"))
        }
        OutputFormat::Compact => compact::render_compact(bundle, options),
    }
}
