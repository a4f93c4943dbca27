// Copyright 2021-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use crate::bundle::ReportBundle;
use crate::clean::{truncate, MAX_VALUE_CHARS};
use crate::ToonOptions;
use std::fmt::Write;
use taist_common::RecordType;

/// One line per record, no grouping. Meant for log-style consumption.
pub(crate) fn render_compact(bundle: &ReportBundle, options: &ToonOptions) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "tests {}/{} failed:{} skipped:{}",
        bundle.stats.passed, bundle.stats.total, bundle.stats.failed, bundle.stats.skipped
    );
    for failure in &bundle.failures {
        let _ = writeln!(
            out,
            "fail {} @{}:{}",
            truncate(&failure.test, MAX_VALUE_CHARS),
            failure.location.path,
            failure.location.line
        );
    }
    for record in &bundle.trace {
        let kind = match record.record_type {
            RecordType::Enter => "enter",
            RecordType::Exit => "exit",
            RecordType::Error => "error",
            RecordType::Event => "event",
        };
        let mut line = format!(
            "{kind} {} trace:{} d:{}",
            record.name, record.trace_id, record.depth
        );
        if let Some(duration) = record.duration {
            let _ = write!(line, " ms:{duration:.1}");
        }
        if let Some(error) = &record.error {
            let _ = write!(line, " err:{}", error.name);
        }
        if record.duration.unwrap_or(0.0) >= options.slow_threshold_ms {
            line.push_str(" SLOW");
        }
        let _ = writeln!(out, "{line}");
    }
    out
}
