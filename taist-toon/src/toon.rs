// Copyright 2021-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use crate::bundle::ReportBundle;
use crate::clean::{abbreviate_path, abbreviate_words, clean_error_text, truncate, MAX_VALUE_CHARS};
use crate::ToonOptions;
use serde_json::Value;
use std::collections::HashMap;
use std::fmt::Write;
use taist_common::{RecordType, TraceRecord};

pub(crate) fn render_toon(bundle: &ReportBundle, options: &ToonOptions) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "===TESTS: {}/{}===", bundle.stats.passed, bundle.stats.total);

    if !bundle.failures.is_empty() {
        out.push_str("FAILURES:\n");
        for failure in &bundle.failures {
            let _ = writeln!(out, "✗ {}", truncate(&failure.test, MAX_VALUE_CHARS));
            let location = abbreviate_path(&failure.location.path);
            match failure.location.col {
                Some(col) => {
                    let _ = writeln!(out, "  @{location}:{}:{col}", failure.location.line);
                }
                None => {
                    let _ = writeln!(out, "  @{location}:{}", failure.location.line);
                }
            }
            let mut error = clean_error_text(&failure.error);
            if options.abbreviate {
                error = abbreviate_words(&error);
            }
            let _ = writeln!(out, "  {error}");
            if let Some(expected) = &failure.expected {
                let _ = writeln!(out, "  exp: {}", format_value(expected));
            }
            if let Some(got) = &failure.got {
                let _ = writeln!(out, "  got: {}", format_value(got));
            }
        }
    }

    if !bundle.trace.is_empty() {
        render_trace_section(&mut out, &bundle.trace, options);
    }

    if let Some(coverage) = &bundle.coverage {
        let _ = writeln!(
            out,
            "COV: {:.0}% ({}/{})",
            coverage.percent, coverage.covered, coverage.total
        );
    }
    out
}

fn render_trace_section(out: &mut String, trace: &[TraceRecord], options: &ToonOptions) {
    out.push_str("TRACE:\n");

    // Args live on the enter record; the rendered line is the settled one.
    let args_by_id: HashMap<&str, &Value> = trace
        .iter()
        .filter(|r| r.record_type == RecordType::Enter)
        .filter_map(|r| r.args.as_ref().map(|args| (r.id.as_str(), args)))
        .collect();

    // Groups keep first-appearance order, which is stable for identical
    // inputs; records within a group are ordered by timestamp.
    let mut order: Vec<&str> = vec![];
    let mut groups: HashMap<&str, Vec<&TraceRecord>> = HashMap::new();
    for record in trace {
        let group = groups.entry(record.trace_id.as_str()).or_insert_with(|| {
            order.push(record.trace_id.as_str());
            vec![]
        });
        group.push(record);
    }

    for trace_id in order.iter().take(options.max_trace_groups) {
        let mut records = groups.remove(trace_id).unwrap_or_default();
        records.sort_by(|a, b| {
            a.timestamp
                .partial_cmp(&b.timestamp)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        let root_name = records
            .iter()
            .find(|r| r.depth == 0)
            .or(records.first())
            .map(|r| r.name.as_str())
            .unwrap_or("?");
        let _ = writeln!(out, "--- {root_name} ---");

        for record in records {
            match record.record_type {
                RecordType::Enter => continue,
                RecordType::Event => {
                    let indent = "  ".repeat(record.depth as usize);
                    let mut line = format!("{indent}ev:{}", record.name);
                    if let Some(args) = &record.args {
                        let _ = write!(line, " args:{}", format_value(args));
                    }
                    let _ = writeln!(out, "{line}");
                }
                RecordType::Exit | RecordType::Error => {
                    let indent = "  ".repeat(record.depth as usize);
                    let mut line = format!("{indent}fn:{}", record.name);
                    if let Some(duration) = record.duration {
                        let _ = write!(line, " ms:{}", format_ms(duration));
                    }
                    if let Some(args) = args_by_id.get(record.id.as_str()) {
                        let _ = write!(line, " args:{}", format_value(args));
                    }
                    if let Some(result) = &record.result {
                        let _ = write!(line, " ret:{}", format_value(result));
                    }
                    if let Some(error) = &record.error {
                        let _ = write!(line, " err:{}: {}", error.name, error.message);
                    }
                    if record.duration.unwrap_or(0.0) >= options.slow_threshold_ms {
                        line.push_str(" SLOW");
                    }
                    let _ = writeln!(out, "{line}");
                }
            }
        }
    }

    let hidden = order.len().saturating_sub(options.max_trace_groups);
    if hidden > 0 {
        let _ = writeln!(out, "… and {hidden} more requests");
    }
}

fn format_value(value: &Value) -> String {
    let compact = serde_json::to_string(value).unwrap_or_else(|_| "?".to_string());
    truncate(&compact, MAX_VALUE_CHARS)
}

fn format_ms(ms: f64) -> String {
    if (ms - ms.round()).abs() < 0.05 {
        format!("{}", ms.round() as i64)
    } else {
        format!("{ms:.1}")
    }
}
