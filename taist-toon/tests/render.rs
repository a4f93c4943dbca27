// Copyright 2021-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use pretty_assertions::assert_eq;
use serde_json::json;
use taist_common::config::OutputFormat;
use taist_common::{ErrorInfo, RecordType, TraceRecord};
use taist_toon::{
    render, Coverage, ReportBundle, SourceLocation, TestFailure, TestStats, ToonOptions,
};

fn span(
    id: &str,
    trace: &str,
    name: &str,
    record_type: RecordType,
    depth: u32,
    timestamp: f64,
) -> TraceRecord {
    TraceRecord {
        id: id.into(),
        name: name.into(),
        record_type,
        args: None,
        result: None,
        error: None,
        duration: match record_type {
            RecordType::Exit | RecordType::Error => Some(2.0),
            _ => None,
        },
        timestamp,
        depth,
        parent_id: None,
        trace_id: trace.into(),
        correlation_id: format!("req-{trace}"),
    }
}

fn sample_bundle() -> ReportBundle {
    let mut enter = span("s1", "t1", "Route.POST /users", RecordType::Enter, 0, 1.0);
    enter.args = Some(json!([{"name": "A"}]));
    let mut exit = span("s1", "t1", "Route.POST /users", RecordType::Exit, 0, 9.0);
    exit.result = Some(json!({"status": 201}));
    let svc_enter = span("s2", "t1", "UserService.register", RecordType::Enter, 1, 2.0);
    let mut svc_exit = span("s2", "t1", "UserService.register", RecordType::Exit, 1, 3.0);
    svc_exit.result = Some(json!({"id": 7}));

    ReportBundle {
        stats: TestStats {
            total: 10,
            passed: 8,
            failed: 1,
            skipped: 1,
        },
        failures: vec![TestFailure {
            test: "registering a duplicate user fails".into(),
            location: SourceLocation {
                path: "/home/ci/app/src/service/user.rs".into(),
                line: 42,
                col: Some(9),
            },
            error: "\u{1b}[31mexpected error, got success\u{1b}[0m".into(),
            expected: Some(json!({"err": "duplicate"})),
            got: Some(json!({"id": 7})),
            stack: Some(vec![
                "user_service::register".into(),
                "routes::handle".into(),
            ]),
        }],
        trace: vec![enter, svc_enter, svc_exit, exit],
        coverage: Some(Coverage {
            percent: 85.0,
            covered: 17,
            total: 20,
        }),
    }
}

#[test]
fn toon_renders_every_section() {
    let text = render(OutputFormat::Toon, &sample_bundle(), &ToonOptions::default());

    assert!(text.starts_with("===TESTS: 8/10===\n"));
    assert!(text.contains("FAILURES:\n✗ registering a duplicate user fails"));
    assert!(text.contains("  @src/service/user.rs:42:9"));
    assert!(text.contains("  exp error, got success"), "ANSI stripped and words abbreviated: {text}");
    assert!(text.contains("  exp: {\"err\":\"duplicate\"}"));
    assert!(text.contains("  got: {\"id\":7}"));
    assert!(text.contains("TRACE:\n--- Route.POST /users ---\n"));
    assert!(text.contains("  fn:UserService.register ms:2 ret:{\"id\":7}"));
    assert!(text.contains("\nfn:Route.POST /users ms:2 args:[{\"name\":\"A\"}] ret:{\"status\":201}"));
    assert!(text.ends_with("COV: 85% (17/20)\n"));
}

#[test]
fn toon_output_is_deterministic() {
    let bundle = sample_bundle();
    let options = ToonOptions::default();
    assert_eq!(
        render(OutputFormat::Toon, &bundle, &options),
        render(OutputFormat::Toon, &bundle, &options)
    );
}

#[test]
fn slow_spans_are_tagged() {
    let mut bundle = ReportBundle::from_traces(vec![{
        let mut exit = span("s1", "t1", "Db.query", RecordType::Exit, 0, 1.0);
        exit.duration = Some(250.0);
        exit
    }]);
    bundle.stats = TestStats::default();
    let text = render(OutputFormat::Toon, &bundle, &ToonOptions::default());
    assert!(text.contains("fn:Db.query ms:250 SLOW"));
}

#[test]
fn error_spans_render_the_error_payload() {
    let mut error = span("s1", "t1", "UserService.register", RecordType::Error, 0, 1.0);
    error.error = Some(ErrorInfo::new("ValidationError", "bad input"));
    let bundle = ReportBundle::from_traces(vec![error]);
    let text = render(OutputFormat::Toon, &bundle, &ToonOptions::default());
    assert!(text.contains("fn:UserService.register ms:2 err:ValidationError: bad input"));
}

#[test]
fn groups_beyond_the_cap_are_summarized() {
    let trace: Vec<_> = (0..12)
        .map(|n| span(&format!("s{n}"), &format!("t{n}"), "Route.GET /x", RecordType::Exit, 0, n as f64))
        .collect();
    let bundle = ReportBundle::from_traces(trace);
    let text = render(OutputFormat::Toon, &bundle, &ToonOptions::default());
    assert_eq!(text.matches("--- Route.GET /x ---").count(), 10);
    assert!(text.contains("… and 2 more requests"));
}

#[test]
fn events_render_inside_their_group() {
    let mut event = span("s2", "t1", "cache.miss", RecordType::Event, 1, 2.0);
    event.args = Some(json!({"key": "user:1"}));
    let bundle = ReportBundle::from_traces(vec![
        span("s1", "t1", "Route.GET /users", RecordType::Exit, 0, 3.0),
        event,
    ]);
    let text = render(OutputFormat::Toon, &bundle, &ToonOptions::default());
    assert!(text.contains("  ev:cache.miss args:{\"key\":\"user:1\"}"));
}

#[test]
fn json_renderer_roundtrips() {
    let bundle = sample_bundle();
    let text = render(OutputFormat::Json, &bundle, &ToonOptions::default());
    let parsed: ReportBundle = serde_json::from_str(&text).unwrap();
    assert_eq!(parsed.stats, bundle.stats);
    assert_eq!(parsed.trace.len(), bundle.trace.len());
    assert_eq!(
        parsed.failures[0].stack, bundle.failures[0].stack,
        "failure stacks survive the json renderer"
    );
}

#[test]
fn compact_renderer_emits_one_line_per_record() {
    let bundle = sample_bundle();
    let text = render(OutputFormat::Compact, &bundle, &ToonOptions::default());
    let lines: Vec<_> = text.lines().collect();
    // stats + 1 failure + 4 records
    assert_eq!(lines.len(), 6);
    assert_eq!(lines[0], "tests 8/10 failed:1 skipped:1");
    assert!(lines[2].starts_with("enter Route.POST /users trace:t1 d:0"));
}

#[test]
fn long_values_are_truncated_in_trace_lines() {
    let mut exit = span("s1", "t1", "Blob.store", RecordType::Exit, 0, 1.0);
    exit.result = Some(json!("x".repeat(120)));
    let bundle = ReportBundle::from_traces(vec![exit]);
    let text = render(OutputFormat::Toon, &bundle, &ToonOptions::default());
    let ret_line = text.lines().find(|l| l.contains("ret:")).unwrap();
    assert!(ret_line.contains('…'));
    assert!(ret_line.len() < 120);
}
