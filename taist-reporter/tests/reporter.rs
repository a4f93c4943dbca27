// Copyright 2021-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

#![cfg(unix)]

use std::time::Duration;
use taist_common::{RecordType, TraceRecord};
use taist_ipc::WireMessage;
use taist_reporter::{Reporter, ReporterConfig};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{UnixListener, UnixStream};
use tokio::time::timeout;

fn record(n: u32) -> TraceRecord {
    TraceRecord {
        id: format!("id-{n}"),
        name: "Calc.add".into(),
        record_type: RecordType::Enter,
        args: None,
        result: None,
        error: None,
        duration: None,
        timestamp: n as f64,
        depth: 0,
        parent_id: None,
        trace_id: format!("id-{n}"),
        correlation_id: format!("req-{n}"),
    }
}

async fn read_message(reader: &mut BufReader<impl tokio::io::AsyncRead + Unpin>) -> WireMessage {
    let mut line = String::new();
    timeout(Duration::from_secs(2), reader.read_line(&mut line))
        .await
        .expect("timed out waiting for a frame")
        .unwrap();
    WireMessage::decode(line.trim()).unwrap()
}

fn batch_records(message: WireMessage) -> Vec<TraceRecord> {
    match message {
        WireMessage::Batch { data, .. } => data,
        other => panic!("expected batch, got {other:?}"),
    }
}

async fn accept(listener: &UnixListener) -> BufReader<UnixStream> {
    let (stream, _) = timeout(Duration::from_secs(2), listener.accept())
        .await
        .expect("timed out waiting for the reporter to connect")
        .unwrap();
    BufReader::new(stream)
}

#[tokio::test]
async fn flush_ships_one_batch_frame_in_order() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("collector.sock");
    let listener = UnixListener::bind(&path).unwrap();

    let reporter = Reporter::start(ReporterConfig::new(&path));
    for n in 0..3 {
        reporter.enqueue(record(n));
    }
    assert_eq!(reporter.queued(), 3);

    reporter.flush_now().await;
    let mut reader = accept(&listener).await;
    let records = batch_records(read_message(&mut reader).await);
    let ids: Vec<_> = records.iter().map(|r| r.id.clone()).collect();
    assert_eq!(ids, vec!["id-0", "id-1", "id-2"]);
    assert_eq!(reporter.queued(), 0);
}

#[tokio::test]
async fn reaching_the_threshold_flushes_without_being_asked() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("collector.sock");
    let listener = UnixListener::bind(&path).unwrap();

    let mut config = ReporterConfig::new(&path);
    config.flush_threshold = 5;
    config.flush_interval = Duration::from_secs(60);
    let reporter = Reporter::start(config);
    for n in 0..5 {
        reporter.enqueue(record(n));
    }

    let mut reader = accept(&listener).await;
    let records = batch_records(read_message(&mut reader).await);
    assert_eq!(records.len(), 5);
}

#[tokio::test]
async fn connect_failure_keeps_records_queued_until_a_collector_appears() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("collector.sock");

    let mut config = ReporterConfig::new(&path);
    config.flush_interval = Duration::from_secs(60);
    let reporter = Reporter::start(config);
    reporter.enqueue(record(1));
    reporter.flush_now().await;
    assert_eq!(reporter.queued(), 1, "records survive a failed connect");

    let listener = UnixListener::bind(&path).unwrap();
    reporter.flush_now().await;
    let mut reader = accept(&listener).await;
    let records = batch_records(read_message(&mut reader).await);
    assert_eq!(records[0].id, "id-1");
    assert_eq!(reporter.queued(), 0);
}

#[tokio::test]
async fn shutdown_frame_triggers_final_batch_flush_and_fin() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("collector.sock");
    let listener = UnixListener::bind(&path).unwrap();

    let reporter = Reporter::start(ReporterConfig::new(&path));
    reporter.enqueue(record(1));
    reporter.flush_now().await;
    let mut reader = accept(&listener).await;
    batch_records(read_message(&mut reader).await);

    // Records still pending when the collector asks everyone to drain.
    reporter.enqueue(record(2));
    let frame = WireMessage::Shutdown.encode().unwrap();
    reader.get_mut().write_all(&frame).await.unwrap();

    let final_batch = batch_records(read_message(&mut reader).await);
    assert_eq!(final_batch[0].id, "id-2");
    let advisory = read_message(&mut reader).await;
    assert!(matches!(advisory, WireMessage::Flush { .. }));

    // The client half-closed: our next read observes EOF.
    let mut line = String::new();
    let n = timeout(Duration::from_secs(2), reader.read_line(&mut line))
        .await
        .expect("timed out waiting for FIN")
        .unwrap();
    assert_eq!(n, 0);
}

#[tokio::test]
async fn blocking_final_flush_delivers_the_outbox() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("collector.sock");
    let listener = UnixListener::bind(&path).unwrap();

    let mut config = ReporterConfig::new(&path);
    config.flush_interval = Duration::from_secs(60);
    let reporter = Reporter::start(config);
    reporter.enqueue(record(7));

    let flusher = reporter.clone();
    let handle = tokio::task::spawn_blocking(move || flusher.final_flush_blocking());
    let mut reader = accept(&listener).await;
    let records = batch_records(read_message(&mut reader).await);
    assert_eq!(records[0].id, "id-7");
    handle.await.unwrap();

    // The drain guard makes a second pass a no-op.
    reporter.enqueue(record(8));
    reporter.shutdown().await;
    assert_eq!(reporter.queued(), 1);
}
