// Copyright 2021-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::path::PathBuf;
use taist_common::TraceRecord;
use tokio::sync::broadcast;

/// Collector lifecycle and ingest notifications, fanned out over a
/// broadcast channel. Slow subscribers lose old events rather than
/// back-pressuring the ingest path.
#[derive(Debug, Clone)]
pub enum CollectorEvent {
    Started { socket_path: PathBuf },
    Stopped,
    /// A record passed dedupe and the filter and entered the buffer.
    Trace(Box<TraceRecord>),
    /// A client sent an advisory flush frame.
    Flush { worker_id: String },
    Error { message: String },
    ConnectionError { message: String },
    ParseError { message: String },
}

const EVENT_CAPACITY: usize = 256;

#[derive(Debug)]
pub(crate) struct EventBus {
    sender: broadcast::Sender<CollectorEvent>,
}

impl EventBus {
    pub(crate) fn new() -> Self {
        let (sender, _) = broadcast::channel(EVENT_CAPACITY);
        Self { sender }
    }

    pub(crate) fn subscribe(&self) -> broadcast::Receiver<CollectorEvent> {
        self.sender.subscribe()
    }

    /// Lossy on purpose: no subscribers is not an error.
    pub(crate) fn emit(&self, event: CollectorEvent) {
        let _ = self.sender.send(event);
    }
}
