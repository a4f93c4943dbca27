// Copyright 2021-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! The client half of the aggregation pipeline, running inside every
//! instrumented process.
//!
//! Records accumulate in an in-memory outbox and ship as NDJSON batch
//! frames over the Unix socket named by `TAIST_COLLECTOR_SOCKET`. A size
//! threshold or a periodic tick triggers the flush; write failures return
//! the batch to the head of the queue for the next attempt, so records are
//! only ever lost when the process dies with the collector unreachable.
//! Transport failures are absorbed and never propagate into user code.

#![cfg(unix)]

use std::collections::VecDeque;
use std::io::Write;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use taist_common::config::FromEnv;
use taist_common::TraceRecord;
use taist_ipc::{LineBuffer, WireMessage};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::unix::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::UnixStream;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

pub const DEFAULT_FLUSH_THRESHOLD: usize = 100;
pub const DEFAULT_FLUSH_INTERVAL: Duration = Duration::from_secs(1);

#[derive(Debug, Clone)]
pub struct ReporterConfig {
    pub socket_path: PathBuf,
    /// Queue length at which a flush is scheduled immediately.
    pub flush_threshold: usize,
    /// Periodic flush cadence for quiet queues.
    pub flush_interval: Duration,
    /// Connect at startup instead of on the first record.
    pub eager_connect: bool,
}

impl ReporterConfig {
    pub fn new(socket_path: impl Into<PathBuf>) -> Self {
        Self {
            socket_path: socket_path.into(),
            flush_threshold: DEFAULT_FLUSH_THRESHOLD,
            flush_interval: DEFAULT_FLUSH_INTERVAL,
            eager_connect: false,
        }
    }

    /// Reads the socket path from the environment the parent handed us.
    pub fn from_env() -> Option<Self> {
        FromEnv::socket_path().map(Self::new)
    }
}

struct Inner {
    config: ReporterConfig,
    worker_id: String,
    queue: Mutex<VecDeque<TraceRecord>>,
    /// Write half of the collector connection. The lock also serializes
    /// connect attempts, so concurrent callers share one pending connect.
    conn: tokio::sync::Mutex<Option<OwnedWriteHalf>>,
    kick: Notify,
    stop: CancellationToken,
    /// Set by whichever drain path wins; the loser becomes a no-op.
    draining: AtomicBool,
}

/// Handle to the per-process reporter. Cheap to clone; all clones share
/// one outbox and one connection.
#[derive(Clone)]
pub struct Reporter {
    inner: Arc<Inner>,
}

impl Reporter {
    /// Creates the reporter and spawns its periodic flusher on the current
    /// tokio runtime.
    pub fn start(config: ReporterConfig) -> Reporter {
        let reporter = Reporter {
            inner: Arc::new(Inner {
                worker_id: std::process::id().to_string(),
                queue: Mutex::new(VecDeque::new()),
                conn: tokio::sync::Mutex::new(None),
                kick: Notify::new(),
                stop: CancellationToken::new(),
                draining: AtomicBool::new(false),
                config,
            }),
        };
        let flusher = reporter.clone();
        tokio::spawn(async move { flusher.run_flusher().await });
        if reporter.inner.config.eager_connect {
            let eager = reporter.clone();
            tokio::spawn(async move {
                let mut conn = eager.inner.conn.lock().await;
                eager.ensure_connected(&mut conn).await;
            });
        }
        reporter
    }

    /// Queues one record. Never blocks on the network.
    pub fn enqueue(&self, record: TraceRecord) {
        let len = {
            let mut queue = self.lock_queue();
            queue.push_back(record);
            queue.len()
        };
        if len >= self.inner.config.flush_threshold {
            self.inner.kick.notify_one();
        }
    }

    pub fn queued(&self) -> usize {
        self.lock_queue().len()
    }

    /// Writes everything queued as one batch frame. Failures requeue.
    pub async fn flush_now(&self) {
        let mut conn = self.inner.conn.lock().await;
        self.flush_locked(&mut conn).await;
    }

    /// The coordinated drain: stop the flusher, write the final batch and
    /// an advisory flush frame, then half-close our side while the
    /// collector may still be reading. Runs at most once; the signal path
    /// and the shutdown-frame path share the guard.
    pub async fn shutdown(&self) {
        if self.inner.draining.swap(true, Ordering::SeqCst) {
            return;
        }
        self.inner.stop.cancel();
        let mut conn = self.inner.conn.lock().await;
        self.flush_locked(&mut conn).await;
        if let Some(write) = conn.as_mut() {
            let advisory = WireMessage::Flush {
                worker_id: self.inner.worker_id.clone(),
            };
            if let Ok(frame) = advisory.encode() {
                let _ = write.write_all(&frame).await;
            }
            if let Err(e) = write.shutdown().await {
                debug!("error half-closing reporter socket: {e}");
            }
        }
        let dropped = self.queued();
        if dropped > 0 {
            warn!("dropping {dropped} unflushed trace records at shutdown");
        }
    }

    /// Best-effort blocking flush for exit paths with no runtime left
    /// (`SIGINT`/`SIGTERM` handlers, about-to-exit hooks). Shares the
    /// drain guard with [`Reporter::shutdown`].
    pub fn final_flush_blocking(&self) {
        if self.inner.draining.swap(true, Ordering::SeqCst) {
            return;
        }
        self.inner.stop.cancel();
        let batch = {
            let mut queue = self.lock_queue();
            queue.drain(..).collect::<Vec<_>>()
        };
        if batch.is_empty() {
            return;
        }
        let message = WireMessage::Batch {
            worker_id: self.inner.worker_id.clone(),
            data: batch,
        };
        let Ok(frame) = message.encode() else { return };
        match std::os::unix::net::UnixStream::connect(&self.inner.config.socket_path) {
            Ok(mut stream) => {
                if let Err(e) = stream.write_all(&frame) {
                    warn!("final flush write failed: {e}");
                }
                let _ = stream.shutdown(std::net::Shutdown::Write);
            }
            Err(e) => warn!("final flush connect failed: {e}"),
        }
    }

    /// Listens for `SIGINT`/`SIGTERM` and drains once either arrives.
    /// The listener is additive; it does not displace the application's
    /// own signal handling.
    pub fn install_exit_hooks(&self) {
        let reporter = self.clone();
        tokio::spawn(async move {
            use tokio::signal::unix::{signal, SignalKind};
            let (Ok(mut int), Ok(mut term)) =
                (signal(SignalKind::interrupt()), signal(SignalKind::terminate()))
            else {
                warn!("failed to install reporter signal hooks");
                return;
            };
            tokio::select! {
                _ = int.recv() => {}
                _ = term.recv() => {}
            }
            reporter.shutdown().await;
        });
    }

    async fn run_flusher(&self) {
        let mut tick = tokio::time::interval(self.inner.config.flush_interval);
        tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        loop {
            tokio::select! {
                _ = self.inner.stop.cancelled() => break,
                _ = tick.tick() => self.flush_now().await,
                _ = self.inner.kick.notified() => self.flush_now().await,
            }
        }
    }

    async fn flush_locked(&self, conn: &mut Option<OwnedWriteHalf>) {
        let batch = {
            let mut queue = self.lock_queue();
            if queue.is_empty() {
                return;
            }
            queue.drain(..).collect::<Vec<_>>()
        };
        let message = WireMessage::Batch {
            worker_id: self.inner.worker_id.clone(),
            data: batch,
        };
        let frame = match message.encode() {
            Ok(frame) => frame,
            Err(e) => {
                warn!("failed to encode trace batch, dropping it: {e}");
                return;
            }
        };
        if !self.ensure_connected(conn).await {
            self.requeue(message);
            return;
        }
        #[allow(clippy::unwrap_used)] // just connected under the same lock
        let write = conn.as_mut().unwrap();
        if let Err(e) = write.write_all(&frame).await {
            warn!("trace batch write failed, requeueing: {e}");
            *conn = None;
            self.requeue(message);
        }
    }

    /// Lazily connects; the caller holds the connection lock, so there is
    /// exactly one attempt in flight at any time.
    ///
    /// Returns a boxed future rather than `async fn` to break the cyclic
    /// type this would otherwise form with `watch_collector` -> `shutdown`
    /// -> `flush_locked`, which calls back into this function.
    fn ensure_connected<'a>(
        &'a self,
        conn: &'a mut Option<OwnedWriteHalf>,
    ) -> std::pin::Pin<Box<dyn std::future::Future<Output = bool> + Send + 'a>> {
        Box::pin(async move {
            if conn.is_some() {
                return true;
            }
            match UnixStream::connect(&self.inner.config.socket_path).await {
                Ok(stream) => {
                    let (read, write) = stream.into_split();
                    *conn = Some(write);
                    let reporter = self.clone();
                    tokio::spawn(async move { reporter.watch_collector(read).await });
                    true
                }
                Err(e) => {
                    debug!("collector not reachable, keeping records queued: {e}");
                    false
                }
            }
        })
    }

    /// Reads the reverse direction for the collector's shutdown frame.
    async fn watch_collector(&self, mut read: OwnedReadHalf) {
        let mut lines = LineBuffer::new();
        let mut buf = [0u8; 1024];
        loop {
            let n = match read.read(&mut buf).await {
                Ok(0) | Err(_) => return,
                Ok(n) => n,
            };
            for line in lines.push(&buf[..n]) {
                if matches!(WireMessage::decode(&line), Ok(WireMessage::Shutdown)) {
                    self.shutdown().await;
                    return;
                }
            }
        }
    }

    fn requeue(&self, message: WireMessage) {
        if let WireMessage::Batch { data, .. } = message {
            let mut queue = self.lock_queue();
            for record in data.into_iter().rev() {
                queue.push_front(record);
            }
        }
    }

    fn lock_queue(&self) -> std::sync::MutexGuard<'_, VecDeque<TraceRecord>> {
        self.inner
            .queue
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl taist_runtime::TraceSink for Reporter {
    fn emit(&self, record: TraceRecord) {
        self.enqueue(record);
    }
}
