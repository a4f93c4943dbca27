// Copyright 2021-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use crate::events::{CollectorEvent, EventBus};
use crate::store::TraceStore;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use taist_common::filter::NameFilter;
use taist_common::TraceRecord;
use taist_ipc::{sockets, LineBuffer, WireMessage};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::unix::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

pub const DEFAULT_MAX_TRACES: usize = 10_000;
pub const DEFAULT_MAX_CLIENTS: usize = 256;
pub const DEFAULT_DRAIN_GRACE: Duration = Duration::from_millis(500);

#[derive(Debug, Clone)]
pub struct CollectorConfig {
    pub socket_path: PathBuf,
    /// FIFO buffer bound; the oldest records are evicted past it.
    pub max_traces: usize,
    /// Accepted connections past this bound are dropped immediately.
    pub max_clients: usize,
    /// Extra wait for in-flight NDJSON after the half-close step of the
    /// coordinated drain.
    pub drain_grace: Duration,
    pub filter: NameFilter,
}

impl CollectorConfig {
    pub fn new(socket_path: impl Into<PathBuf>) -> Self {
        Self {
            socket_path: socket_path.into(),
            max_traces: DEFAULT_MAX_TRACES,
            max_clients: DEFAULT_MAX_CLIENTS,
            drain_grace: DEFAULT_DRAIN_GRACE,
            filter: NameFilter::default(),
        }
    }
}

struct Connection {
    write: Arc<tokio::sync::Mutex<OwnedWriteHalf>>,
    reader: JoinHandle<()>,
}

struct Inner {
    config: CollectorConfig,
    store: Mutex<TraceStore>,
    events: EventBus,
    connections: Mutex<HashMap<u64, Connection>>,
    next_conn_id: AtomicU64,
    stop_accept: CancellationToken,
    accept_task: Mutex<Option<JoinHandle<()>>>,
    started: AtomicBool,
    stopped: AtomicBool,
}

/// The server half of the aggregation pipeline, hosted by the driver
/// process. Cheap to clone; all clones share one buffer and one listener.
#[derive(Clone)]
pub struct Collector {
    inner: Arc<Inner>,
}

impl Collector {
    pub fn new(config: CollectorConfig) -> Collector {
        let max_traces = config.max_traces;
        Collector {
            inner: Arc::new(Inner {
                store: Mutex::new(TraceStore::new(max_traces)),
                events: EventBus::new(),
                connections: Mutex::new(HashMap::new()),
                next_conn_id: AtomicU64::new(1),
                stop_accept: CancellationToken::new(),
                accept_task: Mutex::new(None),
                started: AtomicBool::new(false),
                stopped: AtomicBool::new(false),
                config,
            }),
        }
    }

    /// Binds the socket (unlinking a stale file first) and starts
    /// accepting clients.
    pub fn start(&self) -> anyhow::Result<()> {
        if self.inner.started.swap(true, Ordering::SeqCst) {
            anyhow::bail!("collector already started");
        }
        let path = &self.inner.config.socket_path;
        sockets::cleanup_stale(path)?;
        let listener = UnixListener::bind(path)?;
        info!("collector listening on {}", path.display());
        self.inner.events.emit(CollectorEvent::Started {
            socket_path: path.clone(),
        });
        let collector = self.clone();
        let task = tokio::spawn(async move { collector.accept_loop(listener).await });
        *lock(&self.inner.accept_task) = Some(task);
        Ok(())
    }

    /// Coordinated drain. Asks every client to flush and close, waits out
    /// half the timeout, half-closes stragglers while still reading them,
    /// grants the grace window, then force-destroys whatever is left.
    /// Bounded by `timeout`; never blocks indefinitely.
    pub async fn stop(&self, timeout: Duration) {
        if !self.inner.started.load(Ordering::SeqCst)
            || self.inner.stopped.swap(true, Ordering::SeqCst)
        {
            return;
        }

        let frame = WireMessage::Shutdown
            .encode()
            .unwrap_or_else(|_| b"{\"type\":\"shutdown\"}\n".to_vec());
        for write in self.write_halves() {
            let mut write = write.lock().await;
            let _ = write.write_all(&frame).await;
        }

        let deadline = tokio::time::Instant::now() + timeout / 2;
        while self.connection_count() > 0 && tokio::time::Instant::now() < deadline {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        if self.connection_count() > 0 {
            // FIN our write side; the clients' pending data can still be
            // read while they finish their own drain.
            for write in self.write_halves() {
                let mut write = write.lock().await;
                let _ = write.shutdown().await;
            }
            let grace = self.inner.config.drain_grace.min(timeout / 2);
            let grace_deadline = tokio::time::Instant::now() + grace;
            while self.connection_count() > 0 && tokio::time::Instant::now() < grace_deadline {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        }

        let stragglers: Vec<Connection> = {
            let mut connections = lock(&self.inner.connections);
            connections.drain().map(|(_, c)| c).collect()
        };
        if !stragglers.is_empty() {
            self.inner.events.emit(CollectorEvent::Error {
                message: format!(
                    "shutdown timeout: force-closing {} connection(s)",
                    stragglers.len()
                ),
            });
            warn!("force-closing {} connection(s) at stop", stragglers.len());
            for connection in &stragglers {
                connection.reader.abort();
            }
        }

        self.inner.stop_accept.cancel();
        let accept_task = lock(&self.inner.accept_task).take();
        if let Some(task) = accept_task {
            let _ = task.await;
        }
        let _ = std::fs::remove_file(&self.inner.config.socket_path);
        self.inner.events.emit(CollectorEvent::Stopped);
        info!("collector stopped");
    }

    /// Snapshot copy of the buffer; callers may iterate without holding
    /// any collector lock.
    pub fn get_traces(&self) -> Vec<TraceRecord> {
        lock(&self.inner.store).snapshot()
    }

    pub fn get_trace_count(&self) -> usize {
        lock(&self.inner.store).len()
    }

    pub fn clear_traces(&self) {
        lock(&self.inner.store).clear();
    }

    pub fn subscribe(&self) -> broadcast::Receiver<CollectorEvent> {
        self.inner.events.subscribe()
    }

    pub fn socket_path(&self) -> &Path {
        &self.inner.config.socket_path
    }

    pub fn connection_count(&self) -> usize {
        lock(&self.inner.connections).len()
    }

    pub(crate) fn stop_token(&self) -> CancellationToken {
        self.inner.stop_accept.clone()
    }

    async fn accept_loop(self, listener: UnixListener) {
        loop {
            tokio::select! {
                _ = self.inner.stop_accept.cancelled() => break,
                accepted = listener.accept() => match accepted {
                    Ok((stream, _)) => self.register_client(stream),
                    Err(e) => {
                        self.inner.events.emit(CollectorEvent::Error {
                            message: format!("accept failed: {e}"),
                        });
                        warn!("accept failed: {e}");
                    }
                }
            }
        }
        // Dropping the listener here closes the socket; the file itself is
        // unlinked by stop().
    }

    fn register_client(&self, stream: UnixStream) {
        let mut connections = lock(&self.inner.connections);
        if connections.len() >= self.inner.config.max_clients {
            self.inner.events.emit(CollectorEvent::ConnectionError {
                message: format!(
                    "client limit of {} reached, dropping connection",
                    self.inner.config.max_clients
                ),
            });
            warn!("client limit reached, dropping connection");
            return;
        }
        let conn_id = self.inner.next_conn_id.fetch_add(1, Ordering::Relaxed);
        let (read, write) = stream.into_split();
        let collector = self.clone();
        let reader = tokio::spawn(async move { collector.read_connection(conn_id, read).await });
        connections.insert(
            conn_id,
            Connection {
                write: Arc::new(tokio::sync::Mutex::new(write)),
                reader,
            },
        );
        debug!("client {conn_id} connected");
    }

    async fn read_connection(&self, conn_id: u64, mut read: OwnedReadHalf) {
        let mut lines = LineBuffer::new();
        let mut buf = [0u8; 8192];
        loop {
            match read.read(&mut buf).await {
                Ok(0) => break,
                Ok(n) => {
                    for line in lines.push(&buf[..n]) {
                        self.dispatch_line(&line);
                    }
                }
                Err(e) => {
                    self.inner.events.emit(CollectorEvent::ConnectionError {
                        message: format!("read failed on client {conn_id}: {e}"),
                    });
                    break;
                }
            }
        }
        // Whatever was in flight when the client closed is one final
        // message.
        if let Some(rest) = lines.drain_remainder() {
            self.dispatch_line(&rest);
        }
        lock(&self.inner.connections).remove(&conn_id);
        debug!("client {conn_id} disconnected");
    }

    fn dispatch_line(&self, line: &str) {
        match WireMessage::decode(line) {
            Ok(WireMessage::Trace { data }) => self.ingest(data),
            Ok(WireMessage::Batch { data, .. }) => {
                for record in data {
                    self.ingest(record);
                }
            }
            Ok(WireMessage::Flush { worker_id }) => {
                debug!("flush advisory from worker {worker_id}");
                self.inner.events.emit(CollectorEvent::Flush { worker_id });
            }
            // Clients never legitimately send this; nothing to do.
            Ok(WireMessage::Shutdown) => {}
            Err(e) => {
                debug!("dropping malformed line: {e}");
                self.inner.events.emit(CollectorEvent::ParseError {
                    message: e.to_string(),
                });
            }
        }
    }

    fn ingest(&self, record: TraceRecord) {
        if !self.inner.config.filter.accepts(&record) {
            return;
        }
        let stored = lock(&self.inner.store).insert(record.clone());
        if stored {
            self.inner.events.emit(CollectorEvent::Trace(Box::new(record)));
        }
    }

    fn write_halves(&self) -> Vec<Arc<tokio::sync::Mutex<OwnedWriteHalf>>> {
        lock(&self.inner.connections)
            .values()
            .map(|c| c.write.clone())
            .collect()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
