// Copyright 2021-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::sync::{Arc, RwLock};
use taist_common::TraceRecord;

/// Destination for emitted records. The reporter client is the production
/// implementation; tests install in-memory sinks.
pub trait TraceSink: Send + Sync {
    fn emit(&self, record: TraceRecord);
}

static SINK: RwLock<Option<Arc<dyn TraceSink>>> = RwLock::new(None);

/// Installs the process-wide sink, replacing any previous one.
pub fn install_sink(sink: Arc<dyn TraceSink>) {
    let mut slot = SINK.write().unwrap_or_else(|poisoned| poisoned.into_inner());
    *slot = Some(sink);
}

/// Hands a record to the installed sink; silently dropped when none is
/// installed. Entry adapters use this directly for the records they
/// compose themselves; instrumented code goes through the `traced*`
/// entry points instead.
pub fn emit_record(record: TraceRecord) {
    let slot = SINK.read().unwrap_or_else(|poisoned| poisoned.into_inner());
    if let Some(sink) = slot.as_ref() {
        sink.emit(record);
    }
}
