// Copyright 2021-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use serde::{Deserialize, Serialize};
use taist_common::TraceRecord;

/// One NDJSON wire message. Client→server carries `trace`, `batch` and the
/// advisory `flush`; the reverse direction carries only `shutdown`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum WireMessage {
    Trace {
        data: TraceRecord,
    },
    Batch {
        #[serde(rename = "workerId")]
        worker_id: String,
        data: Vec<TraceRecord>,
    },
    Flush {
        #[serde(rename = "workerId")]
        worker_id: String,
    },
    Shutdown,
}

impl WireMessage {
    /// Serializes to one newline-terminated NDJSON line.
    pub fn encode(&self) -> serde_json::Result<Vec<u8>> {
        let mut line = serde_json::to_vec(self)?;
        line.push(b'\n');
        Ok(line)
    }

    /// Parses one complete line (without requiring the terminator).
    pub fn decode(line: &str) -> serde_json::Result<Self> {
        serde_json::from_str(line)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use taist_common::RecordType;

    fn record(id: &str) -> TraceRecord {
        TraceRecord {
            id: id.into(),
            name: "Calc.add".into(),
            record_type: RecordType::Enter,
            args: None,
            result: None,
            error: None,
            duration: None,
            timestamp: 10.0,
            depth: 0,
            parent_id: None,
            trace_id: id.into(),
            correlation_id: format!("req-{id}"),
        }
    }

    #[test]
    fn batch_roundtrips_with_tagged_type() {
        let msg = WireMessage::Batch {
            worker_id: "41".into(),
            data: vec![record("a"), record("b")],
        };
        let line = msg.encode().unwrap();
        assert_eq!(*line.last().unwrap(), b'\n');
        let text = std::str::from_utf8(&line).unwrap();
        assert!(text.starts_with(r#"{"type":"batch","workerId":"41""#));
        assert_eq!(WireMessage::decode(text.trim_end()).unwrap(), msg);
    }

    #[test]
    fn shutdown_is_the_bare_tag() {
        let line = WireMessage::Shutdown.encode().unwrap();
        assert_eq!(std::str::from_utf8(&line).unwrap(), "{\"type\":\"shutdown\"}\n");
    }

    #[test]
    fn unknown_tag_fails_to_decode() {
        assert!(WireMessage::decode(r#"{"type":"gossip"}"#).is_err());
    }
}
