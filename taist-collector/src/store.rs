// Copyright 2021-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::collections::{HashSet, VecDeque};
use taist_common::{RecordType, TraceRecord};

/// Identity under which duplicate deliveries are detected. Retried batches
/// may replay records, so the first write wins; records arriving without
/// an id fall back to a synthetic identity.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum DedupeKey {
    Id(String),
    Synthetic {
        name: String,
        timestamp_bits: u64,
        record_type: RecordType,
    },
}

impl DedupeKey {
    fn of(record: &TraceRecord) -> DedupeKey {
        if record.id.is_empty() {
            DedupeKey::Synthetic {
                name: record.name.clone(),
                timestamp_bits: record.timestamp.to_bits(),
                record_type: record.record_type,
            }
        } else {
            DedupeKey::Id(record.id.clone())
        }
    }
}

/// Bounded FIFO of accepted records plus the dedupe set covering exactly
/// the records still buffered. Evicting a record also evicts its identity,
/// so a later duplicate of an evicted record is admitted again.
#[derive(Debug)]
pub struct TraceStore {
    max_traces: usize,
    buffer: VecDeque<TraceRecord>,
    seen: HashSet<DedupeKey>,
}

impl TraceStore {
    pub fn new(max_traces: usize) -> Self {
        Self {
            max_traces,
            buffer: VecDeque::new(),
            seen: HashSet::new(),
        }
    }

    /// Inserts unless a duplicate; returns whether the record was stored.
    pub fn insert(&mut self, record: TraceRecord) -> bool {
        let key = DedupeKey::of(&record);
        if !self.seen.insert(key) {
            return false;
        }
        if self.buffer.len() == self.max_traces {
            if let Some(evicted) = self.buffer.pop_front() {
                self.seen.remove(&DedupeKey::of(&evicted));
            }
        }
        self.buffer.push_back(record);
        true
    }

    pub fn snapshot(&self) -> Vec<TraceRecord> {
        self.buffer.iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    pub fn clear(&mut self) {
        self.buffer.clear();
        self.seen.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(id: &str, name: &str) -> TraceRecord {
        TraceRecord {
            id: id.into(),
            name: name.into(),
            record_type: RecordType::Enter,
            args: None,
            result: None,
            error: None,
            duration: None,
            timestamp: 10.0,
            depth: 0,
            parent_id: None,
            trace_id: id.into(),
            correlation_id: "req-1".into(),
        }
    }

    #[test]
    fn duplicate_ids_store_once_first_write_wins() {
        let mut store = TraceStore::new(16);
        assert!(store.insert(record("a", "first")));
        let mut conflicting = record("a", "second");
        conflicting.depth = 9;
        assert!(!store.insert(conflicting));
        assert_eq!(store.len(), 1);
        assert_eq!(store.snapshot()[0].name, "first");
    }

    #[test]
    fn missing_ids_dedupe_on_name_timestamp_type() {
        let mut store = TraceStore::new(16);
        assert!(store.insert(record("", "anon")));
        assert!(!store.insert(record("", "anon")));
        let mut other_type = record("", "anon");
        other_type.record_type = RecordType::Exit;
        assert!(store.insert(other_type));
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn eviction_is_fifo_and_frees_the_dedupe_slot() {
        let mut store = TraceStore::new(3);
        for n in 0..5 {
            assert!(store.insert(record(&format!("r{n}"), "op")));
        }
        let ids: Vec<_> = store.snapshot().iter().map(|r| r.id.clone()).collect();
        assert_eq!(ids, vec!["r2", "r3", "r4"]);
        // r0 was evicted, so its id may be admitted again.
        assert!(store.insert(record("r0", "op")));
        assert_eq!(store.len(), 3);
    }

    #[test]
    fn clear_resets_both_buffer_and_dedupe() {
        let mut store = TraceStore::new(4);
        store.insert(record("a", "op"));
        store.clear();
        assert!(store.is_empty());
        assert!(store.insert(record("a", "op")));
    }
}
