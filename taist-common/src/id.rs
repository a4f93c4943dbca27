// Copyright 2021-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::LazyLock;
use std::time::{SystemTime, UNIX_EPOCH};

static COUNTER: AtomicU64 = AtomicU64::new(0);

static PROCESS_START_MILLIS: LazyLock<u64> = LazyLock::new(|| {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
});

/// Returns a short process-unique identifier.
///
/// Monotonic counter concatenated with the process start time; unique for
/// the lifetime of the process and cheap enough for per-call allocation.
pub fn next_id() -> String {
    let n = COUNTER.fetch_add(1, Ordering::Relaxed) + 1;
    format!("{:x}-{:x}", *PROCESS_START_MILLIS, n)
}

/// Returns a fresh request-scoped correlation identifier.
pub fn next_correlation_id() -> String {
    format!("req-{}", next_id())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::thread;

    #[test]
    fn ids_are_unique_across_threads() {
        let handles: Vec<_> = (0..8)
            .map(|_| thread::spawn(|| (0..1000).map(|_| next_id()).collect::<Vec<_>>()))
            .collect();
        let mut seen = HashSet::new();
        for handle in handles {
            for id in handle.join().unwrap() {
                assert!(seen.insert(id));
            }
        }
    }

    #[test]
    fn correlation_ids_are_prefixed() {
        assert!(next_correlation_id().starts_with("req-"));
    }
}
