// Copyright 2021-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

/// Process-wide correlation slot, used only when scoped propagation cannot
/// reach a downstream framework's executor.
///
/// Writes are intentionally racy: the slot is a single word of shared
/// state, safe only while one request at a time mutates it. Entry adapters
/// must set it from the scoped frame and clear it on response completion;
/// everything else should treat it as read-only.
pub mod fallback_correlation {
    use std::sync::Mutex;

    static SLOT: Mutex<Option<String>> = Mutex::new(None);

    fn slot() -> std::sync::MutexGuard<'static, Option<String>> {
        SLOT.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn get() -> Option<String> {
        slot().clone()
    }

    pub fn set(id: impl Into<String>) {
        *slot() = Some(id.into());
    }

    pub fn clear() {
        *slot() = None;
    }
}
