// Copyright 2021-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{LazyLock, Mutex};
use taist_common::config::{Config, DEFAULT_MAX_DEPTH};

static ENABLED: AtomicBool = AtomicBool::new(true);
static MAX_DEPTH: AtomicU32 = AtomicU32::new(DEFAULT_MAX_DEPTH);

/// Short method names the wrapper skips, regardless of qualification.
static EXCLUDED: LazyLock<Mutex<HashSet<String>>> = LazyLock::new(|| Mutex::new(HashSet::new()));

pub fn init_from_config(config: &Config) {
    set_enabled(config.enabled);
    set_max_depth(config.max_depth);
}

pub fn set_enabled(enabled: bool) {
    ENABLED.store(enabled, Ordering::Relaxed);
}

pub fn is_enabled() -> bool {
    ENABLED.load(Ordering::Relaxed)
}

pub fn set_max_depth(depth: u32) {
    MAX_DEPTH.store(depth, Ordering::Relaxed);
}

pub fn max_depth() -> u32 {
    MAX_DEPTH.load(Ordering::Relaxed)
}

pub fn set_excluded_functions(names: impl IntoIterator<Item = String>) {
    let mut excluded = lock_excluded();
    excluded.clear();
    excluded.extend(names);
}

/// Matches on the short name: the segment after the last `.`.
pub(crate) fn is_excluded(qualified: &str) -> bool {
    let excluded = lock_excluded();
    if excluded.is_empty() {
        return false;
    }
    let short = qualified.rsplit('.').next().unwrap_or(qualified);
    excluded.contains(short)
}

fn lock_excluded() -> std::sync::MutexGuard<'static, HashSet<String>> {
    EXCLUDED
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exclusion_matches_the_short_name() {
        set_excluded_functions(["ping".to_string()]);
        assert!(is_excluded("HealthService.ping"));
        assert!(is_excluded("ping"));
        assert!(!is_excluded("HealthService.check"));
        set_excluded_functions([]);
        assert!(!is_excluded("HealthService.ping"));
    }
}
