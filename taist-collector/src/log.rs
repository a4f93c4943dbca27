// Copyright 2021-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use taist_common::config::FromEnv;
use tracing_subscriber::EnvFilter;

/// Installs the global fmt subscriber, filtered by `TAIST_LOG` (defaulting
/// to `info`). Call once from the driver process.
pub fn enable_logging() -> anyhow::Result<()> {
    let filter =
        EnvFilter::try_new(FromEnv::log_level()).unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .try_init()
        .map_err(|e| anyhow::anyhow!("failed to install subscriber: {e}"))
}
