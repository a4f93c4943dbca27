// Copyright 2021-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use crate::server::Collector;
use taist_common::config::Config;
use taist_toon::{render, ReportBundle, ToonOptions};
use tokio::task::JoinHandle;
use tracing::warn;

fn options_from(config: &Config) -> ToonOptions {
    ToonOptions {
        slow_threshold_ms: config.slow_threshold_ms,
        ..ToonOptions::default()
    }
}

/// Renders the current buffer once, to the configured file or stdout.
pub fn write_report(collector: &Collector, config: &Config) -> anyhow::Result<()> {
    let bundle = ReportBundle::from_traces(collector.get_traces());
    let text = render(config.format, &bundle, &options_from(config));
    match &config.output_file {
        Some(path) => std::fs::write(path, text)?,
        None => println!("{text}"),
    }
    Ok(())
}

/// Spawns the periodic summary task when an output interval is configured.
/// The task re-renders on every tick, renders one last time when the
/// collector stops, and returns the handle for callers that want to await
/// it.
pub fn spawn_output_stage(collector: &Collector, config: &Config) -> Option<JoinHandle<()>> {
    let interval = config.output_interval?;
    let collector = collector.clone();
    let config = config.clone();
    let stopped = collector.stop_token();
    Some(tokio::spawn(async move {
        let mut tick = tokio::time::interval(interval);
        tick.tick().await; // the first tick completes immediately
        loop {
            tokio::select! {
                _ = stopped.cancelled() => break,
                _ = tick.tick() => {
                    if let Err(e) = write_report(&collector, &config) {
                        warn!("periodic report failed: {e}");
                    }
                }
            }
        }
        if let Err(e) = write_report(&collector, &config) {
            warn!("final report failed: {e}");
        }
    }))
}
