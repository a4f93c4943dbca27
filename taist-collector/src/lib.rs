// Copyright 2021-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! The server half of the aggregation pipeline.
//!
//! A driver process hosts one [`Collector`] on a Unix domain socket. Each
//! reporter client gets its own read task feeding a shared, bounded,
//! deduplicated buffer; [`Collector::stop`] runs the coordinated drain
//! that gives in-flight outer spans a chance to land before the socket is
//! torn down.

#![cfg(unix)]

mod events;
#[cfg(feature = "tracing-init")]
mod log;
mod output;
mod server;
mod store;

pub use events::CollectorEvent;
#[cfg(feature = "tracing-init")]
pub use log::enable_logging;
pub use output::{spawn_output_stage, write_report};
pub use server::{
    Collector, CollectorConfig, DEFAULT_DRAIN_GRACE, DEFAULT_MAX_CLIENTS, DEFAULT_MAX_TRACES,
};
