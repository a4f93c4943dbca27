// Copyright 2021-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

pub mod capture;
pub mod config;
pub mod filter;
pub mod id;
pub mod record;
pub mod time;

pub use record::{ErrorInfo, RecordType, TraceRecord};
