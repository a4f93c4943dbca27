// Copyright 2021-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

pub mod msg;
pub mod ndjson;
#[cfg(unix)]
pub mod sockets;

pub use msg::WireMessage;
pub use ndjson::LineBuffer;
