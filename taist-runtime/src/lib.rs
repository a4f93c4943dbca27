// Copyright 2021-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! The wrapper runtime called by transformed code.
//!
//! Every instrumented invocation routes through one of the `traced*` entry
//! points, which read the caller's context frame, open a child frame, and
//! emit the enter/exit/error record pair around the wrapped body. Records
//! flow to the installed [`sink::TraceSink`]; when tracing is disabled or
//! the depth cap is reached the entry points are pass-through and touch
//! neither context nor sink.

mod settings;
mod sink;
mod span;
mod tree;
mod wrap;

pub use settings::{init_from_config, is_enabled, max_depth, set_enabled, set_excluded_functions, set_max_depth};
pub use sink::{emit_record, install_sink, TraceSink};
pub use tree::{instrument_tree, HandlerFn, HandlerNode, HandlerTree};
pub use wrap::{emit_event, traced, traced_async, traced_result, traced_result_async};
