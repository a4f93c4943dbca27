// Copyright 2021-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Build-time source instrumentation.
//!
//! [`transform_source`] takes one file's source text and returns text that
//! behaves identically except that externally visible functions, inherent
//! methods, function-pointer bindings and handler trees route through the
//! wrapper runtime. Four export shapes are recognized:
//!
//! 1. `pub fn foo(..)`: renamed to a reserved private symbol; a forwarding
//!    `pub fn foo` is emitted that wraps the call as `"<Module>.foo"`.
//!    Functions returning `Result<..>` route through the fallible entry
//!    points.
//! 2. `pub static FOO: fn(..) -> .. = ..;` (or `const`): the initializer
//!    moves to a renamed private binding and the re-exported pointer
//!    targets a hidden wrapper function.
//! 3. `impl C { .. }` for a `pub` type: every `pub` method and associated
//!    function is wrapped in place as `"C.<method>"`, except `new` and
//!    names starting with `_`.
//! 4. Handler trees: a `LazyLock<HandlerTree>` binding or a function
//!    returning `HandlerTree` has its tree passed through the recursive
//!    `instrument_tree` decorator under the export's name.
//!
//! Files with no recognized exports (declaration-only artifacts included)
//! come back byte-identical. Output carries a sentinel comment and is
//! returned unchanged when transformed again, so re-running never wraps
//! wrappers.

mod rewrite;

use std::path::Path;

/// First line of every transformed file; its presence short-circuits a
/// second transformation.
pub const SENTINEL: &str = "// @taist-instrumented";

/// Reserved import alias for the wrapper runtime.
pub const RUNTIME_ALIAS: &str = "__taist_rt";

#[derive(Debug, Clone, Default)]
pub struct TransformOptions {
    /// Qualifier for free functions and pointer bindings, typically the
    /// file stem: `"user_service"` yields `"user_service.register"`.
    pub module_prefix: String,
    /// Short names never wrapped, on top of the built-in `new`/`_` rules.
    pub exclude_functions: Vec<String>,
}

impl TransformOptions {
    pub fn for_module(module_prefix: impl Into<String>) -> Self {
        Self {
            module_prefix: module_prefix.into(),
            exclude_functions: vec![],
        }
    }
}

/// Failure to rewrite one file. Callers log it and pass the file through
/// unchanged; a broken file should fail its own build, not the tracer.
#[derive(Debug)]
pub enum TransformError {
    Parse(String),
}

impl std::fmt::Display for TransformError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransformError::Parse(msg) => write!(f, "failed to parse source: {msg}"),
        }
    }
}

impl std::error::Error for TransformError {}

/// Whether `source` already carries the sentinel.
pub fn is_instrumented(source: &str) -> bool {
    source.starts_with(SENTINEL)
}

/// The module qualifier conventionally used for a file: its stem.
pub fn module_prefix_for(path: &Path) -> String {
    path.file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// Rewrites one file's source text. Idempotent: already-instrumented
/// input is returned as-is, and input with no recognized exports comes
/// back byte-identical.
pub fn transform_source(source: &str, options: &TransformOptions) -> Result<String, TransformError> {
    if is_instrumented(source) {
        return Ok(source.to_string());
    }
    let mut file =
        syn::parse_file(source).map_err(|e| TransformError::Parse(e.to_string()))?;
    let wrapped = rewrite::rewrite_file(&mut file, options);
    if wrapped == 0 {
        return Ok(source.to_string());
    }
    rewrite::prepend_preamble(&mut file);
    let body = prettyplease::unparse(&file);
    Ok(format!("{SENTINEL}\n{body}"))
}
