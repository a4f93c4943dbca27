// Copyright 2021-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use pretty_assertions::assert_eq;
use taist_transform::{
    is_instrumented, module_prefix_for, transform_source, TransformError, TransformOptions,
    SENTINEL,
};

fn transform(source: &str) -> String {
    transform_source(source, &TransformOptions::for_module("user_service")).unwrap()
}

#[test]
fn free_functions_are_renamed_and_rewrapped() {
    let out = transform("pub fn register(name: String) -> u32 { name.len() as u32 }\n");
    assert!(out.starts_with(SENTINEL));
    assert!(out.contains("use taist_runtime as __taist_rt;"));
    assert!(out.contains("fn __taist_impl_register(name: String) -> u32"));
    assert!(out.contains("pub fn register(__taist_arg0: String) -> u32"));
    assert!(out.contains("__taist_rt::traced(\n        \"user_service.register\"")
        || out.contains("__taist_rt::traced(\"user_service.register\""));
    assert!(out.contains("__taist_impl_register(__taist_arg0)"));
}

#[test]
fn async_functions_route_through_the_async_entry_point() {
    let out = transform("pub async fn fetch(id: u64) -> u64 { id + 1 }\n");
    assert!(out.contains("async fn __taist_impl_fetch(id: u64) -> u64"));
    assert!(out.contains("traced_async"));
    assert!(out.contains(".await"));
}

#[test]
fn result_returns_route_through_the_fallible_entry_points() {
    let sync = transform("pub fn parse(s: String) -> Result<u32, String> { s.parse().map_err(|_| s) }\n");
    assert!(sync.contains("traced_result"));
    assert!(!sync.contains("traced_result_async"));

    let async_out =
        transform("pub async fn load(id: u64) -> anyhow::Result<u64> { Ok(id) }\n");
    assert!(async_out.contains("traced_result_async"));
}

#[test]
fn impl_methods_are_wrapped_in_place() {
    let source = r#"
pub struct Calc {
    base: u32,
}

impl Calc {
    pub fn new(base: u32) -> Self {
        Self { base }
    }

    pub fn add(&self, a: u32, b: u32) -> u32 {
        self.base + a + b
    }

    pub fn version() -> u32 {
        1
    }

    fn _internal(&self) -> u32 {
        0
    }
}
"#;
    let out = transform(source);
    // `new` and the underscore helper stay untouched.
    assert!(out.contains("pub fn new(base: u32) -> Self"));
    assert!(!out.contains("__taist_impl_new"));
    assert!(!out.contains("__taist_impl__internal"));
    // Instance method: renamed original plus forwarding wrapper.
    assert!(out.contains("fn __taist_impl_add(&self, a: u32, b: u32) -> u32"));
    assert!(out.contains("\"Calc.add\""));
    assert!(out.contains("self.__taist_impl_add(__taist_arg0, __taist_arg1)"));
    // Static method gets the same treatment through `Self::`.
    assert!(out.contains("\"Calc.version\""));
    assert!(out.contains("Self::__taist_impl_version()"));
}

#[test]
fn function_pointer_bindings_reexport_a_wrapper() {
    let out = transform("pub static HANDLER: fn(u32) -> u32 = double;\nfn double(x: u32) -> u32 { x * 2 }\n");
    assert!(out.contains("static __taist_impl_HANDLER: fn(u32) -> u32 = double;"));
    assert!(out.contains("pub static HANDLER: fn(u32) -> u32 = __taist_wrap_HANDLER;"));
    assert!(out.contains("fn __taist_wrap_HANDLER(__taist_arg0: u32) -> u32"));
    assert!(out.contains("\"user_service.HANDLER\""));
}

#[test]
fn lazy_handler_trees_pass_through_the_decorator() {
    let source = r#"
use std::sync::LazyLock;
use taist_runtime::HandlerTree;

pub static HANDLERS: LazyLock<HandlerTree> = LazyLock::new(|| {
    HandlerTree::new().nested("Query", HandlerTree::new().handler("getUser", |v| v))
});
"#;
    let out = transform(source);
    assert!(out.contains("__taist_rt::instrument_tree("));
    assert!(out.contains("\"HANDLERS\""));
}

#[test]
fn tree_returning_functions_are_decorated_not_traced() {
    let out = transform("pub fn handlers() -> HandlerTree { HandlerTree::new() }\n");
    assert!(out.contains("instrument_tree("));
    assert!(out.contains("\"handlers\""));
    assert!(!out.contains("__taist_impl_handlers"));
}

#[test]
fn unrecognized_files_come_back_byte_identical() {
    let declarations = "pub struct Config {\n    pub depth: u32,\n}\n\npub trait Sink {\n    fn emit(&self);\n}\n";
    assert_eq!(transform(declarations), declarations);

    let private_only = "fn helper() -> u32 { 3 }\n";
    assert_eq!(transform(private_only), private_only);
}

#[test]
fn generic_unsafe_and_extern_functions_are_left_alone() {
    let generic = "pub fn pick<T>(a: T, b: T) -> T { a }\n";
    assert_eq!(transform(generic), generic);

    let unsafe_fn = "pub unsafe fn poke(p: *mut u8) { *p = 0; }\n";
    assert_eq!(transform(unsafe_fn), unsafe_fn);
}

#[test]
fn excluded_functions_are_skipped() {
    let options = TransformOptions {
        module_prefix: "health".into(),
        exclude_functions: vec!["ping".into()],
    };
    let source = "pub fn ping() -> u32 { 1 }\npub fn check() -> u32 { 2 }\n";
    let out = transform_source(source, &options).unwrap();
    assert!(!out.contains("__taist_impl_ping"));
    assert!(out.contains("__taist_impl_check"));
}

#[test]
fn transform_is_idempotent() {
    let source = r#"
pub struct Calc;

impl Calc {
    pub fn add(&self, a: u32, b: u32) -> u32 {
        a + b
    }
}

pub fn register(name: String) -> u32 {
    name.len() as u32
}
"#;
    let once = transform(source);
    let twice = transform(&once);
    assert_eq!(once, twice);
    assert!(is_instrumented(&once));
    // One wrapper per export, never wrappers of wrappers.
    assert!(once.contains("__taist_impl_add"));
    assert!(!twice.contains("__taist_impl___taist_impl"));
}

#[test]
fn parse_failures_are_transform_errors() {
    let err = transform_source("pub fn broken(", &TransformOptions::default()).unwrap_err();
    assert!(matches!(err, TransformError::Parse(_)));
    assert!(err.to_string().contains("failed to parse"));
}

#[test]
fn module_prefix_comes_from_the_file_stem() {
    assert_eq!(
        module_prefix_for(std::path::Path::new("src/service/user_service.rs")),
        "user_service"
    );
}

#[test]
fn nested_modules_are_rewritten_too() {
    let source = "pub mod api {\n    pub fn list() -> u32 { 0 }\n}\n";
    let out = transform(source);
    assert!(out.contains("__taist_impl_list"));
}
