// Copyright 2021-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Recursive decorator for nested handler-map exports.
//!
//! The typed analogue of an object-literal export: a tree of named
//! subtrees whose leaves are boxed handlers. [`instrument_tree`] rebuilds
//! the tree with every leaf wrapped under its dotted path, so
//! `handlers.Query.getUser` traces like any other instrumented call.

use crate::wrap::traced;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use taist_common::capture::capture;

pub type HandlerFn = Arc<dyn Fn(Value) -> Value + Send + Sync>;

#[derive(Clone)]
pub enum HandlerNode {
    Handler(HandlerFn),
    Tree(HandlerTree),
}

/// Nested map of named handlers.
#[derive(Clone, Default)]
pub struct HandlerTree {
    entries: BTreeMap<String, HandlerNode>,
}

/// Subtrees nested deeper than this are kept, but no longer instrumented.
const MAX_WALK_DEPTH: usize = 8;

impl HandlerTree {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn handler(
        mut self,
        name: impl Into<String>,
        f: impl Fn(Value) -> Value + Send + Sync + 'static,
    ) -> Self {
        self.entries
            .insert(name.into(), HandlerNode::Handler(Arc::new(f)));
        self
    }

    pub fn nested(mut self, name: impl Into<String>, tree: HandlerTree) -> Self {
        self.entries.insert(name.into(), HandlerNode::Tree(tree));
        self
    }

    /// Looks a handler up by dotted path.
    pub fn get(&self, path: &str) -> Option<&HandlerFn> {
        let (head, rest) = match path.split_once('.') {
            Some((head, rest)) => (head, Some(rest)),
            None => (path, None),
        };
        match (self.entries.get(head), rest) {
            (Some(HandlerNode::Handler(f)), None) => Some(f),
            (Some(HandlerNode::Tree(tree)), Some(rest)) => tree.get(rest),
            _ => None,
        }
    }

    /// Invokes the handler at `path`, or returns `None` when absent.
    pub fn call(&self, path: &str, args: Value) -> Option<Value> {
        self.get(path).map(|f| f(args))
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Rebuilds `tree` with every handler leaf wrapped under its dotted path,
/// rooted at `prefix`. The walk is depth-bounded and only descends into
/// subtrees, never into handlers.
pub fn instrument_tree(prefix: &str, tree: HandlerTree) -> HandlerTree {
    instrument_at(prefix, tree, 0)
}

fn instrument_at(prefix: &str, tree: HandlerTree, depth: usize) -> HandlerTree {
    if depth >= MAX_WALK_DEPTH {
        return tree;
    }
    let mut entries = BTreeMap::new();
    for (name, node) in tree.entries {
        let path = format!("{prefix}.{name}");
        let node = match node {
            HandlerNode::Handler(f) => HandlerNode::Handler(wrap_leaf(path, f)),
            HandlerNode::Tree(subtree) => {
                HandlerNode::Tree(instrument_at(&path, subtree, depth + 1))
            }
        };
        entries.insert(name, node);
    }
    HandlerTree { entries }
}

fn wrap_leaf(name: String, f: HandlerFn) -> HandlerFn {
    Arc::new(move |args: Value| {
        let snapshot = capture(&[args.clone()]);
        traced(name.clone(), Some(snapshot), || f(args))
    })
}
