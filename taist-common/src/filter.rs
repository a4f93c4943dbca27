// Copyright 2021-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use crate::config::{Config, ConfigError};
use crate::record::TraceRecord;
use glob::Pattern;
use std::path::Path;

/// Name substrings the collector always rejects, so the tracer never
/// traces its own machinery.
pub const INTERNAL_NAME_BLOCKLIST: &[&str] = &[
    "__taist",
    "taist_runtime",
    "taist_reporter",
    "taist_collector",
    "taist_context",
];

/// Glob-based gate deciding which files are transformed.
#[derive(Debug, Default)]
pub struct FileFilter {
    include: Vec<Pattern>,
    exclude: Vec<Pattern>,
}

impl FileFilter {
    pub fn new(include: &[String], exclude: &[String]) -> Result<Self, ConfigError> {
        let compile = |patterns: &[String]| -> Result<Vec<Pattern>, ConfigError> {
            patterns
                .iter()
                .map(|p| {
                    Pattern::new(p).map_err(|e| ConfigError::InvalidGlob(format!("{p:?}: {e}")))
                })
                .collect()
        };
        Ok(Self {
            include: compile(include)?,
            exclude: compile(exclude)?,
        })
    }

    pub fn from_config(config: &Config) -> Result<Self, ConfigError> {
        Self::new(&config.include, &config.exclude)
    }

    /// Excludes win over includes; an empty include set accepts everything
    /// not excluded.
    pub fn accepts(&self, path: impl AsRef<Path>) -> bool {
        let path = path.as_ref();
        if self.exclude.iter().any(|p| p.matches_path(path)) {
            return false;
        }
        self.include.is_empty() || self.include.iter().any(|p| p.matches_path(path))
    }
}

/// Substring predicate over trace names, applied at the collector before
/// records enter the buffer.
#[derive(Debug, Default, Clone)]
pub struct NameFilter {
    include: Vec<String>,
    exclude: Vec<String>,
}

impl NameFilter {
    pub fn new(include: Vec<String>, exclude: Vec<String>) -> Self {
        Self { include, exclude }
    }

    pub fn accepts_name(&self, name: &str) -> bool {
        if INTERNAL_NAME_BLOCKLIST.iter().any(|s| name.contains(s)) {
            return false;
        }
        if self.exclude.iter().any(|s| name.contains(s)) {
            return false;
        }
        self.include.is_empty() || self.include.iter().any(|s| name.contains(s))
    }

    pub fn accepts(&self, record: &TraceRecord) -> bool {
        self.accepts_name(&record.name)
    }
}
