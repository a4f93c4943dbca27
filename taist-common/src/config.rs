// Copyright 2021-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const ENV_ENABLED: &str = "TAIST_ENABLED";
pub const ENV_DEPTH: &str = "TAIST_DEPTH";
pub const ENV_FORMAT: &str = "TAIST_FORMAT";
pub const ENV_OUTPUT_FILE: &str = "TAIST_OUTPUT_FILE";
pub const ENV_OUTPUT_INTERVAL: &str = "TAIST_OUTPUT_INTERVAL";
pub const ENV_INCLUDE: &str = "TAIST_INCLUDE";
pub const ENV_EXCLUDE: &str = "TAIST_EXCLUDE";
pub const ENV_SLOW_THRESHOLD: &str = "TAIST_SLOW_THRESHOLD";
pub const ENV_COLLECTOR_SOCKET: &str = "TAIST_COLLECTOR_SOCKET";
pub const ENV_LOG_LEVEL: &str = "TAIST_LOG";

pub const CONFIG_FILE_NAME: &str = "taist.config.json";

const FORMAT_TOON: &str = "toon";
const FORMAT_JSON: &str = "json";
const FORMAT_COMPACT: &str = "compact";

pub const DEFAULT_MAX_DEPTH: u32 = 10;
pub const DEFAULT_SLOW_THRESHOLD_MS: f64 = 100.0;

/// Errors surfaced to the user at startup. Unlike transport or parse
/// failures these abort instead of being absorbed.
#[derive(Debug, PartialEq)]
pub enum ConfigError {
    /// Config file exists but could not be read.
    Io(String),
    /// Config file is not valid JSON for the recognized keys.
    Parse(String),
    /// Unrecognized output format tag.
    InvalidFormat(String),
    /// A file include/exclude glob failed to compile.
    InvalidGlob(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Io(msg) => write!(f, "failed to read config file: {msg}"),
            ConfigError::Parse(msg) => write!(f, "malformed config file: {msg}"),
            ConfigError::InvalidFormat(tag) => write!(
                f,
                "invalid format {tag:?}, expected {FORMAT_TOON}|{FORMAT_JSON}|{FORMAT_COMPACT}"
            ),
            ConfigError::InvalidGlob(msg) => write!(f, "invalid glob pattern: {msg}"),
        }
    }
}

impl std::error::Error for ConfigError {}

/// Output renderer selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    #[default]
    Toon,
    Json,
    Compact,
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OutputFormat::Toon => write!(f, "{FORMAT_TOON}"),
            OutputFormat::Json => write!(f, "{FORMAT_JSON}"),
            OutputFormat::Compact => write!(f, "{FORMAT_COMPACT}"),
        }
    }
}

impl std::str::FromStr for OutputFormat {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            FORMAT_TOON => Ok(OutputFormat::Toon),
            FORMAT_JSON => Ok(OutputFormat::Json),
            FORMAT_COMPACT => Ok(OutputFormat::Compact),
            other => Err(ConfigError::InvalidFormat(other.to_string())),
        }
    }
}

/// Resolved tracing configuration: defaults, overlaid by the JSON config
/// file when present, overlaid by environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    pub enabled: bool,
    /// File globs gating which files are transformed.
    pub include: Vec<String>,
    pub exclude: Vec<String>,
    /// Depth past which wrappers become pass-through.
    pub max_depth: u32,
    pub format: OutputFormat,
    /// Operations at or above this duration are flagged as slow.
    pub slow_threshold_ms: f64,
    /// Report destination; stdout when unset.
    pub output_file: Option<PathBuf>,
    /// Periodic summary interval; one-shot output on stop when unset.
    pub output_interval: Option<Duration>,
    /// Reporter→collector socket path, handed to children via env.
    pub socket_path: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            enabled: true,
            include: vec![],
            exclude: vec![],
            max_depth: DEFAULT_MAX_DEPTH,
            format: OutputFormat::default(),
            slow_threshold_ms: DEFAULT_SLOW_THRESHOLD_MS,
            output_file: None,
            output_interval: None,
            socket_path: None,
        }
    }
}

/// The recognized subset of the JSON config file. Unknown keys are ignored.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FileConfig {
    include: Option<Vec<String>>,
    exclude: Option<Vec<String>>,
    depth: Option<u32>,
    format: Option<String>,
    slow_op_threshold: Option<f64>,
    output_file: Option<PathBuf>,
    output_interval: Option<u64>,
}

impl Config {
    /// Resolves the effective config: defaults, then `taist.config.json`
    /// from the working directory when present, then the environment.
    pub fn resolve() -> Result<Config, ConfigError> {
        let mut config = Config::default();
        let file = Path::new(CONFIG_FILE_NAME);
        if file.exists() {
            config.apply_file(file)?;
        }
        FromEnv::apply(&mut config)?;
        config.validate_globs()?;
        Ok(config)
    }

    /// Overlays values from a JSON config file.
    pub fn apply_file(&mut self, path: &Path) -> Result<(), ConfigError> {
        let text =
            std::fs::read_to_string(path).map_err(|e| ConfigError::Io(e.to_string()))?;
        let file: FileConfig =
            serde_json::from_str(&text).map_err(|e| ConfigError::Parse(e.to_string()))?;
        if let Some(include) = file.include {
            self.include = include;
        }
        if let Some(exclude) = file.exclude {
            self.exclude = exclude;
        }
        if let Some(depth) = file.depth {
            self.max_depth = depth;
        }
        if let Some(format) = file.format {
            self.format = format.parse()?;
        }
        if let Some(threshold) = file.slow_op_threshold {
            self.slow_threshold_ms = threshold;
        }
        if file.output_file.is_some() {
            self.output_file = file.output_file;
        }
        if let Some(interval) = file.output_interval {
            self.output_interval = Some(Duration::from_millis(interval));
        }
        Ok(())
    }

    fn validate_globs(&self) -> Result<(), ConfigError> {
        for pattern in self.include.iter().chain(self.exclude.iter()) {
            glob::Pattern::new(pattern)
                .map_err(|e| ConfigError::InvalidGlob(format!("{pattern:?}: {e}")))?;
        }
        Ok(())
    }
}

pub struct FromEnv {}

impl FromEnv {
    fn flag(name: &str) -> Option<bool> {
        match std::env::var(name).ok()?.as_str() {
            "1" | "true" | "on" => Some(true),
            "0" | "false" | "off" => Some(false),
            _ => None,
        }
    }

    fn list(name: &str) -> Option<Vec<String>> {
        let raw = std::env::var(name).ok()?;
        Some(
            raw.split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect(),
        )
    }

    pub fn socket_path() -> Option<PathBuf> {
        std::env::var_os(ENV_COLLECTOR_SOCKET).map(PathBuf::from)
    }

    pub fn log_level() -> String {
        std::env::var(ENV_LOG_LEVEL).unwrap_or_else(|_| "info".to_string())
    }

    /// Overlays recognized environment variables onto `config`.
    pub fn apply(config: &mut Config) -> Result<(), ConfigError> {
        if let Some(enabled) = Self::flag(ENV_ENABLED) {
            config.enabled = enabled;
        }
        if let Some(depth) = std::env::var(ENV_DEPTH).ok().and_then(|s| s.parse().ok()) {
            config.max_depth = depth;
        }
        if let Ok(format) = std::env::var(ENV_FORMAT) {
            config.format = format.parse()?;
        }
        if let Some(include) = Self::list(ENV_INCLUDE) {
            config.include = include;
        }
        if let Some(exclude) = Self::list(ENV_EXCLUDE) {
            config.exclude = exclude;
        }
        if let Some(threshold) = std::env::var(ENV_SLOW_THRESHOLD)
            .ok()
            .and_then(|s| s.parse().ok())
        {
            config.slow_threshold_ms = threshold;
        }
        if let Some(path) = std::env::var_os(ENV_OUTPUT_FILE) {
            config.output_file = Some(PathBuf::from(path));
        }
        if let Some(interval) = std::env::var(ENV_OUTPUT_INTERVAL)
            .ok()
            .and_then(|s| s.parse().ok())
        {
            config.output_interval = Some(Duration::from_millis(interval));
        }
        if let Some(path) = Self::socket_path() {
            config.socket_path = Some(path);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_are_sane() {
        let config = Config::default();
        assert!(config.enabled);
        assert_eq!(config.max_depth, DEFAULT_MAX_DEPTH);
        assert_eq!(config.format, OutputFormat::Toon);
        assert!(config.include.is_empty());
    }

    #[test]
    fn file_layer_overlays_recognized_keys() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"include":["src/**/*.rs"],"depth":4,"format":"compact","slowOpThreshold":250,"outputInterval":5000}}"#
        )
        .unwrap();
        let mut config = Config::default();
        config.apply_file(file.path()).unwrap();
        assert_eq!(config.include, vec!["src/**/*.rs".to_string()]);
        assert_eq!(config.max_depth, 4);
        assert_eq!(config.format, OutputFormat::Compact);
        assert_eq!(config.slow_threshold_ms, 250.0);
        assert_eq!(config.output_interval, Some(Duration::from_millis(5000)));
    }

    #[test]
    fn malformed_file_is_a_parse_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "{{not json").unwrap();
        let mut config = Config::default();
        let err = config.apply_file(file.path()).unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn bad_format_tag_is_rejected() {
        let err = "yaml".parse::<OutputFormat>().unwrap_err();
        assert_eq!(err, ConfigError::InvalidFormat("yaml".to_string()));
    }

    #[test]
    fn format_tags_roundtrip() {
        for format in [OutputFormat::Toon, OutputFormat::Json, OutputFormat::Compact] {
            assert_eq!(format.to_string().parse::<OutputFormat>().unwrap(), format);
        }
    }

    #[test]
    fn bad_globs_are_rejected() {
        let config = Config {
            include: vec!["src/[".to_string()],
            ..Config::default()
        };
        assert!(matches!(
            config.validate_globs(),
            Err(ConfigError::InvalidGlob(_))
        ));
    }
}
