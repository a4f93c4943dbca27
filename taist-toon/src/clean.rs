// Copyright 2021-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use regex::Regex;
use std::sync::LazyLock;

pub const MAX_VALUE_CHARS: usize = 50;
const MAX_PATH_CHARS: usize = 30;

static ANSI: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\x1b\[[0-9;]*[A-Za-z]").expect("static regex"));

static TIMESTAMP: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\d{4}-\d{2}-\d{2}[T ][0-9:.]+Z?").expect("static regex")
});

static ABSOLUTE_PATH: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?:/[\w@.\-]+){2,}").expect("static regex"));

/// Value-abbreviation dictionary, applied word-wise.
const ABBREVIATIONS: &[(&str, &str)] = &[
    ("function", "fn"),
    ("expected", "exp"),
    ("received", "recv"),
    ("undefined", "undef"),
    ("properties", "props"),
    ("arguments", "args"),
];

/// Strips ANSI escapes, timestamps and absolute paths (the latter are
/// collapsed to their basename) from a failure message.
pub fn clean_error_text(text: &str) -> String {
    let text = ANSI.replace_all(text, "");
    let text = TIMESTAMP.replace_all(&text, "");
    let text = ABSOLUTE_PATH.replace_all(&text, |caps: &regex::Captures<'_>| {
        caps[0].rsplit('/').next().unwrap_or("").to_string()
    });
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Applies the abbreviation dictionary.
pub fn abbreviate_words(text: &str) -> String {
    let mut out = text.to_string();
    for (long, short) in ABBREVIATIONS {
        out = out.replace(long, short);
    }
    out
}

/// Well-known prefix segments are shortened; anything still longer than
/// the path cap falls back to the basename.
pub fn abbreviate_path(path: &str) -> String {
    if let Some((_, rest)) = path.split_once("node_modules/") {
        return format!("npm/{rest}");
    }
    if let Some((_, rest)) = path.split_once("src/") {
        return format!("src/{rest}");
    }
    if path.chars().count() > MAX_PATH_CHARS {
        return path.rsplit('/').next().unwrap_or(path).to_string();
    }
    path.to_string()
}

/// Truncates to the value cap with a `…` marker.
pub fn truncate(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }
    let mut out: String = text.chars().take(max).collect();
    out.push('…');
    out
}
