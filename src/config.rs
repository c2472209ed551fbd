//! Runtime configuration.
//!
//! ## Environment variables
//!
//! - `CONTENT_GRAPH_FENCE_STALE`: drop fragments from superseded fetches (default: true)
//! - `CONTENT_GRAPH_REPLY_DEPTH`: reply levels an adapter fills before emitting a loader (default: 3)
//! - `LOG_FORMAT`: "json" for structured logs, "pretty" for development (default: json)

use serde::{Deserialize, Serialize};

/// Default number of reply levels filled per page.
pub const DEFAULT_REPLY_DEPTH: usize = 3;

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    /// Structured JSON, one event per line.
    #[default]
    Json,
    /// Human-readable output for local development.
    Pretty,
}

impl std::str::FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "json" => Ok(Self::Json),
            "pretty" => Ok(Self::Pretty),
            other => Err(format!("unknown log format: {}", other)),
        }
    }
}

/// Configuration for the content manager.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManagerConfig {
    /// When set, a fenced merge skips links already written by a newer fetch.
    pub fence_stale_fetches: bool,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            fence_stale_fetches: true,
        }
    }
}

/// Top-level configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphConfig {
    /// Content manager settings.
    pub manager: ManagerConfig,
    /// Reply levels an adapter fills before emitting a loader.
    pub reply_depth: usize,
    /// Log output format.
    pub log_format: LogFormat,
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            manager: ManagerConfig::default(),
            reply_depth: DEFAULT_REPLY_DEPTH,
            log_format: LogFormat::default(),
        }
    }
}

impl GraphConfig {
    /// Create configuration from environment variables.
    ///
    /// Unset or unparsable variables fall back to defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Create configuration from an arbitrary variable lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();

        let fence_stale_fetches = lookup("CONTENT_GRAPH_FENCE_STALE")
            .and_then(|v| parse_bool(&v))
            .unwrap_or(defaults.manager.fence_stale_fetches);

        let reply_depth = lookup("CONTENT_GRAPH_REPLY_DEPTH")
            .and_then(|v| v.parse().ok())
            .unwrap_or(defaults.reply_depth);

        let log_format = lookup("LOG_FORMAT")
            .and_then(|v| v.parse().ok())
            .unwrap_or(defaults.log_format);

        Self {
            manager: ManagerConfig { fence_stale_fetches },
            reply_depth,
            log_format,
        }
    }
}

fn parse_bool(s: &str) -> Option<bool> {
    match s.to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
