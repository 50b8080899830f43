//! Logging setup and the per-session span.
//!
//! Every session runs inside a `session` span carrying `session_id`,
//! `generation` and `mode`, so individual events only log what changed.

use std::path::PathBuf;

use once_cell::sync::OnceCell;
use tracing_subscriber::layer::SubscriberExt as _;
use tracing_subscriber::util::SubscriberInitExt as _;

use crate::model::QueryMode;

static INIT: OnceCell<()> = OnceCell::new();

const DEFAULT_JSON_FILE: &str = "recall.logs.jsonl";

/// Where log records go.
#[derive(Clone, Debug, PartialEq, Eq)]
enum LogOutput {
    /// Compact lines on stderr, keeping stdout free for rendered output.
    Console,
    /// JSON lines appended to this file.
    JsonFile(PathBuf),
}

#[derive(Clone, Debug, PartialEq, Eq)]
struct LogSettings {
    enabled: bool,
    // Explicit filter directive; `None` falls back to `RUST_LOG`, then the default level.
    filter: Option<String>,
    output: LogOutput,
}

impl LogSettings {
    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let enabled = lookup("RECALL_OBSERVABILITY_ENABLED")
            .map(|v| parse_bool_env(&v).unwrap_or(true))
            .unwrap_or(true);
        let filter = lookup("RECALL_LOG_LEVEL")
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty());
        let output = match lookup("RECALL_JSON_LOG_PATH").filter(|p| !p.trim().is_empty()) {
            Some(path) => LogOutput::JsonFile(PathBuf::from(path.trim())),
            None => LogOutput::Console,
        };
        Self {
            enabled,
            filter,
            output,
        }
    }

    fn env_filter(&self, default_level: &str) -> tracing_subscriber::EnvFilter {
        if let Some(directive) = &self.filter
            && let Ok(filter) = tracing_subscriber::EnvFilter::try_new(directive)
        {
            return filter;
        }
        tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level))
    }
}

fn parse_bool_env(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" | "enabled" => Some(true),
        "0" | "false" | "no" | "off" | "disabled" => Some(false),
        _ => None,
    }
}

/// Initialize logging once per process.
///
/// Environment variables:
/// - `RECALL_OBSERVABILITY_ENABLED`: enable/disable flag (default enabled).
/// - `RECALL_LOG_LEVEL`: level/filter override (`info`, `recall_stream=debug`, ...).
/// - `RECALL_JSON_LOG_PATH`: write JSONL records (with the session span) to this file
///   instead of stderr.
/// - `RUST_LOG`: filter used when `RECALL_LOG_LEVEL` is unset.
///
/// `default_level` applies when neither filter variable is set.
pub fn init_observability(default_level: &str) {
    INIT.get_or_init(|| {
        let settings = LogSettings::from_lookup(|key| std::env::var(key).ok());
        if !settings.enabled {
            return;
        }
        let env_filter = settings.env_filter(default_level);

        match settings.output {
            LogOutput::JsonFile(path) => {
                if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                    let _ = std::fs::create_dir_all(parent);
                }
                let dir = path
                    .parent()
                    .filter(|p| !p.as_os_str().is_empty())
                    .unwrap_or_else(|| std::path::Path::new("."));
                let file_name = path
                    .file_name()
                    .and_then(|n| n.to_str())
                    .unwrap_or(DEFAULT_JSON_FILE);
                let json_layer = tracing_subscriber::fmt::layer()
                    .json()
                    .with_current_span(true)
                    .with_span_list(false)
                    .with_target(false)
                    .with_writer(tracing_appender::rolling::never(dir, file_name));
                let _ = tracing_subscriber::registry()
                    .with(env_filter)
                    .with(json_layer)
                    .try_init();
            }
            LogOutput::Console => {
                let console_layer = tracing_subscriber::fmt::layer()
                    .compact()
                    .with_target(false)
                    .with_writer(std::io::stderr);
                let _ = tracing_subscriber::registry()
                    .with(env_filter)
                    .with(console_layer)
                    .try_init();
            }
        }
    });
}

/// Span wrapping one session's task.
pub(crate) fn session_span(id: uuid::Uuid, generation: u64, mode: QueryMode) -> tracing::Span {
    tracing::info_span!("session", session_id = %id, generation, mode = ?mode)
}
