//! Process-wide tracing setup for the sync service.
use anyhow::Context;
use tracing::info;
use tracing_subscriber::{fmt::SubscriberBuilder, EnvFilter};

use crate::util::env::env_opt;

/// Service logs at info; pool and HTTP plumbing only when something goes wrong.
pub const DEFAULT_FILTER: &str = "info,sqlx=warn,reqwest=warn,hyper=warn";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// One line per event with target, file and line.
    #[default]
    Full,
    /// Shorter lines for terminals; no source locations.
    Compact,
}

impl LogFormat {
    /// Anything but `compact` (case-insensitive) means `Full`.
    pub fn parse(raw: Option<&str>) -> Self {
        match raw.map(|v| v.trim().to_ascii_lowercase()) {
            Some(v) if v == "compact" => LogFormat::Compact,
            _ => LogFormat::Full,
        }
    }
}

/// Filter directives in effect: `RUST_LOG`, then `LOG_FILTER`, then [`DEFAULT_FILTER`].
pub fn resolve_filter(rust_log: Option<String>, log_filter: Option<String>) -> String {
    rust_log
        .or(log_filter)
        .unwrap_or_else(|| DEFAULT_FILTER.to_string())
}

/// Installs the global fmt subscriber. Fails on malformed directives or when a subscriber
/// is already installed.
pub fn init_tracing() -> Result<(), anyhow::Error> {
    let directives = resolve_filter(env_opt("RUST_LOG"), env_opt("LOG_FILTER"));
    let filter = EnvFilter::try_new(&directives)
        .with_context(|| format!("invalid log filter `{directives}`"))?;
    let format = LogFormat::parse(env_opt("LOG_FORMAT").as_deref());

    let builder = SubscriberBuilder::default()
        .with_env_filter(filter)
        .with_target(true);
    let installed = match format {
        LogFormat::Full => builder.with_line_number(true).with_file(true).try_init(),
        LogFormat::Compact => builder.compact().try_init(),
    };
    installed.map_err(|e| anyhow::anyhow!("failed to initialize tracing: {}", e))?;

    info!(filter = %directives, ?format, "logging initialized");
    Ok(())
}
