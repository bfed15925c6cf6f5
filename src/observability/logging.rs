//! Log filter and format resolution.

use crate::config::{LogFormat, LoggingConfig};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// Resolved logging settings.
#[derive(Debug)]
pub struct LogSettings {
    /// Output format.
    pub format: LogFormat,
    /// Log file; stderr when `None`.
    pub file: Option<PathBuf>,
    /// Event filter.
    pub filter: EnvFilter,
}

impl LogSettings {
    /// Resolves settings from config, the environment and the CLI flag.
    ///
    /// Filter precedence: `TRENDVAULT_LOG`, `RUST_LOG`, the config `level`,
    /// then `debug` when `verbose` is set and `info` otherwise.
    #[must_use]
    pub fn resolve(config: &LoggingConfig, verbose: bool) -> Self {
        let directive = std::env::var("TRENDVAULT_LOG")
            .or_else(|_| std::env::var("RUST_LOG"))
            .ok()
            .or_else(|| config.level.clone())
            .unwrap_or_else(|| default_directive(verbose).to_string());

        let filter = EnvFilter::try_new(&directive).unwrap_or_else(|e| {
            eprintln!("Invalid log filter '{directive}': {e}");
            EnvFilter::new(default_directive(verbose))
        });

        Self {
            format: config.format,
            file: config.file.clone(),
            filter,
        }
    }
}

const fn default_directive(verbose: bool) -> &'static str {
    if verbose { "debug" } else { "info" }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_directive() {
        assert_eq!(default_directive(true), "debug");
        assert_eq!(default_directive(false), "info");
    }

    #[test]
    fn test_resolve_keeps_format_and_file() {
        let config = LoggingConfig {
            format: LogFormat::Json,
            level: Some("trendvault=trace".to_string()),
            file: Some(PathBuf::from("/tmp/trendvault.log")),
        };
        let settings = LogSettings::resolve(&config, false);
        assert_eq!(settings.format, LogFormat::Json);
        assert_eq!(settings.file, Some(PathBuf::from("/tmp/trendvault.log")));
    }
}
