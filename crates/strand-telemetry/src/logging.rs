use tracing_subscriber::EnvFilter;

/// Log output format.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LogFormat {
    /// Human-readable compact lines.
    Pretty,
    /// One JSON object per line, for log shippers.
    Json,
}

/// Logging configuration. The filter falls back to `default_level` when
/// RUST_LOG is unset.
#[derive(Clone, Debug)]
pub struct LoggingConfig {
    pub default_level: String,
    pub format: LogFormat,
    /// Write to stderr instead of stdout (keeps stdout clean for
    /// print-mode output).
    pub use_stderr: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            default_level: "info".to_string(),
            format: LogFormat::Pretty,
            use_stderr: true,
        }
    }
}

/// Initialize the global tracing subscriber. Call once at startup; later
/// calls are ignored (useful in tests where multiple inits race).
pub fn init(config: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.default_level.clone()));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true);

    let result = match (config.format, config.use_stderr) {
        (LogFormat::Json, true) => builder.json().with_writer(std::io::stderr).try_init(),
        (LogFormat::Json, false) => builder.json().try_init(),
        (LogFormat::Pretty, true) => builder.compact().with_writer(std::io::stderr).try_init(),
        (LogFormat::Pretty, false) => builder.compact().try_init(),
    };
    // Already-initialized is fine
    let _ = result;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = LoggingConfig::default();
        assert_eq!(config.default_level, "info");
        assert_eq!(config.format, LogFormat::Pretty);
        assert!(config.use_stderr);
    }

    #[test]
    fn init_is_idempotent() {
        let config = LoggingConfig::default();
        init(&config);
        init(&config); // second call must not panic
        tracing::info!("logging initialized in test");
    }
}
