//! Subscriber installation

use tracing::debug;
use tracing_subscriber::{
    Registry, filter::EnvFilter, fmt, fmt::writer::BoxMakeWriter, layer::SubscriberExt,
    util::SubscriberInitExt,
};

use crate::{LoggingConfig, LoggingError};

/// Parses the filter, preferring `RUST_LOG` over the configured directive.
pub(crate) fn build_filter(config: &LoggingConfig) -> Result<EnvFilter, LoggingError> {
    EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.log_level))
        .map_err(|e| LoggingError::InvalidFilter {
            directive: config.log_level.clone(),
            message: e.to_string(),
        })
}

fn writer(config: &LoggingConfig) -> BoxMakeWriter {
    if config.stderr_output {
        BoxMakeWriter::new(std::io::stderr)
    } else {
        BoxMakeWriter::new(std::io::stdout)
    }
}

/// Installs the global subscriber.
///
/// JSON and pretty output need separate paths because the layer types differ.
pub(crate) fn init_subscriber(config: &LoggingConfig) -> Result<(), LoggingError> {
    let env_filter = build_filter(config)?;

    if config.json_logs {
        let fmt_layer = fmt::layer()
            .with_writer(writer(config))
            .with_target(config.with_target)
            .with_thread_ids(true)
            .with_file(true)
            .with_line_number(true)
            .json();

        Registry::default()
            .with(env_filter)
            .with(fmt_layer)
            .try_init()
            .map_err(|e| LoggingError::AlreadyInitialized(e.to_string()))?;
    } else {
        let fmt_layer = fmt::layer()
            .with_writer(writer(config))
            .with_target(config.with_target)
            .with_thread_ids(false)
            .pretty();

        Registry::default()
            .with(env_filter)
            .with(fmt_layer)
            .try_init()
            .map_err(|e| LoggingError::AlreadyInitialized(e.to_string()))?;
    }

    debug!(
        log_level = %config.log_level,
        json_logs = config.json_logs,
        stderr_output = config.stderr_output,
        "apiprobe logging initialized"
    );
    Ok(())
}

/// Installs a compact subscriber that writes through the test harness.
///
/// Safe to call from every test; only the first call installs anything.
pub fn try_init_for_tests() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug"));
    let _ = fmt()
        .with_env_filter(filter)
        .with_test_writer()
        .compact()
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_filter_is_reported() {
        // Only meaningful when RUST_LOG does not override the directive.
        if std::env::var_os("RUST_LOG").is_some() {
            return;
        }
        let config = LoggingConfig::builder().log_level("apiprobe=verbose").build();
        let err = build_filter(&config).unwrap_err();
        assert!(matches!(err, LoggingError::InvalidFilter { .. }));
        assert!(err.to_string().contains("apiprobe=verbose"));
    }

    #[test]
    fn test_second_init_fails() {
        try_init_for_tests();
        try_init_for_tests();
        let err = LoggingConfig::default().init().unwrap_err();
        assert!(matches!(err, LoggingError::AlreadyInitialized(_)));
    }
}
