//! Logging configuration

/// Logging configuration
///
/// Use [`LoggingConfigBuilder`] for ergonomic construction.
///
/// # Example
///
/// ```rust
/// use apiprobe_telemetry::LoggingConfig;
///
/// let config = LoggingConfig::builder()
///     .log_level("info,apiprobe_socket=debug")
///     .json_logs(false)
///     .build();
/// assert!(!config.json_logs);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoggingConfig {
    /// Filter directive (e.g. "info", "warn,apiprobe_queue=debug").
    /// `RUST_LOG` takes precedence when set.
    pub log_level: String,
    /// Emit one JSON object per event
    pub json_logs: bool,
    /// Write to stderr instead of stdout
    pub stderr_output: bool,
    /// Include the event target (module path)
    pub with_target: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            json_logs: false,
            stderr_output: true,
            with_target: true,
        }
    }
}

impl LoggingConfig {
    /// Create a new configuration builder
    #[must_use]
    pub fn builder() -> LoggingConfigBuilder {
        LoggingConfigBuilder::default()
    }

    /// Install the global subscriber described by this configuration
    pub fn init(self) -> crate::LoggingResult<()> {
        crate::init::init_subscriber(&self)
    }
}

/// Builder for [`LoggingConfig`]
#[derive(Debug, Clone, Default)]
pub struct LoggingConfigBuilder {
    log_level: Option<String>,
    json_logs: Option<bool>,
    stderr_output: Option<bool>,
    with_target: Option<bool>,
}

impl LoggingConfigBuilder {
    /// Set the filter directive
    #[must_use]
    pub fn log_level(mut self, level: impl Into<String>) -> Self {
        self.log_level = Some(level.into());
        self
    }

    /// Enable or disable JSON output
    #[must_use]
    pub fn json_logs(mut self, enabled: bool) -> Self {
        self.json_logs = Some(enabled);
        self
    }

    /// Enable or disable stderr output
    #[must_use]
    pub fn stderr_output(mut self, enabled: bool) -> Self {
        self.stderr_output = Some(enabled);
        self
    }

    /// Include or omit event targets
    #[must_use]
    pub fn with_target(mut self, enabled: bool) -> Self {
        self.with_target = Some(enabled);
        self
    }

    /// Build the configuration
    #[must_use]
    pub fn build(self) -> LoggingConfig {
        let defaults = LoggingConfig::default();
        LoggingConfig {
            log_level: self.log_level.unwrap_or(defaults.log_level),
            json_logs: self.json_logs.unwrap_or(defaults.json_logs),
            stderr_output: self.stderr_output.unwrap_or(defaults.stderr_output),
            with_target: self.with_target.unwrap_or(defaults.with_target),
        }
    }
}
