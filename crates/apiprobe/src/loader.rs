//! Loading raw configuration and selecting the environment.

use std::fmt;
use std::path::Path;

use apiprobe_core::{ClientError, ClientResult};
use serde_json::Value;

use crate::resolver::{DEFAULT_ENV, RawConfig};

/// Environment variable naming the active environment.
pub const ENV_VAR: &str = "APIPROBE_ENV";

impl RawConfig {
    /// Parses YAML text shaped `protocol -> environment -> settings`.
    pub fn from_yaml_str(text: &str) -> ClientResult<Self> {
        let value: Value = serde_yaml::from_str(text)
            .map_err(|e| ClientError::config(format!("invalid YAML configuration: {e}")))?;
        if value.is_null() {
            return Ok(Self::new());
        }
        Self::from_value(value)
    }

    /// Reads and parses a YAML configuration file.
    pub fn from_yaml_file(path: impl AsRef<Path>) -> ClientResult<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| {
            ClientError::config(format!("cannot read configuration {}: {e}", path.display()))
        })?;
        Self::from_yaml_str(&text)
            .map_err(|e| ClientError::config(format!("{}: {}", path.display(), e.message)))
    }
}

/// The environment block selected for a run.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Environment(String);

impl Environment {
    /// Named environment.
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// Reads [`ENV_VAR`], falling back to `default` when unset or blank.
    pub fn from_env() -> Self {
        Self::from_var(std::env::var(ENV_VAR).ok())
    }

    fn from_var(value: Option<String>) -> Self {
        value
            .map(|v| v.trim().to_owned())
            .filter(|v| !v.is_empty())
            .map_or_else(Self::default, Self)
    }

    /// Environment name.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether this is the `default` block.
    pub fn is_default(&self) -> bool {
        self.0 == DEFAULT_ENV
    }
}

impl Default for Environment {
    fn default() -> Self {
        Self(DEFAULT_ENV.to_owned())
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for Environment {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
