//! Default + environment configuration merging.
//!
//! Resolution is pure: it reads an already-loaded [`RawConfig`] and produces
//! validated [`ConnectionDescriptor`]s without touching the filesystem or the
//! process environment.

use std::collections::BTreeMap;

use apiprobe_core::{ClientError, ClientResult, ConnectionDescriptor, Protocol, ProtocolSettings};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::debug;

/// Name of the environment block every other environment inherits from.
pub const DEFAULT_ENV: &str = "default";

/// Protocol name → environment name → settings map, as loaded.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RawConfig {
    protocols: BTreeMap<String, BTreeMap<String, Value>>,
}

impl RawConfig {
    /// Empty configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Interprets an already-loaded map.
    pub fn from_value(value: Value) -> ClientResult<Self> {
        serde_json::from_value(value).map_err(|e| {
            ClientError::config(format!(
                "configuration must map protocol -> environment -> settings: {e}"
            ))
        })
    }

    /// Adds or replaces one environment block.
    #[must_use]
    pub fn with_block(
        mut self,
        protocol: impl Into<String>,
        environment: impl Into<String>,
        settings: Value,
    ) -> Self {
        self.protocols
            .entry(protocol.into())
            .or_default()
            .insert(environment.into(), settings);
        self
    }

    /// Protocol names as written in the configuration.
    pub fn protocol_names(&self) -> impl Iterator<Item = &str> {
        self.protocols.keys().map(String::as_str)
    }

    /// Environments configured for `protocol`, `default` included.
    pub fn environments(&self, protocol: Protocol) -> Vec<&str> {
        self.blocks(protocol)
            .ok()
            .flatten()
            .map(|blocks| blocks.keys().map(String::as_str).collect())
            .unwrap_or_default()
    }

    /// Finds the environment blocks of `protocol`, accepting any alias as key.
    fn blocks(&self, protocol: Protocol) -> ClientResult<Option<&BTreeMap<String, Value>>> {
        let mut found: Option<(&str, &BTreeMap<String, Value>)> = None;
        for (name, blocks) in &self.protocols {
            if name.parse::<Protocol>().ok() != Some(protocol) {
                continue;
            }
            if let Some((first, _)) = found {
                return Err(ClientError::config(format!(
                    "protocol {protocol} is configured twice ('{first}' and '{name}')"
                ))
                .with_protocol(protocol));
            }
            found = Some((name, blocks));
        }
        Ok(found.map(|(_, blocks)| blocks))
    }
}

/// Deep-merges `overlay` into `base`.
///
/// Objects merge key by key, recursively; any other overlay value replaces
/// the base value. Keys absent from `overlay` keep their base value.
pub fn deep_merge(base: &mut Value, overlay: &Value) {
    match (base, overlay) {
        (Value::Object(base), Value::Object(overlay)) => {
            for (key, value) in overlay {
                match base.get_mut(key) {
                    Some(existing) if existing.is_object() && value.is_object() => {
                        deep_merge(existing, value);
                    }
                    _ => {
                        base.insert(key.clone(), value.clone());
                    }
                }
            }
        }
        (base, overlay) => *base = overlay.clone(),
    }
}

/// Turns raw configuration into connection descriptors.
#[derive(Debug, Clone, Default)]
pub struct ConfigResolver {
    raw: RawConfig,
}

impl ConfigResolver {
    /// Resolver over a loaded configuration.
    pub fn new(raw: RawConfig) -> Self {
        Self { raw }
    }

    /// The configuration being resolved.
    pub fn raw(&self) -> &RawConfig {
        &self.raw
    }

    /// Merges the `default` block with the `environment` block of `protocol`
    /// and validates the result.
    ///
    /// Unknown protocol names fail with `UnsupportedProtocol`; a missing
    /// protocol section, missing environment, bad value or unknown key fails
    /// with `Config`.
    pub fn resolve(&self, protocol: &str, environment: &str) -> ClientResult<ConnectionDescriptor> {
        let protocol: Protocol = protocol.parse()?;
        let fail = |message: String| ClientError::config(message).with_protocol(protocol);

        let blocks = self
            .raw
            .blocks(protocol)?
            .ok_or_else(|| fail(format!("no configuration for protocol {protocol}")))?;
        let defaults = blocks.get(DEFAULT_ENV);
        let overlay = if environment == DEFAULT_ENV {
            None
        } else {
            Some(blocks.get(environment).ok_or_else(|| {
                let known: Vec<&str> = blocks.keys().map(String::as_str).collect();
                fail(format!(
                    "environment '{environment}' is not configured for {protocol} (known: {})",
                    known.join(", ")
                ))
            })?)
        };
        if defaults.is_none() && overlay.is_none() {
            return Err(fail(format!(
                "environment '{DEFAULT_ENV}' is not configured for {protocol}"
            )));
        }

        let mut merged = Value::Object(Map::new());
        for block in [defaults, overlay].into_iter().flatten() {
            if !block.is_object() {
                return Err(fail(format!(
                    "settings for {protocol} must be a map, got {block}"
                )));
            }
            deep_merge(&mut merged, block);
        }
        debug!(protocol = %protocol, environment, settings = %merged, "Resolved configuration");

        let settings = ProtocolSettings::from_value(protocol, merged)?;
        ConnectionDescriptor::new(environment, settings)
    }

    /// Resolves every configured protocol for `environment`.
    ///
    /// Fails on the first protocol name that is unknown or does not resolve.
    pub fn resolve_all(&self, environment: &str) -> ClientResult<Vec<ConnectionDescriptor>> {
        self.raw
            .protocol_names()
            .map(|name| self.resolve(name, environment))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use apiprobe_core::{ErrorKind, QueuePattern};
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use std::time::Duration;

    fn sample() -> RawConfig {
        RawConfig::from_value(json!({
            "http": {
                "default": {"base_url": "http://localhost:8080", "timeout": 30, "headers": {"X-Team": "qa"}},
                "staging": {"base_url": "https://staging.example.com", "headers": {"X-Env": "staging"}},
                "broken": {"retries": "many"},
                "typo": {"verify_tls": false}
            },
            "zmq": {
                "default": {"host": "localhost", "port": 5555},
                "staging": {"pattern": "SUB", "subscribe": ["orders"]}
            },
            "tcp": {
                "default": {"host": "localhost", "port": 9000, "framing": "length_prefixed", "frame_param": 4}
            }
        }))
        .unwrap()
    }

    #[test]
    fn test_merge_keeps_unspecified_keys() {
        let mut base = json!({"timeout": 30});
        deep_merge(&mut base, &json!({"base_url": "https://x"}));
        assert_eq!(base, json!({"timeout": 30, "base_url": "https://x"}));
    }

    #[test]
    fn test_merge_nested_maps_key_by_key() {
        let mut base = json!({"headers": {"a": "1", "b": "2"}, "retries": 1});
        deep_merge(&mut base, &json!({"headers": {"b": "3"}, "retries": 4}));
        assert_eq!(base, json!({"headers": {"a": "1", "b": "3"}, "retries": 4}));
    }

    #[test]
    fn test_resolve_environment_override() {
        let resolver = ConfigResolver::new(sample());
        let descriptor = resolver.resolve("http", "staging").unwrap();
        let http = descriptor.http().unwrap();
        assert_eq!(http.base_url, "https://staging.example.com");
        assert_eq!(http.timeout, Duration::from_secs(30));
        assert_eq!(http.headers.len(), 2);
        assert_eq!(descriptor.environment(), "staging");
    }

    #[test]
    fn test_resolve_default_only() {
        let resolver = ConfigResolver::new(sample());
        let descriptor = resolver.resolve("socket", DEFAULT_ENV).unwrap();
        assert_eq!(descriptor.target(), "localhost:9000");
    }

    #[test]
    fn test_alias_keys() {
        let resolver = ConfigResolver::new(sample());
        let queue = resolver.resolve("queue", "staging").unwrap();
        assert_eq!(queue.queue().unwrap().pattern, QueuePattern::Sub);
        assert_eq!(queue.target(), "tcp://localhost:5555");
    }

    #[test]
    fn test_unknown_protocol() {
        let resolver = ConfigResolver::new(sample());
        let err = resolver.resolve("amqp", "staging").unwrap_err();
        assert_eq!(err.kind, ErrorKind::UnsupportedProtocol);
    }

    #[test]
    fn test_missing_environment_is_config_error() {
        let resolver = ConfigResolver::new(sample());
        let err = resolver.resolve("tcp", "staging").unwrap_err();
        assert_eq!(err.kind, ErrorKind::Config);
        assert!(err.message.contains("staging"));
    }

    #[test]
    fn test_invalid_values_are_config_errors() {
        let resolver = ConfigResolver::new(sample());
        assert_eq!(
            resolver.resolve("http", "broken").unwrap_err().kind,
            ErrorKind::Config
        );
        let err = resolver.resolve("http", "typo").unwrap_err();
        assert_eq!(err.kind, ErrorKind::Config);
        assert!(err.message.contains("verify_tls"));
    }

    #[test]
    fn test_duplicate_protocol_keys() {
        let raw = RawConfig::new()
            .with_block("http", DEFAULT_ENV, json!({"base_url": "http://a"}))
            .with_block("https", DEFAULT_ENV, json!({"base_url": "http://b"}));
        let err = ConfigResolver::new(raw)
            .resolve("http", DEFAULT_ENV)
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::Config);
    }

    #[test]
    fn test_resolve_all_rejects_unknown_protocol() {
        let raw = sample().with_block("amqp", DEFAULT_ENV, json!({}));
        let err = ConfigResolver::new(raw)
            .resolve_all(DEFAULT_ENV)
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::UnsupportedProtocol);
    }

    #[test]
    fn test_resolution_is_deterministic() {
        let resolver = ConfigResolver::new(sample());
        assert_eq!(
            resolver.resolve("http", "staging").unwrap(),
            resolver.resolve("http", "staging").unwrap()
        );
    }

    #[test]
    fn test_environments_listing() {
        let raw = sample();
        assert_eq!(
            raw.environments(Protocol::Queue),
            vec![DEFAULT_ENV, "staging"]
        );
        assert!(RawConfig::new().environments(Protocol::Http).is_empty());
    }
}
