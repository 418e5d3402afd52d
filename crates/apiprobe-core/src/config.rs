//! Per-protocol settings and the resolved connection descriptor.

use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use url::Url;

use crate::error::{ClientError, ClientResult};
use crate::format::MessageFormat;
use crate::types::Protocol;

/// Upper bound on a single socket frame unless configured otherwise.
pub const DEFAULT_MAX_FRAME_SIZE: usize = 10 * 1024 * 1024; // 10MB

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

fn default_timeout() -> Duration {
    DEFAULT_TIMEOUT
}

fn default_true() -> bool {
    true
}

fn default_backoff_ms() -> u64 {
    500
}

fn default_subscribe() -> Vec<String> {
    vec![String::new()]
}

fn default_max_frame_size() -> usize {
    DEFAULT_MAX_FRAME_SIZE
}

/// Timeouts are written in seconds (integer or fractional) and must be positive.
mod seconds {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer, de::Error as _};

    pub(super) fn serialize<S: Serializer>(value: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_f64(value.as_secs_f64())
    }

    pub(super) fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(d)?;
        if !secs.is_finite() || secs <= 0.0 {
            return Err(D::Error::custom(format!(
                "timeout must be a positive number of seconds, got {secs}"
            )));
        }
        Duration::try_from_secs_f64(secs).map_err(D::Error::custom)
    }
}

/// Backoff growth between HTTP retries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RetryStrategy {
    /// Same delay before every retry.
    #[default]
    Fixed,
    /// Delay grows by the base backoff on each retry.
    Linear,
}

/// Settings recognized for the HTTP protocol.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HttpSettings {
    /// Base URL every request path is joined to.
    pub base_url: String,
    /// Per-request timeout.
    #[serde(default = "default_timeout", with = "seconds")]
    pub timeout: Duration,
    /// Verify server certificates.
    #[serde(default = "default_true")]
    pub verify_ssl: bool,
    /// Retries after connect-phase failures.
    #[serde(default)]
    pub retries: u32,
    /// Base delay between retries in milliseconds.
    #[serde(default = "default_backoff_ms")]
    pub retry_backoff_ms: u64,
    /// How the delay grows.
    #[serde(default)]
    pub retry_strategy: RetryStrategy,
    /// Default headers sent with every request.
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
}

impl HttpSettings {
    /// Settings with defaults for everything but the base URL.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            timeout: DEFAULT_TIMEOUT,
            verify_ssl: true,
            retries: 0,
            retry_backoff_ms: default_backoff_ms(),
            retry_strategy: RetryStrategy::Fixed,
            headers: BTreeMap::new(),
        }
    }
}

/// Queue exchange patterns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum QueuePattern {
    /// Request side of request/reply.
    #[default]
    #[serde(alias = "req")]
    Req,
    /// Reply side of request/reply.
    #[serde(alias = "rep")]
    Rep,
    /// Publisher.
    #[serde(alias = "pub")]
    Pub,
    /// Subscriber.
    #[serde(alias = "sub")]
    Sub,
    /// Pipeline producer.
    #[serde(alias = "push")]
    Push,
    /// Pipeline consumer.
    #[serde(alias = "pull")]
    Pull,
}

impl QueuePattern {
    /// Upper-case pattern name.
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Req => "REQ",
            Self::Rep => "REP",
            Self::Pub => "PUB",
            Self::Sub => "SUB",
            Self::Push => "PUSH",
            Self::Pull => "PULL",
        }
    }

    /// Patterns that may write messages.
    pub const fn can_send(&self) -> bool {
        matches!(self, Self::Req | Self::Rep | Self::Pub | Self::Push)
    }

    /// Patterns that may read messages.
    pub const fn can_receive(&self) -> bool {
        matches!(self, Self::Req | Self::Rep | Self::Sub | Self::Pull)
    }
}

impl fmt::Display for QueuePattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Framing parameter as written in configuration: a number or a string.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FrameParam {
    /// Frame length or prefix width.
    Number(u64),
    /// Delimiter, or a number written as a string.
    Text(String),
}

impl From<u64> for FrameParam {
    fn from(n: u64) -> Self {
        Self::Number(n)
    }
}

impl From<&str> for FrameParam {
    fn from(s: &str) -> Self {
        Self::Text(s.to_owned())
    }
}

/// Framing scheme names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FramingKind {
    /// Every frame has the same length.
    Fixed,
    /// Frames end with a delimiter.
    Delimited,
    /// Frames start with a big-endian length.
    LengthPrefixed,
}

/// Resolved framing for byte-stream transports.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Framing {
    /// Frames of exactly `length` bytes.
    Fixed {
        /// Frame length.
        length: usize,
    },
    /// Frames terminated by `delimiter`, which is not part of the payload.
    Delimited {
        /// Terminator bytes.
        delimiter: Bytes,
    },
    /// Frames preceded by a big-endian unsigned length of `width` bytes.
    LengthPrefixed {
        /// Prefix width: 1, 2, 4 or 8.
        width: usize,
    },
}

impl Framing {
    /// Resolves a framing kind and its optional parameter.
    ///
    /// `fixed` requires a positive length. `delimited` defaults to `"\n"` and
    /// understands the escapes `\n`, `\r`, `\t`, `\0` and `\\`.
    /// `length_prefixed` defaults to a 4-byte prefix.
    pub fn from_parts(kind: FramingKind, param: Option<&FrameParam>) -> ClientResult<Self> {
        match kind {
            FramingKind::Fixed => {
                let length = param
                    .ok_or_else(|| ClientError::config("fixed framing requires frame_param (frame length)"))
                    .and_then(numeric_param)?;
                if length == 0 {
                    return Err(ClientError::config("fixed frame length must be positive"));
                }
                Ok(Self::Fixed { length })
            }
            FramingKind::Delimited => {
                let delimiter = match param {
                    None => Bytes::from_static(b"\n"),
                    Some(FrameParam::Text(text)) => unescape(text),
                    Some(FrameParam::Number(n)) => {
                        return Err(ClientError::config(format!(
                            "delimiter must be a string, got {n}"
                        )));
                    }
                };
                if delimiter.is_empty() {
                    return Err(ClientError::config("delimiter must not be empty"));
                }
                Ok(Self::Delimited { delimiter })
            }
            FramingKind::LengthPrefixed => {
                let width = match param {
                    None => 4,
                    Some(p) => numeric_param(p)?,
                };
                if !matches!(width, 1 | 2 | 4 | 8) {
                    return Err(ClientError::config(format!(
                        "length prefix width must be 1, 2, 4 or 8 bytes, got {width}"
                    )));
                }
                Ok(Self::LengthPrefixed { width })
            }
        }
    }

    /// The framing kind.
    pub fn kind(&self) -> FramingKind {
        match self {
            Self::Fixed { .. } => FramingKind::Fixed,
            Self::Delimited { .. } => FramingKind::Delimited,
            Self::LengthPrefixed { .. } => FramingKind::LengthPrefixed,
        }
    }
}

fn numeric_param(param: &FrameParam) -> ClientResult<usize> {
    let n = match param {
        FrameParam::Number(n) => *n,
        FrameParam::Text(text) => text.trim().parse::<u64>().map_err(|_| {
            ClientError::config(format!("frame_param must be a number, got '{text}'"))
        })?,
    };
    usize::try_from(n).map_err(|_| ClientError::config(format!("frame_param {n} is too large")))
}

fn unescape(text: &str) -> Bytes {
    let mut out = Vec::with_capacity(text.len());
    let mut chars = text.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            let mut buf = [0u8; 4];
            out.extend_from_slice(c.encode_utf8(&mut buf).as_bytes());
            continue;
        }
        match chars.next() {
            Some('n') => out.push(b'\n'),
            Some('r') => out.push(b'\r'),
            Some('t') => out.push(b'\t'),
            Some('0') => out.push(0),
            Some('\\') => out.push(b'\\'),
            Some(other) => {
                out.push(b'\\');
                let mut buf = [0u8; 4];
                out.extend_from_slice(other.encode_utf8(&mut buf).as_bytes());
            }
            None => out.push(b'\\'),
        }
    }
    Bytes::from(out)
}

/// Settings recognized for the queue protocol.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct QueueSettings {
    /// Peer host, or the interface to bind (`*` for all).
    pub host: String,
    /// Peer port. Port 0 is allowed in bind mode and picks a free port.
    pub port: u16,
    /// Exchange pattern.
    #[serde(default)]
    pub pattern: QueuePattern,
    /// Per-call timeout.
    #[serde(default = "default_timeout", with = "seconds")]
    pub timeout: Duration,
    /// Payload format.
    #[serde(default)]
    pub format: MessageFormat,
    /// Bind instead of connecting.
    #[serde(default)]
    pub bind: bool,
    /// Topic prefixes subscribed on connect (SUB only).
    #[serde(default = "default_subscribe")]
    pub subscribe: Vec<String>,
    /// Optional framing inside each queue message.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub framing: Option<FramingKind>,
    /// Parameter for `framing`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub frame_param: Option<FrameParam>,
}

impl QueueSettings {
    /// Settings with defaults for everything but the endpoint and pattern.
    pub fn new(host: impl Into<String>, port: u16, pattern: QueuePattern) -> Self {
        Self {
            host: host.into(),
            port,
            pattern,
            timeout: DEFAULT_TIMEOUT,
            format: MessageFormat::Json,
            bind: false,
            subscribe: default_subscribe(),
            framing: None,
            frame_param: None,
        }
    }
}

/// Settings recognized for the socket protocol.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SocketSettings {
    /// Peer host.
    pub host: String,
    /// Peer port.
    pub port: u16,
    /// Framing scheme.
    pub framing: FramingKind,
    /// Frame length, delimiter or prefix width.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub frame_param: Option<FrameParam>,
    /// Per-call timeout.
    #[serde(default = "default_timeout", with = "seconds")]
    pub timeout: Duration,
    /// Payload format.
    #[serde(default)]
    pub format: MessageFormat,
    /// Largest frame accepted in either direction.
    #[serde(default = "default_max_frame_size")]
    pub max_frame_size: usize,
}

impl SocketSettings {
    /// Settings with defaults for everything but endpoint and framing.
    pub fn new(
        host: impl Into<String>,
        port: u16,
        framing: FramingKind,
        frame_param: Option<FrameParam>,
    ) -> Self {
        Self {
            host: host.into(),
            port,
            framing,
            frame_param,
            timeout: DEFAULT_TIMEOUT,
            format: MessageFormat::Json,
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
        }
    }
}

/// Typed settings for one protocol.
#[derive(Debug, Clone, PartialEq)]
pub enum ProtocolSettings {
    /// HTTP settings.
    Http(HttpSettings),
    /// Queue settings.
    Queue(QueueSettings),
    /// Socket settings.
    Socket(SocketSettings),
}

impl ProtocolSettings {
    /// Deserializes a merged settings map for `protocol`.
    ///
    /// Missing required keys, wrong types and unknown keys are config errors.
    pub fn from_value(protocol: Protocol, value: Value) -> ClientResult<Self> {
        let parsed = match protocol {
            Protocol::Http => serde_json::from_value(value).map(Self::Http),
            Protocol::Queue => serde_json::from_value(value).map(Self::Queue),
            Protocol::Socket => serde_json::from_value(value).map(Self::Socket),
        };
        parsed.map_err(|e| {
            ClientError::config(format!("invalid {protocol} settings: {e}")).with_protocol(protocol)
        })
    }

    /// The protocol these settings configure.
    pub fn protocol(&self) -> Protocol {
        match self {
            Self::Http(_) => Protocol::Http,
            Self::Queue(_) => Protocol::Queue,
            Self::Socket(_) => Protocol::Socket,
        }
    }
}

/// Validated, immutable connection settings for one (protocol, environment).
#[derive(Debug, Clone, PartialEq)]
pub struct ConnectionDescriptor {
    environment: String,
    settings: ProtocolSettings,
    target: String,
    framing: Option<Framing>,
}

impl ConnectionDescriptor {
    /// Validates settings and derives the target address and framing.
    pub fn new(environment: impl Into<String>, settings: ProtocolSettings) -> ClientResult<Self> {
        let protocol = settings.protocol();
        let fail = |msg: String| ClientError::config(msg).with_protocol(protocol);

        let (target, framing) = match &settings {
            ProtocolSettings::Http(http) => {
                let url = Url::parse(&http.base_url)
                    .map_err(|e| fail(format!("invalid base_url '{}': {e}", http.base_url)))?;
                if !matches!(url.scheme(), "http" | "https") || url.host_str().is_none() {
                    return Err(fail(format!(
                        "base_url must be an http(s) URL with a host, got '{}'",
                        http.base_url
                    )));
                }
                (http.base_url.clone(), None)
            }
            ProtocolSettings::Queue(queue) => {
                if queue.host.trim().is_empty() {
                    return Err(fail("queue host must not be empty".into()));
                }
                if queue.port == 0 && !queue.bind {
                    return Err(fail("queue port 0 is only valid in bind mode".into()));
                }
                let framing = match (&queue.framing, &queue.frame_param) {
                    (Some(kind), param) => Some(
                        Framing::from_parts(*kind, param.as_ref())
                            .map_err(|e| e.with_protocol(protocol))?,
                    ),
                    (None, Some(_)) => {
                        return Err(fail("frame_param given without framing".into()));
                    }
                    (None, None) => None,
                };
                let host = if queue.host == "*" { "0.0.0.0" } else { queue.host.as_str() };
                (format!("tcp://{}:{}", bracket_ipv6(host), queue.port), framing)
            }
            ProtocolSettings::Socket(socket) => {
                if socket.host.trim().is_empty() {
                    return Err(fail("socket host must not be empty".into()));
                }
                if socket.port == 0 {
                    return Err(fail("socket port must not be 0".into()));
                }
                if socket.max_frame_size == 0 {
                    return Err(fail("max_frame_size must be positive".into()));
                }
                let framing = Framing::from_parts(socket.framing, socket.frame_param.as_ref())
                    .map_err(|e| e.with_protocol(protocol))?;
                if let Framing::Fixed { length } = framing
                    && length > socket.max_frame_size
                {
                    return Err(fail(format!(
                        "fixed frame length {length} exceeds max_frame_size {}",
                        socket.max_frame_size
                    )));
                }
                (
                    format!("{}:{}", bracket_ipv6(&socket.host), socket.port),
                    Some(framing),
                )
            }
        };

        Ok(Self {
            environment: environment.into(),
            settings,
            target,
            framing,
        })
    }

    /// Protocol tag.
    pub fn protocol(&self) -> Protocol {
        self.settings.protocol()
    }

    /// Environment the descriptor was resolved for.
    pub fn environment(&self) -> &str {
        &self.environment
    }

    /// Target address: base URL, `tcp://host:port` or `host:port`.
    pub fn target(&self) -> &str {
        &self.target
    }

    /// Default timeout for every blocking operation.
    pub fn timeout(&self) -> Duration {
        match &self.settings {
            ProtocolSettings::Http(s) => s.timeout,
            ProtocolSettings::Queue(s) => s.timeout,
            ProtocolSettings::Socket(s) => s.timeout,
        }
    }

    /// Retry count (HTTP only).
    pub fn retries(&self) -> u32 {
        match &self.settings {
            ProtocolSettings::Http(s) => s.retries,
            _ => 0,
        }
    }

    /// Whether TLS certificates are verified.
    pub fn verify_tls(&self) -> bool {
        match &self.settings {
            ProtocolSettings::Http(s) => s.verify_ssl,
            _ => true,
        }
    }

    /// Payload format of message transports.
    pub fn format(&self) -> Option<MessageFormat> {
        match &self.settings {
            ProtocolSettings::Http(_) => None,
            ProtocolSettings::Queue(s) => Some(s.format),
            ProtocolSettings::Socket(s) => Some(s.format),
        }
    }

    /// Resolved framing, if any.
    pub fn framing(&self) -> Option<&Framing> {
        self.framing.as_ref()
    }

    /// Full typed settings.
    pub fn settings(&self) -> &ProtocolSettings {
        &self.settings
    }

    /// HTTP settings, if this is an HTTP descriptor.
    pub fn http(&self) -> Option<&HttpSettings> {
        match &self.settings {
            ProtocolSettings::Http(s) => Some(s),
            _ => None,
        }
    }

    /// Queue settings, if this is a queue descriptor.
    pub fn queue(&self) -> Option<&QueueSettings> {
        match &self.settings {
            ProtocolSettings::Queue(s) => Some(s),
            _ => None,
        }
    }

    /// Socket settings, if this is a socket descriptor.
    pub fn socket(&self) -> Option<&SocketSettings> {
        match &self.settings {
            ProtocolSettings::Socket(s) => Some(s),
            _ => None,
        }
    }
}

fn bracket_ipv6(host: &str) -> String {
    if host.contains(':') && !host.starts_with('[') {
        format!("[{host}]")
    } else {
        host.to_owned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ErrorKind;
    use serde_json::json;

    #[test]
    fn test_http_defaults() {
        let settings =
            ProtocolSettings::from_value(Protocol::Http, json!({"base_url": "https://x"})).unwrap();
        let ProtocolSettings::Http(http) = settings else {
            panic!("expected http settings");
        };
        assert_eq!(http.timeout, Duration::from_secs(30));
        assert!(http.verify_ssl);
        assert_eq!(http.retries, 0);
        assert_eq!(http.retry_strategy, RetryStrategy::Fixed);
    }

    #[test]
    fn test_unknown_key_rejected() {
        let err = ProtocolSettings::from_value(
            Protocol::Http,
            json!({"base_url": "https://x", "verify_tls": false}),
        )
        .unwrap_err();
        assert_eq!(err.kind, ErrorKind::Config);
        assert!(err.message.contains("verify_tls"));
    }

    #[test]
    fn test_missing_key_rejected() {
        let err = ProtocolSettings::from_value(Protocol::Socket, json!({"host": "localhost"}))
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::Config);
    }

    #[test]
    fn test_zero_timeout_rejected() {
        let err = ProtocolSettings::from_value(
            Protocol::Queue,
            json!({"host": "localhost", "port": 5555, "timeout": 0}),
        )
        .unwrap_err();
        assert!(err.message.contains("positive"));
    }

    #[test]
    fn test_fractional_timeout() {
        let settings = ProtocolSettings::from_value(
            Protocol::Queue,
            json!({"host": "localhost", "port": 5555, "timeout": 0.25, "pattern": "sub"}),
        )
        .unwrap();
        let ProtocolSettings::Queue(queue) = settings else {
            panic!("expected queue settings");
        };
        assert_eq!(queue.timeout, Duration::from_millis(250));
        assert_eq!(queue.pattern, QueuePattern::Sub);
        assert_eq!(queue.subscribe, vec![String::new()]);
    }

    #[test]
    fn test_framing_resolution() {
        assert_eq!(
            Framing::from_parts(FramingKind::Fixed, Some(&FrameParam::Number(16))).unwrap(),
            Framing::Fixed { length: 16 }
        );
        assert_eq!(
            Framing::from_parts(FramingKind::LengthPrefixed, None).unwrap(),
            Framing::LengthPrefixed { width: 4 }
        );
        assert_eq!(
            Framing::from_parts(FramingKind::LengthPrefixed, Some(&"2".into())).unwrap(),
            Framing::LengthPrefixed { width: 2 }
        );
        assert_eq!(
            Framing::from_parts(FramingKind::Delimited, None).unwrap(),
            Framing::Delimited {
                delimiter: Bytes::from_static(b"\n")
            }
        );
        assert_eq!(
            Framing::from_parts(FramingKind::Delimited, Some(&"\\r\\n".into())).unwrap(),
            Framing::Delimited {
                delimiter: Bytes::from_static(b"\r\n")
            }
        );
    }

    #[test]
    fn test_invalid_framing() {
        assert!(Framing::from_parts(FramingKind::Fixed, None).is_err());
        assert!(Framing::from_parts(FramingKind::Fixed, Some(&FrameParam::Number(0))).is_err());
        assert!(Framing::from_parts(FramingKind::LengthPrefixed, Some(&FrameParam::Number(3))).is_err());
        assert!(Framing::from_parts(FramingKind::Delimited, Some(&"".into())).is_err());
        assert!(Framing::from_parts(FramingKind::Fixed, Some(&"abc".into())).is_err());
    }

    #[test]
    fn test_descriptor_targets() {
        let http = ConnectionDescriptor::new(
            "dev",
            ProtocolSettings::Http(HttpSettings::new("http://localhost:8080/api")),
        )
        .unwrap();
        assert_eq!(http.protocol(), Protocol::Http);
        assert_eq!(http.target(), "http://localhost:8080/api");
        assert_eq!(http.environment(), "dev");

        let queue = ConnectionDescriptor::new(
            "dev",
            ProtocolSettings::Queue(QueueSettings::new("localhost", 5555, QueuePattern::Req)),
        )
        .unwrap();
        assert_eq!(queue.target(), "tcp://localhost:5555");
        assert!(queue.framing().is_none());

        let socket = ConnectionDescriptor::new(
            "dev",
            ProtocolSettings::Socket(SocketSettings::new(
                "::1",
                9000,
                FramingKind::LengthPrefixed,
                None,
            )),
        )
        .unwrap();
        assert_eq!(socket.target(), "[::1]:9000");
        assert_eq!(socket.framing(), Some(&Framing::LengthPrefixed { width: 4 }));
        assert_eq!(socket.format(), Some(MessageFormat::Json));
    }

    #[test]
    fn test_descriptor_validation() {
        let bad_url = ConnectionDescriptor::new(
            "dev",
            ProtocolSettings::Http(HttpSettings::new("ftp://example.com")),
        );
        assert_eq!(bad_url.unwrap_err().kind, ErrorKind::Config);

        let zero_port = ConnectionDescriptor::new(
            "dev",
            ProtocolSettings::Queue(QueueSettings::new("localhost", 0, QueuePattern::Req)),
        );
        assert!(zero_port.is_err());

        let mut bind = QueueSettings::new("*", 0, QueuePattern::Rep);
        bind.bind = true;
        let bound = ConnectionDescriptor::new("dev", ProtocolSettings::Queue(bind)).unwrap();
        assert_eq!(bound.target(), "tcp://0.0.0.0:0");
    }

    #[test]
    fn test_pattern_capabilities() {
        assert!(QueuePattern::Req.can_send() && QueuePattern::Req.can_receive());
        assert!(QueuePattern::Pub.can_send() && !QueuePattern::Pub.can_receive());
        assert!(!QueuePattern::Pull.can_send() && QueuePattern::Pull.can_receive());
    }
}
