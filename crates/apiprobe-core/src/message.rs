//! Protocol-neutral request and response models.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::OnceLock;
use std::time::Duration;

use bytes::Bytes;
use http::Method;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::error::{BodyParseError, ClientError, ErrorKind};
use crate::format::MessageFormat;
use crate::types::Protocol;

/// Request or response payload before encoding.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Payload {
    /// No body.
    #[default]
    Empty,
    /// Opaque bytes sent as-is.
    Bytes(Bytes),
    /// UTF-8 text.
    Text(String),
    /// Structured body.
    Json(Value),
}

impl Payload {
    /// Returns `true` for [`Payload::Empty`].
    pub fn is_empty(&self) -> bool {
        matches!(self, Self::Empty)
    }
}

impl From<Value> for Payload {
    fn from(value: Value) -> Self {
        Self::Json(value)
    }
}

impl From<String> for Payload {
    fn from(text: String) -> Self {
        Self::Text(text)
    }
}

impl From<&str> for Payload {
    fn from(text: &str) -> Self {
        Self::Text(text.to_owned())
    }
}

impl From<Bytes> for Payload {
    fn from(raw: Bytes) -> Self {
        Self::Bytes(raw)
    }
}

impl From<Vec<u8>> for Payload {
    fn from(raw: Vec<u8>) -> Self {
        Self::Bytes(Bytes::from(raw))
    }
}

/// A single call issued through a [`ProtocolClient`](crate::ProtocolClient).
///
/// `target` is the HTTP path (or absolute URL) or the queue topic; socket
/// adapters ignore it. `metadata` holds HTTP headers, or message properties
/// on the other transports. A request is consumed by the call that sends it.
#[derive(Debug, Clone)]
pub struct Request {
    /// Correlation id, echoed on the response.
    pub id: Uuid,
    /// Protocol tag. Adapters reject requests tagged for another protocol.
    pub protocol: Option<Protocol>,
    /// HTTP method. Ignored by message transports.
    pub method: Option<Method>,
    /// Route, URL or topic.
    pub target: String,
    /// Body.
    pub payload: Payload,
    /// Headers or message properties.
    pub metadata: BTreeMap<String, String>,
    /// Query string parameters (HTTP only).
    pub query: Vec<(String, String)>,
    /// Overrides the session's message format.
    pub format: Option<MessageFormat>,
    /// Overrides the session's timeout for this call.
    pub timeout: Option<Duration>,
}

impl Request {
    fn blank() -> Self {
        Self {
            id: Uuid::new_v4(),
            protocol: None,
            method: None,
            target: String::new(),
            payload: Payload::Empty,
            metadata: BTreeMap::new(),
            query: Vec::new(),
            format: None,
            timeout: None,
        }
    }

    /// HTTP request with the given method and path.
    pub fn http(method: Method, path: impl Into<String>) -> Self {
        Self {
            protocol: Some(Protocol::Http),
            method: Some(method),
            target: path.into(),
            ..Self::blank()
        }
    }

    /// `GET` request.
    pub fn get(path: impl Into<String>) -> Self {
        Self::http(Method::GET, path)
    }

    /// `POST` request.
    pub fn post(path: impl Into<String>) -> Self {
        Self::http(Method::POST, path)
    }

    /// `PUT` request.
    pub fn put(path: impl Into<String>) -> Self {
        Self::http(Method::PUT, path)
    }

    /// `PATCH` request.
    pub fn patch(path: impl Into<String>) -> Self {
        Self::http(Method::PATCH, path)
    }

    /// `DELETE` request.
    pub fn delete(path: impl Into<String>) -> Self {
        Self::http(Method::DELETE, path)
    }

    /// Untargeted message for queue or socket transports.
    pub fn message(payload: impl Into<Payload>) -> Self {
        Self {
            payload: payload.into(),
            ..Self::blank()
        }
    }

    /// Message published under a topic.
    pub fn topic(topic: impl Into<String>, payload: impl Into<Payload>) -> Self {
        Self {
            target: topic.into(),
            payload: payload.into(),
            ..Self::blank()
        }
    }

    /// Sets a structured body.
    #[must_use]
    pub fn json(mut self, body: Value) -> Self {
        self.payload = Payload::Json(body);
        self
    }

    /// Sets a text body.
    #[must_use]
    pub fn text(mut self, body: impl Into<String>) -> Self {
        self.payload = Payload::Text(body.into());
        self
    }

    /// Sets a raw body.
    #[must_use]
    pub fn bytes(mut self, body: impl Into<Bytes>) -> Self {
        self.payload = Payload::Bytes(body.into());
        self
    }

    /// Adds a header or message property.
    #[must_use]
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(name.into(), value.into());
        self
    }

    /// Adds several headers.
    #[must_use]
    pub fn headers<I, K, V>(mut self, headers: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.metadata
            .extend(headers.into_iter().map(|(k, v)| (k.into(), v.into())));
        self
    }

    /// Appends a query parameter.
    #[must_use]
    pub fn query(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((name.into(), value.into()));
        self
    }

    /// Overrides the message format.
    #[must_use]
    pub fn format(mut self, format: MessageFormat) -> Self {
        self.format = Some(format);
        self
    }

    /// Overrides the timeout.
    #[must_use]
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Tags the request for a protocol.
    #[must_use]
    pub fn protocol(mut self, protocol: Protocol) -> Self {
        self.protocol = Some(protocol);
        self
    }

    /// Case-insensitive metadata lookup.
    pub fn metadata_value(&self, name: &str) -> Option<&str> {
        lookup(&self.metadata, name)
    }
}

/// Protocol-neutral outcome of a call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ResultKind {
    /// Transport succeeded and the peer reported success.
    Success,
    /// Transport succeeded but the peer reported failure (e.g. HTTP 4xx/5xx).
    Failure,
    /// The call exceeded its deadline.
    Timeout,
    /// The transport failed.
    TransportError,
}

impl fmt::Display for ResultKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Success => write!(f, "success"),
            Self::Failure => write!(f, "failure"),
            Self::Timeout => write!(f, "timeout"),
            Self::TransportError => write!(f, "transport-error"),
        }
    }
}

/// Whether a response carries a reply or only acknowledges a send.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Exchange {
    /// The response carries the peer's reply.
    RoundTrip,
    /// The payload was written; any reply must be fetched with `receive`.
    SendOnly,
}

/// Normalized result returned to test code.
///
/// Immutable once built. The structured body is decoded lazily on first
/// access and cached; a decode failure is exposed through
/// [`Response::body_parse_error`] and never hides the raw bytes.
#[derive(Debug, Clone)]
pub struct Response {
    request_id: Option<Uuid>,
    protocol: Protocol,
    kind: ResultKind,
    exchange: Exchange,
    status_code: Option<u16>,
    metadata: BTreeMap<String, String>,
    body: Bytes,
    body_format: Option<MessageFormat>,
    latency: Duration,
    error: Option<String>,
    parsed: OnceLock<Result<Option<Value>, BodyParseError>>,
}

impl Response {
    /// Starts a response for the given protocol.
    pub fn new(protocol: Protocol, kind: ResultKind, exchange: Exchange) -> Self {
        Self {
            request_id: None,
            protocol,
            kind,
            exchange,
            status_code: None,
            metadata: BTreeMap::new(),
            body: Bytes::new(),
            body_format: None,
            latency: Duration::ZERO,
            error: None,
            parsed: OnceLock::new(),
        }
    }

    /// Acknowledgement of a send-only call.
    pub fn sent(protocol: Protocol, request_id: Uuid, latency: Duration) -> Self {
        Self::new(protocol, ResultKind::Success, Exchange::SendOnly)
            .with_request_id(request_id)
            .with_latency(latency)
    }

    /// Converts a failed call into a response for assertion-style tests.
    pub fn from_error(protocol: Protocol, err: &ClientError) -> Self {
        let kind = match err.kind {
            ErrorKind::Timeout => ResultKind::Timeout,
            ErrorKind::Connect | ErrorKind::NotConnected | ErrorKind::Transport => {
                ResultKind::TransportError
            }
            _ => ResultKind::Failure,
        };
        let mut response = Self::new(err.protocol.unwrap_or(protocol), kind, Exchange::RoundTrip)
            .with_latency(err.elapsed);
        response.error = Some(err.to_string());
        response
    }

    /// Sets the correlation id.
    #[must_use]
    pub fn with_request_id(mut self, id: Uuid) -> Self {
        self.request_id = Some(id);
        self
    }

    /// Sets the protocol status code.
    #[must_use]
    pub fn with_status(mut self, status: u16) -> Self {
        self.status_code = Some(status);
        self
    }

    /// Sets metadata entries (HTTP headers, queue topic).
    #[must_use]
    pub fn with_metadata(mut self, metadata: BTreeMap<String, String>) -> Self {
        self.metadata = metadata;
        self
    }

    /// Sets the raw body and the format used to decode it.
    #[must_use]
    pub fn with_body(mut self, body: Bytes, format: Option<MessageFormat>) -> Self {
        self.body = body;
        self.body_format = format;
        self.parsed = OnceLock::new();
        self
    }

    /// Sets the latency.
    #[must_use]
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Correlation id of the originating request, when known.
    pub fn request_id(&self) -> Option<Uuid> {
        self.request_id
    }

    /// Originating protocol.
    pub fn protocol(&self) -> Protocol {
        self.protocol
    }

    /// Protocol-neutral outcome.
    pub fn kind(&self) -> ResultKind {
        self.kind
    }

    /// Round trip or send-only.
    pub fn exchange(&self) -> Exchange {
        self.exchange
    }

    /// Returns `true` for send-only acknowledgements.
    pub fn is_send_only(&self) -> bool {
        self.exchange == Exchange::SendOnly
    }

    /// Returns `true` when the outcome is [`ResultKind::Success`].
    pub fn is_success(&self) -> bool {
        self.kind == ResultKind::Success
    }

    /// Protocol status code (HTTP status).
    pub fn status_code(&self) -> Option<u16> {
        self.status_code
    }

    /// All metadata entries.
    pub fn metadata(&self) -> &BTreeMap<String, String> {
        &self.metadata
    }

    /// Case-insensitive metadata lookup.
    pub fn header(&self, name: &str) -> Option<&str> {
        lookup(&self.metadata, name)
    }

    /// Raw body bytes.
    pub fn body(&self) -> &Bytes {
        &self.body
    }

    /// Body as UTF-8, if it is valid UTF-8.
    pub fn text(&self) -> Option<&str> {
        std::str::from_utf8(&self.body).ok()
    }

    /// Structured body, decoded on first access.
    pub fn json(&self) -> Option<&Value> {
        self.parse().as_ref().ok().and_then(Option::as_ref)
    }

    /// Field of a structured object body.
    pub fn field(&self, key: &str) -> Option<&Value> {
        self.json().and_then(|body| body.get(key))
    }

    /// Decode failure of the structured body, if any.
    pub fn body_parse_error(&self) -> Option<&BodyParseError> {
        self.parse().as_ref().err()
    }

    /// Time spent in the call.
    pub fn latency(&self) -> Duration {
        self.latency
    }

    /// Error detail when the call failed.
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    /// Forces body decoding and returns the cached outcome.
    pub fn parse(&self) -> &Result<Option<Value>, BodyParseError> {
        self.parsed.get_or_init(|| match self.body_format {
            Some(format) => format.decode(&self.body),
            None => Ok(None),
        })
    }
}

fn lookup<'a>(map: &'a BTreeMap<String, String>, name: &str) -> Option<&'a str> {
    map.get(name).map(String::as_str).or_else(|| {
        map.iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    })
}
