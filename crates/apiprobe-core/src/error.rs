//! Client error types.

use std::fmt;
use std::io;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::message::Request;
use crate::types::Protocol;

/// A specialized `Result` type for client operations.
pub type ClientResult<T> = std::result::Result<T, ClientError>;

/// The error taxonomy shared by every adapter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[non_exhaustive]
pub enum ErrorKind {
    /// The transport is unreachable (refused, DNS failure, bad address).
    Connect,
    /// An operation was attempted on a closed session.
    NotConnected,
    /// The operation exceeded its deadline.
    Timeout,
    /// The call discipline of the session was broken.
    ProtocolViolation,
    /// I/O failed mid-operation.
    Transport,
    /// A payload could not be decoded.
    BodyParse,
    /// No adapter exists for the requested protocol.
    UnsupportedProtocol,
    /// Configuration is missing or invalid.
    Config,
}

impl ErrorKind {
    /// Canonical name used in messages and logs.
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Connect => "ConnectError",
            Self::NotConnected => "NotConnected",
            Self::Timeout => "TimeoutError",
            Self::ProtocolViolation => "ProtocolViolation",
            Self::Transport => "TransportError",
            Self::BodyParse => "BodyParseError",
            Self::UnsupportedProtocol => "UnsupportedProtocol",
            Self::Config => "ConfigError",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Refines [`ErrorKind::Transport`] failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TransportFault {
    /// The peer reset or aborted the connection, or closed it mid-frame.
    ConnectionReset,
    /// Writing to a connection the peer already closed.
    BrokenPipe,
    /// The peer closed the connection cleanly.
    Closed,
    /// Any other I/O failure.
    Other,
}

impl fmt::Display for TransportFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ConnectionReset => write!(f, "ConnectionReset"),
            Self::BrokenPipe => write!(f, "BrokenPipe"),
            Self::Closed => write!(f, "Closed"),
            Self::Other => write!(f, "Other"),
        }
    }
}

/// Error returned by every fallible client operation.
///
/// Always carries the protocol, the target address and the elapsed time so a
/// failing test can be diagnosed from the error alone.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error(
    "{kind}{} ({}, after {}ms): {message}",
    fault_label(.fault),
    location_label(.protocol, .target),
    .elapsed.as_millis()
)]
pub struct ClientError {
    /// What went wrong.
    pub kind: ErrorKind,
    /// Protocol of the failing client, when known.
    pub protocol: Option<Protocol>,
    /// Target address (URL, endpoint or `host:port`).
    pub target: String,
    /// Time spent in the failing operation.
    pub elapsed: Duration,
    /// Human readable detail.
    pub message: String,
    /// Transport-level refinement for [`ErrorKind::Transport`].
    pub fault: Option<TransportFault>,
}

fn location_label(protocol: &Option<Protocol>, target: &str) -> String {
    let protocol = protocol.as_ref().map_or("-", Protocol::as_str);
    if target.is_empty() {
        protocol.to_owned()
    } else {
        format!("{protocol} {target}")
    }
}

fn fault_label(fault: &Option<TransportFault>) -> String {
    fault.map(|f| format!("/{f}")).unwrap_or_default()
}

impl ClientError {
    /// Creates an error with no protocol or target context.
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            protocol: None,
            target: String::new(),
            elapsed: Duration::ZERO,
            message: message.into(),
            fault: None,
        }
    }

    /// Unknown protocol identifier.
    pub fn unsupported_protocol(name: impl AsRef<str>) -> Self {
        Self::new(
            ErrorKind::UnsupportedProtocol,
            format!("unsupported protocol '{}'", name.as_ref()),
        )
    }

    /// Invalid or missing configuration.
    pub fn config(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Config, message)
    }

    /// Call discipline violation.
    pub fn protocol_violation(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::ProtocolViolation, message)
    }

    /// Sets the protocol.
    #[must_use]
    pub fn with_protocol(mut self, protocol: Protocol) -> Self {
        self.protocol = Some(protocol);
        self
    }

    /// Sets the target address.
    #[must_use]
    pub fn with_target(mut self, target: impl Into<String>) -> Self {
        self.target = target.into();
        self
    }

    /// Sets the elapsed time.
    #[must_use]
    pub fn with_elapsed(mut self, elapsed: Duration) -> Self {
        self.elapsed = elapsed;
        self
    }

    /// Sets the transport fault.
    #[must_use]
    pub fn with_fault(mut self, fault: TransportFault) -> Self {
        self.fault = Some(fault);
        self
    }

    /// Returns `true` for [`ErrorKind::Timeout`].
    pub fn is_timeout(&self) -> bool {
        self.kind == ErrorKind::Timeout
    }

    /// Returns `true` for [`ErrorKind::NotConnected`].
    pub fn is_not_connected(&self) -> bool {
        self.kind == ErrorKind::NotConnected
    }

    /// Returns `true` when the peer reset the connection.
    pub fn is_connection_reset(&self) -> bool {
        self.kind == ErrorKind::Transport && self.fault == Some(TransportFault::ConnectionReset)
    }
}

/// Non-fatal payload decode failure attached to a [`Response`](crate::Response).
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[error("body parse error: {message}")]
pub struct BodyParseError {
    /// Decoder message.
    pub message: String,
}

impl BodyParseError {
    /// Creates a new parse error.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl From<serde_json::Error> for BodyParseError {
    fn from(err: serde_json::Error) -> Self {
        Self::new(err.to_string())
    }
}

/// Per-call error context.
///
/// Adapters create one at the start of each operation so every error they
/// return is stamped with protocol, target and elapsed time.
#[derive(Debug, Clone)]
pub struct CallContext {
    protocol: Protocol,
    target: String,
    started: Instant,
}

impl CallContext {
    /// Starts timing a call.
    pub fn start(protocol: Protocol, target: impl Into<String>) -> Self {
        Self {
            protocol,
            target: target.into(),
            started: Instant::now(),
        }
    }

    /// Time since the call started.
    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    /// Builds an error of the given kind.
    pub fn fail(&self, kind: ErrorKind, message: impl Into<String>) -> ClientError {
        ClientError::new(kind, message)
            .with_protocol(self.protocol)
            .with_target(self.target.clone())
            .with_elapsed(self.elapsed())
    }

    /// Operation on a closed session.
    pub fn not_connected(&self, operation: &str) -> ClientError {
        self.fail(
            ErrorKind::NotConnected,
            format!("{operation} called on a closed session"),
        )
    }

    /// Deadline exceeded.
    pub fn timeout(&self, operation: &str, limit: Duration) -> ClientError {
        self.fail(
            ErrorKind::Timeout,
            format!("{operation} timed out after {limit:?}"),
        )
    }

    /// Transport failure with a fault refinement.
    pub fn transport(&self, fault: TransportFault, message: impl Into<String>) -> ClientError {
        self.fail(ErrorKind::Transport, message).with_fault(fault)
    }

    /// Re-stamps an error produced elsewhere (for example by a codec) with
    /// this call's context.
    pub fn stamp(&self, mut err: ClientError) -> ClientError {
        err.protocol = Some(self.protocol);
        if err.target.is_empty() {
            err.target.clone_from(&self.target);
        }
        err.elapsed = self.elapsed();
        err
    }

    /// Rejects requests tagged for another protocol.
    pub fn ensure_protocol(&self, request: &Request) -> ClientResult<()> {
        match request.protocol {
            Some(tagged) if tagged != self.protocol => Err(self.fail(
                ErrorKind::ProtocolViolation,
                format!("{tagged} request sent to a {} client", self.protocol),
            )),
            _ => Ok(()),
        }
    }

    /// Classifies an I/O error raised after the connection was established.
    pub fn io(&self, err: &io::Error) -> ClientError {
        use io::ErrorKind as Io;
        match err.kind() {
            Io::TimedOut | Io::WouldBlock => self.fail(ErrorKind::Timeout, err.to_string()),
            Io::ConnectionRefused | Io::NotFound | Io::AddrNotAvailable => {
                self.fail(ErrorKind::Connect, err.to_string())
            }
            Io::ConnectionReset | Io::ConnectionAborted | Io::UnexpectedEof => {
                self.transport(TransportFault::ConnectionReset, err.to_string())
            }
            Io::BrokenPipe => self.transport(TransportFault::BrokenPipe, err.to_string()),
            _ => self.transport(TransportFault::Other, err.to_string()),
        }
    }

    /// Classifies an I/O error raised while establishing the connection.
    pub fn connect_io(&self, err: &io::Error) -> ClientError {
        match err.kind() {
            io::ErrorKind::TimedOut => self.fail(ErrorKind::Timeout, err.to_string()),
            _ => self.fail(ErrorKind::Connect, err.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_carries_context() {
        let err = ClientError::new(ErrorKind::Connect, "connection refused")
            .with_protocol(Protocol::Socket)
            .with_target("127.0.0.1:9")
            .with_elapsed(Duration::from_millis(42));
        assert_eq!(
            err.to_string(),
            "ConnectError (socket 127.0.0.1:9, after 42ms): connection refused"
        );
    }

    #[test]
    fn test_display_without_protocol() {
        let err = ClientError::config("missing key 'base_url'");
        assert_eq!(
            err.to_string(),
            "ConfigError (-, after 0ms): missing key 'base_url'"
        );

        let err = ClientError::protocol_violation("double send").with_protocol(Protocol::Queue);
        assert_eq!(
            err.to_string(),
            "ProtocolViolation (queue, after 0ms): double send"
        );
    }

    #[test]
    fn test_connection_reset_distinct_from_timeout() {
        let ctx = CallContext::start(Protocol::Socket, "localhost:1");
        let reset = ctx.io(&io::Error::from(io::ErrorKind::ConnectionReset));
        assert!(reset.is_connection_reset());
        assert!(!reset.is_timeout());
        assert!(reset.to_string().contains("TransportError/ConnectionReset"));

        let timeout = ctx.io(&io::Error::from(io::ErrorKind::TimedOut));
        assert!(timeout.is_timeout());
        assert!(!timeout.is_connection_reset());
    }

    #[test]
    fn test_io_classification() {
        let ctx = CallContext::start(Protocol::Queue, "tcp://127.0.0.1:5555");
        assert_eq!(
            ctx.io(&io::Error::from(io::ErrorKind::BrokenPipe)).fault,
            Some(TransportFault::BrokenPipe)
        );
        assert_eq!(
            ctx.io(&io::Error::from(io::ErrorKind::UnexpectedEof)).fault,
            Some(TransportFault::ConnectionReset)
        );
        assert_eq!(
            ctx.io(&io::Error::from(io::ErrorKind::ConnectionRefused)).kind,
            ErrorKind::Connect
        );
        assert_eq!(
            ctx.connect_io(&io::Error::from(io::ErrorKind::PermissionDenied))
                .kind,
            ErrorKind::Connect
        );
    }

    #[test]
    fn test_ensure_protocol() {
        let ctx = CallContext::start(Protocol::Socket, "localhost:1");
        assert!(ctx.ensure_protocol(&Request::message("x")).is_ok());
        let err = ctx.ensure_protocol(&Request::get("/health")).unwrap_err();
        assert_eq!(err.kind, ErrorKind::ProtocolViolation);
        assert!(err.message.contains("http request sent to a socket client"));
    }

    #[test]
    fn test_stamp_keeps_existing_target() {
        let ctx = CallContext::start(Protocol::Http, "http://localhost");
        let err = ctx.stamp(ClientError::config("bad").with_target("elsewhere"));
        assert_eq!(err.protocol, Some(Protocol::Http));
        assert_eq!(err.target, "elsewhere");

        let err = ctx.stamp(ClientError::config("bad"));
        assert_eq!(err.target, "http://localhost");
    }
}
