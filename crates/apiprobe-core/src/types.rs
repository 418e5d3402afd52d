//! Core client types.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ClientError;

/// Enumerates the protocols an adapter can speak.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    /// HTTP and HTTPS request/response.
    Http,
    /// Message queue sessions (ZeroMQ exchange patterns).
    Queue,
    /// Raw TCP byte streams with configurable framing.
    Socket,
}

impl Protocol {
    /// All protocols with a built-in adapter.
    pub const ALL: [Self; 3] = [Self::Http, Self::Queue, Self::Socket];

    /// Canonical lowercase name.
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Http => "http",
            Self::Queue => "queue",
            Self::Socket => "socket",
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Protocol {
    type Err = ClientError;

    /// Accepts the canonical names plus the aliases used in configuration
    /// files (`https`, `zmq`, `mq`, `tcp`), case-insensitively.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "http" | "https" => Ok(Self::Http),
            "queue" | "zmq" | "mq" => Ok(Self::Queue),
            "socket" | "tcp" => Ok(Self::Socket),
            _ => Err(ClientError::unsupported_protocol(s)),
        }
    }
}

/// Lifecycle state of a [`ClientSession`](crate::ClientSession).
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SessionState {
    /// No transport resource is held. Only `connect` may succeed.
    #[default]
    Closed,
    /// The transport is open and healthy.
    Open,
    /// The transport is still held but can no longer be trusted. Health checks
    /// report unhealthy until the session is closed and reconnected.
    Degraded {
        /// Why the session degraded.
        reason: String,
    },
}

impl SessionState {
    /// Returns `true` unless the session is closed.
    pub const fn is_open(&self) -> bool {
        !matches!(self, Self::Closed)
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Closed => write!(f, "closed"),
            Self::Open => write!(f, "open"),
            Self::Degraded { reason } => write!(f, "degraded: {reason}"),
        }
    }
}
