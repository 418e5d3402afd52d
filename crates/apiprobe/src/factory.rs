//! Protocol → adapter dispatch.

use std::collections::HashMap;
use std::fmt;

use apiprobe_core::{ClientError, ClientResult, ConnectionDescriptor, Protocol, ProtocolClient};
use apiprobe_http::HttpClient;
use apiprobe_queue::QueueClient;
use apiprobe_socket::SocketClient;
use tracing::debug;

/// Builds a closed adapter from a resolved descriptor.
pub type ClientConstructor = fn(ConnectionDescriptor) -> ClientResult<Box<dyn ProtocolClient>>;

fn http_client(descriptor: ConnectionDescriptor) -> ClientResult<Box<dyn ProtocolClient>> {
    Ok(Box::new(HttpClient::new(descriptor)?))
}

fn queue_client(descriptor: ConnectionDescriptor) -> ClientResult<Box<dyn ProtocolClient>> {
    Ok(Box::new(QueueClient::new(descriptor)?))
}

fn socket_client(descriptor: ConnectionDescriptor) -> ClientResult<Box<dyn ProtocolClient>> {
    Ok(Box::new(SocketClient::new(descriptor)?))
}

/// Explicit protocol → constructor mapping.
///
/// Each factory owns its own mapping; there is no process-wide registry.
/// Adapters are returned closed; callers (usually a page object) connect them.
#[derive(Clone)]
pub struct ClientFactory {
    constructors: HashMap<Protocol, ClientConstructor>,
}

impl fmt::Debug for ClientFactory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut protocols: Vec<_> = self.constructors.keys().collect();
        protocols.sort();
        f.debug_struct("ClientFactory")
            .field("protocols", &protocols)
            .finish()
    }
}

impl Default for ClientFactory {
    fn default() -> Self {
        Self::new()
    }
}

impl ClientFactory {
    /// Factory with the built-in HTTP, queue and socket adapters.
    pub fn new() -> Self {
        Self::empty()
            .with_constructor(Protocol::Http, http_client)
            .with_constructor(Protocol::Queue, queue_client)
            .with_constructor(Protocol::Socket, socket_client)
    }

    /// Factory with no mappings.
    pub fn empty() -> Self {
        Self {
            constructors: HashMap::new(),
        }
    }

    /// Maps `protocol` to `constructor`, replacing any previous mapping.
    #[must_use]
    pub fn with_constructor(mut self, protocol: Protocol, constructor: ClientConstructor) -> Self {
        self.constructors.insert(protocol, constructor);
        self
    }

    /// Whether a constructor is mapped for `protocol`.
    pub fn supports(&self, protocol: Protocol) -> bool {
        self.constructors.contains_key(&protocol)
    }

    /// Creates the adapter for `protocol`.
    ///
    /// Unknown or unmapped protocol names fail with `UnsupportedProtocol`; a
    /// descriptor resolved for a different protocol fails with `Config`.
    pub fn create(
        &self,
        protocol: &str,
        descriptor: ConnectionDescriptor,
    ) -> ClientResult<Box<dyn ProtocolClient>> {
        let protocol: Protocol = protocol.parse()?;
        if descriptor.protocol() != protocol {
            return Err(ClientError::config(format!(
                "descriptor for {} cannot build a {protocol} client",
                descriptor.protocol()
            ))
            .with_protocol(protocol)
            .with_target(descriptor.target()));
        }
        self.create_for(descriptor)
    }

    /// Creates the adapter matching the descriptor's own protocol.
    pub fn create_for(
        &self,
        descriptor: ConnectionDescriptor,
    ) -> ClientResult<Box<dyn ProtocolClient>> {
        let protocol = descriptor.protocol();
        let constructor = self
            .constructors
            .get(&protocol)
            .ok_or_else(|| ClientError::unsupported_protocol(protocol.as_str()))?;
        debug!(
            protocol = %protocol,
            target_addr = %descriptor.target(),
            environment = %descriptor.environment(),
            "Creating client"
        );
        constructor(descriptor)
    }
}
