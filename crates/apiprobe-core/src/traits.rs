//! The client contract every protocol adapter satisfies.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;

use crate::config::ConnectionDescriptor;
use crate::error::{CallContext, ClientResult, ErrorKind};
use crate::message::{Request, Response};
use crate::metrics::SessionMetrics;
use crate::types::{Protocol, SessionState};

/// Polymorphic capability set of a protocol adapter.
///
/// An adapter owns exactly one session. Every operation other than
/// [`connect`](Self::connect) fails with [`ErrorKind::NotConnected`] while the
/// session is closed; adapters never reconnect on their own.
///
/// All blocking operations are bounded by the descriptor's timeout or by an
/// explicit per-call timeout.
#[async_trait]
pub trait ProtocolClient: Send + fmt::Debug {
    /// Protocol spoken by this adapter.
    fn protocol(&self) -> Protocol;

    /// Descriptor the adapter was created with.
    fn descriptor(&self) -> &ConnectionDescriptor;

    /// Current session state.
    fn state(&self) -> SessionState;

    /// Snapshot of the session counters.
    fn metrics(&self) -> SessionMetrics;

    /// Opens the session.
    ///
    /// Idempotent: on an already open session this returns `Ok(())` without
    /// opening a second transport resource.
    async fn connect(&mut self) -> ClientResult<()>;

    /// Sends a request.
    ///
    /// HTTP performs the full round trip. Queue and socket adapters write the
    /// message and return a [`Exchange::SendOnly`](crate::Exchange::SendOnly)
    /// acknowledgement; the reply is read with [`receive`](Self::receive).
    async fn send_request(&mut self, request: Request) -> ClientResult<Response>;

    /// Waits up to `timeout` (or the descriptor timeout) for the next message.
    ///
    /// Expiry is reported as [`ErrorKind::Timeout`], distinct from transport
    /// failures.
    async fn receive(&mut self, timeout: Option<Duration>) -> ClientResult<Response>;

    /// Releases the session.
    ///
    /// Idempotent and infallible: transport close failures are logged.
    async fn close(&mut self);

    /// Non-blocking liveness probe. `false` when closed or degraded.
    fn is_healthy(&self) -> bool;

    /// Sends `request` and, when the adapter only acknowledged the send,
    /// waits for the reply.
    async fn exchange(
        &mut self,
        request: Request,
        timeout: Option<Duration>,
    ) -> ClientResult<Response> {
        let sent = self.send_request(request).await?;
        if sent.is_send_only() {
            self.receive(timeout).await
        } else {
            Ok(sent)
        }
    }

    /// Subscribes to a topic prefix. Only subscriber sessions support this.
    async fn subscribe(&mut self, topic: &str) -> ClientResult<()> {
        Err(CallContext::start(self.protocol(), self.endpoint()).fail(
            ErrorKind::ProtocolViolation,
            format!("subscribe('{topic}') is not supported by this session"),
        ))
    }

    /// Removes a topic subscription. Only subscriber sessions support this.
    async fn unsubscribe(&mut self, topic: &str) -> ClientResult<()> {
        Err(CallContext::start(self.protocol(), self.endpoint()).fail(
            ErrorKind::ProtocolViolation,
            format!("unsubscribe('{topic}') is not supported by this session"),
        ))
    }

    /// Address the session talks to.
    fn endpoint(&self) -> String {
        self.descriptor().target().to_owned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{FramingKind, ProtocolSettings, SocketSettings};
    use crate::message::{Exchange, ResultKind};
    use crate::session::ClientSession;
    use bytes::Bytes;

    fn _test_client_object(_c: &dyn ProtocolClient) {}

    /// Echoes the last sent payload back on receive.
    #[derive(Debug)]
    struct EchoClient {
        descriptor: ConnectionDescriptor,
        session: ClientSession<Vec<Bytes>>,
    }

    impl EchoClient {
        fn new() -> Self {
            let settings = SocketSettings::new("localhost", 7, FramingKind::Delimited, None);
            Self {
                descriptor: ConnectionDescriptor::new("test", ProtocolSettings::Socket(settings))
                    .unwrap(),
                session: ClientSession::new(),
            }
        }

        fn ctx(&self) -> CallContext {
            CallContext::start(Protocol::Socket, self.descriptor.target())
        }
    }

    #[async_trait]
    impl ProtocolClient for EchoClient {
        fn protocol(&self) -> Protocol {
            Protocol::Socket
        }

        fn descriptor(&self) -> &ConnectionDescriptor {
            &self.descriptor
        }

        fn state(&self) -> SessionState {
            self.session.state().clone()
        }

        fn metrics(&self) -> SessionMetrics {
            self.session.metrics().clone()
        }

        async fn connect(&mut self) -> ClientResult<()> {
            if !self.session.is_open() {
                self.session.open(Vec::new());
            }
            Ok(())
        }

        async fn send_request(&mut self, request: Request) -> ClientResult<Response> {
            let ctx = self.ctx();
            let queue = self
                .session
                .handle_mut()
                .ok_or_else(|| ctx.not_connected("send_request"))?;
            if let crate::Payload::Text(text) = request.payload {
                queue.push(Bytes::from(text));
            }
            Ok(Response::sent(Protocol::Socket, request.id, ctx.elapsed()))
        }

        async fn receive(&mut self, timeout: Option<Duration>) -> ClientResult<Response> {
            let ctx = self.ctx();
            let queue = self
                .session
                .handle_mut()
                .ok_or_else(|| ctx.not_connected("receive"))?;
            match queue.pop() {
                Some(body) => Ok(
                    Response::new(Protocol::Socket, ResultKind::Success, Exchange::RoundTrip)
                        .with_body(body, None),
                ),
                None => Err(ctx.timeout("receive", timeout.unwrap_or_default())),
            }
        }

        async fn close(&mut self) {
            self.session.take();
        }

        fn is_healthy(&self) -> bool {
            self.session.is_healthy()
        }
    }

    #[tokio::test]
    async fn test_exchange_follows_send_only_with_receive() {
        let mut client = EchoClient::new();
        client.connect().await.unwrap();
        client.connect().await.unwrap();
        assert_eq!(client.metrics().connections, 1);

        let reply = client.exchange(Request::message("ping"), None).await.unwrap();
        assert_eq!(reply.exchange(), Exchange::RoundTrip);
        assert_eq!(reply.text(), Some("ping"));
    }

    #[tokio::test]
    async fn test_operations_after_close_fail_not_connected() {
        let mut client = EchoClient::new();
        client.connect().await.unwrap();
        client.close().await;
        client.close().await;

        let err = client.send_request(Request::message("x")).await.unwrap_err();
        assert!(err.is_not_connected());
        let err = client.receive(None).await.unwrap_err();
        assert!(err.is_not_connected());
        assert!(!client.is_healthy());
    }

    #[tokio::test]
    async fn test_default_subscribe_is_protocol_violation() {
        let mut client = EchoClient::new();
        let err = client.subscribe("orders").await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::ProtocolViolation);
        assert_eq!(client.endpoint(), "localhost:7");
    }
}
