//! TCP socket adapter.

use std::time::{Duration, Instant};

use apiprobe_core::{
    CallContext, ClientError, ClientResult, ClientSession, ConnectionDescriptor, ErrorKind, Exchange, Framing,
    MessageFormat, Protocol, ProtocolClient, Request, Response, ResultKind, SessionMetrics,
    SessionState, TransportFault,
};
use apiprobe_wire::FrameCodec;
use async_trait::async_trait;
use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_util::codec::Framed;
use tracing::{debug, info, warn};

type FramedStream = Framed<TcpStream, FrameCodec>;

/// Raw TCP client with configurable framing.
///
/// `send_request` writes one frame and returns a send-only acknowledgement;
/// `receive` reads the next complete frame. Partial frames stay buffered
/// across `receive` calls, including calls that time out. A frame that fails
/// to decode poisons the read side: every later `receive` returns the same
/// error until the session is closed and reconnected.
#[derive(Debug)]
pub struct SocketClient {
    descriptor: ConnectionDescriptor,
    framing: Framing,
    format: MessageFormat,
    max_frame_size: usize,
    session: ClientSession<FramedStream>,
    read_failure: Option<ClientError>,
}

impl SocketClient {
    /// Creates a closed client for a socket descriptor.
    pub fn new(descriptor: ConnectionDescriptor) -> ClientResult<Self> {
        let ctx = CallContext::start(Protocol::Socket, descriptor.target());
        let settings = descriptor.socket().ok_or_else(|| {
            ctx.fail(
                ErrorKind::Config,
                format!("expected a socket descriptor, got {}", descriptor.protocol()),
            )
        })?;
        let framing = descriptor
            .framing()
            .cloned()
            .ok_or_else(|| ctx.fail(ErrorKind::Config, "socket framing missing"))?;

        Ok(Self {
            format: settings.format,
            max_frame_size: settings.max_frame_size,
            framing,
            descriptor,
            session: ClientSession::new(),
            read_failure: None,
        })
    }

    /// Bytes of an incomplete frame currently buffered.
    pub fn buffered(&self) -> usize {
        self.session
            .handle()
            .map_or(0, |framed| framed.read_buffer().len())
    }

    /// Local address of the open connection.
    pub fn local_addr(&self) -> Option<std::net::SocketAddr> {
        self.session
            .handle()
            .and_then(|framed| framed.get_ref().local_addr().ok())
    }

    fn ctx(&self) -> CallContext {
        CallContext::start(Protocol::Socket, self.descriptor.target())
    }
}

#[async_trait]
impl ProtocolClient for SocketClient {
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
        if self.session.is_open() {
            debug!(target_addr = %self.descriptor.target(), "Socket session already open");
            return Ok(());
        }

        let ctx = self.ctx();
        let limit = self.descriptor.timeout();
        info!(
            protocol = "socket",
            target_addr = %self.descriptor.target(),
            framing = ?self.framing.kind(),
            "Connecting to TCP endpoint"
        );

        let stream = match timeout(limit, TcpStream::connect(self.descriptor.target())).await {
            Ok(Ok(stream)) => stream,
            Ok(Err(e)) => {
                self.session.metrics_mut().failed_connections += 1;
                return Err(ctx.connect_io(&e));
            }
            Err(_) => {
                self.session.metrics_mut().failed_connections += 1;
                return Err(ctx.timeout("connect", limit));
            }
        };
        if let Err(e) = stream.set_nodelay(true) {
            debug!(error = %e, "Failed to set TCP_NODELAY");
        }

        let codec = FrameCodec::with_max_frame_size(self.framing.clone(), self.max_frame_size);
        self.read_failure = None;
        self.session.open(Framed::new(stream, codec));
        info!(
            target_addr = %self.descriptor.target(),
            elapsed_ms = ctx.elapsed().as_millis() as u64,
            "Socket session opened"
        );
        Ok(())
    }

    async fn send_request(&mut self, request: Request) -> ClientResult<Response> {
        let ctx = self.ctx();
        if !self.session.is_open() {
            return Err(ctx.not_connected("send_request"));
        }
        ctx.ensure_protocol(&request)?;

        let limit = request.timeout.unwrap_or_else(|| self.descriptor.timeout());
        let format = request.format.unwrap_or(self.format);
        let body = format
            .encode(&request.payload)
            .map_err(|e| ctx.stamp(e.into()))?;
        let len = body.len();

        let framed = self
            .session
            .handle_mut()
            .ok_or_else(|| ctx.not_connected("send_request"))?;
        // Framed::send flushes, looping over partial writes.
        match timeout(limit, framed.send(body)).await {
            Ok(Ok(())) => {
                let latency = ctx.elapsed();
                let metrics = self.session.metrics_mut();
                metrics.record_sent(len);
                metrics.record_latency(latency);
                debug!(
                    request_id = %request.id,
                    bytes = len,
                    elapsed_ms = latency.as_millis() as u64,
                    "Socket frame sent"
                );
                Ok(Response::sent(Protocol::Socket, request.id, latency))
            }
            Ok(Err(e)) => {
                if !e.is_payload_error() {
                    warn!(error = %e, "Socket write failed, session degraded");
                    self.session.mark_degraded(format!("write failed: {e}"));
                }
                Err(e.into_client_error(&ctx))
            }
            Err(_) => {
                warn!(
                    timeout_ms = limit.as_millis() as u64,
                    "Socket write timed out, session degraded"
                );
                self.session.mark_degraded("write timed out mid-frame");
                Err(ctx.timeout("send_request", limit))
            }
        }
    }

    async fn receive(&mut self, limit: Option<Duration>) -> ClientResult<Response> {
        let ctx = self.ctx();
        let limit = limit.unwrap_or_else(|| self.descriptor.timeout());
        let format = self.format;
        let framed = self
            .session
            .handle_mut()
            .ok_or_else(|| ctx.not_connected("receive"))?;
        // The undecodable bytes are still buffered and the stream has fused.
        if let Some(failure) = &self.read_failure {
            return Err(ctx.stamp(failure.clone()));
        }

        let started = Instant::now();
        match timeout(limit, framed.next()).await {
            Ok(Some(Ok(frame))) => {
                let latency = started.elapsed();
                let metrics = self.session.metrics_mut();
                metrics.record_received(frame.len());
                metrics.record_latency(latency);
                debug!(
                    bytes = frame.len(),
                    elapsed_ms = latency.as_millis() as u64,
                    "Socket frame received"
                );
                Ok(
                    Response::new(Protocol::Socket, ResultKind::Success, Exchange::RoundTrip)
                        .with_body(frame, Some(format))
                        .with_latency(latency),
                )
            }
            Ok(Some(Err(e))) => {
                let err = e.into_client_error(&ctx);
                warn!(error = %err, "Socket read failed, session degraded");
                self.session.mark_degraded(err.message.clone());
                self.read_failure = Some(err.clone());
                Err(err)
            }
            Ok(None) => {
                warn!(target_addr = %self.descriptor.target(), "Peer closed the connection");
                self.session.mark_degraded("peer closed the connection");
                Err(ctx.transport(TransportFault::Closed, "peer closed the connection"))
            }
            Err(_) => {
                debug!(
                    buffered = self.buffered(),
                    timeout_ms = limit.as_millis() as u64,
                    "Socket receive timed out"
                );
                Err(ctx.timeout("receive", limit))
            }
        }
    }

    async fn close(&mut self) {
        self.read_failure = None;
        let Some(mut framed) = self.session.take() else {
            debug!("Socket session already closed");
            return;
        };
        let flush = SinkExt::<Bytes>::close(&mut framed);
        match timeout(self.descriptor.timeout(), flush).await {
            Ok(Ok(())) => info!(target_addr = %self.descriptor.target(), "Socket session closed"),
            Ok(Err(e)) => warn!(error = %e, "Error while closing socket session"),
            Err(_) => warn!("Timed out flushing socket session on close"),
        }
    }

    fn is_healthy(&self) -> bool {
        self.session.is_healthy()
    }
}

impl Drop for SocketClient {
    fn drop(&mut self) {
        if self.session.is_open() {
            warn!(
                target_addr = %self.descriptor.target(),
                "SocketClient dropped without close; connection released by drop"
            );
        }
    }
}
