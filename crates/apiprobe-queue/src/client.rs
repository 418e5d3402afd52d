//! Queue adapter with per-pattern call discipline.

use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use apiprobe_core::{
    CallContext, ClientResult, ClientSession, ConnectionDescriptor, ErrorKind, Exchange,
    MessageFormat, Protocol, ProtocolClient, QueuePattern, Request, Response, ResultKind,
    SessionMetrics, SessionState,
};
use apiprobe_wire::{FrameCodec, decode_exact, encode_frame};
use async_trait::async_trait;
use bytes::Bytes;
use tokio::time::timeout;
use tracing::{debug, info, warn};
use zeromq::ZmqMessage;

use crate::socket::{QueueSocket, map_zmq_error};

/// Metadata key holding the topic frame of a multi-frame message.
pub const TOPIC_KEY: &str = "topic";

/// Which operation the session's pattern permits next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Turn {
    /// Sending is the only valid next step (REQ before a request, REP after a request).
    Send,
    /// Receiving is the only valid next step (REQ awaiting a reply, REP awaiting a request).
    Receive,
    /// No alternation: PUB/PUSH only send, SUB/PULL only receive.
    Free,
}

impl Turn {
    fn initial(pattern: QueuePattern) -> Self {
        match pattern {
            QueuePattern::Req => Self::Send,
            QueuePattern::Rep => Self::Receive,
            _ => Self::Free,
        }
    }
}

/// ZeroMQ client bound to one exchange pattern.
///
/// Request/reply sessions alternate strictly. Calls that would break the
/// alternation, or use a direction the pattern lacks, fail with
/// `ProtocolViolation` before any I/O. A receive timeout degrades the
/// session until it is closed and reconnected.
#[derive(Debug)]
pub struct QueueClient {
    descriptor: ConnectionDescriptor,
    pattern: QueuePattern,
    format: MessageFormat,
    bind: bool,
    subscriptions: Vec<String>,
    codec: Option<FrameCodec>,
    turn: Turn,
    bound_endpoint: Option<String>,
    session: ClientSession<QueueSocket>,
}

impl QueueClient {
    /// Creates a closed client for a queue descriptor.
    pub fn new(descriptor: ConnectionDescriptor) -> ClientResult<Self> {
        let settings = descriptor.queue().ok_or_else(|| {
            CallContext::start(Protocol::Queue, descriptor.target()).fail(
                ErrorKind::Config,
                format!("expected a queue descriptor, got {}", descriptor.protocol()),
            )
        })?;

        Ok(Self {
            pattern: settings.pattern,
            format: settings.format,
            bind: settings.bind,
            subscriptions: settings.subscribe.clone(),
            codec: descriptor.framing().cloned().map(FrameCodec::new),
            turn: Turn::initial(settings.pattern),
            bound_endpoint: None,
            descriptor,
            session: ClientSession::new(),
        })
    }

    /// Exchange pattern of this session.
    pub fn pattern(&self) -> QueuePattern {
        self.pattern
    }

    /// Next operation the pattern allows.
    pub fn turn(&self) -> Turn {
        self.turn
    }

    /// Endpoint actually bound in bind mode, with the resolved port.
    pub fn bound_endpoint(&self) -> Option<&str> {
        self.bound_endpoint.as_deref()
    }

    fn ctx(&self) -> CallContext {
        CallContext::start(Protocol::Queue, self.endpoint())
    }

    fn check_send(&self, ctx: &CallContext) -> ClientResult<()> {
        if !self.pattern.can_send() {
            return Err(ctx.fail(
                ErrorKind::ProtocolViolation,
                format!("{} sessions are receive-only", self.pattern),
            ));
        }
        if self.turn == Turn::Receive {
            return Err(ctx.fail(
                ErrorKind::ProtocolViolation,
                format!(
                    "{} session must receive before sending again",
                    self.pattern
                ),
            ));
        }
        Ok(())
    }

    fn check_receive(&self, ctx: &CallContext) -> ClientResult<()> {
        if !self.pattern.can_receive() {
            return Err(ctx.fail(
                ErrorKind::ProtocolViolation,
                format!("{} sessions are send-only", self.pattern),
            ));
        }
        if self.turn == Turn::Send {
            let message = match self.pattern {
                QueuePattern::Req => "REQ session must send a request before receiving",
                _ => "REP session must reply before receiving the next request",
            };
            return Err(ctx.fail(ErrorKind::ProtocolViolation, message));
        }
        Ok(())
    }

    fn advance(&mut self) {
        self.turn = match (self.pattern, self.turn) {
            (QueuePattern::Req | QueuePattern::Rep, Turn::Send) => Turn::Receive,
            (QueuePattern::Req | QueuePattern::Rep, Turn::Receive) => Turn::Send,
            (_, turn) => turn,
        };
    }

    /// Encodes a request into a message, returning it with its payload size.
    fn build_message(
        &mut self,
        request: &Request,
        ctx: &CallContext,
    ) -> ClientResult<(ZmqMessage, usize)> {
        let format = request.format.unwrap_or(self.format);
        let mut body = format
            .encode(&request.payload)
            .map_err(|e| ctx.stamp(e.into()))?;
        if let Some(codec) = self.codec.as_mut() {
            body = encode_frame(codec, body).map_err(|e| e.into_client_error(ctx))?;
        }

        let len = body.len();
        if self.pattern == QueuePattern::Pub && !request.target.is_empty() {
            let mut message = ZmqMessage::from(Bytes::from(request.target.clone()));
            message.push_back(body);
            Ok((message, len + request.target.len()))
        } else {
            Ok((ZmqMessage::from(body), len))
        }
    }

    fn parse_message(
        &mut self,
        message: ZmqMessage,
        latency: Duration,
        ctx: &CallContext,
    ) -> ClientResult<Response> {
        let mut frames = message.into_vec();
        let mut metadata = BTreeMap::new();
        let body = frames.pop().unwrap_or_default();
        if let Some(topic) = frames.first() {
            metadata.insert(
                TOPIC_KEY.to_string(),
                String::from_utf8_lossy(topic).into_owned(),
            );
        }
        if !frames.is_empty() {
            metadata.insert("frames".to_string(), (frames.len() + 1).to_string());
        }

        let body = match self.codec.as_mut() {
            Some(codec) => decode_exact(codec, &body).map_err(|e| e.into_client_error(ctx))?,
            None => body,
        };

        Ok(
            Response::new(Protocol::Queue, ResultKind::Success, Exchange::RoundTrip)
                .with_metadata(metadata)
                .with_body(body, Some(self.format))
                .with_latency(latency),
        )
    }

    /// Runs a subscription change under the session deadline.
    async fn change_subscription(&mut self, topic: &str, subscribe: bool) -> ClientResult<()> {
        let operation = if subscribe { "subscribe" } else { "unsubscribe" };
        let ctx = self.ctx();
        let limit = self.descriptor.timeout();
        let socket = self
            .session
            .handle_mut()
            .ok_or_else(|| ctx.not_connected(operation))?;
        let changed = if subscribe {
            timeout(limit, socket.subscribe(topic, &ctx)).await
        } else {
            timeout(limit, socket.unsubscribe(topic, &ctx)).await
        };
        match changed {
            Ok(result) => result,
            Err(_) => {
                warn!(
                    topic = %topic,
                    timeout_ms = limit.as_millis() as u64,
                    "Queue {operation} timed out, session degraded"
                );
                self.session
                    .mark_degraded(format!("{operation} timed out after {limit:?}"));
                Err(ctx.timeout(operation, limit))
            }
        }
    }
}

/// Binds or connects `socket` and applies the initial subscriptions.
async fn open_socket(
    socket: &mut QueueSocket,
    target: &str,
    bind: bool,
    subscriptions: &[String],
    limit: Duration,
    ctx: &CallContext,
) -> ClientResult<Option<String>> {
    let opened = if bind {
        timeout(limit, socket.bind(target))
            .await
            .map(|r| r.map(Some))
    } else {
        timeout(limit, socket.connect(target))
            .await
            .map(|r| r.map(|()| None))
    };
    let bound = match opened {
        Ok(Ok(bound)) => bound,
        Ok(Err(e)) => {
            let err = map_zmq_error(ctx, e);
            return Err(ctx.fail(ErrorKind::Connect, err.message));
        }
        Err(_) => return Err(ctx.timeout(if bind { "bind" } else { "connect" }, limit)),
    };

    if socket.pattern() == QueuePattern::Sub {
        for topic in subscriptions {
            timeout(limit, socket.subscribe(topic, ctx))
                .await
                .map_err(|_| ctx.timeout("subscribe", limit))??;
            debug!(topic = %topic, "Subscribed");
        }
    }
    Ok(bound)
}

/// Closes a socket that never became a session.
async fn discard(socket: QueueSocket, endpoint: &str, limit: Duration) {
    match timeout(limit, socket.close()).await {
        Ok(errors) => {
            for e in errors {
                debug!(endpoint = %endpoint, error = %e, "Error while discarding queue socket");
            }
        }
        Err(_) => warn!(endpoint = %endpoint, "Timed out discarding queue socket"),
    }
}

#[async_trait]
impl ProtocolClient for QueueClient {
    fn protocol(&self) -> Protocol {
        Protocol::Queue
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
            debug!(endpoint = %self.endpoint(), "Queue session already open");
            return Ok(());
        }

        let ctx = self.ctx();
        let limit = self.descriptor.timeout();
        let target = self.descriptor.target().to_owned();
        info!(
            protocol = "queue",
            pattern = %self.pattern,
            endpoint = %target,
            bind = self.bind,
            "Opening queue session"
        );

        let mut socket = QueueSocket::new(self.pattern);
        let opened = open_socket(
            &mut socket,
            &target,
            self.bind,
            &self.subscriptions,
            limit,
            &ctx,
        )
        .await;
        let bound = match opened {
            Ok(bound) => bound,
            Err(err) => {
                self.session.metrics_mut().failed_connections += 1;
                warn!(endpoint = %target, error = %err, "Queue session failed to open");
                discard(socket, &target, limit).await;
                return Err(err);
            }
        };

        self.bound_endpoint = bound;
        self.turn = Turn::initial(self.pattern);
        self.session.open(socket);
        info!(
            endpoint = %self.endpoint(),
            elapsed_ms = ctx.elapsed().as_millis() as u64,
            "Queue session opened"
        );
        Ok(())
    }

    async fn send_request(&mut self, request: Request) -> ClientResult<Response> {
        let ctx = self.ctx();
        if !self.session.is_open() {
            return Err(ctx.not_connected("send_request"));
        }
        ctx.ensure_protocol(&request)?;
        self.check_send(&ctx)?;

        let limit = request.timeout.unwrap_or_else(|| self.descriptor.timeout());
        let (message, len) = self.build_message(&request, &ctx)?;

        let socket = self
            .session
            .handle_mut()
            .ok_or_else(|| ctx.not_connected("send_request"))?;
        match timeout(limit, socket.send(message, &ctx)).await {
            Ok(Ok(())) => {
                self.advance();
                let latency = ctx.elapsed();
                let metrics = self.session.metrics_mut();
                metrics.record_sent(len);
                metrics.record_latency(latency);
                debug!(
                    request_id = %request.id,
                    pattern = %self.pattern,
                    topic = %request.target,
                    bytes = len,
                    "Queue message sent"
                );
                Ok(Response::sent(Protocol::Queue, request.id, latency))
            }
            Ok(Err(err)) => {
                warn!(error = %err, "Queue send failed, session degraded");
                self.session.mark_degraded(err.message.clone());
                Err(err)
            }
            Err(_) => {
                warn!(
                    timeout_ms = limit.as_millis() as u64,
                    "Queue send timed out, session degraded"
                );
                self.session.mark_degraded("send timed out");
                Err(ctx.timeout("send_request", limit))
            }
        }
    }

    async fn receive(&mut self, limit: Option<Duration>) -> ClientResult<Response> {
        let ctx = self.ctx();
        if !self.session.is_open() {
            return Err(ctx.not_connected("receive"));
        }
        self.check_receive(&ctx)?;

        let limit = limit.unwrap_or_else(|| self.descriptor.timeout());
        let socket = self
            .session
            .handle_mut()
            .ok_or_else(|| ctx.not_connected("receive"))?;
        let started = Instant::now();
        match timeout(limit, socket.recv(&ctx)).await {
            Ok(Ok(message)) => {
                self.advance();
                let latency = started.elapsed();
                let response = self.parse_message(message, latency, &ctx)?;
                let metrics = self.session.metrics_mut();
                metrics.record_received(response.body().len());
                metrics.record_latency(latency);
                debug!(
                    pattern = %self.pattern,
                    bytes = response.body().len(),
                    elapsed_ms = latency.as_millis() as u64,
                    "Queue message received"
                );
                Ok(response)
            }
            Ok(Err(err)) => {
                warn!(error = %err, "Queue receive failed, session degraded");
                self.session.mark_degraded(err.message.clone());
                Err(err)
            }
            Err(_) => {
                warn!(
                    pattern = %self.pattern,
                    timeout_ms = limit.as_millis() as u64,
                    "Queue receive timed out, session degraded"
                );
                self.session
                    .mark_degraded(format!("receive timed out after {limit:?}"));
                Err(ctx.timeout("receive", limit))
            }
        }
    }

    async fn close(&mut self) {
        let Some(socket) = self.session.take() else {
            debug!("Queue session already closed");
            return;
        };
        let endpoint = self.endpoint();
        self.bound_endpoint = None;
        self.turn = Turn::initial(self.pattern);
        match timeout(self.descriptor.timeout(), socket.close()).await {
            Ok(errors) if errors.is_empty() => {
                info!(endpoint = %endpoint, "Queue session closed");
            }
            Ok(errors) => {
                for e in errors {
                    warn!(endpoint = %endpoint, error = %e, "Error while closing queue session");
                }
            }
            Err(_) => warn!(endpoint = %endpoint, "Timed out closing queue session"),
        }
    }

    fn is_healthy(&self) -> bool {
        self.session.is_healthy()
    }

    async fn subscribe(&mut self, topic: &str) -> ClientResult<()> {
        self.change_subscription(topic, true).await?;
        if !self.subscriptions.iter().any(|t| t == topic) {
            self.subscriptions.push(topic.to_owned());
        }
        debug!(topic = %topic, "Subscribed");
        Ok(())
    }

    async fn unsubscribe(&mut self, topic: &str) -> ClientResult<()> {
        self.change_subscription(topic, false).await?;
        self.subscriptions.retain(|t| t != topic);
        debug!(topic = %topic, "Unsubscribed");
        Ok(())
    }

    fn endpoint(&self) -> String {
        self.bound_endpoint
            .clone()
            .unwrap_or_else(|| self.descriptor.target().to_owned())
    }
}

impl Drop for QueueClient {
    fn drop(&mut self) {
        if self.session.is_open() {
            warn!(
                endpoint = %self.endpoint(),
                "QueueClient dropped without close; socket released by drop"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use apiprobe_core::{ProtocolSettings, QueueSettings};

    fn client(pattern: QueuePattern) -> QueueClient {
        let settings = QueueSettings::new("127.0.0.1", 5555, pattern);
        QueueClient::new(ConnectionDescriptor::new("test", ProtocolSettings::Queue(settings)).unwrap())
            .unwrap()
    }

    #[test]
    fn test_initial_turns() {
        assert_eq!(client(QueuePattern::Req).turn(), Turn::Send);
        assert_eq!(client(QueuePattern::Rep).turn(), Turn::Receive);
        assert_eq!(client(QueuePattern::Pub).turn(), Turn::Free);
        assert_eq!(client(QueuePattern::Sub).turn(), Turn::Free);
    }

    #[test]
    fn test_req_alternation() {
        let mut req = client(QueuePattern::Req);
        let ctx = req.ctx();
        assert!(req.check_send(&ctx).is_ok());
        assert_eq!(
            req.check_receive(&ctx).unwrap_err().kind,
            ErrorKind::ProtocolViolation
        );

        req.advance();
        assert_eq!(req.turn(), Turn::Receive);
        assert_eq!(
            req.check_send(&ctx).unwrap_err().kind,
            ErrorKind::ProtocolViolation
        );
        assert!(req.check_receive(&ctx).is_ok());

        req.advance();
        assert_eq!(req.turn(), Turn::Send);
    }

    #[test]
    fn test_one_way_patterns() {
        let publisher = client(QueuePattern::Pub);
        let ctx = publisher.ctx();
        assert!(publisher.check_send(&ctx).is_ok());
        assert!(publisher.check_receive(&ctx).is_err());

        let puller = client(QueuePattern::Pull);
        assert!(puller.check_send(&ctx).is_err());
        assert!(puller.check_receive(&ctx).is_ok());
    }

    #[test]
    fn test_pub_topic_is_first_frame() {
        let mut publisher = client(QueuePattern::Pub);
        let ctx = publisher.ctx();
        let (message, len) = publisher
            .build_message(&Request::topic("orders", serde_json::json!({"id": 1})), &ctx)
            .unwrap();
        assert_eq!(len, 14);
        let frames = message.into_vec();
        assert_eq!(frames.len(), 2);
        assert_eq!(&frames[0][..], b"orders");
        assert_eq!(&frames[1][..], br#"{"id":1}"#);
    }

    #[test]
    fn test_sub_topic_metadata() {
        let mut subscriber = client(QueuePattern::Sub);
        let ctx = subscriber.ctx();
        let mut message = ZmqMessage::from(Bytes::from_static(b"orders"));
        message.push_back(Bytes::from_static(br#"{"id":1}"#));
        let response = subscriber
            .parse_message(message, Duration::ZERO, &ctx)
            .unwrap();
        assert_eq!(response.header(TOPIC_KEY), Some("orders"));
        assert_eq!(response.field("id"), Some(&serde_json::json!(1)));
    }

    #[tokio::test]
    async fn test_closed_session_not_connected() {
        let mut req = client(QueuePattern::Req);
        let err = req.send_request(Request::message("x")).await.unwrap_err();
        assert!(err.is_not_connected());
        let err = req.receive(None).await.unwrap_err();
        assert!(err.is_not_connected());
        let err = req.subscribe("t").await.unwrap_err();
        assert!(err.is_not_connected());
        req.close().await;
    }
}
