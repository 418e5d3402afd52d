//! Pattern-specific ZeroMQ sockets behind one type.

use std::fmt;

use apiprobe_core::{
    CallContext, ClientError, ClientResult, ErrorKind, QueuePattern, TransportFault,
};
use zeromq::{
    PubSocket, PullSocket, PushSocket, RepSocket, ReqSocket, Socket, SocketRecv, SocketSend,
    SubSocket, ZmqError, ZmqMessage,
};

pub(crate) enum QueueSocket {
    Req(ReqSocket),
    Rep(RepSocket),
    Pub(PubSocket),
    Sub(SubSocket),
    Push(PushSocket),
    Pull(PullSocket),
}

impl fmt::Debug for QueueSocket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("QueueSocket").field(&self.pattern()).finish()
    }
}

pub(crate) fn map_zmq_error(ctx: &CallContext, err: ZmqError) -> ClientError {
    match err {
        ZmqError::Network(io) => ctx.io(&io),
        other => ctx.transport(TransportFault::Other, other.to_string()),
    }
}

impl QueueSocket {
    pub(crate) fn new(pattern: QueuePattern) -> Self {
        match pattern {
            QueuePattern::Req => Self::Req(ReqSocket::new()),
            QueuePattern::Rep => Self::Rep(RepSocket::new()),
            QueuePattern::Pub => Self::Pub(PubSocket::new()),
            QueuePattern::Sub => Self::Sub(SubSocket::new()),
            QueuePattern::Push => Self::Push(PushSocket::new()),
            QueuePattern::Pull => Self::Pull(PullSocket::new()),
        }
    }

    pub(crate) fn pattern(&self) -> QueuePattern {
        match self {
            Self::Req(_) => QueuePattern::Req,
            Self::Rep(_) => QueuePattern::Rep,
            Self::Pub(_) => QueuePattern::Pub,
            Self::Sub(_) => QueuePattern::Sub,
            Self::Push(_) => QueuePattern::Push,
            Self::Pull(_) => QueuePattern::Pull,
        }
    }

    pub(crate) async fn connect(&mut self, endpoint: &str) -> Result<(), ZmqError> {
        match self {
            Self::Req(s) => s.connect(endpoint).await,
            Self::Rep(s) => s.connect(endpoint).await,
            Self::Pub(s) => s.connect(endpoint).await,
            Self::Sub(s) => s.connect(endpoint).await,
            Self::Push(s) => s.connect(endpoint).await,
            Self::Pull(s) => s.connect(endpoint).await,
        }
    }

    /// Binds and returns the resolved endpoint (with the real port when 0 was requested).
    pub(crate) async fn bind(&mut self, endpoint: &str) -> Result<String, ZmqError> {
        let bound = match self {
            Self::Req(s) => s.bind(endpoint).await,
            Self::Rep(s) => s.bind(endpoint).await,
            Self::Pub(s) => s.bind(endpoint).await,
            Self::Sub(s) => s.bind(endpoint).await,
            Self::Push(s) => s.bind(endpoint).await,
            Self::Pull(s) => s.bind(endpoint).await,
        }?;
        Ok(bound.to_string())
    }

    pub(crate) async fn send(&mut self, message: ZmqMessage, ctx: &CallContext) -> ClientResult<()> {
        let sent = match self {
            Self::Req(s) => s.send(message).await,
            Self::Rep(s) => s.send(message).await,
            Self::Pub(s) => s.send(message).await,
            Self::Push(s) => s.send(message).await,
            Self::Sub(_) | Self::Pull(_) => {
                return Err(ctx.fail(
                    ErrorKind::ProtocolViolation,
                    format!("{} sockets cannot send", self.pattern()),
                ));
            }
        };
        sent.map_err(|e| map_zmq_error(ctx, e))
    }

    pub(crate) async fn recv(&mut self, ctx: &CallContext) -> ClientResult<ZmqMessage> {
        let received = match self {
            Self::Req(s) => s.recv().await,
            Self::Rep(s) => s.recv().await,
            Self::Sub(s) => s.recv().await,
            Self::Pull(s) => s.recv().await,
            Self::Pub(_) | Self::Push(_) => {
                return Err(ctx.fail(
                    ErrorKind::ProtocolViolation,
                    format!("{} sockets cannot receive", self.pattern()),
                ));
            }
        };
        received.map_err(|e| map_zmq_error(ctx, e))
    }

    pub(crate) async fn subscribe(&mut self, topic: &str, ctx: &CallContext) -> ClientResult<()> {
        match self {
            Self::Sub(s) => s.subscribe(topic).await.map_err(|e| map_zmq_error(ctx, e)),
            _ => Err(self.not_subscriber(ctx, "subscribe")),
        }
    }

    pub(crate) async fn unsubscribe(&mut self, topic: &str, ctx: &CallContext) -> ClientResult<()> {
        match self {
            Self::Sub(s) => s.unsubscribe(topic).await.map_err(|e| map_zmq_error(ctx, e)),
            _ => Err(self.not_subscriber(ctx, "unsubscribe")),
        }
    }

    fn not_subscriber(&self, ctx: &CallContext, operation: &str) -> ClientError {
        ctx.fail(
            ErrorKind::ProtocolViolation,
            format!("{operation} requires a SUB session, this is {}", self.pattern()),
        )
    }

    /// Closes the socket, returning the errors reported while shutting down.
    pub(crate) async fn close(self) -> Vec<ZmqError> {
        match self {
            Self::Req(s) => s.close().await,
            Self::Rep(s) => s.close().await,
            Self::Pub(s) => s.close().await,
            Self::Sub(s) => s.close().await,
            Self::Push(s) => s.close().await,
            Self::Pull(s) => s.close().await,
        }
    }
}
