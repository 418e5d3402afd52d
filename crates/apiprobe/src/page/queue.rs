//! Queue API page.

use std::time::Duration;

use apiprobe_core::{
    ClientResult, Payload, Protocol, ProtocolClient, QueuePattern, Request, Response,
};
use async_trait::async_trait;
use serde_json::{Value, json};
use tracing::debug;

use super::{PageObject, expect_protocol, reports_success, session_id_of};

/// Page over a queue adapter.
///
/// On REQ sessions domain methods are request/reply exchanges. Methods with
/// a native socket equivalent use it on the matching pattern instead:
/// `subscribe` on SUB, `publish` on PUB, `push_data` on PUSH and
/// `pull_data` on PULL.
#[derive(Debug)]
pub struct QueuePage {
    client: Box<dyn ProtocolClient>,
    pattern: QueuePattern,
    session_id: Option<String>,
    reply_timeout: Option<Duration>,
}

impl QueuePage {
    /// Wraps a queue adapter. Other protocols are a `Config` error.
    pub fn new(client: Box<dyn ProtocolClient>) -> ClientResult<Self> {
        expect_protocol(client.as_ref(), Protocol::Queue, "QueuePage")?;
        let pattern = client
            .descriptor()
            .queue()
            .map(|settings| settings.pattern)
            .unwrap_or_default();
        Ok(Self {
            client,
            pattern,
            session_id: None,
            reply_timeout: None,
        })
    }

    /// Overrides the descriptor timeout when waiting for replies.
    #[must_use]
    pub fn with_reply_timeout(mut self, timeout: Duration) -> Self {
        self.reply_timeout = Some(timeout);
        self
    }

    /// Exchange pattern of the wrapped session.
    pub fn pattern(&self) -> QueuePattern {
        self.pattern
    }

    /// Session id granted by the last successful handshake or login.
    pub fn session_id(&self) -> Option<&str> {
        self.session_id.as_deref()
    }

    /// Sends `{"type": "handshake", ...}`; stores the session id on success.
    pub async fn handshake(&mut self) -> ClientResult<Response> {
        let response = self
            .send_message(json!({"type": "handshake", "protocol": "TCP", "version": "1.0"}))
            .await?;
        self.remember_session(&response);
        Ok(response)
    }

    /// Sends one message and waits for the reply.
    pub async fn send_message(&mut self, message: impl Into<Payload>) -> ClientResult<Response> {
        self.client
            .exchange(Request::message(message), self.reply_timeout)
            .await
    }

    /// Sends one message without waiting for a reply.
    pub async fn send_without_reply(
        &mut self,
        message: impl Into<Payload>,
    ) -> ClientResult<Response> {
        self.client.send_request(Request::message(message)).await
    }

    /// Logs in; stores the session id on success.
    pub async fn login(&mut self, username: &str, password: &str) -> ClientResult<Response> {
        let response = self
            .send_message(json!({"type": "login", "username": username, "password": password}))
            .await?;
        self.remember_session(&response);
        Ok(response)
    }

    /// Logs out and forgets the session id.
    pub async fn logout(&mut self) -> ClientResult<Response> {
        let result = self
            .send_message(json!({"type": "logout", "session_id": self.session_id}))
            .await;
        self.session_id = None;
        result
    }

    /// Keep-alive round trip.
    pub async fn heartbeat(&mut self) -> ClientResult<Response> {
        self.send_message(json!({"type": "heartbeat", "session_id": self.session_id}))
            .await
    }

    /// Subscribes to `topic`.
    ///
    /// SUB sessions subscribe at socket level and return `None`; other
    /// patterns send a subscribe message and return the reply.
    pub async fn subscribe(&mut self, topic: &str) -> ClientResult<Option<Response>> {
        if self.pattern == QueuePattern::Sub {
            self.client.subscribe(topic).await?;
            return Ok(None);
        }
        self.send_message(json!({"type": "subscribe", "topic": topic, "session_id": self.session_id}))
            .await
            .map(Some)
    }

    /// Removes a subscription; same dispatch as [`subscribe`](Self::subscribe).
    pub async fn unsubscribe(&mut self, topic: &str) -> ClientResult<Option<Response>> {
        if self.pattern == QueuePattern::Sub {
            self.client.unsubscribe(topic).await?;
            return Ok(None);
        }
        self.send_message(
            json!({"type": "unsubscribe", "topic": topic, "session_id": self.session_id}),
        )
        .await
        .map(Some)
    }

    /// Publishes `message` under `topic`.
    ///
    /// PUB sessions send a `[topic, body]` message and return the send
    /// acknowledgement; other patterns send a publish request and return the reply.
    pub async fn publish(&mut self, topic: &str, message: Value) -> ClientResult<Response> {
        if self.pattern == QueuePattern::Pub {
            return self.client.send_request(Request::topic(topic, message)).await;
        }
        self.send_message(json!({
            "type": "publish",
            "topic": topic,
            "message": message,
            "session_id": self.session_id,
        }))
        .await
    }

    /// Requests a data set; `params` defaults to an empty object.
    pub async fn request_data(
        &mut self,
        data_type: &str,
        params: Option<Value>,
    ) -> ClientResult<Response> {
        self.send_message(json!({
            "type": "request",
            "data_type": data_type,
            "params": params.unwrap_or_else(|| json!({})),
            "session_id": self.session_id,
        }))
        .await
    }

    /// Pushes `data` to a work queue.
    ///
    /// PUSH sessions send `data` as-is; other patterns wrap it in a push
    /// request naming `queue`.
    pub async fn push_data(&mut self, data: Value, queue: &str) -> ClientResult<Response> {
        if self.pattern == QueuePattern::Push {
            return self.client.send_request(Request::message(data)).await;
        }
        self.send_message(json!({
            "type": "push",
            "queue": queue,
            "data": data,
            "session_id": self.session_id,
        }))
        .await
    }

    /// Pulls the next item of a work queue.
    ///
    /// PULL sessions receive directly; other patterns send a pull request.
    pub async fn pull_data(&mut self, queue: &str) -> ClientResult<Response> {
        if self.pattern == QueuePattern::Pull {
            return self.client.receive(self.reply_timeout).await;
        }
        self.send_message(json!({"type": "pull", "queue": queue, "session_id": self.session_id}))
            .await
    }

    fn remember_session(&mut self, response: &Response) {
        if reports_success(response) {
            self.session_id = session_id_of(response);
            debug!(session_id = ?self.session_id, "Queue session established");
        }
    }
}

#[async_trait]
impl PageObject for QueuePage {
    fn client(&self) -> &dyn ProtocolClient {
        self.client.as_ref()
    }

    fn client_mut(&mut self) -> &mut dyn ProtocolClient {
        self.client.as_mut()
    }

    /// Connects; REQ sessions also perform the handshake.
    async fn setup(&mut self) -> ClientResult<()> {
        self.client.connect().await?;
        if self.pattern == QueuePattern::Req {
            self.handshake().await?;
        }
        Ok(())
    }

    async fn teardown(&mut self) {
        self.session_id = None;
        self.client.close().await;
    }
}
