//! Session-oriented socket API page.

use std::time::Duration;

use apiprobe_core::{ClientResult, Payload, Protocol, ProtocolClient, Request, Response};
use async_trait::async_trait;
use serde_json::{Value, json};
use tracing::{debug, info};

use super::{PageObject, expect_protocol, reports_success, session_id_of};

/// Page over a socket adapter speaking a JSON message protocol.
///
/// Every domain method writes one frame and reads the reply frame.
/// `setup` connects and performs the handshake.
#[derive(Debug)]
pub struct SocketPage {
    client: Box<dyn ProtocolClient>,
    session_id: Option<String>,
    reply_timeout: Option<Duration>,
}

impl SocketPage {
    /// Wraps a socket adapter. Other protocols are a `Config` error.
    pub fn new(client: Box<dyn ProtocolClient>) -> ClientResult<Self> {
        expect_protocol(client.as_ref(), Protocol::Socket, "SocketPage")?;
        Ok(Self {
            client,
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

    /// Writes one message and waits for the reply.
    pub async fn send_message(&mut self, message: impl Into<Payload>) -> ClientResult<Response> {
        self.client
            .exchange(Request::message(message), self.reply_timeout)
            .await
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

    /// Asks the server to deliver messages for `topic`.
    pub async fn subscribe(&mut self, topic: &str) -> ClientResult<Response> {
        self.send_message(json!({"type": "subscribe", "topic": topic, "session_id": self.session_id}))
            .await
    }

    /// Cancels a topic subscription.
    pub async fn unsubscribe(&mut self, topic: &str) -> ClientResult<Response> {
        self.send_message(
            json!({"type": "unsubscribe", "topic": topic, "session_id": self.session_id}),
        )
        .await
    }

    /// Publishes `message` under `topic`.
    pub async fn publish(&mut self, topic: &str, message: Value) -> ClientResult<Response> {
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

    fn remember_session(&mut self, response: &Response) {
        if reports_success(response) {
            self.session_id = session_id_of(response);
            debug!(session_id = ?self.session_id, "Socket session established");
        }
    }
}

#[async_trait]
impl PageObject for SocketPage {
    fn client(&self) -> &dyn ProtocolClient {
        self.client.as_ref()
    }

    fn client_mut(&mut self) -> &mut dyn ProtocolClient {
        self.client.as_mut()
    }

    async fn setup(&mut self) -> ClientResult<()> {
        self.client.connect().await?;
        let response = self.handshake().await?;
        info!(
            endpoint = %self.client.endpoint(),
            accepted = reports_success(&response),
            "Socket page ready"
        );
        Ok(())
    }

    async fn teardown(&mut self) {
        self.session_id = None;
        self.client.close().await;
    }
}
