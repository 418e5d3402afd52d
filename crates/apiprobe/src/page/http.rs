//! User-management HTTP API page.

use std::collections::BTreeMap;

use apiprobe_core::{ClientResult, Protocol, ProtocolClient, Request, Response};
use async_trait::async_trait;
use serde_json::{Value, json};
use tracing::debug;

use super::{PageObject, expect_protocol};

const AUTHORIZATION: &str = "Authorization";

/// Page over an HTTP adapter.
///
/// Page-level headers (including the bearer token set by [`login`](Self::login))
/// are added to every request; headers set on an individual request win.
#[derive(Debug)]
pub struct HttpPage {
    client: Box<dyn ProtocolClient>,
    token: Option<String>,
    headers: BTreeMap<String, String>,
}

impl HttpPage {
    /// Wraps an HTTP adapter. Other protocols are a `Config` error.
    pub fn new(client: Box<dyn ProtocolClient>) -> ClientResult<Self> {
        expect_protocol(client.as_ref(), Protocol::Http, "HttpPage")?;
        Ok(Self {
            client,
            token: None,
            headers: BTreeMap::new(),
        })
    }

    /// Bearer token currently in use.
    pub fn token(&self) -> Option<&str> {
        self.token.as_deref()
    }

    /// Page-level headers.
    pub fn headers(&self) -> &BTreeMap<String, String> {
        &self.headers
    }

    /// Sends `Authorization: Bearer <token>` from now on.
    pub fn set_token(&mut self, token: impl Into<String>) {
        let token = token.into();
        self.headers
            .insert(AUTHORIZATION.to_owned(), format!("Bearer {token}"));
        self.token = Some(token);
    }

    /// Adds or replaces page-level headers.
    pub fn set_headers<I, K, V>(&mut self, headers: I)
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.headers
            .extend(headers.into_iter().map(|(k, v)| (k.into(), v.into())));
    }

    /// Sends `request` with page-level headers merged underneath its own.
    pub async fn send_request(&mut self, mut request: Request) -> ClientResult<Response> {
        for (name, value) in &self.headers {
            if request.metadata_value(name).is_none() {
                request.metadata.insert(name.clone(), value.clone());
            }
        }
        self.client.send_request(request).await
    }

    /// `POST /api/login`; keeps the returned `token` for later calls.
    pub async fn login(&mut self, username: &str, password: &str) -> ClientResult<Response> {
        let response = self
            .send_request(
                Request::post("/api/login")
                    .json(json!({"username": username, "password": password})),
            )
            .await?;
        if let Some(token) = response.field("token").and_then(Value::as_str) {
            debug!(username, "Login returned a token");
            self.set_token(token);
        }
        Ok(response)
    }

    /// `POST /api/logout`; forgets the token whatever the outcome.
    pub async fn logout(&mut self) -> ClientResult<Response> {
        let result = self.send_request(Request::post("/api/logout")).await;
        self.token = None;
        self.headers.remove(AUTHORIZATION);
        result
    }

    /// `GET /api/users/{id}`.
    pub async fn get_user_info(&mut self, user_id: &str) -> ClientResult<Response> {
        self.send_request(Request::get(format!("/api/users/{user_id}")))
            .await
    }

    /// `POST /api/users`.
    pub async fn create_user(&mut self, user: Value) -> ClientResult<Response> {
        self.send_request(Request::post("/api/users").json(user))
            .await
    }

    /// `PUT /api/users/{id}`.
    pub async fn update_user(&mut self, user_id: &str, user: Value) -> ClientResult<Response> {
        self.send_request(Request::put(format!("/api/users/{user_id}")).json(user))
            .await
    }

    /// `DELETE /api/users/{id}`.
    pub async fn delete_user(&mut self, user_id: &str) -> ClientResult<Response> {
        self.send_request(Request::delete(format!("/api/users/{user_id}")))
            .await
    }

    /// `GET /api/users/search` with query parameters.
    pub async fn search_users<I, K, V>(&mut self, params: I) -> ClientResult<Response>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let request = params
            .into_iter()
            .fold(Request::get("/api/users/search"), |request, (k, v)| {
                request.query(k, v)
            });
        self.send_request(request).await
    }
}

#[async_trait]
impl PageObject for HttpPage {
    fn client(&self) -> &dyn ProtocolClient {
        self.client.as_ref()
    }

    fn client_mut(&mut self) -> &mut dyn ProtocolClient {
        self.client.as_mut()
    }

    async fn teardown(&mut self) {
        self.token = None;
        self.headers.remove(AUTHORIZATION);
        self.client.close().await;
    }
}
