//! HTTP adapter over reqwest.

use std::collections::BTreeMap;
use std::time::Duration;

use apiprobe_core::{
    CallContext, ClientError, ClientResult, ClientSession, ConnectionDescriptor, ErrorKind,
    Exchange, HttpSettings, MessageFormat, Payload, Protocol, ProtocolClient, Request, Response,
    ResultKind, SessionMetrics, SessionState, TransportFault,
};
use async_trait::async_trait;
use bytes::Bytes;
use reqwest::header::{self, HeaderMap, HeaderName, HeaderValue};
use tracing::{debug, info, warn};
use url::Url;

use crate::retry::RetryPolicy;

/// HTTP client adapter.
///
/// `send_request` performs a full round trip. HTTP error statuses come back
/// as `Failure` responses carrying the status, never as errors; only
/// connect-phase transport failures are retried.
#[derive(Debug)]
pub struct HttpClient {
    descriptor: ConnectionDescriptor,
    settings: HttpSettings,
    retry: RetryPolicy,
    session: ClientSession<reqwest::Client>,
}

impl HttpClient {
    /// Creates a closed client for an HTTP descriptor.
    pub fn new(descriptor: ConnectionDescriptor) -> ClientResult<Self> {
        let settings = descriptor.http().cloned().ok_or_else(|| {
            CallContext::start(Protocol::Http, descriptor.target()).fail(
                ErrorKind::Config,
                format!("expected an http descriptor, got {}", descriptor.protocol()),
            )
        })?;

        Ok(Self {
            retry: RetryPolicy::from_settings(&settings),
            settings,
            descriptor,
            session: ClientSession::new(),
        })
    }

    /// Retry policy applied to connect-phase failures.
    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry
    }

    /// Replaces the retry policy derived from the descriptor.
    #[must_use]
    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Resolves a request target against the base URL.
    ///
    /// Absolute `http(s)://` targets pass through; relative paths are joined
    /// with exactly one `/`.
    pub fn resolve_url(&self, target: &str) -> Result<Url, url::ParseError> {
        if target.starts_with("http://") || target.starts_with("https://") {
            return Url::parse(target);
        }
        let base = self.settings.base_url.trim_end_matches('/');
        let path = target.trim_start_matches('/');
        if path.is_empty() {
            Url::parse(base)
        } else {
            Url::parse(&format!("{base}/{path}"))
        }
    }

    fn default_headers(&self) -> HeaderMap {
        let mut headers = HeaderMap::new();
        for (key, value) in &self.settings.headers {
            match (
                HeaderName::from_bytes(key.as_bytes()),
                HeaderValue::from_str(value),
            ) {
                (Ok(k), Ok(v)) => {
                    headers.insert(k, v);
                }
                _ => warn!(header = %key, "Skipping invalid default header"),
            }
        }
        headers
    }

    fn build_request(
        &self,
        client: &reqwest::Client,
        request: &Request,
        ctx: &CallContext,
    ) -> ClientResult<reqwest::Request> {
        let mut url = self.resolve_url(&request.target).map_err(|e| {
            ctx.fail(
                ErrorKind::Config,
                format!("invalid request target {:?}: {e}", request.target),
            )
        })?;
        if !request.query.is_empty() {
            url.query_pairs_mut().extend_pairs(&request.query);
        }

        let mut headers = HeaderMap::new();
        for (key, value) in &request.metadata {
            let name = HeaderName::from_bytes(key.as_bytes())
                .map_err(|e| ctx.fail(ErrorKind::Config, format!("invalid header {key:?}: {e}")))?;
            let value = HeaderValue::from_str(value).map_err(|e| {
                ctx.fail(ErrorKind::Config, format!("invalid value for header {key:?}: {e}"))
            })?;
            headers.insert(name, value);
        }

        let body = match &request.payload {
            Payload::Empty => None,
            Payload::Json(value) => {
                if !headers.contains_key(header::CONTENT_TYPE) {
                    headers.insert(
                        header::CONTENT_TYPE,
                        HeaderValue::from_static("application/json"),
                    );
                }
                let encoded = serde_json::to_vec(value).map_err(|e| {
                    ctx.fail(ErrorKind::Config, format!("unserializable JSON body: {e}"))
                })?;
                Some(Bytes::from(encoded))
            }
            Payload::Text(text) => Some(Bytes::from(text.clone())),
            Payload::Bytes(raw) => Some(raw.clone()),
        };

        let method = request.method.clone().ok_or_else(|| {
            ctx.fail(
                ErrorKind::ProtocolViolation,
                "HTTP requests need a method; build them with Request::get/post/...",
            )
        })?;
        let mut builder = client.request(method, url).headers(headers);
        if let Some(limit) = request.timeout {
            builder = builder.timeout(limit);
        }
        if let Some(body) = body {
            builder = builder.body(body);
        }
        builder
            .build()
            .map_err(|e| ctx.fail(ErrorKind::Config, format!("invalid request: {e}")))
    }

    async fn execute_with_retry(
        &mut self,
        client: &reqwest::Client,
        prepared: reqwest::Request,
        ctx: &CallContext,
    ) -> ClientResult<reqwest::Response> {
        let limit = prepared.timeout().copied().unwrap_or(self.settings.timeout);
        let mut attempt = 0u32;
        loop {
            let next = prepared.try_clone().ok_or_else(|| {
                ctx.fail(ErrorKind::Config, "request body cannot be replayed")
            })?;
            match client.execute(next).await {
                Ok(response) => return Ok(response),
                Err(e) if e.is_connect() => {
                    self.session.metrics_mut().failed_connections += 1;
                    let Some(delay) = self.retry.delay(attempt) else {
                        return Err(ctx.fail(
                            ErrorKind::Connect,
                            format!("{} after {} attempt(s)", describe(&e), attempt + 1),
                        ));
                    };
                    attempt += 1;
                    warn!(
                        attempt,
                        max_retries = self.retry.max_retries(),
                        delay_ms = delay.as_millis() as u64,
                        error = %describe(&e),
                        "HTTP connect failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => return Err(map_reqwest_error(ctx, &e, limit)),
            }
        }
    }
}

/// Error text including the innermost source, which carries the OS reason.
fn describe(err: &reqwest::Error) -> String {
    let mut message = err.to_string();
    let mut source = std::error::Error::source(err);
    while let Some(inner) = source {
        message = format!("{message}: {inner}");
        source = std::error::Error::source(inner);
    }
    message
}

fn map_reqwest_error(ctx: &CallContext, err: &reqwest::Error, limit: Duration) -> ClientError {
    if err.is_timeout() {
        ctx.timeout("send_request", limit)
    } else if err.is_connect() {
        ctx.fail(ErrorKind::Connect, describe(err))
    } else if err.is_builder() {
        ctx.fail(ErrorKind::Config, describe(err))
    } else {
        ctx.transport(TransportFault::Other, describe(err))
    }
}

fn header_map(headers: &HeaderMap) -> BTreeMap<String, String> {
    let mut map: BTreeMap<String, String> = BTreeMap::new();
    for (name, value) in headers {
        let value = String::from_utf8_lossy(value.as_bytes());
        map.entry(name.as_str().to_owned())
            .and_modify(|existing| {
                existing.push_str(", ");
                existing.push_str(&value);
            })
            .or_insert_with(|| value.into_owned());
    }
    map
}

#[async_trait]
impl ProtocolClient for HttpClient {
    fn protocol(&self) -> Protocol {
        Protocol::Http
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

    /// Builds the connection pool. No request is sent.
    async fn connect(&mut self) -> ClientResult<()> {
        if self.session.is_open() {
            debug!(base_url = %self.settings.base_url, "HTTP session already open");
            return Ok(());
        }

        let ctx = CallContext::start(Protocol::Http, self.descriptor.target());
        // use_rustls_tls() pins the backend even if another dependency enables native-tls.
        let mut builder = reqwest::Client::builder()
            .use_rustls_tls()
            .timeout(self.settings.timeout)
            .user_agent(format!("apiprobe/{}", env!("CARGO_PKG_VERSION")))
            .default_headers(self.default_headers());

        if !self.settings.verify_ssl {
            warn!(
                base_url = %self.settings.base_url,
                "TLS certificate verification is disabled for this session"
            );
            builder = builder.danger_accept_invalid_certs(true);
        }

        let client = builder.build().map_err(|e| {
            self.session.metrics_mut().failed_connections += 1;
            ctx.fail(ErrorKind::Connect, format!("failed to build HTTP client: {}", describe(&e)))
        })?;
        self.session.open(client);
        info!(
            protocol = "http",
            base_url = %self.settings.base_url,
            retries = self.retry.max_retries(),
            "HTTP session opened"
        );
        Ok(())
    }

    async fn send_request(&mut self, request: Request) -> ClientResult<Response> {
        let ctx = CallContext::start(Protocol::Http, self.descriptor.target());
        let client = self
            .session
            .handle()
            .cloned()
            .ok_or_else(|| ctx.not_connected("send_request"))?;
        ctx.ensure_protocol(&request)?;

        let prepared = self.build_request(&client, &request, &ctx)?;
        let ctx = CallContext::start(Protocol::Http, prepared.url().as_str());
        let sent_bytes = prepared
            .body()
            .and_then(|b| b.as_bytes())
            .map_or(0, <[u8]>::len);
        let method = prepared.method().clone();
        let limit = prepared.timeout().copied().unwrap_or(self.settings.timeout);
        debug!(
            request_id = %request.id,
            method = %method,
            url = %prepared.url(),
            "Sending HTTP request"
        );

        let response = self.execute_with_retry(&client, prepared, &ctx).await?;
        let status = response.status();
        let metadata = header_map(response.headers());
        let is_json = metadata
            .get("content-type")
            .is_some_and(|ct| ct.to_ascii_lowercase().contains("json"));
        let body = response
            .bytes()
            .await
            .map_err(|e| map_reqwest_error(&ctx, &e, limit))?;
        let latency = ctx.elapsed();

        let metrics = self.session.metrics_mut();
        metrics.record_sent(sent_bytes);
        metrics.record_received(body.len());
        metrics.record_latency(latency);

        let kind = if status.is_client_error() || status.is_server_error() {
            ResultKind::Failure
        } else {
            ResultKind::Success
        };
        let normalized = Response::new(Protocol::Http, kind, Exchange::RoundTrip)
            .with_request_id(request.id)
            .with_status(status.as_u16())
            .with_metadata(metadata)
            .with_body(body, is_json.then_some(MessageFormat::Json))
            .with_latency(latency);
        if let Err(e) = normalized.parse() {
            debug!(request_id = %request.id, error = %e, "Response body is not valid JSON");
        }

        debug!(
            request_id = %request.id,
            method = %method,
            status = status.as_u16(),
            elapsed_ms = latency.as_millis() as u64,
            "HTTP response received"
        );
        Ok(normalized)
    }

    /// HTTP replies arrive with `send_request`; there is nothing to receive.
    async fn receive(&mut self, _timeout: Option<Duration>) -> ClientResult<Response> {
        let ctx = CallContext::start(Protocol::Http, self.descriptor.target());
        if !self.session.is_open() {
            return Err(ctx.not_connected("receive"));
        }
        Err(ctx.fail(
            ErrorKind::ProtocolViolation,
            "HTTP responses are returned by send_request",
        ))
    }

    async fn close(&mut self) {
        if self.session.take().is_some() {
            info!(base_url = %self.settings.base_url, "HTTP session closed");
        } else {
            debug!("HTTP session already closed");
        }
    }

    fn is_healthy(&self) -> bool {
        self.session.is_healthy()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use apiprobe_core::ProtocolSettings;
    use reqwest::Method;

    fn client(base_url: &str) -> HttpClient {
        HttpClient::new(
            ConnectionDescriptor::new("test", ProtocolSettings::Http(HttpSettings::new(base_url)))
                .unwrap(),
        )
        .unwrap()
    }

    #[test]
    fn test_url_join_uses_one_slash() {
        let c = client("http://api.local/v1/");
        assert_eq!(
            c.resolve_url("/users").unwrap().as_str(),
            "http://api.local/v1/users"
        );
        assert_eq!(
            c.resolve_url("users/1").unwrap().as_str(),
            "http://api.local/v1/users/1"
        );
        assert_eq!(c.resolve_url("").unwrap().as_str(), "http://api.local/v1");

        let c = client("http://api.local/v1");
        assert_eq!(
            c.resolve_url("/users").unwrap().as_str(),
            "http://api.local/v1/users"
        );
    }

    #[test]
    fn test_absolute_target_passes_through() {
        let c = client("http://api.local");
        assert_eq!(
            c.resolve_url("https://other.local/health").unwrap().as_str(),
            "https://other.local/health"
        );
    }

    #[test]
    fn test_header_map_lowercases_and_joins() {
        let mut headers = HeaderMap::new();
        headers.append("X-Trace", HeaderValue::from_static("a"));
        headers.append("x-trace", HeaderValue::from_static("b"));
        headers.insert("Content-Type", HeaderValue::from_static("application/json"));
        let map = header_map(&headers);
        assert_eq!(map.get("x-trace").map(String::as_str), Some("a, b"));
        assert_eq!(
            map.get("content-type").map(String::as_str),
            Some("application/json")
        );
    }

    #[test]
    fn test_json_body_sets_content_type() {
        let c = client("http://api.local");
        let ctx = CallContext::start(Protocol::Http, "http://api.local");
        let http = reqwest::Client::new();
        let prepared = c
            .build_request(
                &http,
                &Request::post("/users")
                    .json(serde_json::json!({"name": "alice"}))
                    .query("dry_run", "true"),
                &ctx,
            )
            .unwrap();
        assert_eq!(
            prepared.headers()[header::CONTENT_TYPE].to_str().unwrap(),
            "application/json"
        );
        assert_eq!(prepared.url().query(), Some("dry_run=true"));
        assert_eq!(prepared.method(), &Method::POST);
    }

    #[test]
    fn test_caller_content_type_wins() {
        let c = client("http://api.local");
        let ctx = CallContext::start(Protocol::Http, "http://api.local");
        let prepared = c
            .build_request(
                &reqwest::Client::new(),
                &Request::post("/users")
                    .json(serde_json::json!({}))
                    .header("Content-Type", "application/vnd.api+json"),
                &ctx,
            )
            .unwrap();
        assert_eq!(
            prepared.headers()[header::CONTENT_TYPE].to_str().unwrap(),
            "application/vnd.api+json"
        );
    }

    #[tokio::test]
    async fn test_receive_is_protocol_violation() {
        let mut c = client("http://api.local");
        assert!(c.receive(None).await.unwrap_err().is_not_connected());
        c.connect().await.unwrap();
        let err = c.receive(None).await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::ProtocolViolation);
        c.close().await;
    }
}
