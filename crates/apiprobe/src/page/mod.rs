//! Page objects: domain-level facades over one adapter session.
//!
//! A page owns its adapter for the scope of a test. [`run_scoped`] gives that
//! scope a guaranteed teardown, even when the test body fails or panics.

mod http;
mod queue;
mod socket;

use std::panic::AssertUnwindSafe;

use apiprobe_core::{ClientError, ClientResult, Protocol, ProtocolClient};
use async_trait::async_trait;
use futures::FutureExt;
use futures::future::BoxFuture;
use tracing::warn;

pub use http::HttpPage;
pub use queue::QueuePage;
pub use socket::SocketPage;

/// Lifecycle shared by every page object.
#[async_trait]
pub trait PageObject: Send {
    /// The adapter this page drives.
    fn client(&self) -> &dyn ProtocolClient;

    /// Mutable access to the adapter.
    fn client_mut(&mut self) -> &mut dyn ProtocolClient;

    /// Prepares the session. The default connects the adapter.
    async fn setup(&mut self) -> ClientResult<()> {
        self.client_mut().connect().await
    }

    /// Releases the session. Never fails.
    async fn teardown(&mut self) {
        self.client_mut().close().await;
    }
}

/// Runs `body` between `setup` and `teardown`.
///
/// Teardown runs when setup fails, when the body returns an error and when
/// the body panics; a panic is resumed once the session is closed.
///
/// ```rust,ignore
/// let response = run_scoped(&mut page, |page| {
///     Box::pin(async move { page.heartbeat().await })
/// })
/// .await?;
/// ```
pub async fn run_scoped<P, T, F>(page: &mut P, body: F) -> ClientResult<T>
where
    P: PageObject + ?Sized,
    F: for<'a> FnOnce(&'a mut P) -> BoxFuture<'a, ClientResult<T>>,
{
    if let Err(err) = page.setup().await {
        warn!(error = %err, "Page setup failed, tearing down");
        page.teardown().await;
        return Err(err);
    }

    let outcome = AssertUnwindSafe(body(page)).catch_unwind().await;
    page.teardown().await;
    match outcome {
        Ok(result) => result,
        Err(panic) => {
            warn!("Page body panicked; session closed before unwinding");
            std::panic::resume_unwind(panic)
        }
    }
}

/// Rejects adapters that speak another protocol.
fn expect_protocol(client: &dyn ProtocolClient, expected: Protocol, page: &str) -> ClientResult<()> {
    if client.protocol() == expected {
        Ok(())
    } else {
        Err(ClientError::config(format!(
            "{page} needs a {expected} client, got {}",
            client.protocol()
        ))
        .with_protocol(client.protocol())
        .with_target(client.endpoint()))
    }
}

/// `true` when a reply reports `"status": "success"`.
fn reports_success(response: &apiprobe_core::Response) -> bool {
    response
        .field("status")
        .and_then(serde_json::Value::as_str)
        .is_some_and(|status| status == "success")
}

/// The `session_id` string field of a reply.
fn session_id_of(response: &apiprobe_core::Response) -> Option<String> {
    response
        .field("session_id")
        .and_then(serde_json::Value::as_str)
        .map(str::to_owned)
}
