//! # apiprobe
//!
//! Test-author facade for driving HTTP, message-queue and raw socket APIs
//! through one client contract.
//!
//! ## Layers
//!
//! | Layer | Items |
//! |-------|-------|
//! | Config | [`RawConfig`], [`ConfigResolver`], [`Environment`] |
//! | Dispatch | [`ClientFactory`] |
//! | Adapters | [`HttpClient`], [`QueueClient`], [`SocketClient`] |
//! | Domain | [`HttpPage`], [`QueuePage`], [`SocketPage`], [`run_scoped`] |
//!
//! ## Usage
//!
//! ```rust,ignore
//! use apiprobe::{ClientFactory, ConfigResolver, Environment, HttpPage, RawConfig, run_scoped};
//!
//! let raw = RawConfig::from_yaml_file("apiprobe.yaml")?;
//! let descriptor = ConfigResolver::new(raw).resolve("http", Environment::from_env().as_str())?;
//! let client = ClientFactory::new().create("http", descriptor)?;
//! let mut page = HttpPage::new(client)?;
//!
//! let user = run_scoped(&mut page, |page| {
//!     Box::pin(async move {
//!         page.login("alice", "secret").await?;
//!         page.get_user_info("42").await
//!     })
//! })
//! .await?;
//! assert!(user.is_success());
//! ```

#![warn(
    missing_docs,
    missing_debug_implementations,
    rust_2018_idioms,
    unreachable_pub,
    clippy::all
)]

mod factory;
mod loader;
mod page;
mod resolver;

pub use apiprobe_core::{
    BodyParseError, CallContext, ClientError, ClientResult, ClientSession, CodecError,
    ConnectionDescriptor, ErrorKind, Exchange, FrameParam, Framing, FramingKind, HttpSettings,
    MessageFormat, Payload, Protocol, ProtocolClient, ProtocolSettings, QueuePattern,
    QueueSettings, Request, Response, ResultKind, RetryStrategy, SessionMetrics, SessionState,
    SocketSettings, TransportFault,
};
pub use apiprobe_http::{HttpClient, RetryPolicy};
pub use apiprobe_queue::{QueueClient, TOPIC_KEY, Turn};
pub use apiprobe_socket::SocketClient;
pub use apiprobe_telemetry::{
    LoggingConfig, LoggingConfigBuilder, LoggingError, LoggingResult, try_init_for_tests,
};
pub use apiprobe_wire::{FrameCodec, FrameError};

pub use factory::{ClientConstructor, ClientFactory};
pub use loader::{ENV_VAR, Environment};
pub use page::{HttpPage, PageObject, QueuePage, SocketPage, run_scoped};
pub use resolver::{ConfigResolver, DEFAULT_ENV, RawConfig, deep_merge};

/// Folds a call outcome into a [`Response`].
///
/// Successful calls pass through; errors become a response whose
/// [`ResultKind`] mirrors the error kind and whose `error()` carries the
/// message. Lets assertion-style tests treat every outcome uniformly.
pub fn normalize(protocol: Protocol, result: ClientResult<Response>) -> Response {
    match result {
        Ok(response) => response,
        Err(err) => Response::from_error(protocol, &err),
    }
}
