//! # apiprobe core
//!
//! Foundation layer of the apiprobe workspace. Every protocol adapter depends
//! on this crate and implements [`ProtocolClient`] against a concrete
//! transport.
//!
//! ## Overview
//!
//! This crate defines:
//! - **Contract**: [`ProtocolClient`], the capability set every adapter satisfies
//! - **Models**: [`Request`], [`Response`], [`Payload`], [`ResultKind`], [`Exchange`]
//! - **Errors**: [`ClientError`], [`ErrorKind`], [`TransportFault`], [`BodyParseError`]
//! - **Config**: [`ConnectionDescriptor`] and the per-protocol settings structs
//! - **Session**: [`ClientSession`], [`SessionState`], [`SessionMetrics`]
//!
//! ## Usage
//!
//! ```rust,ignore
//! use apiprobe_core::{ProtocolClient, Request};
//!
//! async fn ping(client: &mut dyn ProtocolClient) -> apiprobe_core::ClientResult<()> {
//!     client.connect().await?;
//!     let response = client.exchange(Request::message("ping"), None).await?;
//!     assert!(response.is_success());
//!     client.close().await;
//!     Ok(())
//! }
//! ```

#![warn(
    missing_docs,
    missing_debug_implementations,
    rust_2018_idioms,
    unreachable_pub,
    clippy::all
)]
#![cfg_attr(docsrs, feature(doc_cfg))]
#![allow(
    clippy::module_name_repetitions,
    clippy::missing_errors_doc,
    clippy::must_use_candidate
)]

mod config;
mod error;
mod format;
mod message;
mod metrics;
mod session;
mod traits;
mod types;

pub use config::{
    ConnectionDescriptor, FrameParam, Framing, FramingKind, HttpSettings, ProtocolSettings, QueuePattern,
    QueueSettings, RetryStrategy, SocketSettings, DEFAULT_MAX_FRAME_SIZE,
};
pub use error::{
    BodyParseError, CallContext, ClientError, ClientResult, ErrorKind, TransportFault,
};
pub use format::{CodecError, MessageFormat};
pub use message::{Exchange, Payload, Request, Response, ResultKind};
pub use metrics::SessionMetrics;
pub use session::ClientSession;
pub use traits::ProtocolClient;
pub use types::{Protocol, SessionState};
