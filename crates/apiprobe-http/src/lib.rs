//! # apiprobe http
//!
//! HTTP/HTTPS adapter for apiprobe built on `reqwest` with rustls.
//!
//! - One `send_request` is one full round trip; `receive` is not part of the
//!   HTTP exchange model and fails with `ProtocolViolation`.
//! - 4xx/5xx statuses are `Failure` responses with the status code attached.
//! - Connect-phase failures (refused, DNS) are retried per [`RetryPolicy`];
//!   timeouts and statuses are not.
//! - Disabling certificate verification logs one warning per session.

#![warn(
    missing_docs,
    missing_debug_implementations,
    rust_2018_idioms,
    unreachable_pub,
    clippy::all
)]

mod client;
mod retry;

pub use client::HttpClient;
pub use retry::RetryPolicy;
