//! # apiprobe socket
//!
//! Raw TCP adapter for apiprobe. Implements
//! [`ProtocolClient`](apiprobe_core::ProtocolClient) over
//! `tokio::net::TcpStream` wrapped in `tokio_util::codec::Framed` with an
//! [`apiprobe_wire::FrameCodec`], so fixed-length, delimiter-terminated and
//! length-prefixed wire formats share one code path.
//!
//! ## Failure semantics
//!
//! - A receive timeout returns `TimeoutError`, keeps any partial frame
//!   buffered and leaves the session healthy.
//! - A peer that resets the connection, or closes it mid-frame, yields
//!   `TransportError` with the `ConnectionReset` fault and degrades the session.
//! - A clean close between frames yields `TransportError` with the `Closed`
//!   fault and degrades the session.

#![warn(
    missing_docs,
    missing_debug_implementations,
    rust_2018_idioms,
    unreachable_pub,
    clippy::all
)]

mod client;

pub use client::SocketClient;
