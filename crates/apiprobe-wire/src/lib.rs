//! # apiprobe wire
//!
//! Message framing over byte streams.
//!
//! [`FrameCodec`] implements `tokio_util::codec::{Decoder, Encoder}` for the
//! three framing schemes an apiprobe socket can be configured with:
//!
//! - **fixed**: every frame is exactly N bytes
//! - **delimited**: frames end with a terminator that is stripped on decode
//! - **length-prefixed**: a 1, 2, 4 or 8 byte big-endian length precedes the payload
//!
//! Wrapped in `tokio_util::codec::Framed`, the codec buffers partial frames
//! across reads and the sink loops until every byte is written.

#![warn(
    missing_docs,
    missing_debug_implementations,
    rust_2018_idioms,
    unreachable_pub,
    clippy::all
)]

mod codec;
mod error;

pub use codec::{FrameCodec, decode_exact, encode_frame};
pub use error::FrameError;
