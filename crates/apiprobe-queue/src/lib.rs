//! # apiprobe queue
//!
//! Message-queue adapter for apiprobe over the `zeromq` crate.
//!
//! One [`QueueClient`] owns one socket of a configured pattern:
//!
//! | Pattern | Direction | Discipline |
//! |---|---|---|
//! | `REQ` | send, receive | strictly `send` then `receive` |
//! | `REP` | receive, send | strictly `receive` then `send` |
//! | `PUB` | send | topic sent as a leading frame |
//! | `SUB` | receive | topic exposed as `topic` metadata |
//! | `PUSH` | send | none |
//! | `PULL` | receive | none |
//!
//! Violations fail with `ProtocolViolation` before any I/O so a test never
//! deadlocks on a socket in the wrong state.

#![warn(
    missing_docs,
    missing_debug_implementations,
    rust_2018_idioms,
    unreachable_pub,
    clippy::all
)]

mod client;
mod socket;

pub use client::{QueueClient, TOPIC_KEY, Turn};
