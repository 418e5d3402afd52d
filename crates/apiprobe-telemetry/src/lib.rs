//! Logging setup for apiprobe test runs.
//!
//! Adapters log through `tracing`; this crate installs the subscriber that
//! renders those events, as pretty text or JSON lines, filtered by
//! `RUST_LOG` or a configured directive.
//!
//! ```rust,no_run
//! use apiprobe_telemetry::LoggingConfig;
//!
//! LoggingConfig::builder()
//!     .log_level("info,apiprobe_queue=debug")
//!     .json_logs(true)
//!     .build()
//!     .init()
//!     .expect("logging already initialized");
//! ```

#![warn(
    missing_docs,
    missing_debug_implementations,
    rust_2018_idioms,
    unreachable_pub,
    clippy::all
)]

mod config;
mod error;
mod init;

pub use config::{LoggingConfig, LoggingConfigBuilder};
pub use error::{LoggingError, LoggingResult};
pub use init::try_init_for_tests;

// Re-export tracing macros for convenience
pub use tracing::{debug, error, info, trace, warn};
