//! Framing errors.

use apiprobe_core::{CallContext, ClientError, ErrorKind, TransportFault};
use thiserror::Error;

/// Errors raised while encoding or decoding frames.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum FrameError {
    /// The underlying stream failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A frame exceeds the configured or representable maximum.
    #[error("frame of {size} bytes exceeds the maximum of {max} bytes")]
    FrameTooLarge {
        /// Frame size in bytes.
        size: usize,
        /// Largest allowed size.
        max: usize,
    },

    /// A payload does not match the fixed frame length.
    #[error("fixed framing expects {expected} bytes, payload has {actual}")]
    LengthMismatch {
        /// Configured frame length.
        expected: usize,
        /// Payload length.
        actual: usize,
    },

    /// A payload contains the frame delimiter.
    #[error("payload contains the frame delimiter")]
    DelimiterInPayload,

    /// The stream ended in the middle of a frame.
    #[error("stream ended with {buffered} bytes of an incomplete frame")]
    Truncated {
        /// Bytes buffered when the stream ended.
        buffered: usize,
    },

    /// Bytes remain after the single frame expected in a message.
    #[error("{remaining} bytes left over after the frame")]
    TrailingBytes {
        /// Bytes after the frame.
        remaining: usize,
    },
}

impl FrameError {
    /// Returns `true` when the error was produced before anything was written
    /// and the session is still usable.
    pub fn is_payload_error(&self) -> bool {
        matches!(
            self,
            Self::LengthMismatch { .. } | Self::DelimiterInPayload | Self::FrameTooLarge { .. }
        )
    }

    /// Maps a framing error into the client error taxonomy.
    ///
    /// A stream that ends mid-frame is a connection reset. Payloads that cannot
    /// be framed are protocol violations.
    pub fn into_client_error(self, ctx: &CallContext) -> ClientError {
        match self {
            Self::Io(err) => ctx.io(&err),
            Self::Truncated { .. } => {
                ctx.transport(TransportFault::ConnectionReset, self.to_string())
            }
            Self::FrameTooLarge { .. }
            | Self::LengthMismatch { .. }
            | Self::DelimiterInPayload
            | Self::TrailingBytes { .. } => {
                ctx.fail(ErrorKind::ProtocolViolation, self.to_string())
            }
        }
    }
}
