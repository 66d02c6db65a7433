//! Error types for transport operations.

use crate::engine::StreamId;
use thiserror::Error;

/// Error type for transport operations.
#[derive(Debug, Error)]
pub enum TransportError {
    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Frame too large.
    #[error("frame too large: {size} bytes exceeds maximum {max} bytes")]
    FrameTooLarge {
        /// Actual frame size.
        size: usize,
        /// Maximum allowed size.
        max: usize,
    },

    /// The stream was never created or has already been retired.
    #[error("unknown stream: {stream}")]
    UnknownStream {
        /// Stream that was addressed.
        stream: StreamId,
    },

    /// `connect` was issued twice for the same stream.
    #[error("stream {stream} is already connecting")]
    AlreadyConnecting {
        /// Stream that was addressed.
        stream: StreamId,
    },
}

impl TransportError {
    /// Creates a frame too large error.
    pub fn frame_too_large(size: usize, max: usize) -> Self {
        Self::FrameTooLarge { size, max }
    }

    /// Creates an unknown stream error.
    pub fn unknown_stream(stream: StreamId) -> Self {
        Self::UnknownStream { stream }
    }
}

/// Failure reported by a stream through [`StreamEvent::ErrorOccurred`].
///
/// [`StreamEvent::ErrorOccurred`]: crate::engine::StreamEvent::ErrorOccurred
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StreamError {
    /// The remote endpoint could not be reached.
    #[error("could not connect to server: {0}")]
    ConnectFailed(String),

    /// The connect attempt did not finish in time.
    #[error("connection timeout")]
    ConnectTimeout,

    /// IO failure on an established connection.
    #[error("IO error: {0}")]
    Io(String),
}

impl StreamError {
    /// Returns true for failures that happen while establishing a connection.
    ///
    /// These precede a retry as a matter of course and are not worth surfacing.
    #[must_use]
    pub fn is_connect_failure(&self) -> bool {
        matches!(self, Self::ConnectFailed(_) | Self::ConnectTimeout)
    }
}
