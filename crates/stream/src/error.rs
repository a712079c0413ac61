//! Error types for Conduit stream operations.
//!
//! Two layers are kept apart:
//!
//! - [`ChannelError`] is what a channel signals while running. Segments catch
//!   these and turn them into labeled events on their error channel.
//! - [`StreamError`] is what a constructor returns. Construction failures are
//!   surfaced immediately and never deferred to an error channel.

use conduit_checksum::CodecError;
use conduit_core::CoreError;
use thiserror::Error;

/// Errors signaled by a running channel.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChannelError {
    /// A record could not be decoded
    #[error("Parse error: {0}")]
    Parse(#[from] CodecError),

    /// The other end of the channel is gone
    #[error("Channel closed: {0}")]
    Closed(String),

    /// A write was attempted after the writer was ended
    #[error("Write after end")]
    WriteAfterEnd,

    /// The channel was halted by its segment
    #[error("Channel halted")]
    Halted,

    /// Any other transport failure
    #[error("Channel error: {0}")]
    Other(String),
}

/// Errors that can occur while building streams and segments.
#[derive(Debug, Error)]
pub enum StreamError {
    /// The checksum function identifier was rejected
    #[error("Construction error: {0}")]
    Construction(#[from] CodecError),

    /// Invalid segment or transport configuration
    #[error("Invalid stream configuration: {0}")]
    InvalidConfig(String),

    /// A channel error escaped to a caller
    #[error("Channel error: {0}")]
    Channel(#[from] ChannelError),
}

impl From<CoreError> for StreamError {
    fn from(error: CoreError) -> Self {
        Self::InvalidConfig(error.to_string())
    }
}

/// Result type for stream operations.
pub type StreamResult<T> = Result<T, StreamError>;
