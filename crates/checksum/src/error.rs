//! Error types for checksum codec operations.

use thiserror::Error;

/// Errors that can occur while naming, encoding or decoding checksummed records.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CodecError {
    /// The identifier does not name a supported checksum function
    #[error("Invalid checksum function code: {0}")]
    InvalidFunctionCode(String),

    /// A record carries a function code this codec does not know
    #[error("Unknown checksum function code in record: {0:#04x}")]
    UnknownFunction(u16),

    /// The record is shorter than its header or declared digest
    #[error("Record truncated: need at least {needed} bytes, got {actual}")]
    Truncated {
        /// Minimum length implied by the header
        needed: usize,
        /// Actual buffer length
        actual: usize,
    },

    /// The declared digest length does not match the function's output size
    #[error("Digest length mismatch for {function}: expected {expected}, got {actual}")]
    DigestLength {
        /// Function name
        function: &'static str,
        /// Natural digest length of the function
        expected: usize,
        /// Length declared by the record
        actual: usize,
    },
}

/// Result type for codec operations.
pub type CodecResult<T> = Result<T, CodecError>;
