//! Wrapped records: a payload carrying its own checksum.
//!
//! # Wire Format
//!
//! ```text
//! [ function code: u16 BE ][ digest length: u16 BE ][ digest ][ payload ]
//! ```
//!
//! The digest length must equal the natural output length of the function,
//! so a record whose header was damaged fails to parse instead of being
//! misread.

use crate::error::{CodecError, CodecResult};
use crate::function::ChecksumFunction;
use bytes::{BufMut, Bytes, BytesMut};
use std::fmt;

/// Size of the fixed record header.
pub const HEADER_LEN: usize = 4;

/// A payload paired with the function and digest that protect it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WrappedRecord {
    function: ChecksumFunction,
    digest: Vec<u8>,
    payload: Bytes,
}

impl WrappedRecord {
    /// Wrap a payload, computing its digest with `function`.
    pub fn wrap(payload: Bytes, function: ChecksumFunction) -> Self {
        let digest = function.digest(&payload);
        Self {
            function,
            digest,
            payload,
        }
    }

    /// Parse a record from its wire form.
    ///
    /// The payload is a zero-copy slice of `buf`.
    pub fn decode(buf: &Bytes) -> CodecResult<Self> {
        if buf.len() < HEADER_LEN {
            return Err(CodecError::Truncated {
                needed: HEADER_LEN,
                actual: buf.len(),
            });
        }

        let code = u16::from_be_bytes([buf[0], buf[1]]);
        let function = ChecksumFunction::from_code(code)?;

        let declared = u16::from_be_bytes([buf[2], buf[3]]) as usize;
        if declared != function.digest_len() {
            return Err(CodecError::DigestLength {
                function: function.name(),
                expected: function.digest_len(),
                actual: declared,
            });
        }

        let payload_start = HEADER_LEN + declared;
        if buf.len() < payload_start {
            return Err(CodecError::Truncated {
                needed: payload_start,
                actual: buf.len(),
            });
        }

        Ok(Self {
            function,
            digest: buf[HEADER_LEN..payload_start].to_vec(),
            payload: buf.slice(payload_start..),
        })
    }

    /// Serialize into wire form.
    pub fn encode(&self) -> Bytes {
        let mut out = BytesMut::with_capacity(self.encoded_len());
        out.put_u16(self.function.code());
        out.put_u16(self.digest.len() as u16);
        out.put_slice(&self.digest);
        out.put_slice(&self.payload);
        out.freeze()
    }

    /// Length of the wire form.
    pub fn encoded_len(&self) -> usize {
        HEADER_LEN + self.digest.len() + self.payload.len()
    }

    /// Recompute the digest over the payload and compare.
    pub fn verify(&self) -> bool {
        self.function.digest(&self.payload) == self.digest
    }

    /// Function declared by the record.
    pub fn function(&self) -> ChecksumFunction {
        self.function
    }

    /// Digest carried by the record.
    pub fn digest(&self) -> &[u8] {
        &self.digest
    }

    /// Embedded payload.
    pub fn payload(&self) -> &Bytes {
        &self.payload
    }

    /// Consume the record, keeping only the payload.
    pub fn into_payload(self) -> Bytes {
        self.payload
    }
}

impl fmt::Display for WrappedRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "<{} {} {}B>",
            self.function,
            hex::encode(&self.digest),
            self.payload.len()
        )
    }
}

/// Wrap `payload` with `function` and return the wire form.
pub fn wrap(payload: impl Into<Bytes>, function: ChecksumFunction) -> Bytes {
    WrappedRecord::wrap(payload.into(), function).encode()
}

/// Strip the checksum from a wire record without verifying it.
pub fn unwrap(buf: &Bytes) -> CodecResult<Bytes> {
    WrappedRecord::decode(buf).map(WrappedRecord::into_payload)
}

/// Parse a wire record and check its digest.
pub fn verify(buf: &Bytes) -> CodecResult<bool> {
    WrappedRecord::decode(buf).map(|record| record.verify())
}
