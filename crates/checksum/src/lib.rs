//! Checksum codec for the Conduit integrity transport.
//!
//! This crate turns payloads into self-describing checksummed records and
//! back. A record names the function that produced its digest, so a reader
//! can verify it without out-of-band agreement.
//!
//! # Supported Functions
//!
//! - **SHA-1** (`sha1`, code `0x11`)
//! - **SHA2-256** (`sha2-256`, code `0x12`)
//! - **SHA2-512** (`sha2-512`, code `0x13`)
//! - **BLAKE3** (`blake3`, code `0x1e`)
//!
//! # Example
//!
//! ```
//! use conduit_checksum::{unwrap, verify, wrap, ChecksumFunction};
//!
//! let function = ChecksumFunction::coerce("sha2-256").unwrap();
//! let wire = wrap(&b"hello"[..], function);
//! assert!(verify(&wire).unwrap());
//! assert_eq!(unwrap(&wire).unwrap().as_ref(), b"hello");
//! ```

#![warn(missing_docs)]

pub mod error;
pub mod function;
pub mod record;

pub use error::{CodecError, CodecResult};
pub use function::{ChecksumFunction, FunctionId};
pub use record::{unwrap, verify, wrap, WrappedRecord, HEADER_LEN};
