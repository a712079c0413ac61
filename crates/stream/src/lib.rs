//! Conduit Stream
//!
//! Named channel bundles with a shared, labeled error channel, and the
//! integrity transport built on them.

#![warn(missing_docs)]

pub mod channel;
pub mod error;
pub mod filter;
pub mod integrity;
pub mod segment;
pub mod transform;
pub mod transport;

pub use channel::{pipe, Channel, Duplex, ErrorEmitter, ErrorObserver, Readable, Writable};
pub use error::{ChannelError, StreamError, StreamResult};
pub use filter::{
    checksum_check_segment, ChecksumCheck, FilterSegment, INPUT_CHANNEL, OUTPUT_CHANNEL,
};
pub use integrity::{IntegrityCounters, IntegrityStatus, VerificationStatus};
pub use segment::{ErrorChannel, ErrorRedirect, LabeledError, Segment, ERROR_CHANNEL};
pub use transform::{checksum_unwrap, checksum_wrap, Transform};
pub use transport::{IntegrityTransportSegment, CHECKSUM_CHANNEL, FILTERED_CHANNEL, RAW_CHANNEL};
