//! Integrity Transport Segment
//!
//! A Segment with a plaintext endpoint and a checksum-protected wire
//! endpoint. Corrupted inbound records are isolated on `filtered`.
//!
//! ```text
//!            write                          read
//!   raw  ──────────▶ wrap ─────────────────────────▶ checksum
//!   raw  ◀────────── unwrap ◀── check ◀─────────────  checksum
//!            read               │          write
//!                               └──▶ filtered
//! ```

use crate::channel::{Channel, Duplex, Readable};
use crate::error::StreamResult;
use crate::filter::checksum_check_segment;
use crate::integrity::{IntegrityCounters, IntegrityStatus};
use crate::segment::{ErrorChannel, Segment};
use crate::transform::{checksum_unwrap, checksum_wrap};
use bytes::Bytes;
use conduit_checksum::{ChecksumFunction, FunctionId};
use conduit_core::TransportConfig;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::info;

/// Name of the plaintext duplex.
pub const RAW_CHANNEL: &str = "raw";
/// Name of the wire-format duplex.
pub const CHECKSUM_CHANNEL: &str = "checksum";
/// Name of the channel carrying records that failed verification.
pub const FILTERED_CHANNEL: &str = "filtered";

/// Plaintext and wire endpoints joined by checksum wrap, verify and unwrap.
pub struct IntegrityTransportSegment {
    function: ChecksumFunction,
    raw: Arc<Duplex<Bytes, Bytes>>,
    checksum: Arc<Duplex<Bytes, Bytes>>,
    filtered: Arc<Readable<Bytes>>,
    counters: Arc<IntegrityCounters>,
    segment: Segment,
}

impl IntegrityTransportSegment {
    /// Build a transport committed to `function`.
    ///
    /// Fails immediately if `function` names no supported checksum function
    /// or `config` is invalid. Must be called from within a tokio runtime.
    pub fn new(function: impl Into<FunctionId>, config: &TransportConfig) -> StreamResult<Self> {
        config.validate()?;
        let function = ChecksumFunction::coerce(function)?;
        let capacity = config.channel_capacity;
        let counters = Arc::new(IntegrityCounters::new());

        let check = checksum_check_segment(Some(function.into()), capacity, Arc::clone(&counters))?;
        let (wrap_input, wrap_output) = checksum_wrap(function, capacity)?.split();
        let (unwrap_input, unwrap_output) = checksum_unwrap(capacity).split();

        let (check_input, check_output, filtered) = check.into_parts();
        let raw = Arc::new(Duplex::new(unwrap_output, wrap_input));
        let checksum = Arc::new(Duplex::new(wrap_output, check_input));

        // Verified records that cannot be delivered inbound belong to `raw`.
        check_output.errors().forward_to(raw.errors());
        unwrap_input.errors().forward_to(raw.errors());
        check_output.pipe(unwrap_input);
        let filtered = Arc::new(filtered);

        let members: BTreeMap<&str, Arc<dyn Channel>> = BTreeMap::from([
            (RAW_CHANNEL, Arc::clone(&raw) as Arc<dyn Channel>),
            (CHECKSUM_CHANNEL, Arc::clone(&checksum) as Arc<dyn Channel>),
            (FILTERED_CHANNEL, Arc::clone(&filtered) as Arc<dyn Channel>),
        ]);
        let segment = Segment::new(members, &config.segment_config())?;

        info!(function = %function, capacity, "Integrity transport ready");

        Ok(Self {
            function,
            raw,
            checksum,
            filtered,
            counters,
            segment,
        })
    }

    /// Build a transport using the function named in `config`.
    pub fn from_config(config: &TransportConfig) -> StreamResult<Self> {
        Self::new(config.checksum_function.as_str(), config)
    }

    /// Plaintext endpoint: write payloads out, read verified payloads in.
    pub fn raw(&self) -> &Duplex<Bytes, Bytes> {
        &self.raw
    }

    /// Wire endpoint: read wrapped records out, write received records in.
    pub fn checksum(&self) -> &Duplex<Bytes, Bytes> {
        &self.checksum
    }

    /// Inbound records that failed verification, unchanged.
    pub fn filtered(&self) -> &Readable<Bytes> {
        &self.filtered
    }

    /// Labeled errors from `raw`, `checksum` and `filtered`.
    pub fn error(&self) -> &ErrorChannel {
        self.segment.error()
    }

    /// Every member by name.
    pub fn streams(&self) -> &BTreeMap<String, Arc<dyn Channel>> {
        self.segment.streams()
    }

    /// The underlying segment.
    pub fn segment(&self) -> &Segment {
        &self.segment
    }

    /// Function every outbound record is wrapped with.
    pub fn function(&self) -> ChecksumFunction {
        self.function
    }

    /// Snapshot of inbound verification counters.
    pub fn status(&self) -> IntegrityStatus {
        self.counters.snapshot(self.function)
    }

    /// Stop both directions.
    pub fn halt(&self) {
        self.segment.halt();
    }
}

impl std::fmt::Debug for IntegrityTransportSegment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IntegrityTransportSegment")
            .field("function", &self.function)
            .field("segment", &self.segment)
            .finish()
    }
}
