//! Filter Segment: one input split into `output` and `filtered`.
//!
//! Each record entering `input` is classified by a predicate and lands on
//! exactly one of the two outputs. A record the predicate cannot classify is
//! signaled as an error on `input` instead.

use crate::channel::{pipe_with_emitters, Channel, ErrorEmitter, Readable, Writable};
use crate::error::{ChannelError, StreamResult};
use crate::integrity::IntegrityCounters;
use crate::segment::Segment;
use crate::transport::FILTERED_CHANNEL;
use bytes::Bytes;
use conduit_checksum::{ChecksumFunction, FunctionId, WrappedRecord};
use conduit_core::SegmentConfig;
use std::sync::Arc;
use tracing::{debug, warn};

/// Member name of the write half in [`FilterSegment::into_segment`].
pub const INPUT_CHANNEL: &str = "input";
/// Member name of the accepted records in [`FilterSegment::into_segment`].
pub const OUTPUT_CHANNEL: &str = "output";

/// A running classification stage with its three channels.
pub struct FilterSegment<T> {
    input: Writable<T>,
    output: Readable<T>,
    filtered: Readable<T>,
}

impl<T: Send + 'static> FilterSegment<T> {
    /// Spawn a stage routing records by `predicate`.
    ///
    /// Must be called from within a tokio runtime.
    pub fn spawn<F>(name: &'static str, capacity: usize, mut predicate: F) -> Self
    where
        F: FnMut(&T) -> Result<bool, ChannelError> + Send + 'static,
    {
        let input_errors = ErrorEmitter::new();
        let output_errors = ErrorEmitter::new();
        let filtered_errors = ErrorEmitter::new();
        let (input, source) = pipe_with_emitters(capacity, input_errors.clone(), input_errors);
        let (pass, output) = pipe_with_emitters(capacity, output_errors.clone(), output_errors);
        let (fail, filtered) =
            pipe_with_emitters(capacity, filtered_errors.clone(), filtered_errors);

        tokio::spawn(async move {
            debug!(stage = name, "Filter started");
            let (mut passed, mut failed) = (0u64, 0u64);

            while let Some(record) = source.read().await {
                let dest = match predicate(&record) {
                    Ok(true) => {
                        passed += 1;
                        &pass
                    }
                    Ok(false) => {
                        failed += 1;
                        &fail
                    }
                    Err(error) => {
                        warn!(stage = name, error = %error, "Filter could not classify record");
                        source.errors().emit(error);
                        continue;
                    }
                };
                // One closed branch must not starve the other.
                if let Err(error) = dest.send(record).await {
                    dest.errors().emit(error);
                }
            }

            pass.end();
            fail.end();
            debug!(stage = name, passed, failed, "Filter finished");
        });

        Self {
            input,
            output,
            filtered,
        }
    }

    /// Write half feeding the classifier.
    pub fn input(&self) -> &Writable<T> {
        &self.input
    }

    /// Records the predicate accepted.
    pub fn output(&self) -> &Readable<T> {
        &self.output
    }

    /// Records the predicate rejected.
    pub fn filtered(&self) -> &Readable<T> {
        &self.filtered
    }

    /// Take the three channels apart: `(input, output, filtered)`.
    pub fn into_parts(self) -> (Writable<T>, Readable<T>, Readable<T>) {
        (self.input, self.output, self.filtered)
    }

    /// Bundle the channels into a [`Segment`] named `input`, `output` and
    /// `filtered`, so their errors arrive labeled on one error channel.
    pub fn into_segment(self, config: &SegmentConfig) -> StreamResult<Segment> {
        let (input, output, filtered) = self.into_parts();
        Segment::new(
            [
                (INPUT_CHANNEL, Arc::new(input) as Arc<dyn Channel>),
                (OUTPUT_CHANNEL, Arc::new(output) as Arc<dyn Channel>),
                (FILTERED_CHANNEL, Arc::new(filtered) as Arc<dyn Channel>),
            ],
            config,
        )
    }
}

/// Classifies wrapped records by checksum validity.
#[derive(Debug, Clone)]
pub struct ChecksumCheck {
    function: Option<ChecksumFunction>,
    counters: Arc<IntegrityCounters>,
}

impl ChecksumCheck {
    /// Build a check, optionally committed to one function.
    pub fn new(function: Option<ChecksumFunction>, counters: Arc<IntegrityCounters>) -> Self {
        Self { function, counters }
    }

    /// Committed function, if any.
    pub fn function(&self) -> Option<ChecksumFunction> {
        self.function
    }

    /// `Ok(true)` if the record verifies, `Ok(false)` if it must be filtered,
    /// `Err` if it cannot be parsed.
    pub fn classify(&self, buf: &Bytes) -> Result<bool, ChannelError> {
        let record = match WrappedRecord::decode(buf) {
            Ok(record) => record,
            Err(error) => {
                self.counters.record_malformed(&error);
                return Err(ChannelError::Parse(error));
            }
        };

        if let Some(expected) = self.function {
            if record.function() != expected {
                self.counters.record_filtered("function mismatch");
                return Ok(false);
            }
        }

        if record.verify() {
            self.counters.record_verified();
            Ok(true)
        } else {
            self.counters.record_filtered("digest mismatch");
            Ok(false)
        }
    }
}

/// Filter Segment passing records whose checksum verifies.
///
/// With a committed function, records wrapped with any other function are
/// filtered without checking their digest.
pub fn checksum_check_segment(
    function: Option<FunctionId>,
    capacity: usize,
    counters: Arc<IntegrityCounters>,
) -> StreamResult<FilterSegment<Bytes>> {
    let function = function
        .map(|id| ChecksumFunction::coerce(id))
        .transpose()?;
    let check = ChecksumCheck::new(function, counters);
    Ok(FilterSegment::spawn("checksum-check", capacity, move |buf: &Bytes| {
        check.classify(buf)
    }))
}
