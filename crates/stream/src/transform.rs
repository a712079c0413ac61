//! Single-input, single-output streaming stages.
//!
//! A [`Transform`] runs as its own task: it pulls a record from its input,
//! maps it, and pushes the result to its output, suspending while the output
//! is full. Exactly one output per successful input, in input order.
//!
//! A record the mapping rejects, or one the output no longer accepts, is
//! signaled as an error on the output half and skipped; the stage keeps
//! draining its input until that ends.

use crate::channel::{pipe_with_emitters, ErrorEmitter, Readable, Writable};
use crate::error::{ChannelError, StreamResult};
use bytes::Bytes;
use conduit_checksum::{ChecksumFunction, FunctionId};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// A running map stage with its two halves.
pub struct Transform<I, O> {
    input: Writable<I>,
    output: Readable<O>,
    handle: JoinHandle<()>,
}

impl<I, O> Transform<I, O>
where
    I: Send + 'static,
    O: Send + 'static,
{
    /// Spawn a stage applying `map` to every record.
    ///
    /// Must be called from within a tokio runtime.
    pub fn spawn<F>(name: &'static str, capacity: usize, mut map: F) -> Self
    where
        F: FnMut(I) -> Result<O, ChannelError> + Send + 'static,
    {
        let input_errors = ErrorEmitter::new();
        let output_errors = ErrorEmitter::new();
        let (input, source) = pipe_with_emitters(capacity, input_errors.clone(), input_errors);
        let (sink, output) = pipe_with_emitters(capacity, output_errors.clone(), output_errors);

        let handle = tokio::spawn(async move {
            debug!(stage = name, "Stage started");
            let (mut processed, mut rejected, mut undelivered) = (0u64, 0u64, 0u64);

            while let Some(record) = source.read().await {
                match map(record) {
                    Ok(mapped) => match sink.send(mapped).await {
                        Ok(()) => processed += 1,
                        Err(error) => {
                            undelivered += 1;
                            warn!(stage = name, error = %error, "Stage output refused record");
                            sink.errors().emit(error);
                        }
                    },
                    Err(error) => {
                        rejected += 1;
                        warn!(stage = name, error = %error, "Stage rejected record");
                        sink.errors().emit(error);
                    }
                }
            }

            sink.end();
            debug!(stage = name, processed, rejected, undelivered, "Stage finished");
        });

        Self {
            input,
            output,
            handle,
        }
    }

    /// Write half feeding the stage.
    pub fn input(&self) -> &Writable<I> {
        &self.input
    }

    /// Read half carrying the stage's results.
    pub fn output(&self) -> &Readable<O> {
        &self.output
    }

    /// Whether the stage task has exited.
    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Separate the halves; the stage keeps running detached.
    pub fn split(self) -> (Writable<I>, Readable<O>) {
        (self.input, self.output)
    }
}

/// Stage that wraps each payload with a checksum.
///
/// The function is validated here, once; an unsupported identifier fails
/// construction.
pub fn checksum_wrap(
    function: impl Into<FunctionId>,
    capacity: usize,
) -> StreamResult<Transform<Bytes, Bytes>> {
    let function = ChecksumFunction::coerce(function)?;
    debug!(function = %function, "Building checksum wrap stage");
    Ok(Transform::spawn("checksum-wrap", capacity, move |payload: Bytes| {
        Ok(conduit_checksum::wrap(payload, function))
    }))
}

/// Stage that strips the checksum from each wrapped record.
///
/// Any supported function is accepted and digests are not checked; records
/// are expected to have been verified upstream.
pub fn checksum_unwrap(capacity: usize) -> Transform<Bytes, Bytes> {
    Transform::spawn("checksum-unwrap", capacity, |record: Bytes| {
        Ok(conduit_checksum::unwrap(&record)?)
    })
}
