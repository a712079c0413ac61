//! Segments: named bundles of channels with one labeled error channel.
//!
//! A [`Segment`] holds any number of named [`Channel`]s plus an
//! [`ErrorChannel`]. Every member except the error channel gets an
//! [`ErrorRedirect`] observer that turns the member's errors into
//! [`LabeledError`] items, so a consumer watches one channel instead of
//! every member.
//!
//! By default an erroring member is left in whatever state the error left
//! it in, and its siblings keep running. With
//! [`SegmentConfig::halt_on_error`] the first redirected error halts every
//! member.

use crate::channel::{pipe, Channel, ErrorObserver, Readable};
use crate::error::{ChannelError, StreamError, StreamResult};
use conduit_core::SegmentConfig;
use std::any::Any;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, Weak};
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{error, info, warn};

/// Name under which every segment exposes its error channel.
pub const ERROR_CHANNEL: &str = "error";

/// An error tagged with the name of the member that raised it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabeledError {
    /// The underlying channel error
    pub error: ChannelError,
    /// Name of the member channel that raised it
    pub label: String,
}

impl fmt::Display for LabeledError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.label, self.error)
    }
}

/// Bounded channel of [`LabeledError`]s.
///
/// Pushes never wait: when the buffer is full the event is dropped, counted
/// and logged.
pub struct ErrorChannel {
    tx: Mutex<Option<mpsc::Sender<LabeledError>>>,
    readable: Readable<LabeledError>,
    capacity: usize,
    dropped: AtomicU64,
}

impl ErrorChannel {
    /// Create an error channel buffering up to `capacity` events.
    pub fn new(capacity: usize) -> Self {
        let (writable, readable) = pipe(capacity);
        let capacity = capacity.max(1);
        let tx = Mutex::new(writable.into_sender());
        Self {
            tx,
            readable,
            capacity,
            dropped: AtomicU64::new(0),
        }
    }

    /// Push an event; returns `false` if it was dropped.
    pub fn push(&self, item: LabeledError) -> bool {
        let guard = self.tx.lock().unwrap_or_else(PoisonError::into_inner);
        let Some(tx) = guard.as_ref() else {
            self.record_drop(&item, "Error channel closed, dropping event");
            return false;
        };

        match tx.try_send(item) {
            Ok(()) => true,
            Err(TrySendError::Full(item)) => {
                self.record_drop(&item, "Error channel full, dropping event");
                false
            }
            Err(TrySendError::Closed(item)) => {
                self.record_drop(&item, "Error channel reader gone, dropping event");
                false
            }
        }
    }

    fn record_drop(&self, item: &LabeledError, message: &'static str) {
        let dropped = self.dropped.fetch_add(1, Ordering::Relaxed) + 1;
        warn!(
            label = %item.label,
            error = %item.error,
            dropped,
            capacity = self.capacity,
            "{message}"
        );
    }

    /// Next event; `None` once the channel was closed and drained.
    pub async fn read(&self) -> Option<LabeledError> {
        self.readable.read().await
    }

    /// Next event if one is buffered.
    pub fn try_read(&self) -> Option<LabeledError> {
        self.readable.try_read()
    }

    /// Every event buffered right now.
    pub fn drain(&self) -> Vec<LabeledError> {
        std::iter::from_fn(|| self.try_read()).collect()
    }

    /// Stop accepting events; readers see end of stream after the buffer.
    pub fn close(&self) {
        self.tx
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
    }

    /// Number of events dropped so far.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Buffer bound.
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl fmt::Debug for ErrorChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ErrorChannel")
            .field("capacity", &self.capacity)
            .field("dropped", &self.dropped())
            .finish()
    }
}

impl Channel for ErrorChannel {
    fn observe_errors(&self, observer: Arc<dyn ErrorObserver>) {
        self.readable.errors().subscribe(observer);
    }

    fn fail(&self, error: ChannelError) {
        self.readable.errors().emit(error);
    }

    fn halt(&self) {
        self.close();
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn into_any_arc(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }
}

/// Members to stop when the first error is redirected.
#[derive(Default)]
struct HaltGroup {
    members: Mutex<Vec<(String, Weak<dyn Channel>)>>,
    halted: AtomicBool,
}

impl HaltGroup {
    fn add(&self, name: &str, channel: &Arc<dyn Channel>) {
        self.members
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((name.to_string(), Arc::downgrade(channel)));
    }

    fn halt(&self, origin: &str) {
        if self.halted.swap(true, Ordering::SeqCst) {
            return;
        }
        let members = self
            .members
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();

        warn!(origin, members = members.len(), "Halting segment after member error");
        for (_, member) in members {
            if let Some(channel) = member.upgrade() {
                channel.halt();
            }
        }
    }
}

/// Observer that forwards one member's errors to the segment error channel.
pub struct ErrorRedirect {
    label: String,
    sink: Arc<ErrorChannel>,
    forwarded: AtomicU64,
    halt: Option<Arc<HaltGroup>>,
}

impl ErrorRedirect {
    fn new(label: &str, sink: Arc<ErrorChannel>, halt: Option<Arc<HaltGroup>>) -> Self {
        Self {
            label: label.to_string(),
            sink,
            forwarded: AtomicU64::new(0),
            halt,
        }
    }

    /// Label attached to forwarded errors.
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Number of errors this redirect has observed.
    pub fn forwarded(&self) -> u64 {
        self.forwarded.load(Ordering::Relaxed)
    }
}

impl ErrorObserver for ErrorRedirect {
    fn on_error(&self, error: &ChannelError) {
        self.forwarded.fetch_add(1, Ordering::Relaxed);
        error!(label = %self.label, error = %error, "Member channel error");

        self.sink.push(LabeledError {
            error: error.clone(),
            label: self.label.clone(),
        });

        if let Some(group) = &self.halt {
            group.halt(&self.label);
        }
    }
}

/// A named bundle of channels with one shared, labeled error channel.
pub struct Segment {
    streams: BTreeMap<String, Arc<dyn Channel>>,
    error: Arc<ErrorChannel>,
    redirects: BTreeMap<String, Arc<ErrorRedirect>>,
    halt: Option<Arc<HaltGroup>>,
}

impl Segment {
    /// Build a segment from named channels merged over the defaults.
    ///
    /// The only default is a fresh `error` channel bounded by
    /// `config.error_buffer`. A caller entry named `error` replaces it and
    /// must be an [`ErrorChannel`].
    pub fn new<I, S>(streams: I, config: &SegmentConfig) -> StreamResult<Self>
    where
        I: IntoIterator<Item = (S, Arc<dyn Channel>)>,
        S: Into<String>,
    {
        config.validate()?;

        let mut merged: BTreeMap<String, Arc<dyn Channel>> = BTreeMap::new();
        merged.insert(
            ERROR_CHANNEL.to_string(),
            Arc::new(ErrorChannel::new(config.error_buffer)),
        );
        for (name, channel) in streams {
            merged.insert(name.into(), channel);
        }

        let error = merged
            .get(ERROR_CHANNEL)
            .map(|channel| Arc::clone(channel).into_any_arc())
            .and_then(|any| any.downcast::<ErrorChannel>().ok())
            .ok_or_else(|| {
                StreamError::InvalidConfig(format!(
                    "'{ERROR_CHANNEL}' member must be an ErrorChannel"
                ))
            })?;

        let halt = config
            .halt_on_error
            .then(|| Arc::new(HaltGroup::default()));

        let mut redirects = BTreeMap::new();
        for (name, channel) in &merged {
            // The error channel never redirects into itself.
            if name == ERROR_CHANNEL {
                continue;
            }
            let redirect = Arc::new(ErrorRedirect::new(name, Arc::clone(&error), halt.clone()));
            channel.observe_errors(Arc::clone(&redirect) as Arc<dyn ErrorObserver>);
            if let Some(group) = &halt {
                group.add(name, channel);
            }
            redirects.insert(name.clone(), redirect);
        }

        info!(
            members = ?redirects.keys().collect::<Vec<_>>(),
            error_buffer = error.capacity(),
            halt_on_error = config.halt_on_error,
            "Segment assembled"
        );

        Ok(Self {
            streams: merged,
            error,
            redirects,
            halt,
        })
    }

    /// Build a segment with the default configuration.
    pub fn with_defaults<I, S>(streams: I) -> StreamResult<Self>
    where
        I: IntoIterator<Item = (S, Arc<dyn Channel>)>,
        S: Into<String>,
    {
        Self::new(streams, &SegmentConfig::default())
    }

    /// Member by name, including `error`.
    pub fn get(&self, name: &str) -> Option<&Arc<dyn Channel>> {
        self.streams.get(name)
    }

    /// Member by name, downcast to its concrete type.
    pub fn channel<C: Channel>(&self, name: &str) -> Option<&C> {
        self.streams.get(name)?.as_any().downcast_ref::<C>()
    }

    /// Every member, including `error`.
    pub fn streams(&self) -> &BTreeMap<String, Arc<dyn Channel>> {
        &self.streams
    }

    /// Member names in order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.streams.keys().map(String::as_str)
    }

    /// The shared error channel.
    pub fn error(&self) -> &ErrorChannel {
        &self.error
    }

    /// Shared handle to the error channel.
    pub fn error_channel(&self) -> Arc<ErrorChannel> {
        Arc::clone(&self.error)
    }

    /// The redirect registered for a member.
    pub fn redirect(&self, name: &str) -> Option<&Arc<ErrorRedirect>> {
        self.redirects.get(name)
    }

    /// Halt every member except the error channel.
    pub fn halt(&self) {
        match &self.halt {
            Some(group) => group.halt("segment"),
            None => {
                for (name, channel) in &self.streams {
                    if name != ERROR_CHANNEL {
                        channel.halt();
                    }
                }
            }
        }
    }

    /// Whether the halt policy has fired.
    pub fn is_halted(&self) -> bool {
        self.halt
            .as_ref()
            .map(|group| group.halted.load(Ordering::SeqCst))
            .unwrap_or(false)
    }
}

impl fmt::Debug for Segment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Segment")
            .field("streams", &self.streams.keys().collect::<Vec<_>>())
            .field("error", &self.error)
            .field("halt_on_error", &self.halt.is_some())
            .finish()
    }
}
