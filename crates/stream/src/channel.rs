//! Channel primitives.
//!
//! A channel is a bounded, backpressured transport of discrete items that can
//! be ended normally or signal errors. Errors are not carried in-band: each
//! channel owns an [`ErrorEmitter`] and anything interested (a [`Segment`],
//! a [`Duplex`] that wraps the channel) registers an [`ErrorObserver`].
//!
//! - [`pipe`] creates a connected [`Writable`] / [`Readable`] pair.
//! - [`Duplex`] pairs a readable half from one pipe with a writable half of
//!   another and re-emits the errors of both.
//! - [`Channel`] is the object-safe surface segments are generic over.
//!
//! [`Segment`]: crate::segment::Segment

use crate::error::ChannelError;
use std::any::Any;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::{mpsc, Mutex as AsyncMutex, Notify};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Receives the errors a channel signals.
pub trait ErrorObserver: Send + Sync {
    /// Called once for every error signaled on an observed channel.
    fn on_error(&self, error: &ChannelError);
}

impl<F> ErrorObserver for F
where
    F: Fn(&ChannelError) + Send + Sync,
{
    fn on_error(&self, error: &ChannelError) {
        self(error)
    }
}

/// Fan-out of channel errors to registered observers.
#[derive(Clone, Default)]
pub struct ErrorEmitter {
    observers: Arc<Mutex<Vec<Arc<dyn ErrorObserver>>>>,
}

impl ErrorEmitter {
    /// Create an emitter with no observers.
    pub fn new() -> Self {
        Self::default()
    }

    fn observers(&self) -> MutexGuard<'_, Vec<Arc<dyn ErrorObserver>>> {
        self.observers.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register an observer for every future error.
    pub fn subscribe(&self, observer: Arc<dyn ErrorObserver>) {
        self.observers().push(observer);
    }

    /// Signal an error to every observer.
    ///
    /// An error nobody observes is logged rather than lost.
    pub fn emit(&self, error: ChannelError) {
        // Observers may subscribe or emit in turn; never call them under the lock.
        let observers = self.observers().clone();
        if observers.is_empty() {
            warn!(error = %error, "Channel error with no observer");
            return;
        }
        for observer in observers {
            observer.on_error(&error);
        }
    }

    /// Number of registered observers.
    pub fn observer_count(&self) -> usize {
        self.observers().len()
    }

    /// Whether both emitters deliver to the same observer list.
    pub fn shares_with(&self, other: &ErrorEmitter) -> bool {
        Arc::ptr_eq(&self.observers, &other.observers)
    }

    /// Re-emit every future error of this emitter on `target`.
    pub(crate) fn forward_to(&self, target: &ErrorEmitter) {
        self.subscribe(Arc::new(Forward(target.clone())));
    }
}

impl fmt::Debug for ErrorEmitter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ErrorEmitter")
            .field("observers", &self.observer_count())
            .finish()
    }
}

/// Re-emits observed errors on another emitter.
struct Forward(ErrorEmitter);

impl ErrorObserver for Forward {
    fn on_error(&self, error: &ChannelError) {
        self.0.emit(error.clone());
    }
}

/// Object-safe surface of every channel a segment can hold.
pub trait Channel: Send + Sync + 'static {
    /// Register an observer for this channel's errors.
    fn observe_errors(&self, observer: Arc<dyn ErrorObserver>);

    /// Signal an error on this channel.
    fn fail(&self, error: ChannelError);

    /// Stop the channel: writers are ended and readers report end of stream.
    fn halt(&self);

    /// Borrow as `Any` for typed access.
    fn as_any(&self) -> &dyn Any;

    /// Convert a shared handle into `Any` for typed access.
    fn into_any_arc(self: Arc<Self>) -> Arc<dyn Any + Send + Sync>;
}

/// Create a bounded channel; both halves share one error emitter.
///
/// A capacity of zero is raised to one.
pub fn pipe<T>(capacity: usize) -> (Writable<T>, Readable<T>) {
    let errors = ErrorEmitter::new();
    pipe_with_emitters(capacity, errors.clone(), errors)
}

pub(crate) fn pipe_with_emitters<T>(
    capacity: usize,
    writer_errors: ErrorEmitter,
    reader_errors: ErrorEmitter,
) -> (Writable<T>, Readable<T>) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    (
        Writable::from_sender(tx, writer_errors),
        Readable::from_receiver(rx, reader_errors),
    )
}

/// Write half of a channel.
pub struct Writable<T> {
    tx: Mutex<Option<mpsc::Sender<T>>>,
    errors: ErrorEmitter,
}

impl<T> Writable<T> {
    pub(crate) fn from_sender(tx: mpsc::Sender<T>, errors: ErrorEmitter) -> Self {
        Self {
            tx: Mutex::new(Some(tx)),
            errors,
        }
    }

    pub(crate) fn into_sender(self) -> Option<mpsc::Sender<T>> {
        self.tx.into_inner().unwrap_or_else(PoisonError::into_inner)
    }

    fn sender(&self) -> MutexGuard<'_, Option<mpsc::Sender<T>>> {
        self.tx.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Push an item without signaling failures on the emitter.
    pub(crate) async fn send(&self, item: T) -> Result<(), ChannelError> {
        let tx = self.sender().clone().ok_or(ChannelError::WriteAfterEnd)?;
        tx.send(item)
            .await
            .map_err(|_| ChannelError::Closed("reader is gone".to_string()))
    }

    /// Push an item, suspending while the buffer is full.
    ///
    /// A failed write is both returned and signaled on the channel.
    pub async fn write(&self, item: T) -> Result<(), ChannelError> {
        let result = self.send(item).await;
        if let Err(error) = &result {
            self.errors.emit(error.clone());
        }
        result
    }

    /// Signal end of stream. Idempotent.
    pub fn end(&self) {
        if self.sender().take().is_some() {
            debug!("Writer ended");
        }
    }

    /// Whether [`end`](Self::end) has been called.
    pub fn is_ended(&self) -> bool {
        self.sender().is_none()
    }

    /// Error emitter of this half.
    pub fn errors(&self) -> &ErrorEmitter {
        &self.errors
    }
}

impl<T> fmt::Debug for Writable<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Writable")
            .field("ended", &self.is_ended())
            .finish()
    }
}

impl<T: Send + 'static> Channel for Writable<T> {
    fn observe_errors(&self, observer: Arc<dyn ErrorObserver>) {
        self.errors.subscribe(observer);
    }

    fn fail(&self, error: ChannelError) {
        self.errors.emit(error);
    }

    fn halt(&self) {
        self.end();
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn into_any_arc(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }
}

#[derive(Default)]
struct HaltSignal {
    halted: AtomicBool,
    notify: Notify,
}

/// Read half of a channel.
pub struct Readable<T> {
    rx: Arc<AsyncMutex<mpsc::Receiver<T>>>,
    halt: HaltSignal,
    errors: ErrorEmitter,
}

impl<T> Readable<T> {
    pub(crate) fn from_receiver(rx: mpsc::Receiver<T>, errors: ErrorEmitter) -> Self {
        Self {
            rx: Arc::new(AsyncMutex::new(rx)),
            halt: HaltSignal::default(),
            errors,
        }
    }

    /// Pull the next item; `None` once the stream ended or was halted.
    pub async fn read(&self) -> Option<T> {
        let halted = self.halt.notify.notified();
        tokio::pin!(halted);
        halted.as_mut().enable();
        if self.is_halted() {
            return None;
        }

        let mut rx = self.rx.lock().await;
        tokio::select! {
            item = rx.recv() => item,
            _ = &mut halted => None,
        }
    }

    /// Pull an item if one is buffered right now.
    pub fn try_read(&self) -> Option<T> {
        if self.is_halted() {
            return None;
        }
        self.rx.try_lock().ok()?.try_recv().ok()
    }

    /// Stop reading: pending and future reads return `None` and writers
    /// see the channel as closed.
    pub fn halt(&self)
    where
        T: Send + 'static,
    {
        if self.halt.halted.swap(true, Ordering::SeqCst) {
            return;
        }
        self.halt.notify.notify_waiters();

        match self.rx.try_lock() {
            Ok(mut rx) => rx.close(),
            Err(_) => {
                // A reader holds the receiver until the notification lands.
                if let Ok(handle) = tokio::runtime::Handle::try_current() {
                    let rx = Arc::clone(&self.rx);
                    handle.spawn(async move { rx.lock().await.close() });
                }
            }
        }
        debug!("Reader halted");
    }

    /// Whether [`halt`](Self::halt) has been called.
    pub fn is_halted(&self) -> bool {
        self.halt.halted.load(Ordering::SeqCst)
    }

    /// Error emitter of this half.
    pub fn errors(&self) -> &ErrorEmitter {
        &self.errors
    }

    /// Forward every item into `dest` and end it when this stream ends.
    ///
    /// Errors of this half are not forwarded. An item the destination
    /// refuses is signaled on the destination's emitter and skipped.
    pub fn pipe(self, dest: Writable<T>) -> JoinHandle<()>
    where
        T: Send + 'static,
    {
        tokio::spawn(async move {
            let (mut forwarded, mut refused) = (0u64, 0u64);
            while let Some(item) = self.read().await {
                match dest.send(item).await {
                    Ok(()) => forwarded += 1,
                    Err(error) => {
                        refused += 1;
                        warn!(error = %error, "Pipe destination refused item");
                        dest.errors().emit(error);
                    }
                }
            }
            dest.end();
            debug!(forwarded, refused, "Pipe finished");
        })
    }
}

impl<T> fmt::Debug for Readable<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Readable")
            .field("halted", &self.is_halted())
            .finish()
    }
}

impl<T: Send + 'static> Channel for Readable<T> {
    fn observe_errors(&self, observer: Arc<dyn ErrorObserver>) {
        self.errors.subscribe(observer);
    }

    fn fail(&self, error: ChannelError) {
        self.errors.emit(error);
    }

    fn halt(&self) {
        Readable::halt(self);
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn into_any_arc(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }
}

/// Two single-direction halves presented as one bidirectional endpoint.
///
/// Reads come from `readable`, writes go to `writable`; the halves share no
/// state. Errors signaled on either half are re-emitted on the duplex.
pub struct Duplex<R, W> {
    readable: Readable<R>,
    writable: Writable<W>,
    errors: ErrorEmitter,
}

impl<R, W> Duplex<R, W> {
    /// Pair a read half with a write half.
    pub fn new(readable: Readable<R>, writable: Writable<W>) -> Self {
        let errors = ErrorEmitter::new();
        readable.errors().forward_to(&errors);
        if !writable.errors().shares_with(readable.errors()) {
            writable.errors().forward_to(&errors);
        }

        Self {
            readable,
            writable,
            errors,
        }
    }

    /// Pull from the read half.
    pub async fn read(&self) -> Option<R> {
        self.readable.read().await
    }

    /// Pull from the read half if an item is buffered.
    pub fn try_read(&self) -> Option<R> {
        self.readable.try_read()
    }

    /// Push into the write half.
    pub async fn write(&self, item: W) -> Result<(), ChannelError> {
        self.writable.write(item).await
    }

    /// End the write half.
    pub fn end(&self) {
        self.writable.end();
    }

    /// The read half.
    pub fn readable(&self) -> &Readable<R> {
        &self.readable
    }

    /// The write half.
    pub fn writable(&self) -> &Writable<W> {
        &self.writable
    }

    /// Error emitter of the duplex itself.
    pub fn errors(&self) -> &ErrorEmitter {
        &self.errors
    }
}

impl<R, W> fmt::Debug for Duplex<R, W> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Duplex")
            .field("readable", &self.readable)
            .field("writable", &self.writable)
            .finish()
    }
}

impl<R: Send + 'static, W: Send + 'static> Channel for Duplex<R, W> {
    fn observe_errors(&self, observer: Arc<dyn ErrorObserver>) {
        self.errors.subscribe(observer);
    }

    fn fail(&self, error: ChannelError) {
        self.errors.emit(error);
    }

    fn halt(&self) {
        self.readable.halt();
        self.writable.end();
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn into_any_arc(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }
}
