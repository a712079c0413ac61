//! Test utilities for transport integration tests

use bytes::Bytes;
use conduit_core::{logging, TransportConfig};
use conduit_stream::{IntegrityTransportSegment, Readable};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio::time::{timeout, Duration};

/// Upper bound for any single await in a test
pub const STEP_TIMEOUT: Duration = Duration::from_secs(5);

/// Install a test log subscriber once
pub fn init_tracing() {
    logging::try_init_for_tests();
}

/// Build a transport with default settings
pub fn transport(function: &str) -> Arc<IntegrityTransportSegment> {
    transport_with(function, &TransportConfig::default())
}

/// Build a transport with explicit settings
pub fn transport_with(function: &str, config: &TransportConfig) -> Arc<IntegrityTransportSegment> {
    Arc::new(IntegrityTransportSegment::new(function, config).expect("valid transport"))
}

/// Flip every bit of the last byte
pub fn flip_last_byte(wire: &Bytes) -> Bytes {
    let mut bytes = wire.to_vec();
    if let Some(last) = bytes.last_mut() {
        *last ^= 0xff;
    }
    Bytes::from(bytes)
}

/// Forward wire records from `from` into `to`, corrupting those for which
/// `corrupt(index)` is true. Ends `to`'s wire input when `from` ends.
pub fn link<F>(
    from: Arc<IntegrityTransportSegment>,
    to: Arc<IntegrityTransportSegment>,
    mut corrupt: F,
) -> JoinHandle<usize>
where
    F: FnMut(usize) -> bool + Send + 'static,
{
    tokio::spawn(async move {
        let mut index = 0;
        while let Some(wire) = from.checksum().read().await {
            let wire = if corrupt(index) {
                flip_last_byte(&wire)
            } else {
                wire
            };
            if to.checksum().write(wire).await.is_err() {
                break;
            }
            index += 1;
        }
        to.checksum().end();
        index
    })
}

/// Read until the stream ends, failing the test if it stalls
pub async fn read_to_end<T>(readable: &Readable<T>) -> Vec<T> {
    let mut items = Vec::new();
    while let Some(item) = timeout(STEP_TIMEOUT, readable.read())
        .await
        .expect("stream stalled")
    {
        items.push(item);
    }
    items
}

/// Read exactly `count` items, failing the test if they do not arrive
pub async fn read_n<T>(readable: &Readable<T>, count: usize) -> Vec<T> {
    let mut items = Vec::with_capacity(count);
    for _ in 0..count {
        let item = timeout(STEP_TIMEOUT, readable.read())
            .await
            .expect("stream stalled")
            .expect("stream ended early");
        items.push(item);
    }
    items
}
