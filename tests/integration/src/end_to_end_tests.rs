//! End-to-end transport scenarios
//!
//! Two transports connected wire-to-wire, with a link in between that may
//! corrupt records in flight.

use crate::test_utils::{init_tracing, link, read_n, read_to_end, transport};
use bytes::Bytes;
use conduit_checksum::{ChecksumFunction, WrappedRecord};
use conduit_stream::VerificationStatus;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

fn payloads(count: usize) -> Vec<Bytes> {
    (0..count)
        .map(|i| Bytes::from(format!("record-{i:03}")))
        .collect()
}

#[tokio::test]
async fn test_clean_link_delivers_everything_in_order() {
    init_tracing();
    let sender = transport("sha2-256");
    let receiver = transport("sha2-256");
    let forwarder = link(sender.clone(), receiver.clone(), |_| false);

    let sent = payloads(20);
    for payload in &sent {
        sender.raw().write(payload.clone()).await.unwrap();
    }
    sender.raw().end();

    assert_eq!(read_to_end(receiver.raw().readable()).await, sent);
    assert!(read_to_end(receiver.filtered()).await.is_empty());
    assert_eq!(forwarder.await.unwrap(), 20);

    let status = receiver.status();
    assert_eq!(status.verified_records, 20);
    assert_eq!(status.verification_status, VerificationStatus::Verified);
    // The sending side never checked anything.
    assert_eq!(
        sender.status().verification_status,
        VerificationStatus::StatusUnverified
    );
}

#[tokio::test]
async fn test_corrupted_records_are_isolated() {
    init_tracing();
    let sender = transport("blake3");
    let receiver = transport("blake3");
    link(sender.clone(), receiver.clone(), |index| index % 3 == 2);

    let sent = payloads(10);
    for payload in &sent {
        sender.raw().write(payload.clone()).await.unwrap();
    }
    sender.raw().end();

    let delivered = read_to_end(receiver.raw().readable()).await;
    let expected: Vec<Bytes> = sent
        .iter()
        .enumerate()
        .filter(|(index, _)| index % 3 != 2)
        .map(|(_, payload)| payload.clone())
        .collect();
    assert_eq!(delivered, expected);

    let filtered = read_to_end(receiver.filtered()).await;
    assert_eq!(filtered.len(), 3);
    for record in &filtered {
        // Filtered records are passed through as received: still parseable,
        // but failing verification.
        let record = WrappedRecord::decode(record).unwrap();
        assert!(!record.verify());
    }

    // Corruption is data, not an error.
    assert!(receiver.error().drain().is_empty());
    let status = receiver.status();
    assert_eq!(status.verified_records, 7);
    assert_eq!(status.filtered_records, 3);
    assert_eq!(status.verification_status, VerificationStatus::Compromised);
}

#[tokio::test]
async fn test_random_corruption_preserves_exclusivity() {
    init_tracing();
    let mut rng = StdRng::seed_from_u64(0x5eed);
    let corrupted: Vec<bool> = (0..64).map(|_| rng.gen_bool(0.25)).collect();
    let expected_filtered = corrupted.iter().filter(|flag| **flag).count();

    let sender = transport("sha2-512");
    let receiver = transport("sha2-512");
    let flags = corrupted.clone();
    link(sender.clone(), receiver.clone(), move |index| flags[index]);

    let sent = payloads(corrupted.len());
    for payload in &sent {
        sender.raw().write(payload.clone()).await.unwrap();
    }
    sender.raw().end();

    // Drain both sides together so neither branch can fill up and stall.
    let (delivered, filtered) = tokio::join!(
        read_to_end(receiver.raw().readable()),
        read_to_end(receiver.filtered())
    );

    assert_eq!(delivered.len() + filtered.len(), sent.len());
    assert_eq!(filtered.len(), expected_filtered);
    let expected: Vec<Bytes> = sent
        .iter()
        .zip(&corrupted)
        .filter(|(_, corrupt)| !**corrupt)
        .map(|(payload, _)| payload.clone())
        .collect();
    assert_eq!(delivered, expected);
}

#[tokio::test]
async fn test_function_mismatch_filters_everything() {
    init_tracing();
    let sender = transport("blake3");
    let receiver = transport("sha2-256");
    link(sender.clone(), receiver.clone(), |_| false);

    for payload in payloads(4) {
        sender.raw().write(payload).await.unwrap();
    }
    sender.raw().end();

    assert!(read_to_end(receiver.raw().readable()).await.is_empty());
    let filtered = read_to_end(receiver.filtered()).await;
    assert_eq!(filtered.len(), 4);
    for record in &filtered {
        // Intact, just wrapped with a function the receiver did not commit to.
        assert!(conduit_checksum::verify(record).unwrap());
        let record = WrappedRecord::decode(record).unwrap();
        assert_eq!(record.function(), ChecksumFunction::Blake3);
    }
}

#[tokio::test]
async fn test_bidirectional_link() {
    init_tracing();
    let left = transport("sha2-256");
    let right = transport("sha2-256");
    link(left.clone(), right.clone(), |_| false);
    link(right.clone(), left.clone(), |_| false);

    left.raw().write(Bytes::from_static(b"ping")).await.unwrap();
    right.raw().write(Bytes::from_static(b"pong")).await.unwrap();

    assert_eq!(
        read_n(right.raw().readable(), 1).await,
        vec![Bytes::from_static(b"ping")]
    );
    assert_eq!(
        read_n(left.raw().readable(), 1).await,
        vec![Bytes::from_static(b"pong")]
    );
}

#[tokio::test]
async fn test_backpressure_with_small_buffers() {
    init_tracing();
    let config = conduit_core::TransportConfig {
        channel_capacity: 1,
        ..Default::default()
    };
    let sender = crate::test_utils::transport_with("sha2-256", &config);
    let receiver = crate::test_utils::transport_with("sha2-256", &config);
    link(sender.clone(), receiver.clone(), |_| false);

    let sent = payloads(50);
    let writer = {
        let sender = sender.clone();
        let sent = sent.clone();
        tokio::spawn(async move {
            for payload in sent {
                sender.raw().write(payload).await.unwrap();
            }
            sender.raw().end();
        })
    };

    assert_eq!(read_to_end(receiver.raw().readable()).await, sent);
    writer.await.unwrap();
}

#[tokio::test]
async fn test_status_reports_as_json() {
    init_tracing();
    let sender = transport("sha2-256");
    let receiver = transport("sha2-256");
    link(sender.clone(), receiver.clone(), |index| index == 0);

    sender.raw().write(Bytes::from_static(b"lost")).await.unwrap();
    sender.raw().write(Bytes::from_static(b"kept")).await.unwrap();
    sender.raw().end();
    read_to_end(receiver.raw().readable()).await;

    let json = serde_json::to_value(receiver.status()).unwrap();
    assert_eq!(json["function"], "sha2-256");
    assert_eq!(json["verification_status"], "Compromised");
    assert_eq!(json["total_records"], 2);
    assert_eq!(json["filtered_records"], 1);
}
