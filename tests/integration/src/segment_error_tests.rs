//! Labeled error routing through the transport and shared segments

use crate::test_utils::{init_tracing, read_n, transport, transport_with};
use bytes::Bytes;
use conduit_checksum::{ChecksumFunction, CodecError};
use conduit_core::{Config, SegmentConfig, TransportConfig};
use conduit_stream::{
    pipe, Channel, ChannelError, ErrorChannel, IntegrityTransportSegment, Segment,
    CHECKSUM_CHANNEL, FILTERED_CHANNEL, RAW_CHANNEL,
};
use std::sync::Arc;

fn wrapped(payload: &'static [u8]) -> Bytes {
    conduit_checksum::wrap(payload, ChecksumFunction::Sha2_256)
}

#[tokio::test]
async fn test_each_member_error_carries_its_label() {
    init_tracing();
    let transport = transport("sha2-256");

    transport.raw().fail(ChannelError::Other("raw side".to_string()));
    transport
        .filtered()
        .fail(ChannelError::Other("filtered side".to_string()));
    transport
        .checksum()
        .write(Bytes::from_static(b"\x00\x12\x00"))
        .await
        .unwrap();

    let labels: Vec<String> = {
        let mut labels = Vec::new();
        for _ in 0..3 {
            labels.push(transport.error().read().await.unwrap().label);
        }
        labels
    };
    assert_eq!(labels, vec![RAW_CHANNEL, FILTERED_CHANNEL, CHECKSUM_CHANNEL]);
}

#[tokio::test]
async fn test_malformed_records_do_not_stop_the_transport() {
    init_tracing();
    let transport = transport("sha2-256");

    transport.checksum().write(Bytes::from_static(b"junk")).await.unwrap();
    transport.checksum().write(wrapped(b"after junk")).await.unwrap();

    assert_eq!(
        read_n(transport.raw().readable(), 1).await,
        vec![Bytes::from_static(b"after junk")]
    );
    let labeled = transport.error().read().await.unwrap();
    assert_eq!(labeled.label, CHECKSUM_CHANNEL);
    assert!(matches!(labeled.error, ChannelError::Parse(_)));
    assert!(!transport.segment().is_halted());
}

#[tokio::test]
async fn test_unknown_function_code_is_a_parse_error() {
    init_tracing();
    let transport = transport("sha2-256");

    // Well-formed header naming a function nobody supports.
    let mut wire = vec![0x00, 0x99, 0x00, 0x00];
    wire.extend_from_slice(b"payload");
    transport.checksum().write(Bytes::from(wire)).await.unwrap();

    let labeled = transport.error().read().await.unwrap();
    assert_eq!(
        labeled.error,
        ChannelError::Parse(CodecError::UnknownFunction(0x99))
    );
    assert_eq!(transport.status().malformed_records, 1);
}

#[tokio::test]
async fn test_full_error_channel_drops_without_blocking() {
    init_tracing();
    let config = TransportConfig {
        segment: Some(SegmentConfig {
            error_buffer: 2,
            halt_on_error: false,
        }),
        ..TransportConfig::default()
    };
    let transport = transport_with("sha2-256", &config);

    for _ in 0..5 {
        transport.checksum().write(Bytes::from_static(b"x")).await.unwrap();
    }
    // A valid record behind the junk proves the check stage kept going.
    transport.checksum().write(wrapped(b"ok")).await.unwrap();
    assert_eq!(
        read_n(transport.raw().readable(), 1).await,
        vec![Bytes::from_static(b"ok")]
    );

    assert_eq!(transport.error().drain().len(), 2);
    assert_eq!(transport.error().dropped(), 3);
    assert_eq!(
        transport
            .segment()
            .redirect(CHECKSUM_CHANNEL)
            .unwrap()
            .forwarded(),
        5
    );
}

#[tokio::test]
async fn test_halt_policy_from_config() {
    init_tracing();
    let config = Config::from_toml_str(
        r#"
        [segment]
        halt_on_error = true

        [transport]
        checksum_function = "blake3"
        "#,
    )
    .unwrap();
    let transport = IntegrityTransportSegment::from_config(&config.transport_config()).unwrap();
    assert_eq!(transport.function(), ChecksumFunction::Blake3);

    transport.checksum().write(Bytes::from_static(b"??")).await.unwrap();
    let labeled = transport.error().read().await.unwrap();
    assert_eq!(labeled.label, CHECKSUM_CHANNEL);

    assert!(transport.segment().is_halted());
    assert_eq!(transport.raw().read().await, None);
    assert!(transport.filtered().is_halted());
    assert!(matches!(
        transport.raw().write(Bytes::from_static(b"late")).await,
        Err(ChannelError::WriteAfterEnd)
    ));
}

#[tokio::test]
async fn test_segments_can_share_one_error_channel() {
    init_tracing();
    let shared = Arc::new(ErrorChannel::new(8));

    let (left_tx, _left_rx) = pipe::<u32>(1);
    let (_right_tx, right_rx) = pipe::<u32>(1);
    let left = Segment::with_defaults(vec![
        ("error", Arc::clone(&shared) as Arc<dyn Channel>),
        ("left", Arc::new(left_tx) as Arc<dyn Channel>),
    ])
    .unwrap();
    let right = Segment::with_defaults(vec![
        ("error", Arc::clone(&shared) as Arc<dyn Channel>),
        ("right", Arc::new(right_rx) as Arc<dyn Channel>),
    ])
    .unwrap();

    left.get("left").unwrap().fail(ChannelError::Halted);
    right.get("right").unwrap().fail(ChannelError::Halted);

    let labels: Vec<String> = shared.drain().into_iter().map(|item| item.label).collect();
    assert_eq!(labels, vec!["left", "right"]);
}
