//! Integration tests for the card event monitor and pump.
//!
//! # Purpose
//!
//! These tests run the whole event path the way `main` wires it: a
//! [`MockCardSource`] stands in for the PC/SC monitor thread, the pump
//! drains its batches into a [`CardEventMonitor`], and the monitor fans
//! the work out to pipeline tasks.  They verify the monitor-side
//! contract:
//!
//! - An insertion batch ends in a published tag state; a removal batch in
//!   the absence marker.
//! - A card that fails to read never stops later batches from being
//!   handled (per-card isolation seen from the monitor side).
//! - The pump only ends when the source is stopped.

use std::sync::Arc;
use std::time::Duration;

use tagbridge_agent::application::monitor_cards::{
    pump_card_events, CardEventMonitor, CardObserver,
};
use tagbridge_agent::application::process_card::CardPipeline;
use tagbridge_agent::infrastructure::publisher::mock::RecordingPublisher;
use tagbridge_agent::infrastructure::publisher::StatePublisher;
use tagbridge_agent::infrastructure::reader::mock::{MockCardSource, MockTagReader};
use tagbridge_agent::infrastructure::reader::{CardBatch, CardEvent, CardSource, TagReader};
use tagbridge_core::DEFAULT_TAG_PREFIX;

fn card() -> CardEvent {
    CardEvent {
        reader_name: "Mock Reader 0".to_string(),
        atr: vec![0x3B, 0x8F, 0x80, 0x01],
    }
}

/// One short URI record: "https://www." + suffix.
fn uri_message(suffix: &str) -> Vec<u8> {
    let mut buf = vec![
        0x80 | 0x40 | 0x10 | 0x01,
        0x01,
        (suffix.len() + 1) as u8,
        b'U',
        0x02,
    ];
    buf.extend_from_slice(suffix.as_bytes());
    buf
}

struct Harness {
    source: MockCardSource,
    reader: Arc<MockTagReader>,
    publisher: Arc<RecordingPublisher>,
    pump: tokio::task::JoinHandle<()>,
}

/// Wires source → pump → monitor → pipeline with mocks, mirroring `main`.
fn start_harness(reader: MockTagReader) -> Harness {
    let source = MockCardSource::new();
    let rx = source.start().expect("mock source must start");

    let reader = Arc::new(reader);
    let publisher = Arc::new(RecordingPublisher::new());
    let pipeline = Arc::new(CardPipeline::new(
        Arc::clone(&reader) as Arc<dyn TagReader>,
        Arc::clone(&publisher) as Arc<dyn StatePublisher>,
        DEFAULT_TAG_PREFIX,
    ));
    let observer: Arc<dyn CardObserver> = Arc::new(CardEventMonitor::new(pipeline));
    let pump = tokio::spawn(pump_card_events(rx, observer));

    Harness {
        source,
        reader,
        publisher,
        pump,
    }
}

/// Polls until `predicate` holds or two seconds pass.
async fn wait_until(predicate: impl Fn() -> bool) {
    tokio::time::timeout(Duration::from_secs(2), async {
        while !predicate() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("condition not reached within two seconds");
}

#[tokio::test]
async fn test_insertion_batch_ends_in_published_tag_state() {
    // Arrange
    let harness = start_harness(MockTagReader::with_payload(uri_message(
        "home-assistant.io/tag/kitchen",
    )));

    // Act
    harness.source.inject_batch(CardBatch {
        added: vec![card()],
        removed: vec![],
    });

    // Assert
    let publisher = Arc::clone(&harness.publisher);
    wait_until(move || publisher.publish_count() == 1).await;
    assert_eq!(
        harness.publisher.states(),
        vec![Some("kitchen".to_string())]
    );

    harness.source.stop();
    harness.pump.await.expect("pump must exit cleanly");
}

#[tokio::test]
async fn test_removal_batch_publishes_absence_marker() {
    let harness = start_harness(MockTagReader::new());

    harness.source.inject_batch(CardBatch {
        added: vec![],
        removed: vec![card()],
    });

    let publisher = Arc::clone(&harness.publisher);
    wait_until(move || publisher.publish_count() == 1).await;
    assert_eq!(harness.publisher.states(), vec![None]);

    harness.source.stop();
    harness.pump.await.expect("pump must exit cleanly");
}

#[tokio::test]
async fn test_failing_card_does_not_stop_later_batches() {
    // Arrange: every read fails, so insertions publish nothing.
    let reader = MockTagReader::new();
    reader.fail_reads_with("dead tag");
    let harness = start_harness(reader);

    // Act: a failing insertion batch, then a removal batch.
    harness.source.inject_batch(CardBatch {
        added: vec![card()],
        removed: vec![],
    });
    harness.source.inject_batch(CardBatch {
        added: vec![],
        removed: vec![card()],
    });

    // Assert: the failing card was read (and dropped), and the removal
    // from the later batch still went through.
    let reader = Arc::clone(&harness.reader);
    wait_until(move || reader.reads_started() == 1).await;
    let publisher = Arc::clone(&harness.publisher);
    wait_until(move || publisher.publish_count() == 1).await;
    assert_eq!(harness.publisher.states(), vec![None]);

    harness.source.stop();
    harness.pump.await.expect("pump must exit cleanly");
}

#[tokio::test]
async fn test_one_batch_with_multiple_insertions_processes_each_card() {
    let harness = start_harness(MockTagReader::with_payload(uri_message(
        "home-assistant.io/tag/multi",
    )));

    harness.source.inject_batch(CardBatch {
        added: vec![card(), card(), card()],
        removed: vec![],
    });

    let publisher = Arc::clone(&harness.publisher);
    wait_until(move || publisher.publish_count() == 3).await;
    assert_eq!(harness.reader.max_concurrent_reads(), 1);

    harness.source.stop();
    harness.pump.await.expect("pump must exit cleanly");
}

#[tokio::test]
async fn test_pump_ends_only_when_source_stops() {
    let harness = start_harness(MockTagReader::new());

    // The pump must still be alive after an idle moment...
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(!harness.pump.is_finished());

    // ...and end promptly once the source is stopped.
    harness.source.stop();
    tokio::time::timeout(Duration::from_secs(1), harness.pump)
        .await
        .expect("pump must end after stop()")
        .expect("pump must not panic");
}
