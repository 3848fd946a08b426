//! The per-card processing pipeline.
//!
//! One invocation per inserted card: acquire the pipeline lock, connect to
//! the card, read its NDEF payload, decode, resolve, publish.  A single
//! mutex guards the entire sequence system-wide, so at most one card's
//! pipeline runs at a time — hardware access and state publishes never
//! interleave across cards.  Card removals only publish a constant absence
//! marker and bypass the lock.
//!
//! There is deliberately no timeout on the raw read or the lock wait: a
//! hung read stalls that one card's task, while the event monitor and
//! queued tasks keep working once the lock frees.
//!
//! This module is one of the two designated error boundaries:
//! [`CardPipeline::process_card`] logs every [`CardError`] and lets none
//! escape to the monitor.

use std::sync::Arc;

use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use tagbridge_core::hex::{to_hex_compact, to_hex_string};
use tagbridge_core::{decode_records, resolve_identity, NdefRecord, TagIdentity};

use crate::infrastructure::publisher::{PublishError, StatePublisher};
use crate::infrastructure::reader::{CardEvent, ReaderError, TagReader};

/// A per-card failure.  Logged at the pipeline boundary; never propagates.
#[derive(Debug, Error)]
pub enum CardError {
    /// The card's exclusive connection could not be acquired.
    #[error("failed to connect to card: {0}")]
    Connection(ReaderError),

    /// The raw-read collaborator reported an error.  Nothing is published.
    #[error("failed to read tag payload: {0}")]
    Read(ReaderError),

    /// The resolved state could not be handed to the publisher.
    #[error("failed to publish tag state: {0}")]
    Publish(#[from] PublishError),
}

/// Mutable pipeline state.  Lives inside the processing lock so the
/// counter is only ever touched by the task currently holding the
/// critical section.
#[derive(Debug, Default)]
struct PipelineState {
    cards_processed: u64,
}

/// The per-card worker owning the processing lock and counter.
pub struct CardPipeline {
    reader: Arc<dyn TagReader>,
    publisher: Arc<dyn StatePublisher>,
    tag_prefix: String,
    state: Mutex<PipelineState>,
}

impl CardPipeline {
    pub fn new(
        reader: Arc<dyn TagReader>,
        publisher: Arc<dyn StatePublisher>,
        tag_prefix: impl Into<String>,
    ) -> Self {
        Self {
            reader,
            publisher,
            tag_prefix: tag_prefix.into(),
            state: Mutex::new(PipelineState::default()),
        }
    }

    /// Number of cards fully read and classified so far.
    pub async fn cards_processed(&self) -> u64 {
        self.state.lock().await.cards_processed
    }

    /// Processes one inserted card.
    ///
    /// This is the designated per-card error boundary: failures are logged
    /// here and never propagate to the caller.
    pub async fn process_card(&self, card: CardEvent) {
        let mut state = self.state.lock().await;
        match self.run(&card).await {
            Ok(Some(identity)) => {
                state.cards_processed += 1;
                info!(
                    "card read completed, state {:?} (total: {})",
                    identity.state_string(),
                    state.cards_processed
                );
            }
            // Cards without a payload publish their fallback state inside
            // `run` but do not count as processed reads.
            Ok(None) => {}
            Err(e) => error!("error processing card: {e}"),
        }
    }

    /// Publishes the absence marker for a removed card.
    ///
    /// Removal needs no connection or decode step, so it bypasses the
    /// processing lock entirely.
    pub async fn publish_removal(&self) {
        if let Err(e) = self.publisher.publish_state(None).await {
            error!("failed to publish card removal: {e}");
        }
    }

    /// The fallible pipeline body, run while holding the lock.
    ///
    /// Returns `Some(identity)` when the full decode path completed and
    /// `None` when the card had no payload (fallback state already
    /// published).
    async fn run(&self, card: &CardEvent) -> Result<Option<TagIdentity>, CardError> {
        let atr_hex = to_hex_string(&card.atr);

        // Connection release is guaranteed by drop on every exit path.
        let mut connection = self
            .reader
            .connect(card)
            .await
            .map_err(CardError::Connection)?;
        info!("connected to card in {}", card.reader_name);

        let data = connection.read_ndef().await.map_err(CardError::Read)?;

        let Some(data) = data.filter(|d| !d.is_empty()) else {
            info!("no NDEF data found on card");
            let identity = TagIdentity::NoNdef { atr_hex };
            self.publisher
                .publish_state(Some(&identity.state_string()))
                .await?;
            return Ok(None);
        };

        debug!("raw NDEF data ({} bytes): {}", data.len(), to_hex_compact(&data));

        let records = match decode_records(&data) {
            Ok(records) => records,
            Err(e) => {
                // Malformed input is never fatal: classify what did decode.
                warn!(
                    "NDEF decode failed ({e}); continuing with {} decoded records",
                    e.decoded.len()
                );
                e.decoded
            }
        };

        log_records(&records);

        let identity = resolve_identity(&records, &atr_hex, &self.tag_prefix);
        self.publisher
            .publish_state(Some(&identity.state_string()))
            .await?;
        Ok(Some(identity))
    }
}

/// Logs the decoded record sequence for operators.
fn log_records(records: &[NdefRecord]) {
    for (i, record) in records.iter().enumerate() {
        info!(
            "record {}: TNF {} ({}), type {:?}, {} payload bytes",
            i + 1,
            record.tnf.bits(),
            record.tnf.name(),
            record.type_string(),
            record.payload.len()
        );
        if let Some(id) = record.id_string() {
            info!("  id: {id}");
        }
        debug!("  payload: {}", to_hex_compact(&record.payload));
        debug!(
            "  flags: MB={} ME={} CF={} SR={} IL={}",
            record.flags.message_begin,
            record.flags.message_end,
            record.flags.chunked,
            record.flags.short_record,
            record.flags.has_id
        );
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::publisher::mock::RecordingPublisher;
    use crate::infrastructure::reader::mock::MockTagReader;

    const ATR: [u8; 4] = [0x3B, 0x8F, 0x80, 0x01];
    const ATR_HEX: &str = "3B 8F 80 01";

    fn card() -> CardEvent {
        CardEvent {
            reader_name: "Mock Reader 0".to_string(),
            atr: ATR.to_vec(),
        }
    }

    /// One short URI record: "https://www." + suffix.
    fn uri_message(suffix: &str) -> Vec<u8> {
        let mut buf = vec![
            0x80 | 0x40 | 0x10 | 0x01, // MB | ME | SR | well-known
            0x01,
            (suffix.len() + 1) as u8,
            b'U',
            0x02,
        ];
        buf.extend_from_slice(suffix.as_bytes());
        buf
    }

    fn pipeline(
        reader: MockTagReader,
    ) -> (Arc<CardPipeline>, Arc<RecordingPublisher>) {
        let publisher = Arc::new(RecordingPublisher::new());
        let pipeline = Arc::new(CardPipeline::new(
            Arc::new(reader),
            Arc::clone(&publisher) as Arc<dyn StatePublisher>,
            tagbridge_core::DEFAULT_TAG_PREFIX,
        ));
        (pipeline, publisher)
    }

    #[tokio::test]
    async fn test_automation_tag_publishes_its_id() {
        // Arrange
        let reader = MockTagReader::with_payload(uri_message("home-assistant.io/tag/abc123"));
        let (pipeline, publisher) = pipeline(reader);

        // Act
        pipeline.process_card(card()).await;

        // Assert
        assert_eq!(publisher.states(), vec![Some("abc123".to_string())]);
        assert_eq!(pipeline.cards_processed().await, 1);
    }

    #[tokio::test]
    async fn test_card_without_payload_publishes_no_ndef_state() {
        // Arrange: default mock reads Ok(None)
        let (pipeline, publisher) = pipeline(MockTagReader::new());

        // Act
        pipeline.process_card(card()).await;

        // Assert – fallback published, but the card does not count as processed
        assert_eq!(
            publisher.states(),
            vec![Some(format!("no_ndef_{ATR_HEX}"))]
        );
        assert_eq!(pipeline.cards_processed().await, 0);
    }

    #[tokio::test]
    async fn test_empty_payload_is_treated_as_no_ndef() {
        let reader = MockTagReader::with_payload(vec![]);
        let (pipeline, publisher) = pipeline(reader);

        pipeline.process_card(card()).await;

        assert_eq!(
            publisher.states(),
            vec![Some(format!("no_ndef_{ATR_HEX}"))]
        );
    }

    #[tokio::test]
    async fn test_read_failure_publishes_nothing() {
        // Arrange
        let reader = MockTagReader::new();
        reader.fail_reads_with("transmit glitch");
        let (pipeline, publisher) = pipeline(reader);

        // Act – must not panic; the boundary logs the error
        pipeline.process_card(card()).await;

        // Assert
        assert!(publisher.states().is_empty());
        assert_eq!(pipeline.cards_processed().await, 0);
    }

    #[tokio::test]
    async fn test_connect_failure_publishes_nothing() {
        let reader = MockTagReader::new();
        reader.fail_connects_with("card already gone");
        let (pipeline, publisher) = pipeline(reader);

        pipeline.process_card(card()).await;

        assert!(publisher.states().is_empty());
        assert_eq!(pipeline.cards_processed().await, 0);
    }

    #[tokio::test]
    async fn test_unrecognised_payload_publishes_generic_state() {
        // A media-type record: decodes fine, classifies as nothing.
        let reader = MockTagReader::with_payload(vec![
            0x80 | 0x40 | 0x10 | 0x02, // MB | ME | SR | media type
            0x01,
            0x02,
            b't',
            0xAB,
            0xCD,
        ]);
        let (pipeline, publisher) = pipeline(reader);

        pipeline.process_card(card()).await;

        assert_eq!(
            publisher.states(),
            vec![Some(format!("generic_{ATR_HEX}"))]
        );
        assert_eq!(pipeline.cards_processed().await, 1);
    }

    #[tokio::test]
    async fn test_truncated_payload_classifies_decoded_prefix() {
        // A complete automation-tag record, then a record whose declared
        // payload overruns the buffer.  Best-effort classification must
        // still publish the tag id.
        let mut payload = uri_message("home-assistant.io/tag/partial");
        payload[0] &= !0x40; // clear ME on the first record
        payload.extend_from_slice(&[0x50, 0x01, 0x7F, b'U']); // truncated second record

        let reader = MockTagReader::with_payload(payload);
        let (pipeline, publisher) = pipeline(reader);

        pipeline.process_card(card()).await;

        assert_eq!(publisher.states(), vec![Some("partial".to_string())]);
    }

    #[tokio::test]
    async fn test_publish_failure_is_contained() {
        let reader = MockTagReader::with_payload(uri_message("home-assistant.io/tag/abc123"));
        let publisher = Arc::new(RecordingPublisher::failing());
        let pipeline = CardPipeline::new(
            Arc::new(reader),
            Arc::clone(&publisher) as Arc<dyn StatePublisher>,
            tagbridge_core::DEFAULT_TAG_PREFIX,
        );

        // Must not panic, and the failed publish must not count the card.
        pipeline.process_card(card()).await;
        assert_eq!(pipeline.cards_processed().await, 0);
    }

    #[tokio::test]
    async fn test_removal_publishes_absence_marker() {
        let (pipeline, publisher) = pipeline(MockTagReader::new());

        pipeline.publish_removal().await;

        assert_eq!(publisher.states(), vec![None]);
    }

    #[tokio::test]
    async fn test_counter_accumulates_across_cards() {
        let reader = MockTagReader::with_payload(uri_message("home-assistant.io/tag/a"));
        let (pipeline, _publisher) = pipeline(reader);

        pipeline.process_card(card()).await;
        pipeline.process_card(card()).await;
        pipeline.process_card(card()).await;

        assert_eq!(pipeline.cards_processed().await, 3);
    }
}
