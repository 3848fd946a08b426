//! Card event monitoring: reacting to presence-change batches.
//!
//! The reader subsystem reports batches of added and removed cards, one
//! batch per hardware callback cycle.  [`CardObserver`] is the explicit
//! seam for those callbacks; [`CardEventMonitor`] is its single production
//! implementation.  Insertions fan out into one independent pipeline task
//! per card so the event pump never blocks on card I/O; removals publish
//! the absence marker directly — no connection or decode step is needed.
//!
//! The pump itself never stops on a per-batch problem: card failures are
//! contained inside the spawned tasks, and the loop only ends when the
//! batch channel closes.

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, info};

use tagbridge_core::hex::to_hex_string;

use crate::application::process_card::CardPipeline;
use crate::infrastructure::reader::{CardBatch, CardEvent};

/// Receives card presence changes, one batch per reader callback cycle.
pub trait CardObserver: Send + Sync {
    /// Called for the cards inserted in this cycle.  Must not block.
    fn on_cards_added(&self, cards: &[CardEvent]);
    /// Called for the cards removed in this cycle.  Must not block.
    fn on_cards_removed(&self, cards: &[CardEvent]);
}

/// Production observer: owns the pipeline and fans events out to tasks.
pub struct CardEventMonitor {
    pipeline: Arc<CardPipeline>,
}

impl CardEventMonitor {
    pub fn new(pipeline: Arc<CardPipeline>) -> Self {
        Self { pipeline }
    }
}

impl CardObserver for CardEventMonitor {
    fn on_cards_added(&self, cards: &[CardEvent]) {
        for card in cards {
            info!("card inserted: {}", to_hex_string(&card.atr));
            // One task per insertion, unbounded; the pipeline lock
            // serialises the actual work.
            let pipeline = Arc::clone(&self.pipeline);
            let card = card.clone();
            tokio::spawn(async move {
                pipeline.process_card(card).await;
            });
        }
    }

    fn on_cards_removed(&self, cards: &[CardEvent]) {
        for card in cards {
            info!("card removed: {}", to_hex_string(&card.atr));
            let pipeline = Arc::clone(&self.pipeline);
            tokio::spawn(async move {
                pipeline.publish_removal().await;
            });
        }
    }
}

/// Drains presence batches from the reader subsystem into the observer.
///
/// Runs until the batch channel closes (source stopped or monitor thread
/// died).  The caller treats an unexpected end as fatal.
pub async fn pump_card_events(
    mut rx: mpsc::Receiver<CardBatch>,
    observer: Arc<dyn CardObserver>,
) {
    while let Some(batch) = rx.recv().await {
        debug!(
            "card event batch: {} added, {} removed",
            batch.added.len(),
            batch.removed.len()
        );
        observer.on_cards_added(&batch.added);
        observer.on_cards_removed(&batch.removed);
    }
    info!("card event stream closed");
}

// ── Tests ─────────────────────────────────────────────────────────────────────
