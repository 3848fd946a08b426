//! Card reader infrastructure.
//!
//! The reader subsystem produces two things the application layer consumes:
//!
//! - **Presence changes**: a [`CardSource`] delivers [`CardBatch`]es of
//!   added/removed cards, one batch per hardware callback cycle.
//! - **Tag payloads**: a [`TagReader`] opens an exclusive [`TagConnection`]
//!   to one card and reads its raw NDEF payload.
//!
//! Production implementations talk PC/SC on dedicated threads (the
//! underlying calls are blocking); see [`pcsc`].  Tests use the [`mock`]
//! implementations and never touch hardware.

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::mpsc;

pub mod mock;
#[cfg(feature = "pcsc")]
pub mod pcsc;
pub mod type2;

/// One card observed by the reader subsystem.
#[derive(Debug, Clone)]
pub struct CardEvent {
    /// Name of the reader the card sits in.
    pub reader_name: String,
    /// The card's answer-to-reset bytes, used as a fallback identifier.
    pub atr: Vec<u8>,
}

/// Presence changes reported in one hardware callback cycle.
#[derive(Debug, Clone, Default)]
pub struct CardBatch {
    pub added: Vec<CardEvent>,
    pub removed: Vec<CardEvent>,
}

impl CardBatch {
    /// `true` when the cycle carried no presence change at all.
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty()
    }
}

/// Error type for starting and running the card presence monitor.
#[derive(Debug, Error)]
pub enum MonitorError {
    /// The smartcard service context could not be established.
    #[error("failed to establish PC/SC context: {0}")]
    Establish(String),

    /// Reader enumeration failed outright.
    #[error("failed to enumerate readers: {0}")]
    ListReaders(String),

    /// Enumeration succeeded but no reader hardware is attached.
    #[error("no PC/SC readers found")]
    NoReaders,

    /// The dedicated monitor thread could not be spawned.
    #[error("failed to spawn monitor thread: {0}")]
    ThreadSpawn(#[source] std::io::Error),
}

/// Error type for per-card connection and payload reads.
#[derive(Debug, Error)]
pub enum ReaderError {
    /// The smartcard service context could not be established.
    #[error("failed to establish PC/SC context: {0}")]
    Establish(String),

    /// Connecting to the card in a specific reader failed.
    #[error("failed to connect to card in {reader}: {detail}")]
    Connect { reader: String, detail: String },

    /// The transport-level exchange with the card failed.
    #[error("card transmit failed: {0}")]
    Transmit(String),

    /// The card answered with a non-success status word.
    #[error("read rejected with status {sw1:02X} {sw2:02X}")]
    Status { sw1: u8, sw2: u8 },

    /// The tag's TLV area is internally inconsistent.
    #[error("malformed NDEF TLV at offset {offset}: {reason}")]
    MalformedTlv { offset: usize, reason: String },

    /// The connection was consumed by a previous failed read.
    #[error("connection is no longer usable")]
    ConnectionClosed,

    /// The blocking reader task was cancelled or panicked.
    #[error("blocking reader task failed: {0}")]
    Task(String),
}

/// Produces card presence change batches from the reader subsystem.
///
/// The production implementation watches PC/SC status changes on a
/// dedicated thread; tests use [`mock::MockCardSource`].
pub trait CardSource: Send {
    /// Starts the source and returns the receiver for presence batches.
    fn start(&self) -> Result<mpsc::Receiver<CardBatch>, MonitorError>;
    /// Signals the source to stop delivering batches and release the
    /// underlying resources.
    fn stop(&self);
}

/// An exclusive connection to one card.
///
/// Dropping the connection releases it on every exit path.
#[async_trait]
pub trait TagConnection: Send {
    /// The card's answer-to-reset bytes.
    fn atr(&self) -> &[u8];

    /// Reads the card's NDEF payload.
    ///
    /// `Ok(None)` means the card is readable but carries no NDEF message
    /// (unformatted tag, empty TLV area).
    ///
    /// # Errors
    ///
    /// Returns [`ReaderError`] when the exchange with the card fails or
    /// the tag's TLV structure is malformed.
    async fn read_ndef(&mut self) -> Result<Option<Vec<u8>>, ReaderError>;
}

/// Opens exclusive connections to observed cards.
#[async_trait]
pub trait TagReader: Send + Sync {
    /// Connects to the card described by `event`.
    ///
    /// # Errors
    ///
    /// Returns [`ReaderError::Connect`] when the card cannot be claimed
    /// (already gone, reader unplugged, protocol mismatch).
    async fn connect(&self, event: &CardEvent) -> Result<Box<dyn TagConnection>, ReaderError>;
}
