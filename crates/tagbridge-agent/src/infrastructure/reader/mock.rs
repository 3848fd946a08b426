//! Mock reader implementations for unit and integration testing.
//!
//! Allow tests to inject presence batches and canned NDEF payloads without
//! PC/SC hardware or the system smartcard service.  The mock reader also
//! instruments read concurrency so tests can assert that pipeline runs
//! never overlap.

use std::sync::{
    atomic::{AtomicU32, Ordering},
    Arc, Mutex,
};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;

use super::{
    CardBatch, CardEvent, CardSource, MonitorError, ReaderError, TagConnection, TagReader,
};

// ── Presence source ───────────────────────────────────────────────────────────

/// A mock implementation of [`CardSource`] that lets tests inject batches.
#[derive(Default)]
pub struct MockCardSource {
    sender: Mutex<Option<mpsc::Sender<CardBatch>>>,
}

impl MockCardSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Injects a batch, as if reported by the reader subsystem.
    ///
    /// Panics if `start()` has not been called or `stop()` already was.
    pub fn inject_batch(&self, batch: CardBatch) {
        let guard = self.sender.lock().expect("lock poisoned");
        match guard.as_ref() {
            Some(tx) => tx
                .try_send(batch)
                .expect("receiver dropped or channel full"),
            None => panic!("MockCardSource::inject_batch called before start()"),
        }
    }
}

impl CardSource for MockCardSource {
    fn start(&self) -> Result<mpsc::Receiver<CardBatch>, MonitorError> {
        let (tx, rx) = mpsc::channel(16);
        *self.sender.lock().expect("lock poisoned") = Some(tx);
        Ok(rx)
    }

    fn stop(&self) {
        // Drop the sender to close the channel.
        *self.sender.lock().expect("lock poisoned") = None;
    }
}

// ── Tag reader ────────────────────────────────────────────────────────────────

/// Canned outcome for connection attempts and reads.
#[derive(Debug, Clone)]
enum MockBehavior {
    /// `read_ndef` returns this payload (`None` = readable, no NDEF).
    Payload(Option<Vec<u8>>),
    /// `connect` fails.
    FailConnect(String),
    /// `connect` succeeds, `read_ndef` fails.
    FailRead(String),
}

struct MockState {
    behavior: Mutex<MockBehavior>,
    read_delay: Mutex<Duration>,
    reads_started: AtomicU32,
    active_reads: AtomicU32,
    max_active_reads: AtomicU32,
}

/// A mock implementation of [`TagReader`] with a configurable outcome.
///
/// Every read bumps `reads_started` and tracks how many reads were in
/// flight at once; [`max_concurrent_reads`](Self::max_concurrent_reads)
/// exposes the high-water mark so tests can prove the pipeline lock keeps
/// hardware access exclusive.
pub struct MockTagReader {
    state: Arc<MockState>,
}

impl MockTagReader {
    /// A reader whose cards are readable but carry no NDEF message.
    pub fn new() -> Self {
        Self::with_behavior(MockBehavior::Payload(None))
    }

    /// A reader whose cards return `payload` from every read.
    pub fn with_payload(payload: Vec<u8>) -> Self {
        Self::with_behavior(MockBehavior::Payload(Some(payload)))
    }

    fn with_behavior(behavior: MockBehavior) -> Self {
        Self {
            state: Arc::new(MockState {
                behavior: Mutex::new(behavior),
                read_delay: Mutex::new(Duration::ZERO),
                reads_started: AtomicU32::new(0),
                active_reads: AtomicU32::new(0),
                max_active_reads: AtomicU32::new(0),
            }),
        }
    }

    /// Replaces the canned payload.
    pub fn set_payload(&self, payload: Option<Vec<u8>>) {
        *self.state.behavior.lock().expect("lock poisoned") = MockBehavior::Payload(payload);
    }

    /// Makes every subsequent connection attempt fail.
    pub fn fail_connects_with(&self, detail: &str) {
        *self.state.behavior.lock().expect("lock poisoned") =
            MockBehavior::FailConnect(detail.to_string());
    }

    /// Makes every subsequent read fail after connecting successfully.
    pub fn fail_reads_with(&self, detail: &str) {
        *self.state.behavior.lock().expect("lock poisoned") =
            MockBehavior::FailRead(detail.to_string());
    }

    /// Holds every read open for `delay`, widening any overlap window.
    pub fn set_read_delay(&self, delay: Duration) {
        *self.state.read_delay.lock().expect("lock poisoned") = delay;
    }

    /// Total reads started, including failed ones.
    pub fn reads_started(&self) -> u32 {
        self.state.reads_started.load(Ordering::SeqCst)
    }

    /// The most reads ever in flight simultaneously.
    pub fn max_concurrent_reads(&self) -> u32 {
        self.state.max_active_reads.load(Ordering::SeqCst)
    }
}

impl Default for MockTagReader {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TagReader for MockTagReader {
    async fn connect(&self, event: &CardEvent) -> Result<Box<dyn TagConnection>, ReaderError> {
        if let MockBehavior::FailConnect(detail) =
            &*self.state.behavior.lock().expect("lock poisoned")
        {
            return Err(ReaderError::Connect {
                reader: event.reader_name.clone(),
                detail: detail.clone(),
            });
        }
        Ok(Box::new(MockTagConnection {
            atr: event.atr.clone(),
            state: Arc::clone(&self.state),
        }))
    }
}

struct MockTagConnection {
    atr: Vec<u8>,
    state: Arc<MockState>,
}

#[async_trait]
impl TagConnection for MockTagConnection {
    fn atr(&self) -> &[u8] {
        &self.atr
    }

    async fn read_ndef(&mut self) -> Result<Option<Vec<u8>>, ReaderError> {
        self.state.reads_started.fetch_add(1, Ordering::SeqCst);
        let active = self.state.active_reads.fetch_add(1, Ordering::SeqCst) + 1;
        self.state
            .max_active_reads
            .fetch_max(active, Ordering::SeqCst);

        let delay = *self.state.read_delay.lock().expect("lock poisoned");
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        let behavior = self.state.behavior.lock().expect("lock poisoned").clone();
        self.state.active_reads.fetch_sub(1, Ordering::SeqCst);

        match behavior {
            MockBehavior::Payload(payload) => Ok(payload),
            MockBehavior::FailRead(detail) => Err(ReaderError::Transmit(detail)),
            MockBehavior::FailConnect(detail) => Err(ReaderError::Transmit(detail)),
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
