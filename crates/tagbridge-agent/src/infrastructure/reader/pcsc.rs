//! PC/SC implementations of the reader traits.
//!
//! Three pieces live here:
//!
//! - [`check_reader_system`] – the startup readiness probe.  Without at
//!   least one reader the whole process is pointless, so failure here is
//!   fatal before any monitoring starts.
//! - [`PcscCardSource`] – the presence monitor.  `SCardGetStatusChange`
//!   blocks, so the monitor runs on a dedicated thread and forwards
//!   [`CardBatch`]es over a bounded channel, re-checking the shutdown flag
//!   on every timeout.  A PnP pseudo-reader row keeps hot-plugged readers
//!   visible without polling the reader list aggressively.
//! - [`PcscTagReader`] – per-card connections.  Blocking connect/transmit
//!   calls are pushed onto the blocking thread pool so pipeline tasks never
//!   stall the async runtime.
//!
//! Payloads are read with the contactless storage-card pseudo-APDU
//! `FF B0 00 <block> <len>` (READ BINARY), then run through the Type 2
//! TLV extraction in [`super::type2`].

use std::ffi::CString;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::time::Duration;

use async_trait::async_trait;
use pcsc::{Card, Context, Protocols, ReaderState, Scope, ShareMode, State, PNP_NOTIFICATION};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use super::type2::{extract_ndef_message, CapabilityContainer};
use super::{
    CardBatch, CardEvent, CardSource, MonitorError, ReaderError, TagConnection, TagReader,
};

/// Block size of a Type 2 tag.
const T2_BLOCK_LEN: usize = 4;
/// Block index of the capability container.
const CC_BLOCK: u8 = 3;
/// First block of the TLV data area.
const DATA_START_BLOCK: u8 = 4;

// ── Startup readiness ─────────────────────────────────────────────────────────

/// Verifies the PC/SC system is usable and at least one reader is present.
///
/// Logs every reader found, probing each for a card so the operator can
/// see the hardware state at startup.  Returns the reader count.
///
/// # Errors
///
/// Returns [`MonitorError::NoReaders`] when enumeration succeeds but no
/// reader is attached, or the establish/enumeration errors otherwise.
pub fn check_reader_system() -> Result<usize, MonitorError> {
    info!("checking PC/SC system status");
    let ctx = Context::establish(Scope::User).map_err(|e| MonitorError::Establish(e.to_string()))?;

    let mut readers_buf = [0u8; 4096];
    let names: Vec<CString> = ctx
        .list_readers(&mut readers_buf)
        .map_err(|e| MonitorError::ListReaders(e.to_string()))?
        .map(CString::from)
        .collect();

    info!("available readers: {}", names.len());
    for (i, name) in names.iter().enumerate() {
        info!("reader {i}: {}", name.to_string_lossy());
        match ctx.connect(name, ShareMode::Shared, Protocols::ANY) {
            Ok(_card) => info!("reader {i} has a card present"),
            Err(pcsc::Error::NoSmartcard) => info!("reader {i} has no card"),
            Err(e) => warn!("reader {i} error: {e}"),
        }
    }

    if names.is_empty() {
        return Err(MonitorError::NoReaders);
    }
    Ok(names.len())
}

// ── Presence monitoring ───────────────────────────────────────────────────────

/// Watches all PC/SC readers for card presence changes on a dedicated
/// thread.
pub struct PcscCardSource {
    running: Arc<AtomicBool>,
    poll_interval: Duration,
}

impl PcscCardSource {
    /// `poll_interval` bounds how long the monitor thread blocks in the
    /// status-change wait before re-checking the shutdown flag.
    pub fn new(poll_interval: Duration) -> Self {
        Self {
            running: Arc::new(AtomicBool::new(true)),
            poll_interval,
        }
    }
}

impl CardSource for PcscCardSource {
    fn start(&self) -> Result<mpsc::Receiver<CardBatch>, MonitorError> {
        let ctx =
            Context::establish(Scope::User).map_err(|e| MonitorError::Establish(e.to_string()))?;

        self.running.store(true, Ordering::Relaxed);
        let running = Arc::clone(&self.running);
        let poll_interval = self.poll_interval;
        let (tx, rx) = mpsc::channel(16);

        std::thread::Builder::new()
            .name("tagbridge-monitor".to_string())
            .spawn(move || monitor_loop(ctx, tx, running, poll_interval))
            .map_err(MonitorError::ThreadSpawn)?;

        Ok(rx)
    }

    fn stop(&self) {
        self.running.store(false, Ordering::Relaxed);
    }
}

/// The main status-change loop executed on the monitor thread.
fn monitor_loop(
    ctx: Context,
    tx: mpsc::Sender<CardBatch>,
    running: Arc<AtomicBool>,
    poll_interval: Duration,
) {
    let mut readers_buf = [0u8; 4096];
    let mut reader_states: Vec<ReaderState> =
        vec![ReaderState::new(PNP_NOTIFICATION(), State::UNAWARE)];

    while running.load(Ordering::Relaxed) {
        // Drop rows for readers that have disappeared.
        reader_states
            .retain(|rs| !rs.event_state().intersects(State::UNKNOWN | State::IGNORE));

        // Add rows for readers that appeared.
        let names = match ctx.list_readers(&mut readers_buf) {
            Ok(names) => names,
            Err(e) => {
                error!("failed to enumerate readers: {e}");
                std::thread::sleep(poll_interval);
                continue;
            }
        };
        for name in names {
            if !reader_states.iter().any(|rs| rs.name() == name) {
                debug!("tracking reader {}", name.to_string_lossy());
                reader_states.push(ReaderState::new(name, State::UNAWARE));
            }
        }

        // Remember the current view, then wait for it to change.
        for rs in &mut reader_states {
            rs.sync_current_state();
        }
        match ctx.get_status_change(poll_interval, &mut reader_states) {
            Ok(()) => {}
            Err(pcsc::Error::Timeout) => continue,
            Err(e) => {
                error!("status change wait failed: {e}");
                std::thread::sleep(poll_interval);
                continue;
            }
        }

        let batch = collect_batch(&reader_states);
        if batch.is_empty() {
            continue;
        }
        if tx.blocking_send(batch).is_err() {
            // Receiver dropped – application is shutting down.
            break;
        }
    }

    info!("card monitor stopped");
}

/// Turns the presence deltas of one status-change wake-up into a batch.
fn collect_batch(reader_states: &[ReaderState]) -> CardBatch {
    let mut batch = CardBatch::default();
    for rs in reader_states {
        if rs.name() == PNP_NOTIFICATION() {
            continue;
        }
        let was_present = rs.current_state().contains(State::PRESENT);
        let is_present = rs.event_state().contains(State::PRESENT);
        if is_present == was_present {
            continue;
        }
        let event = CardEvent {
            reader_name: rs.name().to_string_lossy().into_owned(),
            atr: rs.atr().to_vec(),
        };
        if is_present {
            batch.added.push(event);
        } else {
            batch.removed.push(event);
        }
    }
    batch
}

// ── Per-card connections ──────────────────────────────────────────────────────

/// Opens PC/SC connections to observed cards.
#[derive(Debug, Default)]
pub struct PcscTagReader;

impl PcscTagReader {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl TagReader for PcscTagReader {
    async fn connect(&self, event: &CardEvent) -> Result<Box<dyn TagConnection>, ReaderError> {
        let reader_name = event.reader_name.clone();
        let atr = event.atr.clone();

        let card = tokio::task::spawn_blocking(move || -> Result<Card, ReaderError> {
            let ctx = Context::establish(Scope::User)
                .map_err(|e| ReaderError::Establish(e.to_string()))?;
            let name = CString::new(reader_name.clone()).map_err(|_| ReaderError::Connect {
                reader: reader_name.clone(),
                detail: "reader name contains a NUL byte".to_string(),
            })?;
            ctx.connect(&name, ShareMode::Shared, Protocols::ANY)
                .map_err(|e| ReaderError::Connect {
                    reader: reader_name,
                    detail: e.to_string(),
                })
        })
        .await
        .map_err(|e| ReaderError::Task(e.to_string()))??;

        Ok(Box::new(PcscConnection {
            card: Some(card),
            atr,
        }))
    }
}

/// An open PC/SC card handle.  Disconnects on drop, which guarantees
/// release on every pipeline exit path.
struct PcscConnection {
    card: Option<Card>,
    atr: Vec<u8>,
}

#[async_trait]
impl TagConnection for PcscConnection {
    fn atr(&self) -> &[u8] {
        &self.atr
    }

    async fn read_ndef(&mut self) -> Result<Option<Vec<u8>>, ReaderError> {
        let card = self.card.take().ok_or(ReaderError::ConnectionClosed)?;

        let (card, result) = tokio::task::spawn_blocking(move || {
            let result = read_type2_payload(&card);
            (card, result)
        })
        .await
        .map_err(|e| ReaderError::Task(e.to_string()))?;

        self.card = Some(card);
        result
    }
}

/// Reads the capability container and data area of a Type 2 tag and
/// extracts its NDEF message.
fn read_type2_payload(card: &Card) -> Result<Option<Vec<u8>>, ReaderError> {
    let cc_block = read_block(card, CC_BLOCK)?;
    let Some(cc) = CapabilityContainer::parse(&cc_block) else {
        debug!("capability container magic missing; not an NDEF-formatted tag");
        return Ok(None);
    };
    debug!(
        "capability container: version {:#04X}, {} data bytes",
        cc.version, cc.data_area_len
    );

    // Block addresses are a single byte; clamp oversized declared areas.
    let block_count = cc
        .data_area_len
        .div_ceil(T2_BLOCK_LEN)
        .min((u8::MAX - DATA_START_BLOCK) as usize + 1);

    let mut area = Vec::with_capacity(block_count * T2_BLOCK_LEN);
    for i in 0..block_count {
        let chunk = read_block(card, DATA_START_BLOCK + i as u8)?;
        area.extend_from_slice(&chunk);
    }
    area.truncate(cc.data_area_len);

    extract_ndef_message(&area)
}

/// Reads one 4-byte block with the storage-card READ BINARY pseudo-APDU.
fn read_block(card: &Card, block: u8) -> Result<Vec<u8>, ReaderError> {
    let apdu = [0xFF, 0xB0, 0x00, block, T2_BLOCK_LEN as u8];
    let mut recv = [0u8; 64];
    let response = card
        .transmit(&apdu, &mut recv)
        .map_err(|e| ReaderError::Transmit(e.to_string()))?;

    if response.len() < 2 {
        return Err(ReaderError::Transmit(format!(
            "short response: {} bytes",
            response.len()
        )));
    }
    let (data, sw) = response.split_at(response.len() - 2);
    if sw != [0x90, 0x00] {
        return Err(ReaderError::Status {
            sw1: sw[0],
            sw2: sw[1],
        });
    }
    Ok(data.to_vec())
}
