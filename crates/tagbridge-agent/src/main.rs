//! Tagbridge agent entry point.
//!
//! Wires the PC/SC reader infrastructure to the processing pipeline and
//! the MQTT publisher, then blocks until Ctrl-C.
//!
//! # Architecture
//!
//! ```text
//! main()
//!  └─ load_config / tracing init
//!  └─ check_reader_system()   -- fatal when no reader is present (exit 1)
//!  └─ MqttPublisher::start    -- background event-loop task
//!  └─ PcscCardSource::start   -- status-change thread → CardBatch channel
//!  └─ pump_card_events        -- Tokio task fanning out per-card work
//! ```
//!
//! Exit codes: 0 after a graceful Ctrl-C shutdown; 1 when the readiness
//! check fails or the card monitor dies unexpectedly.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context as _;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use tagbridge_agent::application::monitor_cards::{
    pump_card_events, CardEventMonitor, CardObserver,
};
use tagbridge_agent::application::process_card::CardPipeline;
use tagbridge_agent::infrastructure::publisher::mqtt::MqttPublisher;
use tagbridge_agent::infrastructure::reader::pcsc::{
    check_reader_system, PcscCardSource, PcscTagReader,
};
use tagbridge_agent::infrastructure::reader::CardSource;
use tagbridge_agent::infrastructure::storage::config;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cfg = config::load_config().context("failed to load configuration")?;

    // Initialise structured logging.  Level is overridden by `RUST_LOG`.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(cfg.agent.log_level.clone())),
        )
        .init();

    info!("tagbridge agent starting");

    // Fatal before any card handling begins: without a reader there is
    // nothing to monitor.
    let reader_count = check_reader_system().context("PC/SC system check failed")?;
    info!("PC/SC ready with {reader_count} reader(s)");

    let publisher = Arc::new(MqttPublisher::start(&cfg.mqtt));
    let reader = Arc::new(PcscTagReader::new());
    let pipeline = Arc::new(CardPipeline::new(
        reader,
        publisher,
        cfg.agent.tag_prefix.clone(),
    ));
    let observer: Arc<dyn CardObserver> =
        Arc::new(CardEventMonitor::new(Arc::clone(&pipeline)));

    let source = PcscCardSource::new(Duration::from_millis(cfg.reader.poll_interval_ms));
    let rx = source.start().context("failed to start card monitoring")?;
    let mut pump = tokio::spawn(pump_card_events(rx, observer));

    info!("card monitoring started - place a tag on the reader, Ctrl-C to stop");

    tokio::select! {
        signal = tokio::signal::ctrl_c() => {
            signal.context("failed to listen for shutdown signal")?;
            source.stop();
            pump.abort();
            info!(
                "shutting down... processed {} cards",
                pipeline.cards_processed().await
            );
            Ok(())
        }
        // The pump ending on its own means the monitor thread died.
        result = &mut pump => {
            source.stop();
            error!("card monitor stopped unexpectedly");
            result.context("card event pump panicked")?;
            anyhow::bail!("card monitor stopped unexpectedly")
        }
    }
}
