//! Application layer: the per-card processing pipeline and the card event
//! monitor.  Both depend only on the infrastructure traits and on
//! `tagbridge-core`, so every code path here is testable with mocks.

pub mod monitor_cards;
pub mod process_card;
