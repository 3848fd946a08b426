//! # tagbridge-core
//!
//! Shared library for tagbridge containing the NDEF record decoder, record
//! classification, and tag identity resolution.
//!
//! This crate is pure data handling: it has zero dependencies on reader
//! hardware, network transports, or the async runtime, which keeps every
//! decode path unit-testable from plain byte fixtures.
//!
//! # Architecture overview
//!
//! Tagbridge watches a PC/SC smartcard reader for NFC tags and publishes a
//! state string for every tag it sees.  A tag's content is an NDEF message:
//! a binary stream of typed records.  This crate defines the three stages
//! that turn raw message bytes into a publishable state:
//!
//! - **`ndef`** – The record model and binary decoder.  A byte buffer is
//!   walked record-by-record into typed [`NdefRecord`] values, plus the
//!   classifier that recognises URI and Android application records.
//!
//! - **`identity`** – The resolution policy.  A decoded record sequence is
//!   collapsed into exactly one [`TagIdentity`]: a recognised automation
//!   tag, a generic readable tag, or a tag with no NDEF payload.
//!
//! - **`hex`** – Display-hex helpers for ATRs and payload diagnostics.

pub mod hex;
pub mod identity;
pub mod ndef;

// Re-export the most-used types at the crate root so callers can write
// `tagbridge_core::decode_records` instead of the full module path.
pub use identity::{resolve_identity, TagIdentity, DEFAULT_TAG_PREFIX};
pub use ndef::classify::{classify, ClassifyError, RecordClass};
pub use ndef::decoder::{decode_records, DecodeError};
pub use ndef::record::{NdefRecord, RecordFlags, Tnf};
