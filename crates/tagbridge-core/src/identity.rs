//! Tag identity resolution: collapsing a decoded record sequence into the
//! single state published for a card.
//!
//! The policy, in precedence order:
//!
//! 1. Any URI record whose URI starts with the automation-tag prefix makes
//!    the tag a recognised automation tag; the suffix is the tag id.  When
//!    several records qualify, the **last** one wins.
//! 2. Otherwise a readable tag resolves to a generic identity derived from
//!    its ATR.
//!
//! Android application records are surfaced for diagnostics only; they
//! never influence the outcome.  The no-payload case
//! ([`TagIdentity::NoNdef`]) is decided by the pipeline from the read
//! outcome, before any records exist to resolve.

use tracing::debug;

use crate::ndef::classify::{classify, RecordClass};
use crate::ndef::record::NdefRecord;

/// URI prefix marking a tag as a home-automation trigger tag.
pub const DEFAULT_TAG_PREFIX: &str = "https://www.home-assistant.io/tag/";

/// The resolved identity of one scanned tag.  Computed fresh per card
/// event; never cached or compared across events.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TagIdentity {
    /// The tag carries a recognised automation-tag URI.
    HomeAssistant {
        /// The URI suffix after the automation-tag prefix.
        tag_id: String,
    },
    /// A readable tag without a recognised URI, identified by its ATR.
    Generic { atr_hex: String },
    /// A tag that exposed no NDEF payload, identified by its ATR.
    NoNdef { atr_hex: String },
}

impl TagIdentity {
    /// The string handed to the state publisher for this identity.
    pub fn state_string(&self) -> String {
        match self {
            TagIdentity::HomeAssistant { tag_id } => tag_id.clone(),
            TagIdentity::Generic { atr_hex } => format!("generic_{atr_hex}"),
            TagIdentity::NoNdef { atr_hex } => format!("no_ndef_{atr_hex}"),
        }
    }
}

/// Resolves a decoded record sequence into one identity.
///
/// Scans every record.  Later qualifying URI records override earlier
/// ones (last match wins).  Records that fail classification are skipped
/// and the scan continues.
pub fn resolve_identity(records: &[NdefRecord], atr_hex: &str, tag_prefix: &str) -> TagIdentity {
    let mut tag_id: Option<String> = None;

    for (i, record) in records.iter().enumerate() {
        match classify(record) {
            Ok(RecordClass::Uri(uri)) => {
                debug!("record {}: URI {uri}", i + 1);
                if let Some(suffix) = uri.strip_prefix(tag_prefix) {
                    tag_id = Some(suffix.to_string());
                }
            }
            Ok(RecordClass::AndroidApp(package)) => {
                // Informational only.
                debug!("record {}: Android package {package}", i + 1);
            }
            Ok(RecordClass::Uninterpreted) => {}
            Err(e) => {
                debug!("record {}: skipped, {e}", i + 1);
            }
        }
    }

    match tag_id {
        Some(tag_id) => TagIdentity::HomeAssistant { tag_id },
        None => TagIdentity::Generic {
            atr_hex: atr_hex.to_string(),
        },
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
