//! Recognition of well-known and external record formats.
//!
//! Only two `(tnf, type)` signatures carry meaning for tag identity
//! resolution: NFC Forum URI records and Android application records.
//! Everything else classifies as [`RecordClass::Uninterpreted`] and is
//! ignored by the resolver.

use thiserror::Error;

use super::record::{NdefRecord, Tnf};

/// Well-known type field of a URI record.
pub const URI_RECORD_TYPE: &[u8] = b"U";

/// External type field of an Android application record.
pub const ANDROID_APP_RECORD_TYPE: &[u8] = b"android.com:pkg";

/// URI abbreviation table from the NFC Forum URI record type definition.
///
/// The first payload byte of a URI record indexes this table; the rest of
/// the payload is appended to the selected prefix.  The order is normative
/// and must not be rearranged.
pub const URI_PREFIXES: [&str; 36] = [
    "",
    "http://www.",
    "https://www.",
    "http://",
    "https://",
    "tel:",
    "mailto:",
    "ftp://anonymous:anonymous@",
    "ftp://ftp.",
    "ftps://",
    "sftp://",
    "smb://",
    "nfs://",
    "ftp://",
    "dav://",
    "news:",
    "telnet://",
    "imap:",
    "rtsp://",
    "urn:",
    "pop:",
    "sip:",
    "sips:",
    "tftp:",
    "btspp://",
    "btl2cap://",
    "btgoep://",
    "tcpobex://",
    "irdaobex://",
    "file://",
    "urn:epc:id:",
    "urn:epc:tag:",
    "urn:epc:pat:",
    "urn:epc:raw:",
    "urn:epc:",
    "urn:nfc:",
];

/// A single record failed classification.  Never fatal to the sequence;
/// the resolver skips the record and keeps scanning.
#[derive(Debug, Error, PartialEq)]
pub enum ClassifyError {
    /// A URI record with no payload has no abbreviation index byte.
    #[error("URI record payload is empty")]
    EmptyUriPayload,

    /// The abbreviation index byte is past the end of the prefix table.
    #[error("URI abbreviation index 0x{0:02X} is outside the prefix table")]
    UriPrefixOutOfRange(u8),

    /// The record body is not valid UTF-8.
    #[error("record payload is not valid UTF-8: {0}")]
    InvalidUtf8(#[from] std::str::Utf8Error),
}

/// What a record means, for the formats the resolver understands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordClass {
    /// A URI record, fully expanded from its abbreviation prefix.
    Uri(String),
    /// An Android application record carrying a package name.
    AndroidApp(String),
    /// Any other `(tnf, type)` combination.
    Uninterpreted,
}

/// Returns `true` for NFC Forum well-known URI records.
pub fn is_uri_record(record: &NdefRecord) -> bool {
    record.tnf == Tnf::WellKnown && record.record_type == URI_RECORD_TYPE
}

/// Returns `true` for Android application records.
pub fn is_android_app_record(record: &NdefRecord) -> bool {
    record.tnf == Tnf::External && record.record_type == ANDROID_APP_RECORD_TYPE
}

/// Classifies one decoded record.
///
/// # Errors
///
/// Returns [`ClassifyError`] when a recognised record's payload is
/// malformed (bad abbreviation index, empty URI payload, invalid UTF-8).
/// Unrecognised records are not errors; they classify as
/// [`RecordClass::Uninterpreted`].
pub fn classify(record: &NdefRecord) -> Result<RecordClass, ClassifyError> {
    if is_uri_record(record) {
        decode_uri(record).map(RecordClass::Uri)
    } else if is_android_app_record(record) {
        android_package_name(record).map(RecordClass::AndroidApp)
    } else {
        Ok(RecordClass::Uninterpreted)
    }
}

/// Expands a URI record payload into the full URI string.
///
/// # Errors
///
/// Returns [`ClassifyError`] for an empty payload, an out-of-range
/// abbreviation index, or a non-UTF-8 suffix.
pub fn decode_uri(record: &NdefRecord) -> Result<String, ClassifyError> {
    let (&index, suffix) = record
        .payload
        .split_first()
        .ok_or(ClassifyError::EmptyUriPayload)?;
    let prefix = URI_PREFIXES
        .get(index as usize)
        .ok_or(ClassifyError::UriPrefixOutOfRange(index))?;
    let suffix = std::str::from_utf8(suffix)?;
    Ok(format!("{prefix}{suffix}"))
}

/// Extracts the package name from an Android application record.
///
/// # Errors
///
/// Returns [`ClassifyError::InvalidUtf8`] for a non-UTF-8 payload.
pub fn android_package_name(record: &NdefRecord) -> Result<String, ClassifyError> {
    Ok(std::str::from_utf8(&record.payload)?.to_string())
}

// ── Tests ─────────────────────────────────────────────────────────────────────
