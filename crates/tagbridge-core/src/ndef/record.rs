//! The decoded NDEF record model and header bit layout.
//!
//! Wire format of one record:
//!
//! ```text
//! [header:1][type_len:1][payload_len:1|4][id_len:0|1][type:T][id:I][payload:P]
//! ```
//!
//! The header byte packs five flag bits and the 3-bit TNF field:
//!
//! ```text
//! MB(0x80)  ME(0x40)  CF(0x20)  SR(0x10)  IL(0x08)  TNF(0x07)
//! ```
//!
//! `SR` selects a one-byte payload length; without it the payload length is
//! a four-byte big-endian integer.  `IL` selects the optional id-length
//! byte and id field.

/// Header bit: this record starts a message.
pub const FLAG_MESSAGE_BEGIN: u8 = 0x80;
/// Header bit: this record ends a message.
pub const FLAG_MESSAGE_END: u8 = 0x40;
/// Header bit: the payload is a chunk continued by following records.
pub const FLAG_CHUNKED: u8 = 0x20;
/// Header bit: the payload length field is one byte instead of four.
pub const FLAG_SHORT_RECORD: u8 = 0x10;
/// Header bit: an id-length byte and id field are present.
pub const FLAG_ID_LENGTH: u8 = 0x08;
/// Mask selecting the 3-bit TNF field.
pub const TNF_MASK: u8 = 0x07;

/// Type Name Format: how a record's type field is to be interpreted.
///
/// The decoder only transports this discriminant; giving the values
/// meaning is the classifier's job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tnf {
    /// 0 – no type, no payload.
    Empty,
    /// 1 – NFC Forum well-known type (e.g. `U` for URI records).
    WellKnown,
    /// 2 – MIME media type.
    MediaType,
    /// 3 – absolute URI as the type field itself.
    AbsoluteUri,
    /// 4 – external type (e.g. `android.com:pkg`).
    External,
    /// 5 – payload type is unknown.
    Unknown,
    /// 6 – type carried by the preceding chunk.
    Unchanged,
    /// 7 – reserved by the specification.
    Reserved,
}

impl Tnf {
    /// Extracts the TNF field from a record header byte.
    pub fn from_header(header: u8) -> Self {
        match header & TNF_MASK {
            0 => Tnf::Empty,
            1 => Tnf::WellKnown,
            2 => Tnf::MediaType,
            3 => Tnf::AbsoluteUri,
            4 => Tnf::External,
            5 => Tnf::Unknown,
            6 => Tnf::Unchanged,
            _ => Tnf::Reserved,
        }
    }

    /// The raw 3-bit value.
    pub fn bits(self) -> u8 {
        match self {
            Tnf::Empty => 0,
            Tnf::WellKnown => 1,
            Tnf::MediaType => 2,
            Tnf::AbsoluteUri => 3,
            Tnf::External => 4,
            Tnf::Unknown => 5,
            Tnf::Unchanged => 6,
            Tnf::Reserved => 7,
        }
    }

    /// Human-readable name used in record diagnostics.
    pub fn name(self) -> &'static str {
        match self {
            Tnf::Empty => "Empty",
            Tnf::WellKnown => "Well-Known",
            Tnf::MediaType => "Media Type",
            Tnf::AbsoluteUri => "Absolute URI",
            Tnf::External => "External",
            Tnf::Unknown => "Unknown",
            Tnf::Unchanged => "Unchanged",
            Tnf::Reserved => "Reserved",
        }
    }
}

/// The five header flag bits of a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordFlags {
    /// `MB` – first record of the message.
    pub message_begin: bool,
    /// `ME` – logically final record of the message.
    pub message_end: bool,
    /// `CF` – payload is a fragment; following records continue it until
    /// one with `chunked = false` terminates the logical entry.
    pub chunked: bool,
    /// `SR` – one-byte payload length encoding was used.
    pub short_record: bool,
    /// `IL` – an id field is present.
    pub has_id: bool,
}

impl RecordFlags {
    /// Extracts the flag bits from a record header byte.
    pub fn from_header(header: u8) -> Self {
        Self {
            message_begin: header & FLAG_MESSAGE_BEGIN != 0,
            message_end: header & FLAG_MESSAGE_END != 0,
            chunked: header & FLAG_CHUNKED != 0,
            short_record: header & FLAG_SHORT_RECORD != 0,
            has_id: header & FLAG_ID_LENGTH != 0,
        }
    }
}

/// One decoded NDEF record.  Immutable once produced by the decoder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NdefRecord {
    /// The 3-bit type-name-format discriminant.
    pub tnf: Tnf,
    /// The record type field, interpreted according to `tnf`.
    pub record_type: Vec<u8>,
    /// The optional record identifier (present when `flags.has_id`).
    pub id: Option<Vec<u8>>,
    /// The record payload.
    pub payload: Vec<u8>,
    /// The header flag bits as decoded.
    pub flags: RecordFlags,
}

impl NdefRecord {
    /// The type field rendered as text for diagnostics (lossy).
    pub fn type_string(&self) -> String {
        String::from_utf8_lossy(&self.record_type).into_owned()
    }

    /// The id field rendered as text for diagnostics, if present (lossy).
    pub fn id_string(&self) -> Option<String> {
        self.id
            .as_ref()
            .map(|id| String::from_utf8_lossy(id).into_owned())
    }
}
