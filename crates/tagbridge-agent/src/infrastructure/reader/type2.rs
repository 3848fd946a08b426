//! Type 2 tag data-area handling.
//!
//! A Type 2 tag exposes its memory as 4-byte blocks.  Block 3 holds the
//! capability container; the data area starts at block 4 and is a TLV
//! stream in which the NDEF message lives under tag `0x03`:
//!
//! ```text
//! [tag:1][length:1 | 0xFF length:2][value:N] ...  [0xFE terminator]
//! ```
//!
//! NULL TLVs (`0x00`) are single pad bytes with no length field.  The
//! functions here are pure so the TLV walk is testable without hardware;
//! the PC/SC block reads live in [`super::pcsc`].

use super::ReaderError;

/// Magic byte identifying an NDEF-formatted capability container.
pub const CC_MAGIC: u8 = 0xE1;

/// Single-byte padding TLV.
pub const TLV_NULL: u8 = 0x00;
/// The TLV tag wrapping the NDEF message.
pub const TLV_NDEF: u8 = 0x03;
/// Marks the end of the TLV area; nothing meaningful follows.
pub const TLV_TERMINATOR: u8 = 0xFE;

/// Capability container: the four bytes of block 3.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CapabilityContainer {
    /// NDEF mapping version (major.minor packed in one byte).
    pub version: u8,
    /// Usable data-area size in bytes (CC byte 2 × 8).
    pub data_area_len: usize,
    /// Read/write access conditions.
    pub access: u8,
}

impl CapabilityContainer {
    /// Parses block 3.  Returns `None` when the NDEF magic byte is absent,
    /// i.e. the tag is not NDEF formatted.
    pub fn parse(block: &[u8]) -> Option<Self> {
        if block.len() < 4 || block[0] != CC_MAGIC {
            return None;
        }
        Some(Self {
            version: block[1],
            data_area_len: block[2] as usize * 8,
            access: block[3],
        })
    }
}

/// Extracts the NDEF message from a Type 2 tag data area.
///
/// Walks the TLV stream, skipping NULL and unknown TLV blocks (lock
/// control, memory control), and returns the value of the first NDEF
/// message TLV.  `Ok(None)` when the terminator or the end of the area is
/// reached without seeing one.
///
/// # Errors
///
/// Returns [`ReaderError::MalformedTlv`] when a length field is cut short
/// or a declared value overruns the data area.
pub fn extract_ndef_message(area: &[u8]) -> Result<Option<Vec<u8>>, ReaderError> {
    let mut cursor = 0usize;

    while cursor < area.len() {
        let tag = area[cursor];
        match tag {
            TLV_NULL => cursor += 1,
            TLV_TERMINATOR => return Ok(None),
            _ => {
                let (len, len_size) = read_tlv_length(area, cursor)?;
                let value_start = cursor + 1 + len_size;
                let value_end = value_start + len;
                if value_end > area.len() {
                    return Err(ReaderError::MalformedTlv {
                        offset: cursor,
                        reason: format!(
                            "value length {len} overruns the data area ({} bytes remain)",
                            area.len() - value_start.min(area.len())
                        ),
                    });
                }
                if tag == TLV_NDEF {
                    return Ok(Some(area[value_start..value_end].to_vec()));
                }
                cursor = value_end;
            }
        }
    }

    Ok(None)
}

/// Reads the length field of the TLV starting at `tlv_start`, returning
/// `(value_length, length_field_size)`.
fn read_tlv_length(area: &[u8], tlv_start: usize) -> Result<(usize, usize), ReaderError> {
    let first = area.get(tlv_start + 1).copied().ok_or_else(|| {
        ReaderError::MalformedTlv {
            offset: tlv_start,
            reason: "length byte missing".to_string(),
        }
    })?;

    if first != 0xFF {
        return Ok((first as usize, 1));
    }

    // Three-byte form: 0xFF followed by a big-endian u16.
    match (area.get(tlv_start + 2), area.get(tlv_start + 3)) {
        (Some(&hi), Some(&lo)) => Ok((usize::from(hi) << 8 | usize::from(lo), 3)),
        _ => Err(ReaderError::MalformedTlv {
            offset: tlv_start,
            reason: "three-byte length field cut short".to_string(),
        }),
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capability_container_parses_ndef_magic() {
        // Arrange: magic, version 1.0, 48 data bytes (6 × 8), open access
        let cc = CapabilityContainer::parse(&[0xE1, 0x10, 0x06, 0x00]);

        // Assert
        assert_eq!(
            cc,
            Some(CapabilityContainer {
                version: 0x10,
                data_area_len: 48,
                access: 0x00,
            })
        );
    }

    #[test]
    fn test_capability_container_rejects_wrong_magic() {
        assert_eq!(CapabilityContainer::parse(&[0x00, 0x10, 0x06, 0x00]), None);
    }

    #[test]
    fn test_capability_container_rejects_short_block() {
        assert_eq!(CapabilityContainer::parse(&[0xE1, 0x10]), None);
    }

    #[test]
    fn test_extracts_simple_ndef_tlv() {
        // Arrange: [NDEF TLV len=3 value] [terminator]
        let area = [0x03, 0x03, 0xD1, 0x01, 0x00, 0xFE];

        // Act
        let msg = extract_ndef_message(&area).expect("extraction must succeed");

        // Assert
        assert_eq!(msg, Some(vec![0xD1, 0x01, 0x00]));
    }

    #[test]
    fn test_skips_null_tlvs_before_message() {
        let area = [0x00, 0x00, 0x03, 0x01, 0xAB, 0xFE];
        let msg = extract_ndef_message(&area).expect("extraction must succeed");
        assert_eq!(msg, Some(vec![0xAB]));
    }

    #[test]
    fn test_skips_lock_control_tlv_before_message() {
        // Lock control TLV (tag 0x01, len 3) precedes the NDEF TLV.
        let area = [0x01, 0x03, 0xA0, 0x10, 0x44, 0x03, 0x01, 0xCD, 0xFE];
        let msg = extract_ndef_message(&area).expect("extraction must succeed");
        assert_eq!(msg, Some(vec![0xCD]));
    }

    #[test]
    fn test_three_byte_length_form_is_honoured() {
        // 0xFF 0x01 0x00 = 256-byte value.
        let mut area = vec![0x03, 0xFF, 0x01, 0x00];
        area.extend(std::iter::repeat(0x5A).take(256));
        area.push(0xFE);

        let msg = extract_ndef_message(&area).expect("extraction must succeed");

        assert_eq!(msg.as_deref().map(<[u8]>::len), Some(256));
    }

    #[test]
    fn test_terminator_before_message_means_no_ndef() {
        let area = [0x00, 0xFE, 0x03, 0x01, 0xAB];
        assert_eq!(extract_ndef_message(&area).unwrap(), None);
    }

    #[test]
    fn test_area_without_ndef_tlv_means_no_ndef() {
        let area = [0x00, 0x00, 0x00, 0x00];
        assert_eq!(extract_ndef_message(&area).unwrap(), None);
    }

    #[test]
    fn test_empty_area_means_no_ndef() {
        assert_eq!(extract_ndef_message(&[]).unwrap(), None);
    }

    #[test]
    fn test_zero_length_ndef_tlv_yields_empty_message() {
        let area = [0x03, 0x00, 0xFE];
        assert_eq!(extract_ndef_message(&area).unwrap(), Some(vec![]));
    }

    #[test]
    fn test_value_overrunning_area_is_malformed() {
        // Declares 9 value bytes; only 2 follow.
        let area = [0x03, 0x09, 0xAA, 0xBB];
        let err = extract_ndef_message(&area).unwrap_err();
        assert!(matches!(err, ReaderError::MalformedTlv { offset: 0, .. }));
    }

    #[test]
    fn test_missing_length_byte_is_malformed() {
        let area = [0x03];
        let err = extract_ndef_message(&area).unwrap_err();
        assert!(matches!(err, ReaderError::MalformedTlv { .. }));
    }

    #[test]
    fn test_cut_three_byte_length_is_malformed() {
        let area = [0x03, 0xFF, 0x01];
        let err = extract_ndef_message(&area).unwrap_err();
        assert!(matches!(err, ReaderError::MalformedTlv { .. }));
    }
}
