//! Binary decoder for NDEF record streams.
//!
//! Walks a byte buffer from offset 0, decoding one record per iteration
//! until the buffer is exhausted or a record carrying the message-end flag
//! has been consumed.  Every length field is validated against the bytes
//! actually remaining, so malformed input can never cause a read past the
//! buffer end.
//!
//! A failure is not all-or-nothing: [`DecodeError`] carries the records
//! decoded before the failure point, so callers can classify a truncated
//! message best-effort.

use thiserror::Error;

use super::record::{NdefRecord, RecordFlags, Tnf};

/// A length field extended past the end of the buffer.
///
/// `decoded` holds the complete records parsed before the failure.
#[derive(Debug, Error)]
#[error("truncated {field} at offset {offset}: need {needed} bytes, {available} remain")]
pub struct DecodeError {
    /// Which field could not be read in full.
    pub field: &'static str,
    /// Buffer offset at which the read was attempted.
    pub offset: usize,
    /// Bytes the field required.
    pub needed: usize,
    /// Bytes that were actually left.
    pub available: usize,
    /// The successfully decoded prefix of the record sequence.
    pub decoded: Vec<NdefRecord>,
}

/// Truncation details for a single record, before the prefix is attached.
struct Truncation {
    field: &'static str,
    offset: usize,
    needed: usize,
    available: usize,
}

/// Decodes a complete NDEF record sequence from `buf`.
///
/// A zero-length buffer yields an empty sequence, not an error.  Decoding
/// stops after a record with the message-end flag; trailing bytes beyond
/// it are ignored.
///
/// # Errors
///
/// Returns [`DecodeError`] when any field would read past the buffer end.
/// The error carries the records decoded up to that point.
pub fn decode_records(buf: &[u8]) -> Result<Vec<NdefRecord>, DecodeError> {
    let mut records = Vec::new();
    let mut cursor = 0usize;

    while cursor < buf.len() {
        match decode_one(buf, cursor) {
            Ok((record, next)) => {
                let message_end = record.flags.message_end;
                records.push(record);
                cursor = next;
                if message_end {
                    break;
                }
            }
            Err(t) => {
                return Err(DecodeError {
                    field: t.field,
                    offset: t.offset,
                    needed: t.needed,
                    available: t.available,
                    decoded: records,
                });
            }
        }
    }

    Ok(records)
}

/// Decodes one record starting at `start`, returning it and the offset of
/// the byte after its payload.
fn decode_one(buf: &[u8], start: usize) -> Result<(NdefRecord, usize), Truncation> {
    let mut cursor = start;

    let header = take(buf, &mut cursor, 1, "record header")?[0];
    let flags = RecordFlags::from_header(header);
    let tnf = Tnf::from_header(header);

    let type_len = take(buf, &mut cursor, 1, "type length")?[0] as usize;

    let payload_len = if flags.short_record {
        take(buf, &mut cursor, 1, "payload length")?[0] as usize
    } else {
        let b = take(buf, &mut cursor, 4, "payload length")?;
        u32::from_be_bytes([b[0], b[1], b[2], b[3]]) as usize
    };

    let id_len = if flags.has_id {
        Some(take(buf, &mut cursor, 1, "id length")?[0] as usize)
    } else {
        None
    };

    let record_type = take(buf, &mut cursor, type_len, "record type")?.to_vec();

    let id = match id_len {
        Some(n) => Some(take(buf, &mut cursor, n, "record id")?.to_vec()),
        None => None,
    };

    let payload = take(buf, &mut cursor, payload_len, "record payload")?.to_vec();

    Ok((
        NdefRecord {
            tnf,
            record_type,
            id,
            payload,
            flags,
        },
        cursor,
    ))
}

/// Returns the next `n` bytes and advances the cursor, or a [`Truncation`]
/// if fewer than `n` bytes remain.
fn take<'a>(
    buf: &'a [u8],
    cursor: &mut usize,
    n: usize,
    field: &'static str,
) -> Result<&'a [u8], Truncation> {
    let available = buf.len() - *cursor;
    if available < n {
        return Err(Truncation {
            field,
            offset: *cursor,
            needed: n,
            available,
        });
    }
    let slice = &buf[*cursor..*cursor + n];
    *cursor += n;
    Ok(slice)
}

// ── Tests ─────────────────────────────────────────────────────────────────────
