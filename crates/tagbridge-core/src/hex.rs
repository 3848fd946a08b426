//! Display-hex helpers for ATRs and raw payload diagnostics.

/// Formats bytes as uppercase hex pairs separated by spaces: `3B 8F 80`.
///
/// This is the display form used for ATRs in log lines and in the
/// `generic_`/`no_ndef_` fallback state strings.
pub fn to_hex_string(bytes: &[u8]) -> String {
    bytes
        .iter()
        .map(|b| format!("{b:02X}"))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Formats bytes as a compact lowercase run: `3b8f80`.  Used for raw
/// payload dumps at debug level.
pub fn to_hex_compact(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}
