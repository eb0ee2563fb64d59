//! Big-endian integer conversions, concatenation and 32-bit alignment.
//!
//! Readers are bounds-checked and return `None` past the end of the slice so
//! parsers can treat truncation as malformed input instead of panicking.

/// Reads a big-endian `u16` at `offset`.
pub fn read_u16_be(data: &[u8], offset: usize) -> Option<u16> {
    let bytes = data.get(offset..offset.checked_add(2)?)?;
    Some(u16::from_be_bytes([bytes[0], bytes[1]]))
}

/// Reads a big-endian `u32` at `offset`.
pub fn read_u32_be(data: &[u8], offset: usize) -> Option<u32> {
    let bytes = data.get(offset..offset.checked_add(4)?)?;
    Some(u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
}

pub fn write_u16_be(buf: &mut Vec<u8>, value: u16) {
    buf.extend_from_slice(&value.to_be_bytes());
}

pub fn write_u32_be(buf: &mut Vec<u8>, value: u32) {
    buf.extend_from_slice(&value.to_be_bytes());
}

/// Joins byte slices into one buffer.
pub fn concat(parts: &[&[u8]]) -> Vec<u8> {
    let total = parts.iter().map(|p| p.len()).sum();
    let mut out = Vec::with_capacity(total);
    for part in parts {
        out.extend_from_slice(part);
    }
    out
}

/// Number of zero bytes needed to bring `len` to a 32-bit boundary.
pub fn padding_len(len: usize) -> usize {
    (4 - len % 4) % 4
}

/// Appends zeros until `buf.len()` is a multiple of four.
pub fn pad_to_word(buf: &mut Vec<u8>) {
    let pad = padding_len(buf.len());
    buf.resize(buf.len() + pad, 0);
}

/// Returns the sub-slice between the first and last non-zero byte.
///
/// All-zero or empty input yields an empty slice.
pub fn trim_zeros(data: &[u8]) -> &[u8] {
    let Some(start) = data.iter().position(|&b| b != 0) else {
        return &[];
    };
    // position() found a non-zero byte, so rposition() will too.
    let end = data.iter().rposition(|&b| b != 0).unwrap_or(start);
    &data[start..=end]
}
