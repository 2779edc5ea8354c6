//! Zero-copy JSON field scanning for exchange messages
//!
//! Ticker frames are flat objects, so a byte scan for quoted field names is
//! enough; no DOM or allocation per message.

pub mod binance;

pub use binance::{BinanceMessageType, BinanceParser};

/// Value of `"field": <value>` in a flat JSON object
///
/// String values come back without their quotes. A quoted token that is not
/// followed by a colon is a value, not a key, and is skipped.
#[inline]
pub fn find_field<'a>(data: &'a [u8], field: &[u8]) -> Option<&'a [u8]> {
    if field.is_empty() {
        return None;
    }

    let mut from = 0;
    while let Some(offset) = data[from..].iter().position(|&b| b == b'"') {
        let open = from + offset;
        let key_end = open + 1 + field.len();
        if data.get(open + 1..key_end) == Some(field) && data.get(key_end) == Some(&b'"') {
            if let Some(start) = after_colon(data, key_end + 1) {
                return scan_value(data, start);
            }
        }
        from = open + 1;
    }
    None
}

#[inline]
fn skip_whitespace(data: &[u8], from: usize) -> usize {
    from + data
        .get(from..)
        .map_or(0, |rest| rest.iter().take_while(|b| b.is_ascii_whitespace()).count())
}

/// Start of the value when a colon follows position `from`
#[inline]
fn after_colon(data: &[u8], from: usize) -> Option<usize> {
    let colon = skip_whitespace(data, from);
    (data.get(colon) == Some(&b':')).then(|| skip_whitespace(data, colon + 1))
}

#[inline]
fn scan_value(data: &[u8], start: usize) -> Option<&[u8]> {
    if *data.get(start)? == b'"' {
        let body = &data[start + 1..];
        let len = body.iter().position(|&b| b == b'"').unwrap_or(body.len());
        return Some(&body[..len]);
    }

    // Number, boolean or null runs to the next delimiter
    let rest = &data[start..];
    let len = rest
        .iter()
        .position(|&b| matches!(b, b',' | b'}' | b']') || b.is_ascii_whitespace())
        .unwrap_or(rest.len());
    Some(&rest[..len])
}

/// Substring test on raw bytes
#[inline]
pub fn contains(data: &[u8], needle: &[u8]) -> bool {
    !needle.is_empty() && data.windows(needle.len()).any(|w| w == needle)
}

/// Unsigned decimal integer (request ids); rejects signs and overflow
#[inline]
pub fn parse_u64(bytes: &[u8]) -> Option<u64> {
    if bytes.is_empty() {
        return None;
    }
    bytes.iter().try_fold(0u64, |acc, &b| {
        b.is_ascii_digit().then_some(())?;
        acc.checked_mul(10)?.checked_add(u64::from(b - b'0'))
    })
}
