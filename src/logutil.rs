//! Logging helpers for raw dongle traffic so logs stay single-line and readable.

use std::fmt::Write;

/// Render bytes the way the dongle tooling has always shown them:
/// printable ASCII (`0x20..0x7F`) as characters, everything else as `0x..`.
///
/// `b"\x00\x03RU\x00"` renders as `0x00x3RU0x0`.
pub fn byte_repr(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 2);
    for &b in bytes {
        if (32..127).contains(&b) {
            out.push(b as char);
        } else {
            let _ = write!(&mut out, "{:#x}", b);
        }
    }
    out
}

/// Space separated upper-case hex, truncated after `max` bytes.
pub fn hex_snippet(data: &[u8], max: usize) -> String {
    let mut out = String::with_capacity(data.len().min(max) * 3 + 4);
    for (i, b) in data.iter().take(max).enumerate() {
        if i > 0 {
            out.push(' ');
        }
        let _ = write!(&mut out, "{:02X}", b);
    }
    if data.len() > max {
        out.push_str(" …");
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn printable_bytes_stay_readable() {
        assert_eq!(byte_repr(b"\x00\x03RU\x00"), "0x00x3RU0x0");
        assert_eq!(byte_repr(&[0xB6]), "0xb6");
        assert_eq!(byte_repr(&[]), "");
    }

    #[test]
    fn hex_snippet_truncates() {
        assert_eq!(hex_snippet(&[0x00, 0x03, 0x52], 8), "00 03 52");
        assert_eq!(hex_snippet(&[1, 2, 3], 2), "01 02 …");
    }
}
