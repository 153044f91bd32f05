//! Maps MySQL charset ids to a text decoder. No teacher counterpart (the
//! teacher's binary protocol leaves strings as bytes) — grounded on
//! `encoding_rs`'s usage in the pack's `vector`/`convex` manifests for
//! non-UTF-8 decoding, and on spec.md's named minimum table.

/// Decode `bytes` using the charset identified by `charset_id`, falling back
/// to the raw bytes (as a lossless escape hatch, not a decode) for charsets
/// outside the minimum table or malformed sequences.
pub fn decode(charset_id: u16, bytes: &[u8]) -> String {
    match charset_id {
        // latin1 (ISO-8859-1): every byte maps directly to the codepoint of
        // the same value, so this never needs a lookup table.
        8 => bytes.iter().map(|&b| b as char).collect(),
        // ascii: valid ASCII decodes as-is; non-ASCII bytes are replaced.
        11 => bytes
            .iter()
            .map(|&b| if b < 0x80 { b as char } else { '\u{FFFD}' })
            .collect(),
        // cp1250 (Windows-1250, Central European)
        26 => {
            let (decoded, _, _) = encoding_rs::WINDOWS_1250.decode(bytes);
            decoded.into_owned()
        }
        // utf8 / utf8mb4 and everything else (including binary, id 63, which
        // has no decoding step of its own): UTF-8 with lossy replacement.
        _ => String::from_utf8_lossy(bytes).into_owned(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_utf8() {
        assert_eq!(decode(33, "héllo".as_bytes()), "héllo");
    }

    #[test]
    fn decodes_latin1_byte_for_byte() {
        // 0xE9 in latin1 is U+00E9 (é), which is NOT valid standalone UTF-8.
        assert_eq!(decode(8, &[0xE9]), "é");
    }

    #[test]
    fn decodes_ascii() {
        assert_eq!(decode(11, b"hello"), "hello");
    }

    #[test]
    fn decodes_cp1250() {
        // 0x8C in cp1250 is Š (LATIN CAPITAL LETTER S WITH CARON).
        assert_eq!(decode(26, &[0x8C]), "Š");
    }

    #[test]
    fn unknown_charset_falls_back_to_utf8_lossy() {
        assert_eq!(decode(9999, b"plain"), "plain");
    }
}
