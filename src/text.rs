//! Character-set handling for DVB text fields such as service and provider names, per
//! _ETSI EN 300 468, Annex A_.
//!
//! A text field may begin with a byte selecting its character table.  Without one, the default
//! table applies; that table is a superset of printable ASCII, and is approximated here by
//! Windows-1252 (the WHATWG reading of ISO-8859-1).

use encoding_rs::Encoding;
use std::borrow::Cow;

/// Selector byte for UTF-8 encoded text.
pub const UTF8_SELECTOR: u8 = 0x15;

fn iso_8859_part(part: u8) -> Option<&'static Encoding> {
    Some(match part {
        1 => encoding_rs::WINDOWS_1252,
        2 => encoding_rs::ISO_8859_2,
        3 => encoding_rs::ISO_8859_3,
        4 => encoding_rs::ISO_8859_4,
        5 => encoding_rs::ISO_8859_5,
        6 => encoding_rs::ISO_8859_6,
        7 => encoding_rs::ISO_8859_7,
        8 => encoding_rs::ISO_8859_8,
        9 => encoding_rs::WINDOWS_1254,
        10 => encoding_rs::ISO_8859_10,
        11 => encoding_rs::WINDOWS_874,
        13 => encoding_rs::ISO_8859_13,
        14 => encoding_rs::ISO_8859_14,
        15 => encoding_rs::ISO_8859_15,
        16 => encoding_rs::ISO_8859_16,
        _ => return None,
    })
}

/// Works out the character table of a text field, returning it with the number of selector bytes
/// to skip.
fn character_table(buf: &[u8]) -> (&'static Encoding, usize) {
    match buf.first().copied() {
        None => (encoding_rs::WINDOWS_1252, 0),
        Some(b) if b >= 0x20 => (encoding_rs::WINDOWS_1252, 0),
        Some(b) if (0x01..=0x0b).contains(&b) => {
            (iso_8859_part(b + 4).unwrap_or(encoding_rs::WINDOWS_1252), 1)
        }
        Some(0x10) if buf.len() >= 3 => (
            iso_8859_part(buf[2]).unwrap_or(encoding_rs::WINDOWS_1252),
            3,
        ),
        Some(0x11) => (encoding_rs::UTF_16BE, 1),
        Some(0x12) => (encoding_rs::EUC_KR, 1),
        Some(0x13) => (encoding_rs::GBK, 1),
        Some(0x14) => (encoding_rs::BIG5, 1),
        Some(UTF8_SELECTOR) => (encoding_rs::UTF_8, 1),
        Some(0x1f) if buf.len() >= 2 => (encoding_rs::WINDOWS_1252, 2),
        Some(_) => (encoding_rs::WINDOWS_1252, 1),
    }
}

/// Decodes a DVB text field into a Rust string.
///
/// Single-byte control codes (`0x80` to `0x9f`, used for emphasis and line breaks) are dropped.
pub fn decode(buf: &[u8]) -> Cow<'_, str> {
    let (encoding, skip) = character_table(buf);
    let text = buf.get(skip..).unwrap_or_default();
    let single_byte = encoding.is_single_byte();
    if single_byte && text.iter().any(|b| (0x80..=0x9f).contains(b)) {
        let filtered: Vec<u8> = text
            .iter()
            .copied()
            .filter(|b| !(0x80..=0x9f).contains(b))
            .collect();
        let (s, _) = encoding.decode_without_bom_handling(&filtered);
        return Cow::Owned(s.into_owned());
    }
    encoding.decode_without_bom_handling(text).0
}

/// Encodes a string as a DVB text field.  Printable ASCII is written without a table selector;
/// anything else is written as UTF-8 behind the UTF-8 selector byte.
pub fn encode(s: &str) -> Vec<u8> {
    if s.bytes().all(|b| (0x20..0x7f).contains(&b)) {
        s.as_bytes().to_vec()
    } else {
        let mut out = Vec::with_capacity(s.len() + 1);
        out.push(UTF8_SELECTOR);
        out.extend_from_slice(s.as_bytes());
        out
    }
}

/// As `encode()`, but dropping characters from the end of `s` until the encoding takes no more
/// than `max` bytes.
pub fn encode_truncated(s: &str, max: usize) -> Vec<u8> {
    let mut end = s.len();
    while end > 0 && encode(&s[..end]).len() > max {
        end = s[..end]
            .char_indices()
            .next_back()
            .map(|(i, _)| i)
            .unwrap_or(0);
    }
    encode(&s[..end])
}

/// Reduces a name to the form used for comparisons, ignoring case and all whitespace.
pub fn normalise_name(name: &str) -> String {
    name.chars()
        .filter(|c| !c.is_whitespace())
        .flat_map(char::to_lowercase)
        .collect()
}

/// True if the two names are equal once case and whitespace are disregarded.
pub fn similar_names(a: &str, b: &str) -> bool {
    normalise_name(a) == normalise_name(b)
}
