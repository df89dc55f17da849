//! ASCII wire armor: `?OTR:`-prefixed base64 binary frames, `?OTRv4?`/`?OTRv43?`
//! query messages, and the whitespace tag. Pure framing — no parsing of the
//! binary payload itself, which is each message type's own `to_bytes`.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;

const ARMOR_PREFIX: &str = "?OTR:";
const ARMOR_SUFFIX: char = '.';
const QUERY_PREFIX: &str = "?OTR";

/// Wraps a binary frame as `?OTR:<base64>.`.
pub fn encode_frame(frame: &[u8]) -> String {
    format!("{ARMOR_PREFIX}{}{ARMOR_SUFFIX}", STANDARD.encode(frame))
}

/// Strips the `?OTR:`/`.` armor and base64-decodes, or returns `None` if the
/// text is not an armored record at all (the caller should then treat it as
/// plaintext, per §4.G).
pub fn decode_frame(text: &str) -> Option<Vec<u8>> {
    let body = text.strip_prefix(ARMOR_PREFIX)?;
    let body = body.strip_suffix(ARMOR_SUFFIX)?;
    STANDARD.decode(body).ok()
}

/// The whitespace tag's fixed lead-in, followed by one 4-byte pair per
/// advertised version.
const WHITESPACE_LEAD_IN: &str = "\x20\x09\x20\x20\x09\x09\x09\x09\x20\x09\x20\x09\x20\x09\x20\x20";
const WHITESPACE_V4: &str = "\x20\x09\x20\x09\x09\x20\x09\x20";
const WHITESPACE_V3: &str = "\x20\x20\x09\x09\x20\x09\x20\x09";

/// Builds a query message advertising `versions` (e.g. `&[4]` or `&[4, 3]`),
/// followed by a single space and the plaintext the host wants to send
/// alongside it. Versions are listed preferred-first, matching `?OTRv43?`
/// (4 preferred, 3 accepted) rather than numeric order.
pub fn build_query_message(versions: &[u8], plaintext: &str) -> String {
    let mut tag: Vec<u8> = versions.to_vec();
    tag.sort_unstable_by(|a, b| b.cmp(a));
    let digits: String = tag.iter().map(|v| v.to_string()).collect();
    format!("?OTR{digits}? {plaintext}")
}

/// Builds a whitespace-tagged message: the fixed lead-in, one version pair per
/// advertised version, then the plaintext untouched.
pub fn build_whitespace_tag(versions: &[u8], plaintext: &str) -> String {
    let mut out = String::from(WHITESPACE_LEAD_IN);
    for v in versions {
        out.push_str(match v {
            4 => WHITESPACE_V4,
            3 => WHITESPACE_V3,
            _ => continue,
        });
    }
    out.push_str(plaintext);
    out
}

/// Detects the whitespace tag prefix, returning the advertised version set and
/// the remaining plaintext (the tag is stripped so the text can still be
/// displayed to the user per §4.G).
pub fn detect_whitespace_tag(text: &str) -> Option<(Vec<u8>, &str)> {
    let rest = text.strip_prefix(WHITESPACE_LEAD_IN)?;
    let mut versions = Vec::new();
    let mut cursor = rest;
    loop {
        if let Some(tail) = cursor.strip_prefix(WHITESPACE_V4) {
            versions.push(4);
            cursor = tail;
        } else if let Some(tail) = cursor.strip_prefix(WHITESPACE_V3) {
            versions.push(3);
            cursor = tail;
        } else {
            break;
        }
    }
    Some((versions, cursor))
}

/// Parses a query message (`?OTRv4?`/`?OTRv3?`/`?OTRv43?` etc.) into the
/// advertised version set and the trailing plaintext, or `None` if `text`
/// isn't a query message.
pub fn detect_query_message(text: &str) -> Option<(Vec<u8>, &str)> {
    let rest = text.strip_prefix(QUERY_PREFIX)?;
    let rest = rest.strip_prefix('v')?;
    let end = rest.find('?')?;
    let (digits, tail) = rest.split_at(end);
    let tail = &tail[1..];
    let versions: Vec<u8> = digits.bytes().filter_map(|b| (b as char).to_digit(10)).map(|d| d as u8).collect();
    if versions.is_empty() {
        return None;
    }
    let tail = tail.strip_prefix(' ').unwrap_or(tail);
    Some((versions, tail))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn binary_frame_round_trips() {
        let frame = b"identity message bytes".to_vec();
        let armored = encode_frame(&frame);
        assert!(armored.starts_with("?OTR:"));
        assert!(armored.ends_with('.'));
        assert_eq!(decode_frame(&armored).unwrap(), frame);
    }

    #[test]
    fn non_armored_text_decodes_to_none() {
        assert!(decode_frame("hello there").is_none());
    }

    #[test]
    fn query_message_single_version() {
        let msg = build_query_message(&[4], "And some random invitation text.");
        assert_eq!(msg, "?OTRv4? And some random invitation text.");
        let (versions, tail) = detect_query_message(&msg).unwrap();
        assert_eq!(versions, vec![4]);
        assert_eq!(tail, "And some random invitation text.");
    }

    #[test]
    fn query_message_multi_version() {
        let msg = build_query_message(&[3, 4], "And some random invitation text.");
        assert_eq!(msg, "?OTRv43? And some random invitation text.");
    }

    #[test]
    fn whitespace_tag_round_trips() {
        let msg = build_whitespace_tag(&[4], "And some random invitation text.");
        let expected_prefix = "\x20\x09\x20\x20\x09\x09\x09\x09\x20\x09\x20\x09\x20\x09\x20\x20\x20\x09\x20\x09\x09\x20\x09\x20";
        assert!(msg.starts_with(expected_prefix));
        let (versions, tail) = detect_whitespace_tag(&msg).unwrap();
        assert_eq!(versions, vec![4]);
        assert_eq!(tail, "And some random invitation text.");
    }
}
