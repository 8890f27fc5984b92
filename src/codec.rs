// SPDX-License-Identifier: AGPL-3.0-or-later

//! Byte-level escaping for the line-delimited wire format.
//!
//! Every wire line is `:`-separated text; payload fields (inserted text,
//! display names) go through [`encode`]/[`decode`] so that neither a
//! literal `:` nor a literal newline can break framing. The codec operates
//! on raw bytes rather than `str`, so it round-trips any byte string,
//! including ones that aren't valid UTF-8 on their own (a lone high byte
//! mid-escape, say) — callers that know their payload is text can go
//! through `str::as_bytes`/`String::from_utf8` at the edges.

use crate::error::AgentError;

/// Escapes `s` so the result contains no raw control byte (`< 0x20` or
/// `0x7f`) and is safe to embed in a single wire line.
#[must_use]
pub fn encode(s: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(s.len());
    for &b in s {
        match b {
            b'\\' => out.extend_from_slice(b"\\\\"),
            b'\n' => out.extend_from_slice(b"\\n"),
            b'\r' => out.extend_from_slice(b"\\r"),
            b'\t' => out.extend_from_slice(b"\\t"),
            0x08 => out.extend_from_slice(b"\\b"),
            0x00 => out.extend_from_slice(b"\\0"),
            0x01..=0x1f | 0x7f => out.extend_from_slice(format!("\\x{b:02x}").as_bytes()),
            _ => out.push(b),
        }
    }
    out
}

/// Inverse of [`encode`]. Fails on an unrecognized escape or a malformed
/// `\x` hex nibble.
pub fn decode(s: &[u8]) -> Result<Vec<u8>, AgentError> {
    #[derive(Clone, Copy)]
    enum State {
        Normal,
        AfterBackslash,
        AfterX,
        AfterXH(u8),
    }

    let mut out = Vec::with_capacity(s.len());
    let mut state = State::Normal;
    for &b in s {
        state = match state {
            State::Normal => {
                if b == b'\\' {
                    State::AfterBackslash
                } else {
                    out.push(b);
                    State::Normal
                }
            }
            State::AfterBackslash => match b {
                b'\\' => {
                    out.push(b'\\');
                    State::Normal
                }
                b'n' => {
                    out.push(b'\n');
                    State::Normal
                }
                b'r' => {
                    out.push(b'\r');
                    State::Normal
                }
                b't' => {
                    out.push(b'\t');
                    State::Normal
                }
                b'b' => {
                    out.push(0x08);
                    State::Normal
                }
                b'0' => {
                    out.push(0x00);
                    State::Normal
                }
                b'x' => State::AfterX,
                _ => return Err(AgentError::Codec("bad escape".to_string())),
            },
            State::AfterX => {
                let nibble = hex_nibble(b).ok_or_else(|| AgentError::Codec("bad hex".to_string()))?;
                State::AfterXH(nibble)
            }
            State::AfterXH(high) => {
                let low = hex_nibble(b).ok_or_else(|| AgentError::Codec("bad hex".to_string()))?;
                out.push(high << 4 | low);
                State::Normal
            }
        };
    }
    match state {
        State::Normal => Ok(out),
        _ => Err(AgentError::Codec("truncated escape".to_string())),
    }
}

fn hex_nibble(b: u8) -> Option<u8> {
    match b {
        b'0'..=b'9' => Some(b - b'0'),
        b'a'..=b'f' => Some(b - b'a' + 10),
        b'A'..=b'F' => Some(b - b'A' + 10),
        _ => None,
    }
}

/// Convenience wrapper for the common case: escaping a UTF-8 string.
#[must_use]
pub fn encode_str(s: &str) -> String {
    // `encode` only ever introduces ASCII bytes around passed-through
    // UTF-8 sequences, so the result is always valid UTF-8 itself.
    String::from_utf8(encode(s.as_bytes())).expect("encode output is always valid UTF-8")
}

/// Convenience wrapper for the common case: decoding into a UTF-8 string.
pub fn decode_str(s: &str) -> Result<String, AgentError> {
    String::from_utf8(decode(s.as_bytes())?)
        .map_err(|_| AgentError::Codec("decoded bytes are not valid UTF-8".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_all_bytes() {
        let all: Vec<u8> = (0..=255).collect();
        let encoded = encode(&all);
        assert_eq!(decode(&encoded).unwrap(), all);
    }

    #[test]
    fn round_trips_arbitrary_strings() {
        for s in ["", "hello", "line\nwith\tstuff", "back\\slash", "\0null"] {
            let encoded = encode_str(s);
            assert_eq!(decode_str(&encoded).unwrap(), s);
        }
    }

    #[test]
    fn encode_never_emits_raw_control_bytes() {
        let all: Vec<u8> = (0..=255).collect();
        let encoded = encode(&all);
        for b in encoded {
            assert!(b >= 0x20 && b != 0x7f, "raw control byte {b:#x} leaked through");
        }
    }

    #[test]
    fn decode_rejects_bad_escape() {
        assert!(decode_str("\\q").is_err());
    }

    #[test]
    fn decode_rejects_bad_hex() {
        assert!(decode_str("\\xzz").is_err());
        assert!(decode_str("\\x1").is_err());
    }

    #[test]
    fn high_bytes_pass_through_verbatim() {
        // UTF-8 continuation bytes (>= 0x80) are not control bytes and pass through.
        let s = "héllo 🦀";
        assert_eq!(encode_str(s), s);
    }

    #[test]
    fn decode_rejects_truncated_escape() {
        assert!(decode_str("\\").is_err());
        assert!(decode_str("\\x").is_err());
        assert!(decode_str("\\x1").is_err());
    }
}
