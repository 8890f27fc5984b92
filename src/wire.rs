// SPDX-License-Identifier: AGPL-3.0-or-later

//! The wire protocol: newline-delimited, UTF-8, `:`-separated fields,
//! payload fields escaped by the codec.

use crate::codec;
use crate::error::AgentError;
use crate::ot::Op;
use crate::splitter::split;

/// A local edit, sequenced and parented, ready to send to the server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Submission {
    pub seq: u64,
    pub parent_seq: u64,
    pub parent_id: u64,
    pub op: Op,
}

/// A message the server sends during an active session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerMessage {
    External { seq: u64, op: Op },
    Accept { seq: u64 },
}

/// The server's reply to `new:`/reconnect negotiation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NegotiationResponse {
    pub author_id: u64,
    pub reconnect_secret: Vec<u8>,
    pub seqno: u64,
    pub text: String,
}

/// Builds the initial-session negotiation line: `new:<display-name>\n`.
#[must_use]
pub fn encode_new(display_name: &str) -> String {
    format!("new:{}\n", codec::encode_str(display_name))
}

/// Builds the reconnect negotiation line. The wire format for this line
/// is server-defined; this client presents the secret as an escaped
/// payload under its own `reconnect:` tag, storing and replaying it
/// verbatim as opaque bytes either way.
#[must_use]
pub fn encode_reconnect(secret: &[u8]) -> String {
    let encoded = codec::encode(secret);
    let encoded = String::from_utf8(encoded).expect("codec::encode of bytes only introduces ASCII");
    format!("reconnect:{encoded}\n")
}

/// Builds a submission line: `s:<seq>:<parent_seq>:<parent_id>:<type>:<idx>:<arg>\n`.
#[must_use]
pub fn encode_submission(sub: &Submission) -> String {
    let (type_tag, idx, arg) = match &sub.op {
        Op::Insert { idx, text } => ('i', *idx, codec::encode_str(text)),
        Op::Delete { idx, nchars, .. } => ('d', *idx, nchars.to_string()),
    };
    format!(
        "s:{}:{}:{}:{}:{}:{}\n",
        sub.seq, sub.parent_seq, sub.parent_id, type_tag, idx, arg
    )
}

/// Parses the negotiation response: `<author_id>:<reconnect_secret>:<seqno>:<encoded_text>`.
pub fn parse_negotiation_response(line: &str) -> Result<NegotiationResponse, AgentError> {
    let fields = split(line, ':', 4)?;
    let author_id: u64 = fields[0]
        .parse()
        .map_err(|_| AgentError::Codec("malformed author_id".to_string()))?;
    if author_id == 0 {
        return Err(AgentError::Protocol("server assigned reserved author_id 0".to_string()));
    }
    let reconnect_secret = codec::decode(fields[1].as_bytes())?;
    let seqno: u64 = fields[2]
        .parse()
        .map_err(|_| AgentError::Codec("malformed seqno".to_string()))?;
    let text = codec::decode_str(fields[3])?;
    Ok(NegotiationResponse { author_id, reconnect_secret, seqno, text })
}

/// Parses a during-session server message: `x:...` (external edit) or
/// `a:<seq>` (accept).
pub fn parse_server_message(line: &str) -> Result<ServerMessage, AgentError> {
    if let Some(rest) = line.strip_prefix("x:") {
        let fields = split(rest, ':', 4)?;
        let seq: u64 = fields[0]
            .parse()
            .map_err(|_| AgentError::Codec("malformed seq".to_string()))?;
        let idx: usize = fields[2]
            .parse()
            .map_err(|_| AgentError::Codec("malformed idx".to_string()))?;
        let op = match fields[1] {
            "i" => Op::insert(idx, codec::decode_str(fields[3])?),
            "d" => {
                let nchars: usize = fields[3]
                    .parse()
                    .map_err(|_| AgentError::Codec("malformed nchars".to_string()))?;
                Op::delete(idx, nchars)
            }
            other => return Err(AgentError::Codec(format!("unknown op type {other:?}"))),
        };
        return Ok(ServerMessage::External { seq, op });
    }
    if let Some(rest) = line.strip_prefix("a:") {
        let seq: u64 = rest.parse().map_err(|_| AgentError::Codec("malformed seq".to_string()))?;
        return Ok(ServerMessage::Accept { seq });
    }
    Err(AgentError::Protocol(format!("unrecognized message line: {line:?}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_new_escapes_embedded_newline() {
        // A literal colon needs no escaping: the display name is always the
        // line's last field, so it keeps whatever `rest` contains. A literal
        // newline would break line framing and must be escaped.
        assert_eq!(encode_new("a:b"), "new:a:b\n");
        assert_eq!(encode_new("a\nb"), "new:a\\nb\n");
    }

    #[test]
    fn encode_submission_insert() {
        let sub = Submission { seq: 1, parent_seq: 0, parent_id: 0, op: Op::insert(5, "abc") };
        assert_eq!(encode_submission(&sub), "s:1:0:0:i:5:abc\n");
    }

    #[test]
    fn encode_submission_delete() {
        let sub = Submission { seq: 2, parent_seq: 1, parent_id: 7, op: Op::delete(5, 6) };
        assert_eq!(encode_submission(&sub), "s:2:1:7:d:5:6\n");
    }

    #[test]
    fn parse_negotiation_response_roundtrip() {
        let line = format!("7:{}:0:{}", codec::encode_str("sekrit"), codec::encode_str("hello\nworld\n"));
        let parsed = parse_negotiation_response(&line).unwrap();
        assert_eq!(parsed.author_id, 7);
        assert_eq!(parsed.reconnect_secret, b"sekrit");
        assert_eq!(parsed.seqno, 0);
        assert_eq!(parsed.text, "hello\nworld\n");
    }

    #[test]
    fn parse_negotiation_response_rejects_author_zero() {
        let line = format!("0:{}:0:{}", codec::encode_str("s"), codec::encode_str("x"));
        assert!(parse_negotiation_response(&line).is_err());
    }

    #[test]
    fn parse_external_insert() {
        let msg = parse_server_message("x:3:i:5:xyz").unwrap();
        assert_eq!(msg, ServerMessage::External { seq: 3, op: Op::insert(5, "xyz") });
    }

    #[test]
    fn parse_external_delete() {
        let msg = parse_server_message("x:3:d:5:6").unwrap();
        assert_eq!(msg, ServerMessage::External { seq: 3, op: Op::delete(5, 6) });
    }

    #[test]
    fn parse_accept() {
        assert_eq!(parse_server_message("a:42").unwrap(), ServerMessage::Accept { seq: 42 });
    }

    #[test]
    fn parse_unrecognized_message_fails() {
        assert!(parse_server_message("q:1").is_err());
    }

    #[test]
    fn submission_with_embedded_newline_survives_escaping() {
        let sub = Submission { seq: 9, parent_seq: 8, parent_id: 3, op: Op::insert(2, "hi\nthere:you") };
        let line = encode_submission(&sub);
        assert_eq!(line, "s:9:8:3:i:2:hi\\nthere:you\n");
        // `arg` is the line's last field, so parsing it back reuses the same
        // `i`/`d` tail shape that `parse_server_message` uses for `x:` lines.
        let fields = split(line.trim_end_matches('\n'), ':', 6).unwrap();
        assert_eq!(fields[3], "i");
        assert_eq!(fields[4], "2");
        assert_eq!(codec::decode_str(fields[5]).unwrap(), "hi\nthere:you");
    }
}
