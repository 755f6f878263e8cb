/// IRC line codec: frames a TCP byte stream into logical lines.
///
/// Inbound, lines split on `\n` and a single trailing `\r` is stripped, so
/// both `\r\n` and bare `\n` terminators are accepted; partial tails stay
/// buffered until more bytes arrive. Outbound messages are serialized with
/// `\r\n` termination.
use bytes::{Buf, BufMut, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use super::message::Message;

/// How much unterminated input a connection may buffer before it is cut off.
const MAX_LINE_LENGTH: usize = 4096;

/// Codec error: either a framing failure or an I/O error.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("line exceeds maximum length ({MAX_LINE_LENGTH} bytes)")]
    LineTooLong,
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// A tokio codec that frames inbound bytes on `\n` boundaries.
#[derive(Debug, Default)]
pub struct LineCodec;

impl Decoder for LineCodec {
    type Item = String;
    type Error = CodecError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        match src.iter().position(|&b| b == b'\n') {
            Some(pos) => {
                let mut line = src.split_to(pos);
                src.advance(1); // skip \n
                if line.last() == Some(&b'\r') {
                    line.truncate(line.len() - 1);
                }

                let line = std::str::from_utf8(&line)
                    .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;

                Ok(Some(line.to_owned()))
            }
            None => {
                // No complete line yet. Check if the buffer is getting too large.
                if src.len() > MAX_LINE_LENGTH {
                    return Err(CodecError::LineTooLong);
                }
                Ok(None)
            }
        }
    }
}

impl Encoder<Message> for LineCodec {
    type Error = CodecError;

    fn encode(&mut self, item: Message, dst: &mut BytesMut) -> Result<(), Self::Error> {
        let wire = item.to_wire();
        dst.reserve(wire.len() + 2);
        dst.put_slice(wire.as_bytes());
        dst.put_slice(b"\r\n");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::BytesMut;
    use pretty_assertions::assert_eq;

    // ── Decoder ──────────────────────────────────────────────────

    #[test]
    fn decode_complete_line() {
        let mut codec = LineCodec;
        let mut buf = BytesMut::from("NICK alice\r\n");
        let line = codec.decode(&mut buf).unwrap().unwrap();
        assert_eq!(line, "NICK alice");
        assert!(buf.is_empty());
    }

    #[test]
    fn decode_accepts_bare_newline() {
        let mut codec = LineCodec;
        let mut buf = BytesMut::from("NICK alice\n");
        let line = codec.decode(&mut buf).unwrap().unwrap();
        assert_eq!(line, "NICK alice");
    }

    #[test]
    fn decode_partial_line_then_complete() {
        let mut codec = LineCodec;
        let mut buf = BytesMut::from("NICK al");

        // Not enough data yet.
        assert!(codec.decode(&mut buf).unwrap().is_none());

        // More data arrives.
        buf.extend_from_slice(b"ice\r\n");
        let line = codec.decode(&mut buf).unwrap().unwrap();
        assert_eq!(line, "NICK alice");
    }

    #[test]
    fn decode_two_lines_in_one_read() {
        let mut codec = LineCodec;
        let mut buf = BytesMut::from("NICK alice\r\nUSER alice 0 * :Alice A\r\n");

        assert_eq!(codec.decode(&mut buf).unwrap().unwrap(), "NICK alice");
        assert_eq!(
            codec.decode(&mut buf).unwrap().unwrap(),
            "USER alice 0 * :Alice A"
        );
        assert!(buf.is_empty());
    }

    #[test]
    fn decode_keeps_partial_tail_buffered() {
        let mut codec = LineCodec;
        let mut buf = BytesMut::from("PING a\r\nPING b");
        assert_eq!(codec.decode(&mut buf).unwrap().unwrap(), "PING a");
        assert!(codec.decode(&mut buf).unwrap().is_none());
        assert_eq!(&buf[..], b"PING b");
    }

    #[test]
    fn decode_buffers_line_of_exactly_max_length() {
        let mut codec = LineCodec;
        let mut buf = BytesMut::from(vec![b'A'; MAX_LINE_LENGTH].as_slice());
        // No terminator yet: buffered, not emitted, not an error.
        assert!(codec.decode(&mut buf).unwrap().is_none());
        assert_eq!(buf.len(), MAX_LINE_LENGTH);
    }

    #[test]
    fn decode_rejects_oversized_line() {
        let mut codec = LineCodec;
        let mut buf = BytesMut::from(vec![b'A'; MAX_LINE_LENGTH + 1].as_slice());
        let err = codec.decode(&mut buf).unwrap_err();
        assert!(matches!(err, CodecError::LineTooLong));
    }

    #[test]
    fn decode_empty_buffer() {
        let mut codec = LineCodec;
        let mut buf = BytesMut::new();
        assert!(codec.decode(&mut buf).unwrap().is_none());
    }

    #[test]
    fn decode_empty_line() {
        let mut codec = LineCodec;
        let mut buf = BytesMut::from("\r\n");
        assert_eq!(codec.decode(&mut buf).unwrap().unwrap(), "");
    }

    // ── Encoder ──────────────────────────────────────────────────

    #[test]
    fn encode_appends_crlf() {
        let mut codec = LineCodec;
        let mut buf = BytesMut::new();
        let msg = Message {
            prefix: None,
            command: "NICK".into(),
            params: vec!["alice".into()],
            trailing: None,
        };
        codec.encode(msg, &mut buf).unwrap();
        assert_eq!(&buf[..], b"NICK alice\r\n");
    }

    #[test]
    fn encode_with_prefix_and_trailing() {
        let mut codec = LineCodec;
        let mut buf = BytesMut::new();
        let msg = Message {
            prefix: Some("irc.example.net".into()),
            command: "001".into(),
            params: vec!["alice".into()],
            trailing: Some("Welcome".into()),
        };
        codec.encode(msg, &mut buf).unwrap();
        assert_eq!(&buf[..], b":irc.example.net 001 alice :Welcome\r\n");
    }

    // ── Roundtrip through codec ──────────────────────────────────

    #[test]
    fn roundtrip_through_codec() {
        let mut codec = LineCodec;

        let original = Message {
            prefix: Some("alice!alice@host".into()),
            command: "PRIVMSG".into(),
            params: vec!["#room".into()],
            trailing: Some("Hello everyone!".into()),
        };
        let mut buf = BytesMut::new();
        codec.encode(original.clone(), &mut buf).unwrap();

        let line = codec.decode(&mut buf).unwrap().unwrap();
        assert_eq!(Message::parse(&line).unwrap(), original);
    }
}
