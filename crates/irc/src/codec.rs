use {
    bytes::{Buf, BytesMut},
    tokio_util::codec::{Decoder, Encoder},
    tracing::warn,
};

use crate::{Error, Message, Result};

/// Longest accepted inbound line. Twitch tags can push lines well past the
/// classic 512-byte IRC limit.
pub const MAX_LINE_BYTES: usize = 16 * 1024;

/// CRLF line framing: decodes raw lines, encodes [`Message`]s.
///
/// Inbound bytes are decoded lossily, so invalid UTF-8 becomes U+FFFD. A line
/// longer than [`MAX_LINE_BYTES`] is skipped up to its terminating newline.
/// Neither case is a stream error.
#[derive(Debug, Default)]
pub struct IrcCodec {
    /// Bytes of `src` already scanned for a newline.
    scanned: usize,
    /// Inside an oversized line whose tail has not arrived yet.
    discarding: bool,
}

impl IrcCodec {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop bytes up to and including the next newline. Returns `false` when
    /// the buffer ran out first.
    fn skip_oversized(&mut self, src: &mut BytesMut) -> bool {
        match src.iter().position(|b| *b == b'\n') {
            Some(newline) => {
                src.advance(newline + 1);
                self.discarding = false;
                true
            },
            None => {
                src.clear();
                false
            },
        }
    }
}

fn decode_line(raw: &[u8]) -> String {
    let raw = raw.strip_suffix(b"\r").unwrap_or(raw);
    String::from_utf8_lossy(raw).into_owned()
}

impl Decoder for IrcCodec {
    type Error = Error;
    type Item = String;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<String>> {
        loop {
            if self.discarding && !self.skip_oversized(src) {
                return Ok(None);
            }

            let limit = src.len().min(MAX_LINE_BYTES + 1);
            let found = src[self.scanned.min(limit)..limit]
                .iter()
                .position(|b| *b == b'\n');
            if let Some(offset) = found {
                let newline = self.scanned + offset;
                self.scanned = 0;
                let line = src.split_to(newline + 1);
                return Ok(Some(decode_line(&line[..newline])));
            }

            if src.len() > MAX_LINE_BYTES {
                warn!(max = MAX_LINE_BYTES, "discarding oversized IRC line");
                self.scanned = 0;
                self.discarding = true;
                continue;
            }
            self.scanned = src.len();
            return Ok(None);
        }
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<String>> {
        if let Some(line) = self.decode(src)? {
            return Ok(Some(line));
        }
        self.scanned = 0;
        if self.discarding || src.is_empty() {
            src.clear();
            self.discarding = false;
            return Ok(None);
        }
        let rest = src.split();
        Ok(Some(decode_line(&rest)))
    }
}

impl Encoder<Message> for IrcCodec {
    type Error = Error;

    fn encode(&mut self, msg: Message, dst: &mut BytesMut) -> Result<()> {
        let line = msg.to_string();
        if line.contains(['\r', '\n']) {
            return Err(Error::Parse {
                line,
                reason: "outgoing line contains CR or LF",
            });
        }
        dst.reserve(line.len() + 2);
        dst.extend_from_slice(line.as_bytes());
        dst.extend_from_slice(b"\r\n");
        Ok(())
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_crlf_lines() {
        let mut codec = IrcCodec::new();
        let mut buf = BytesMut::from("PING :tmi.twitch.tv\r\n:a!a@a PRIVMSG #c :hi\r\npartial");
        assert_eq!(
            codec.decode(&mut buf).unwrap().as_deref(),
            Some("PING :tmi.twitch.tv")
        );
        assert_eq!(
            codec.decode(&mut buf).unwrap().as_deref(),
            Some(":a!a@a PRIVMSG #c :hi")
        );
        assert_eq!(codec.decode(&mut buf).unwrap(), None);
    }

    #[test]
    fn encodes_with_crlf() {
        let mut codec = IrcCodec::new();
        let mut buf = BytesMut::new();
        codec.encode(Message::join("#chan"), &mut buf).unwrap();
        assert_eq!(&buf[..], b"JOIN #chan\r\n");
    }

    #[test]
    fn refuses_to_encode_embedded_newline() {
        let mut codec = IrcCodec::new();
        let mut buf = BytesMut::new();
        let err = codec
            .encode(Message::join("#chan\r\nQUIT"), &mut buf)
            .unwrap_err();
        assert!(matches!(err, Error::Parse { .. }));
        assert!(buf.is_empty());
    }

    #[test]
    fn invalid_utf8_is_replaced() {
        let mut codec = IrcCodec::new();
        let mut buf = BytesMut::from(&b":a!a@a PRIVMSG #c :caf\xe9\r\nPING :x\r\n"[..]);
        assert_eq!(
            codec.decode(&mut buf).unwrap().as_deref(),
            Some(":a!a@a PRIVMSG #c :caf\u{fffd}")
        );
        assert_eq!(codec.decode(&mut buf).unwrap().as_deref(), Some("PING :x"));
    }

    #[test]
    fn oversized_line_is_skipped() {
        let mut codec = IrcCodec::new();
        let mut buf = BytesMut::from(vec![b'a'; MAX_LINE_BYTES + 10].as_slice());
        buf.extend_from_slice(b"\r\nPING :after\r\n");
        assert_eq!(codec.decode(&mut buf).unwrap().as_deref(), Some("PING :after"));
        assert!(buf.is_empty());
    }

    #[test]
    fn oversized_line_split_across_reads() {
        let mut codec = IrcCodec::new();
        let mut buf = BytesMut::from(vec![b'a'; MAX_LINE_BYTES + 1].as_slice());
        assert_eq!(codec.decode(&mut buf).unwrap(), None);
        assert!(buf.is_empty());

        buf.extend_from_slice(&[b'a'; 4096]);
        assert_eq!(codec.decode(&mut buf).unwrap(), None);

        buf.extend_from_slice(b"aaa\r\nPING :x\r\n");
        assert_eq!(codec.decode(&mut buf).unwrap().as_deref(), Some("PING :x"));
    }

    #[test]
    fn line_at_limit_is_kept() {
        let mut codec = IrcCodec::new();
        let body = "a".repeat(MAX_LINE_BYTES);
        let mut buf = BytesMut::from(format!("{body}\n").as_str());
        assert_eq!(codec.decode(&mut buf).unwrap(), Some(body));
    }

    #[test]
    fn partial_line_is_flushed_at_eof() {
        let mut codec = IrcCodec::new();
        let mut buf = BytesMut::from("PING :tail");
        assert_eq!(codec.decode(&mut buf).unwrap(), None);
        assert_eq!(codec.decode_eof(&mut buf).unwrap().as_deref(), Some("PING :tail"));
        assert_eq!(codec.decode_eof(&mut buf).unwrap(), None);
    }
}
