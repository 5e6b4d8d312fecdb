//! Line framing for stream endpoints
//!
//! Inbound bytes are decoded one char per byte (ISO-8859-1) and collected
//! until a terminator shows up. Every `\n` closes a message, and the message
//! keeps its terminator, so both `\r\n` and bare `\n` peers are handled by the
//! same rule. A terminator split across two reads is still found because the
//! accumulator spans reads.
//!
//! Outbound messages get `\r\n` appended unless they already end in `\r\n`
//! or `\n`, then are encoded back to one byte per char.

use crate::error::{Error, Result};
use crate::message::Message;

/// Terminators recognized at the end of an outbound message
pub const TERMINATORS: [&str; 2] = ["\r\n", "\n"];

/// Terminator appended to outbound messages
pub const EOL: &str = "\r\n";

/// Decode bytes, mapping each byte to the char with the same code point
pub fn decode_latin1(bytes: &[u8]) -> String {
    bytes.iter().map(|&b| char::from(b)).collect()
}

/// Encode text one byte per char; fails on chars above U+00FF
pub fn encode_latin1(text: &str) -> Result<Vec<u8>> {
    text.chars()
        .map(|c| u8::try_from(u32::from(c)).map_err(|_| Error::Encoding(c)))
        .collect()
}

/// Wire bytes for one outbound message
pub fn encode_line(message: &Message) -> Result<Vec<u8>> {
    let mut text = message.to_text().into_owned();
    if !TERMINATORS.iter().any(|t| text.ends_with(t)) {
        text.push_str(EOL);
    }
    encode_latin1(&text)
}

/// Reassembles newline-terminated messages from arbitrarily split reads
///
/// Owned by a single reader stage; never shared.
#[derive(Debug, Default)]
pub struct LineAssembler {
    pending: String,
}

impl LineAssembler {
    /// Empty assembler
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one chunk; returns every message it completed, in order
    ///
    /// An empty chunk returns nothing and leaves the partial line alone.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<String> {
        if chunk.is_empty() {
            return Vec::new();
        }
        self.pending.push_str(&decode_latin1(chunk));

        let mut lines = Vec::new();
        while let Some(pos) = self.pending.find('\n') {
            let rest = self.pending.split_off(pos + 1);
            lines.push(std::mem::replace(&mut self.pending, rest));
        }
        lines
    }

    /// Partial line waiting for its terminator
    pub fn pending(&self) -> &str {
        &self.pending
    }

    /// Drop any partial line
    pub fn reset(&mut self) {
        self.pending.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn feed_in_chunks(data: &[u8], size: usize) -> Vec<String> {
        let mut asm = LineAssembler::new();
        data.chunks(size).flat_map(|c| asm.feed(c)).collect()
    }

    #[test]
    fn test_any_chunk_size_yields_one_message() {
        for size in [1, 2, 7] {
            assert_eq!(feed_in_chunks(b"hello\r\n", size), vec!["hello\r\n"], "size {size}");
        }
    }

    #[test]
    fn test_split_terminator_flushes_once() {
        let mut asm = LineAssembler::new();
        assert!(asm.feed(b"ab\r").is_empty());
        assert_eq!(asm.pending(), "ab\r");
        assert_eq!(asm.feed(b"\n"), vec!["ab\r\n"]);
        assert_eq!(asm.pending(), "");
    }

    #[test]
    fn test_multiple_terminators_in_one_chunk() {
        let mut asm = LineAssembler::new();
        assert_eq!(asm.feed(b"one\ntwo\r\nthr"), vec!["one\n", "two\r\n"]);
        assert_eq!(asm.pending(), "thr");
        assert_eq!(asm.feed(b"ee\n"), vec!["three\n"]);
    }

    #[test]
    fn test_empty_chunk_keeps_partial() {
        let mut asm = LineAssembler::new();
        asm.feed(b"par");
        assert!(asm.feed(b"").is_empty());
        assert_eq!(asm.pending(), "par");
        asm.reset();
        assert_eq!(asm.pending(), "");
    }

    #[test]
    fn test_lone_carriage_return_is_not_a_terminator() {
        assert!(feed_in_chunks(b"a\rb", 2).is_empty());
    }

    #[test]
    fn test_encode_line_appends_crlf() {
        assert_eq!(encode_line(&Message::from("ping")).unwrap(), b"ping\r\n");
        assert_eq!(encode_line(&Message::from("ping\n")).unwrap(), b"ping\n");
        assert_eq!(encode_line(&Message::from("ping\r\n")).unwrap(), b"ping\r\n");
        assert_eq!(encode_line(&Message::from(b"raw".to_vec())).unwrap(), b"raw\r\n");
    }

    #[test]
    fn test_encoding_rejects_wide_chars() {
        assert_eq!(encode_latin1("caf\u{e9}").unwrap(), vec![b'c', b'a', b'f', 0xE9]);
        assert!(matches!(encode_latin1("\u{2603}"), Err(Error::Encoding('\u{2603}'))));
    }

    #[test]
    fn test_latin1_round_trips_high_bytes() {
        let bytes: Vec<u8> = (0x80..=0xFF).collect();
        assert_eq!(encode_latin1(&decode_latin1(&bytes)).unwrap(), bytes);
    }
}
