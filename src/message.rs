//! Payload carried through the session pipeline

use std::borrow::Cow;
use std::fmt;

/// One message moving through a queue
///
/// Raw transports produce `Bytes`; line-framed endpoints decode to `Text`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    /// Raw chunk as read from the transport
    Bytes(Vec<u8>),
    /// Decoded text
    Text(String),
}

impl Message {
    /// In-memory byte view; text is returned as its UTF-8 bytes
    ///
    /// Transports put text on the wire with [`crate::framing::encode_latin1`]
    /// instead.
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            Message::Bytes(b) => b,
            Message::Text(s) => s.as_bytes(),
        }
    }

    /// Text view; bytes are decoded one char per byte
    pub fn to_text(&self) -> Cow<'_, str> {
        match self {
            Message::Text(s) => Cow::Borrowed(s),
            Message::Bytes(b) => Cow::Owned(crate::framing::decode_latin1(b)),
        }
    }

    /// Text with any trailing `\r\n` / `\n` removed
    pub fn trimmed(&self) -> String {
        self.to_text().trim_end_matches(['\r', '\n']).to_string()
    }

    /// Length in bytes
    pub fn len(&self) -> usize {
        self.as_bytes().len()
    }

    /// True for an empty payload
    pub fn is_empty(&self) -> bool {
        self.as_bytes().is_empty()
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_text())
    }
}

impl From<&str> for Message {
    fn from(s: &str) -> Self {
        Message::Text(s.to_string())
    }
}

impl From<String> for Message {
    fn from(s: String) -> Self {
        Message::Text(s)
    }
}

impl From<Vec<u8>> for Message {
    fn from(b: Vec<u8>) -> Self {
        Message::Bytes(b)
    }
}

impl From<&[u8]> for Message {
    fn from(b: &[u8]) -> Self {
        Message::Bytes(b.to_vec())
    }
}
