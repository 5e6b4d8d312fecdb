//! Transport layer for I/O abstraction
//!
//! A session depends on its transport only through [`Transport`]. Every
//! method takes `&self`: the reader stage sits in [`Transport::receive_chunk`]
//! while another thread sends or closes, so implementations keep their own
//! interior synchronization and `close` must unblock a pending receive.

use crate::config::SessionConfig;
use crate::error::Result;
use crate::framing::encode_latin1;
use crate::message::Message;

mod mock;
mod tcp;

pub use mock::MockTransport;
pub use tcp::TcpTransport;

/// Transport trait for device communication
pub trait Transport: Send + Sync {
    /// Short name used for session, event, and thread names
    fn name(&self) -> &str;

    /// Connect or acquire the underlying device
    fn open(&self, config: &SessionConfig) -> Result<()>;

    /// Release the device, waking any receive in progress
    fn close(&self) -> Result<()>;

    /// Read up to `max_size` bytes; an empty vec means nothing arrived yet
    fn receive_chunk(&self, max_size: usize) -> Result<Vec<u8>>;

    /// Write all of `data`, blocking until sent
    fn send_chunk(&self, data: &[u8]) -> Result<()>;

    /// Transmit one outbound message
    ///
    /// Bytes go out as is and text is encoded one byte per char, without a
    /// terminator. Framed transports override this to add theirs.
    fn send_message(&self, message: &Message) -> Result<()> {
        match message {
            Message::Bytes(bytes) => self.send_chunk(bytes),
            Message::Text(text) => self.send_chunk(&encode_latin1(text)?),
        }
    }
}
