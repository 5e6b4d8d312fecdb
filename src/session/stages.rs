//! Stage loops run by a device session
//!
//! Each loop gets a [`StageContext`] and runs on its own thread until the
//! session stops running, its queue delivers the shutdown sentinel, or it
//! hits an error. Errors end only the stage that raised them; the session
//! records them in its stage health.

use crate::bus::EventBus;
use crate::error::Result;
use crate::message::Message;
use crate::queue::{HandoffQueue, Poll};
use crate::transport::Transport;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

/// Stage entry point
pub type StageFn = Arc<dyn Fn(&StageContext) -> Result<()> + Send + Sync>;

/// Everything a stage may touch
#[derive(Clone)]
pub struct StageContext {
    /// Session running flag, written only by open/close
    pub running: Arc<AtomicBool>,
    /// Session transport
    pub transport: Arc<dyn Transport>,
    /// Reader → distributor queue
    pub inbound: HandoffQueue<Message>,
    /// `send` → writer queue
    pub outbound: HandoffQueue<Message>,
    /// Inbound event bus
    pub rx_bus: Arc<EventBus<Message>>,
    /// Outbound event bus
    pub tx_bus: Arc<EventBus<Message>>,
    /// Bytes per transport read
    pub chunk_size: usize,
    /// Queue wait before re-checking `running`
    pub poll_timeout: Duration,
}

impl StageContext {
    /// Session running flag
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Read one chunk from the transport
    ///
    /// Returns `Ok(None)` when the read failed because the session is
    /// closing, which is how a reader blocked in the transport gets out.
    pub fn receive(&self) -> Result<Option<Vec<u8>>> {
        match self.transport.receive_chunk(self.chunk_size) {
            Ok(chunk) => Ok(Some(chunk)),
            Err(e) if !self.is_running() => {
                log::debug!("Receive ended by close: {}", e);
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    /// Hand a message to the distributor
    ///
    /// A full bounded queue drops the message with a warning rather than
    /// stalling the reader.
    pub fn enqueue_inbound(&self, message: Message) {
        if let Err(e) = self.inbound.put(message) {
            log::warn!("Dropping inbound message: {}", e);
        }
    }
}

/// Stage implementations used by a session
///
/// Any of the three can be swapped; the defaults are [`reader_loop`],
/// [`distributor_loop`] and [`writer_loop`].
#[derive(Clone)]
pub struct StageSet {
    /// Transport → inbound queue
    pub reader: StageFn,
    /// Inbound queue → RX bus
    pub distributor: StageFn,
    /// Outbound queue → transport → TX bus
    pub writer: StageFn,
}

impl Default for StageSet {
    fn default() -> Self {
        Self {
            reader: Arc::new(reader_loop),
            distributor: Arc::new(distributor_loop),
            writer: Arc::new(writer_loop),
        }
    }
}

impl StageSet {
    /// Replace the reader stage
    pub fn with_reader<F>(mut self, reader: F) -> Self
    where
        F: Fn(&StageContext) -> Result<()> + Send + Sync + 'static,
    {
        self.reader = Arc::new(reader);
        self
    }

    /// Replace the distributor stage
    pub fn with_distributor<F>(mut self, distributor: F) -> Self
    where
        F: Fn(&StageContext) -> Result<()> + Send + Sync + 'static,
    {
        self.distributor = Arc::new(distributor);
        self
    }

    /// Replace the writer stage
    pub fn with_writer<F>(mut self, writer: F) -> Self
    where
        F: Fn(&StageContext) -> Result<()> + Send + Sync + 'static,
    {
        self.writer = Arc::new(writer);
        self
    }
}

/// Default reader: every non-empty chunk becomes one raw message
pub fn reader_loop(ctx: &StageContext) -> Result<()> {
    while ctx.is_running() {
        match ctx.receive()? {
            Some(chunk) if !chunk.is_empty() => ctx.enqueue_inbound(Message::Bytes(chunk)),
            Some(_) => {}
            None => break,
        }
    }
    Ok(())
}

/// Default distributor: post each inbound message on the RX bus
pub fn distributor_loop(ctx: &StageContext) -> Result<()> {
    while ctx.is_running() {
        match ctx.inbound.get(ctx.poll_timeout) {
            Poll::Item(message) => ctx.rx_bus.post(message)?,
            Poll::Empty => {}
            Poll::Woken => break,
        }
    }
    Ok(())
}

/// Default writer: transmit each outbound message, then post it on the TX bus
pub fn writer_loop(ctx: &StageContext) -> Result<()> {
    while ctx.is_running() {
        match ctx.outbound.get(ctx.poll_timeout) {
            Poll::Item(message) => {
                if let Err(e) = ctx.transport.send_message(&message) {
                    if !ctx.is_running() && e.is_disconnect() {
                        log::debug!("Send ended by close: {}", e);
                        break;
                    }
                    return Err(e);
                }
                ctx.tx_bus.post(message)?;
            }
            Poll::Empty => {}
            Poll::Woken => break,
        }
    }
    Ok(())
}
