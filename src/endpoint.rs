//! Line-framed stream endpoint
//!
//! A [`DeviceSession`] whose reader reassembles newline-terminated text
//! messages from arbitrarily small reads. Over [`TcpTransport`] outgoing
//! messages get `\r\n` appended when they carry no terminator.

use crate::config::SessionConfig;
use crate::error::{Error, Result};
use crate::framing::LineAssembler;
use crate::message::Message;
use crate::session::{DeviceSession, StageContext, StageSet};
use crate::transport::{TcpTransport, Transport};
use std::ops::Deref;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

/// Longest single sleep while a beacon waits, so `close` is noticed quickly
const BEACON_SLICE: Duration = Duration::from_millis(50);

/// Reader stage that posts one `Message::Text` per received line
///
/// Each message keeps its terminator. A partial line left when the stage
/// stops is dropped.
pub fn framed_reader_loop(ctx: &StageContext) -> Result<()> {
    let mut assembler = LineAssembler::new();
    while ctx.is_running() {
        let Some(chunk) = ctx.receive()? else {
            break;
        };
        for line in assembler.feed(&chunk) {
            ctx.enqueue_inbound(Message::Text(line));
        }
    }
    if !assembler.pending().is_empty() {
        log::debug!("Dropping partial line {:?}", assembler.pending());
    }
    Ok(())
}

/// Session speaking newline-delimited text
pub struct LineEndpoint {
    session: DeviceSession,
}

impl LineEndpoint {
    /// Endpoint over a TCP stream
    pub fn new(config: SessionConfig) -> Result<Self> {
        Self::with_transport(Arc::new(TcpTransport::new()), config)
    }

    /// Endpoint over any transport
    pub fn with_transport(transport: Arc<dyn Transport>, config: SessionConfig) -> Result<Self> {
        let stages = StageSet::default().with_reader(framed_reader_loop);
        Ok(Self {
            session: DeviceSession::with_stages(transport, config, stages)?,
        })
    }

    /// Underlying session
    pub fn session(&self) -> &DeviceSession {
        &self.session
    }

    /// Send `payload` every `1 / frequency` seconds until the session stops
    ///
    /// Blocks the caller. Returns how many messages were queued; returns at
    /// once with zero when the session is not open.
    pub fn beacon(&self, frequency: f64, payload: impl Into<Message>) -> Result<u64> {
        if !(frequency.is_finite() && frequency > 0.0) {
            return Err(Error::Config(format!(
                "beacon frequency must be positive, got {}",
                frequency
            )));
        }
        let period = Duration::try_from_secs_f64(1.0 / frequency).map_err(|e| {
            Error::Config(format!("beacon frequency {} out of range: {}", frequency, e))
        })?;
        let payload = payload.into();

        log::info!("{}: beacon every {:?}", self.session.name(), period);
        let mut sent = 0u64;
        while self.session.is_running() {
            self.session.send(payload.clone())?;
            sent += 1;
            self.pause(period);
        }
        log::info!("{}: beacon stopped after {} messages", self.session.name(), sent);
        Ok(sent)
    }

    fn pause(&self, period: Duration) {
        let deadline = Instant::now() + period;
        while self.session.is_running() {
            let left = deadline.saturating_duration_since(Instant::now());
            if left.is_zero() {
                break;
            }
            thread::sleep(left.min(BEACON_SLICE));
        }
    }
}

impl Deref for LineEndpoint {
    type Target = DeviceSession;

    fn deref(&self) -> &DeviceSession {
        &self.session
    }
}
