//! Periodic tick emitter
//!
//! Runs a dedicated thread that posts an incrementing tick count on an
//! injected [`EventBus`] at a fixed interval. Ticks are scheduled against a
//! deadline, so a slow subscriber delays one tick without shifting the ones
//! after it; missed deadlines are skipped rather than bunched up.

use crate::bus::EventBus;
use crate::error::{Error, Result};
use crossbeam_channel::{RecvTimeoutError, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// Source name used by [`PeriodicEmitter::default_bus`]
pub const TIMER_SRC: &str = "TimerEvent";

/// Background thread posting ticks on a bus
pub struct PeriodicEmitter {
    interval: Duration,
    bus: Arc<EventBus<u64>>,
    stop_tx: Option<Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl PeriodicEmitter {
    /// Bus named `<secs>s_timer` with source `TimerEvent`
    pub fn default_bus(interval: Duration) -> Arc<EventBus<u64>> {
        Arc::new(EventBus::new(
            format!("{}s_timer", interval.as_secs_f64()),
            TIMER_SRC,
        ))
    }

    /// Start ticking on `bus` every `interval`; the first tick is 1
    pub fn start(interval: Duration, bus: Arc<EventBus<u64>>) -> Result<Self> {
        if interval.is_zero() {
            return Err(Error::Config("timer interval must be non-zero".to_string()));
        }
        let (stop_tx, stop_rx) = crossbeam_channel::bounded::<()>(1);
        let thread_bus = Arc::clone(&bus);

        let handle = thread::Builder::new()
            .name(format!("timer-{}", bus.event()))
            .spawn(move || {
                let mut next = Instant::now() + interval;
                let mut tick: u64 = 0;
                loop {
                    let wait = next.saturating_duration_since(Instant::now());
                    match stop_rx.recv_timeout(wait) {
                        Err(RecvTimeoutError::Timeout) => {}
                        Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                    }
                    tick += 1;
                    if let Err(e) = thread_bus.post(tick) {
                        log::error!("Timer {} stopped: {}", thread_bus.event(), e);
                        break;
                    }
                    next += interval;
                    let now = Instant::now();
                    while next <= now {
                        next += interval;
                    }
                }
                log::debug!("Timer {} exiting after {} ticks", thread_bus.event(), tick);
            })
            .map_err(|e| Error::ThreadSpawn(format!("timer: {}", e)))?;

        log::debug!("Timer {} started ({:?})", bus.event(), interval);
        Ok(Self {
            interval,
            bus,
            stop_tx: Some(stop_tx),
            handle: Some(handle),
        })
    }

    /// Tick interval
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Bus the ticks are posted on
    pub fn bus(&self) -> &Arc<EventBus<u64>> {
        &self.bus
    }

    /// True until the thread has exited
    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Stop ticking and wait for the thread
    pub fn stop(&mut self) {
        // Dropping the sender disconnects the channel, which ends the wait
        self.stop_tx.take();
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                log::error!("Timer {} thread panicked", self.bus.event());
            }
        }
    }
}

impl Drop for PeriodicEmitter {
    fn drop(&mut self) {
        self.stop();
    }
}
