//! Device session: three-stage pipeline over one transport
//!
//! ```text
//! transport ──reader──▶ inbound ──distributor──▶ RX bus
//! send() ──▶ outbound ──writer──▶ transport ──▶ TX bus
//! ```
//!
//! Each stage runs on a named thread (`<label>-reader`, `<label>-dist`,
//! `<label>-writer`). `close` flips the running flag, closes the transport,
//! wakes both queues and waits for every stage up to the configured timeout.

mod stages;

pub use stages::{
    StageContext, StageFn, StageSet, distributor_loop, reader_loop, writer_loop,
};

use crate::bus::{CallbackResult, Cookie, EventBus, EventPacket};
use crate::config::{DebugConfig, SessionConfig};
use crate::debug::DebugLogger;
use crate::error::{Error, Result};
use crate::message::Message;
use crate::queue::HandoffQueue;
use crate::transport::Transport;
use crossbeam_channel::{Receiver, RecvTimeoutError};
use parking_lot::{Mutex, RwLock};
use std::any::Any;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// Subscriber name used by the debug tap
const DEBUG_SUBSCRIBER: &str = "debug";

/// Which bus a subscription targets
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Channel {
    /// Inbound messages, posted by the distributor
    #[default]
    Rx,
    /// Outbound messages, posted by the writer after transmission
    Tx,
}

/// Pipeline stage
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageKind {
    /// Transport → inbound queue
    Reader,
    /// Inbound queue → RX bus
    Distributor,
    /// Outbound queue → transport → TX bus
    Writer,
}

impl StageKind {
    const ALL: [StageKind; 3] = [StageKind::Reader, StageKind::Distributor, StageKind::Writer];

    fn suffix(self) -> &'static str {
        match self {
            StageKind::Reader => "reader",
            StageKind::Distributor => "dist",
            StageKind::Writer => "writer",
        }
    }
}

/// Snapshot of one stage's health
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageStatus {
    /// Which stage
    pub kind: StageKind,
    /// Thread name
    pub thread: String,
    /// True while the stage thread is running its loop
    pub alive: bool,
    /// Error or panic message that ended the stage, if any
    pub failure: Option<String>,
}

#[derive(Default)]
struct StageHealth {
    alive: AtomicBool,
    failure: Mutex<Option<String>>,
}

struct RunningStage {
    thread: String,
    handle: JoinHandle<()>,
    done: Receiver<()>,
}

impl RunningStage {
    /// Wait for the stage to finish, detaching it after `timeout`
    fn join(self, timeout: Duration) {
        if self.handle.thread().id() == thread::current().id() {
            // close() called from a subscriber running on this stage
            log::debug!("{}: not waiting on own thread", self.thread);
            return;
        }
        match self.done.recv_timeout(timeout) {
            Ok(()) | Err(RecvTimeoutError::Disconnected) => {
                if self.handle.join().is_err() {
                    log::error!("{}: thread panicked outside its stage", self.thread);
                }
            }
            Err(RecvTimeoutError::Timeout) => {
                let err = Error::ShutdownTimeout {
                    stage: self.thread.clone(),
                };
                log::warn!("{}; detaching", err);
            }
        }
    }
}

/// Session over one transport with RX/TX event buses
pub struct DeviceSession {
    name: String,
    label: String,
    transport: Arc<dyn Transport>,
    stages: StageSet,
    running: Arc<AtomicBool>,
    inbound: HandoffQueue<Message>,
    outbound: HandoffQueue<Message>,
    rx_bus: Arc<EventBus<Message>>,
    tx_bus: Arc<EventBus<Message>>,
    config: RwLock<SessionConfig>,
    health: [Arc<StageHealth>; 3],
    workers: Mutex<Vec<RunningStage>>,
    lifecycle: Mutex<()>,
    logger: RwLock<Option<Arc<DebugLogger>>>,
}

impl DeviceSession {
    /// Session with the default stages
    pub fn new(transport: Arc<dyn Transport>, config: SessionConfig) -> Result<Self> {
        Self::with_stages(transport, config, StageSet::default())
    }

    /// Session with custom stage implementations
    ///
    /// `config.queue_capacity` sizes the hand-off queues for the lifetime of
    /// the session. A config asking for the debug tap enables it here.
    pub fn with_stages(
        transport: Arc<dyn Transport>,
        config: SessionConfig,
        stages: StageSet,
    ) -> Result<Self> {
        config.validate()?;
        let name = transport.name().to_string();
        let label: String = name.chars().take(3).collect::<String>().to_lowercase();

        let session = Self {
            rx_bus: Arc::new(EventBus::new(format!("{}InEvent", name), name.as_str())),
            tx_bus: Arc::new(EventBus::new(format!("{}OutEvent", name), name.as_str())),
            inbound: HandoffQueue::with_capacity(config.queue_capacity),
            outbound: HandoffQueue::with_capacity(config.queue_capacity),
            name,
            label,
            transport,
            stages,
            running: Arc::new(AtomicBool::new(false)),
            health: Default::default(),
            workers: Mutex::new(Vec::new()),
            lifecycle: Mutex::new(()),
            logger: RwLock::new(None),
            config: RwLock::new(config.clone()),
        };

        if config.debug.wants_tap() {
            session.debug_on(&config.debug)?;
        }
        Ok(session)
    }

    /// Session name, taken from the transport
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Inbound event name (`<name>InEvent`)
    pub fn rx_event(&self) -> &str {
        self.rx_bus.event()
    }

    /// Outbound event name (`<name>OutEvent`)
    pub fn tx_event(&self) -> &str {
        self.tx_bus.event()
    }

    /// Bus for `channel`
    pub fn bus(&self, channel: Channel) -> &Arc<EventBus<Message>> {
        match channel {
            Channel::Rx => &self.rx_bus,
            Channel::Tx => &self.tx_bus,
        }
    }

    /// Transport shared with the stages
    pub fn transport(&self) -> &Arc<dyn Transport> {
        &self.transport
    }

    /// Configuration of the current (or last) open
    pub fn config(&self) -> SessionConfig {
        self.config.read().clone()
    }

    /// True between a successful `open` and `close`
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Open the transport and start the three stages
    ///
    /// Nothing is started when the transport fails to open. A session can be
    /// opened again after `close`.
    pub fn open(&self, config: &SessionConfig) -> Result<&Self> {
        config.validate()?;
        let _lifecycle = self.lifecycle.lock();
        if self.is_running() {
            return Err(Error::AlreadyOpen);
        }

        self.transport.open(config)?;
        *self.config.write() = config.clone();

        if config.debug.wants_tap() && self.logger.read().is_none() {
            if let Err(e) = self.debug_on(&config.debug) {
                if let Err(close_err) = self.transport.close() {
                    log::warn!("{}: transport close failed: {}", self.name, close_err);
                }
                return Err(e);
            }
        }

        self.running.store(true, Ordering::Release);
        if let Err(e) = self.spawn_stages(config) {
            log::error!("{}: failed to start stages: {}", self.name, e);
            self.shutdown();
            return Err(e);
        }

        log::info!("{}: session open on {}", self.name, config.address);
        Ok(self)
    }

    /// Stop the stages and close the transport
    ///
    /// Safe on a session that was never opened, and idempotent.
    pub fn close(&self) -> &Self {
        let _lifecycle = self.lifecycle.lock();
        if self.shutdown() {
            log::info!("{}: session closed", self.name);
        }
        self
    }

    /// Queue `message` for the writer stage
    ///
    /// Fails only when a bounded outbound queue is full.
    pub fn send(&self, message: impl Into<Message>) -> Result<()> {
        self.outbound.put(message.into())
    }

    /// Register a subscriber on `channel`
    pub fn subscribe<F>(
        &self,
        name: &str,
        callback: F,
        channel: Channel,
        cookie: Option<Cookie>,
    ) -> bool
    where
        F: Fn(&EventPacket<Message>) -> CallbackResult + Send + Sync + 'static,
    {
        self.bus(channel).subscribe(name, callback, cookie)
    }

    /// Remove a subscriber from `channel`
    pub fn unsubscribe(&self, name: &str, channel: Channel) -> bool {
        self.bus(channel).unsubscribe(name)
    }

    /// Subscribe and announce it on the same channel
    pub fn start<F>(
        &self,
        name: &str,
        callback: F,
        channel: Channel,
        cookie: Option<Cookie>,
    ) -> Result<&Self>
    where
        F: Fn(&EventPacket<Message>) -> CallbackResult + Send + Sync + 'static,
    {
        let bus = self.bus(channel);
        bus.subscribe(name, callback, cookie);
        bus.post(Message::Text(format!(
            "Start logging topic {} to {}",
            bus.event(),
            name
        )))?;
        Ok(self)
    }

    /// Announce the end of a subscription, then remove it
    pub fn stop(&self, name: &str, channel: Channel) -> Result<&Self> {
        let bus = self.bus(channel);
        let announced = bus.post(Message::Text(format!(
            "Stop logging topic {} to {}",
            bus.event(),
            name
        )));
        bus.unsubscribe(name);
        announced.map(|()| self)
    }

    /// Health of every stage, reader first
    pub fn stage_health(&self) -> Vec<StageStatus> {
        StageKind::ALL
            .iter()
            .zip(self.health.iter())
            .map(|(&kind, health)| StageStatus {
                kind,
                thread: self.thread_name(kind),
                alive: health.alive.load(Ordering::Acquire),
                failure: health.failure.lock().clone(),
            })
            .collect()
    }

    /// Diagnostic logger, present while the debug tap is on
    pub fn logger(&self) -> Option<Arc<DebugLogger>> {
        self.logger.read().clone()
    }

    /// Turn on the debug tap
    ///
    /// Reuses the current logger if there is one. Every RX and TX message is
    /// written as `<event>,<payload>` with line terminators stripped.
    pub fn debug_on(&self, config: &DebugConfig) -> Result<()> {
        let logger = {
            let mut slot = self.logger.write();
            match slot.as_ref() {
                Some(logger) => Arc::clone(logger),
                None => {
                    let logger = Arc::new(DebugLogger::new(&self.name, config)?);
                    *slot = Some(Arc::clone(&logger));
                    logger
                }
            }
        };
        logger.write("DEBUG", "ON");

        for bus in [&self.rx_bus, &self.tx_bus] {
            let logger = Arc::clone(&logger);
            bus.subscribe(
                DEBUG_SUBSCRIBER,
                move |pkt: &EventPacket<Message>| {
                    let data = pkt.payload.to_text().replace(['\r', '\n'], "");
                    logger.write(&pkt.event, &data);
                    Ok(())
                },
                None,
            );
        }
        Ok(())
    }

    /// Turn off the debug tap and drop the logger
    pub fn debug_off(&self) -> &Self {
        self.rx_bus.unsubscribe(DEBUG_SUBSCRIBER);
        self.tx_bus.unsubscribe(DEBUG_SUBSCRIBER);
        if let Some(logger) = self.logger.write().take() {
            logger.write("DEBUG", "OFF");
        }
        self
    }

    /// Write a diagnostic entry if the debug tap is on
    #[track_caller]
    pub fn debug_write(&self, topic: &str, data: &str) {
        if let Some(logger) = self.logger.read().as_ref() {
            logger.write(topic, data);
        }
    }

    fn thread_name(&self, kind: StageKind) -> String {
        format!("{}-{}", self.label, kind.suffix())
    }

    fn context(&self, config: &SessionConfig) -> StageContext {
        StageContext {
            running: Arc::clone(&self.running),
            transport: Arc::clone(&self.transport),
            inbound: self.inbound.clone(),
            outbound: self.outbound.clone(),
            rx_bus: Arc::clone(&self.rx_bus),
            tx_bus: Arc::clone(&self.tx_bus),
            chunk_size: config.chunk_size,
            poll_timeout: config.poll_timeout(),
        }
    }

    fn spawn_stages(&self, config: &SessionConfig) -> Result<()> {
        let ctx = self.context(config);
        let entries = [
            &self.stages.reader,
            &self.stages.distributor,
            &self.stages.writer,
        ];
        for ((kind, stage), health) in StageKind::ALL.iter().zip(entries).zip(&self.health) {
            let running = self.spawn_stage(
                self.thread_name(*kind),
                Arc::clone(stage),
                ctx.clone(),
                Arc::clone(health),
            )?;
            self.workers.lock().push(running);
        }
        Ok(())
    }

    fn spawn_stage(
        &self,
        thread_name: String,
        stage: StageFn,
        ctx: StageContext,
        health: Arc<StageHealth>,
    ) -> Result<RunningStage> {
        let (done_tx, done_rx) = crossbeam_channel::bounded::<()>(1);
        health.alive.store(true, Ordering::Release);
        *health.failure.lock() = None;

        let name = thread_name.clone();
        let thread_health = Arc::clone(&health);
        let spawned = thread::Builder::new().name(thread_name.clone()).spawn(move || {
            // Dropped last, after the health record is final
            let _done = done_tx;
            log::debug!("{}: stage started", name);
            let failure = match panic::catch_unwind(AssertUnwindSafe(|| stage(&ctx))) {
                Ok(Ok(())) => None,
                Ok(Err(e)) => Some(e.to_string()),
                Err(payload) => Some(format!("panicked: {}", panic_message(payload.as_ref()))),
            };
            match &failure {
                Some(msg) => log::error!("{}: stage failed: {}", name, msg),
                None => log::debug!("{}: stage stopped", name),
            }
            *thread_health.failure.lock() = failure;
            thread_health.alive.store(false, Ordering::Release);
        });

        match spawned {
            Ok(handle) => Ok(RunningStage {
                thread: thread_name,
                handle,
                done: done_rx,
            }),
            Err(e) => {
                health.alive.store(false, Ordering::Release);
                Err(Error::ThreadSpawn(format!("{}: {}", thread_name, e)))
            }
        }
    }

    /// Stop everything; returns whether the session was running
    fn shutdown(&self) -> bool {
        let was_running = self.running.swap(false, Ordering::AcqRel);
        if was_running {
            if let Err(e) = self.transport.close() {
                log::warn!("{}: transport close failed: {}", self.name, e);
            }
        }

        let workers: Vec<RunningStage> = self.workers.lock().drain(..).collect();
        if workers.is_empty() {
            return was_running;
        }

        self.inbound.wake();
        self.outbound.wake();
        let timeout = self.config.read().join_timeout();
        for stage in workers {
            stage.join(timeout);
        }
        // Sentinels nobody consumed must not end the stages of the next open
        self.inbound.rearm();
        self.outbound.rearm();
        was_running
    }
}

impl fmt::Debug for DeviceSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeviceSession")
            .field("name", &self.name)
            .field("running", &self.is_running())
            .field("stages", &self.stage_health())
            .finish()
    }
}

impl Drop for DeviceSession {
    fn drop(&mut self) {
        self.close();
        if self.logger.read().is_some() {
            self.debug_off();
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<&'static str>() {
        s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.as_str()
    } else {
        "unknown panic"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::MockTransport;
    use std::time::Instant;

    const WAIT: Duration = Duration::from_secs(2);

    fn fast_config() -> SessionConfig {
        SessionConfig {
            poll_interval: 0.05,
            timeout: 1.0,
            ..SessionConfig::default()
        }
    }

    fn mock_session() -> (MockTransport, DeviceSession) {
        let mock = MockTransport::new();
        let session = DeviceSession::new(Arc::new(mock.clone()), fast_config()).unwrap();
        (mock, session)
    }

    fn wait_until(mut condition: impl FnMut() -> bool) -> bool {
        let deadline = Instant::now() + WAIT;
        while Instant::now() < deadline {
            if condition() {
                return true;
            }
            thread::sleep(Duration::from_millis(5));
        }
        condition()
    }

    fn collector(session: &DeviceSession, channel: Channel) -> Arc<Mutex<Vec<String>>> {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen_clone = Arc::clone(&seen);
        session.subscribe(
            "recorder",
            move |pkt: &EventPacket<Message>| {
                seen_clone.lock().push(pkt.payload.to_string());
                Ok(())
            },
            channel,
            None,
        );
        seen
    }

    #[test]
    fn test_names_follow_transport() {
        let (_mock, session) = mock_session();
        assert_eq!(session.name(), "Mock");
        assert_eq!(session.rx_event(), "MockInEvent");
        assert_eq!(session.tx_event(), "MockOutEvent");
        assert_eq!(session.bus(Channel::Rx).src(), "Mock");
        let threads: Vec<String> = session.stage_health().into_iter().map(|s| s.thread).collect();
        assert_eq!(threads, vec!["moc-reader", "moc-dist", "moc-writer"]);
    }

    #[test]
    fn test_close_without_open_is_safe() {
        let (mock, session) = mock_session();
        session.close().close();
        assert!(!session.is_running());
        assert_eq!(mock.close_count(), 0);
    }

    #[test]
    fn test_open_starts_all_stages() {
        let (mock, session) = mock_session();
        session.open(&fast_config()).unwrap();
        assert!(session.is_running());
        assert!(mock.is_open());
        assert!(session.stage_health().iter().all(|s| s.alive));

        assert!(matches!(session.open(&fast_config()), Err(Error::AlreadyOpen)));

        session.close();
        assert!(!mock.is_open());
        assert!(session.stage_health().iter().all(|s| !s.alive && s.failure.is_none()));
    }

    #[test]
    fn test_open_failure_starts_nothing() {
        let (mock, session) = mock_session();
        mock.fail_open(true);
        let err = session.open(&fast_config()).unwrap_err();
        assert!(matches!(err, Error::Connection { .. }));
        assert!(!session.is_running());
        assert!(session.stage_health().iter().all(|s| !s.alive));
    }

    #[test]
    fn test_send_reaches_transport_then_tx_bus() {
        let (mock, session) = mock_session();
        let tx = collector(&session, Channel::Tx);
        session.open(&fast_config()).unwrap();

        for i in 0..5 {
            session.send(format!("msg{}", i)).unwrap();
        }
        assert!(wait_until(|| tx.lock().len() == 5));
        assert_eq!(
            *tx.lock(),
            (0..5).map(|i| format!("msg{}", i)).collect::<Vec<_>>()
        );
        assert_eq!(mock.get_written(), b"msg0msg1msg2msg3msg4");
        session.close();
    }

    #[test]
    fn test_received_chunks_reach_rx_bus() {
        let (mock, session) = mock_session();
        let rx = collector(&session, Channel::Rx);
        session.open(&fast_config()).unwrap();

        mock.inject_read(b"pong\n");
        assert!(wait_until(|| rx.lock().concat() == "pong\n"));
        session.close();
    }

    #[test]
    fn test_start_and_stop_announce() {
        let (_mock, session) = mock_session();
        let rx = collector(&session, Channel::Rx);
        session
            .start("logger", |_| Ok(()), Channel::Rx, None)
            .unwrap();
        assert!(session.bus(Channel::Rx).contains("logger"));
        session.stop("logger", Channel::Rx).unwrap();
        assert!(!session.bus(Channel::Rx).contains("logger"));
        assert_eq!(
            *rx.lock(),
            vec![
                "Start logging topic MockInEvent to logger",
                "Stop logging topic MockInEvent to logger",
            ]
        );
    }

    #[test]
    fn test_stop_unsubscribes_even_when_announce_fails() {
        let (_mock, session) = mock_session();
        session.subscribe("faulty", |_| Err("nope".into()), Channel::Tx, None);
        assert!(session.stop("faulty", Channel::Tx).is_err());
        assert!(!session.bus(Channel::Tx).contains("faulty"));
    }

    #[test]
    fn test_failing_rx_callback_ends_only_distributor() {
        let (mock, session) = mock_session();
        session.subscribe("faulty", |_| Err("bad subscriber".into()), Channel::Rx, None);
        let tx = collector(&session, Channel::Tx);
        session.open(&fast_config()).unwrap();

        mock.inject_read(b"x");
        assert!(wait_until(|| !session.stage_health()[1].alive));
        let health = session.stage_health();
        assert_eq!(health[1].kind, StageKind::Distributor);
        assert!(health[1].failure.as_deref().unwrap().contains("bad subscriber"));
        assert!(health[2].alive);

        session.send("still works").unwrap();
        assert!(wait_until(|| tx.lock().len() == 1));
        session.close();
    }

    #[test]
    fn test_stage_panic_is_recorded() {
        let mock = MockTransport::new();
        let stages = StageSet::default().with_writer(|_| panic!("writer blew up"));
        let session =
            DeviceSession::with_stages(Arc::new(mock.clone()), fast_config(), stages).unwrap();
        session.open(&fast_config()).unwrap();
        assert!(wait_until(|| !session.stage_health()[2].alive));
        let failure = session.stage_health()[2].failure.clone().unwrap();
        assert!(failure.contains("writer blew up"), "{failure}");
        session.close();
    }

    #[test]
    fn test_close_detaches_stuck_stage() {
        let mock = MockTransport::new();
        let release = Arc::new(AtomicBool::new(false));
        let release_stage = Arc::clone(&release);
        let stages = StageSet::default().with_distributor(move |_| {
            while !release_stage.load(Ordering::Acquire) {
                thread::sleep(Duration::from_millis(5));
            }
            Ok(())
        });
        let config = SessionConfig {
            timeout: 0.1,
            ..fast_config()
        };
        let session = DeviceSession::with_stages(Arc::new(mock), config.clone(), stages).unwrap();
        session.open(&config).unwrap();

        let start = Instant::now();
        session.close();
        assert!(start.elapsed() < Duration::from_secs(1));
        release.store(true, Ordering::Release);
    }

    #[test]
    fn test_reopen_after_close() {
        let (mock, session) = mock_session();
        let tx = collector(&session, Channel::Tx);
        session.open(&fast_config()).unwrap();
        session.close();
        session.open(&fast_config()).unwrap();
        assert_eq!(mock.open_count(), 2);

        session.send("again").unwrap();
        assert!(wait_until(|| tx.lock().len() == 1));
        session.close();
    }

    #[test]
    fn test_bounded_send_fails_fast() {
        let mock = MockTransport::new();
        let config = SessionConfig {
            queue_capacity: Some(1),
            ..fast_config()
        };
        let session = DeviceSession::new(Arc::new(mock), config).unwrap();
        session.send("a").unwrap();
        assert!(matches!(session.send("b"), Err(Error::QueueFull(1))));
    }

    #[test]
    fn test_bounded_send_after_close() {
        let mock = MockTransport::new();
        let config = SessionConfig {
            queue_capacity: Some(1),
            ..fast_config()
        };
        let session = DeviceSession::new(Arc::new(mock.clone()), config.clone()).unwrap();

        // Closing a session that never opened leaves the queues untouched
        session.close().close();
        session.send("a").unwrap();

        let tx = collector(&session, Channel::Tx);
        session.open(&config).unwrap();
        assert!(wait_until(|| tx.lock().len() == 1));
        session.close();

        session.send("b").unwrap();
        session.open(&config).unwrap();
        assert!(wait_until(|| tx.lock().len() == 2));
        assert!(session.stage_health().iter().all(|s| s.alive));
        session.close();
        assert_eq!(*tx.lock(), vec!["a", "b"]);
    }

    #[test]
    fn test_close_lets_inflight_delivery_finish() {
        let (mock, session) = mock_session();
        let (started_tx, started_rx) = crossbeam_channel::bounded::<()>(1);
        let delivered = Arc::new(AtomicBool::new(false));
        let delivered_flag = Arc::clone(&delivered);
        session.subscribe(
            "slow",
            move |_: &EventPacket<Message>| {
                let _ = started_tx.try_send(());
                thread::sleep(Duration::from_millis(200));
                delivered_flag.store(true, Ordering::Release);
                Ok(())
            },
            Channel::Rx,
            None,
        );
        session.open(&fast_config()).unwrap();

        mock.inject_read(b"x");
        started_rx.recv_timeout(WAIT).unwrap();
        session.close();
        assert!(delivered.load(Ordering::Acquire));
        assert!(session.stage_health().iter().all(|s| !s.alive && s.failure.is_none()));
    }

    #[test]
    fn test_failed_open_leaves_debug_tap_off() {
        let dir = tempfile::tempdir().unwrap();
        let (mock, session) = mock_session();
        mock.fail_open(true);
        let config = SessionConfig {
            debug: DebugConfig {
                file_name: Some(dir.path().join("mock").to_string_lossy().into_owned()),
                date_filename: false,
                console_output: false,
                ..DebugConfig::default()
            },
            ..fast_config()
        };

        assert!(session.open(&config).is_err());
        assert!(session.logger().is_none());
        assert!(!session.bus(Channel::Rx).contains("debug"));
        assert!(!dir.path().join("mock.log").exists());

        mock.fail_open(false);
        session.open(&config).unwrap();
        assert!(session.logger().is_some());
        session.close();
    }

    #[test]
    fn test_debug_format_shows_state() {
        let (_mock, session) = mock_session();
        let shown = format!("{:?}", session);
        assert!(shown.contains("DeviceSession"));
        assert!(shown.contains("\"Mock\""));
        assert!(shown.contains("running: false"));
        assert!(shown.contains("moc-writer"));
    }

    #[test]
    fn test_debug_tap_writes_both_directions() {
        let dir = tempfile::tempdir().unwrap();
        let debug = DebugConfig {
            file_name: Some(dir.path().join("mock").to_string_lossy().into_owned()),
            date_filename: false,
            console_output: false,
            ..DebugConfig::default()
        };
        let mock = MockTransport::new();
        let config = SessionConfig {
            chunk_size: 64,
            debug,
            ..fast_config()
        };
        let session = DeviceSession::new(Arc::new(mock.clone()), config.clone()).unwrap();
        let path = session.logger().unwrap().path().to_path_buf();
        session.open(&config).unwrap();

        session.send("ping\r\n").unwrap();
        mock.inject_read(b"pong\n");
        let tapped = || std::fs::read_to_string(&path).unwrap_or_default();
        assert!(wait_until(|| {
            let log = tapped();
            log.contains(",MockOutEvent,ping") && log.contains(",MockInEvent,pong")
        }));

        session.close();
        session.debug_off();
        assert!(session.logger().is_none());
        let log = tapped();
        assert!(log.lines().next().unwrap().ends_with(",DEBUG,ON"));
        assert!(log.lines().last().unwrap().ends_with(",DEBUG,OFF"));
    }

    #[test]
    fn test_debug_write_without_logger_is_noop() {
        let (_mock, session) = mock_session();
        assert!(session.logger().is_none());
        session.debug_write("T", "d");
    }
}
