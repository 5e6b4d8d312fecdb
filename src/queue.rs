//! Hand-off queue between pipeline stages
//!
//! A FIFO built on a crossbeam channel. Producers never block: an unbounded
//! queue always accepts, a bounded one fails fast with [`Error::QueueFull`].
//! Consumers block for at most a timeout and get [`Poll::Empty`] back when
//! nothing arrived, so a stage can re-check its running flag.
//!
//! Shutdown wakes a blocked consumer with a sentinel pushed through
//! [`HandoffQueue::wake`]. The sentinel lives in a private envelope variant,
//! so no caller-supplied item can ever be mistaken for it. Each sentinel is
//! tagged with the queue's epoch; [`HandoffQueue::rearm`] starts a new epoch,
//! after which sentinels left over from an earlier shutdown are skipped in
//! place. Only items count toward capacity.

use crate::error::{Error, Result};
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, TrySendError};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::{Duration, Instant};

enum Slot<T> {
    Item(T),
    Wake(u64),
}

/// Outcome of a blocking [`HandoffQueue::get`]
#[derive(Debug, PartialEq, Eq)]
pub enum Poll<T> {
    /// Next item in FIFO order
    Item(T),
    /// Timed out with nothing queued
    Empty,
    /// Shutdown sentinel
    Woken,
}

/// Thread-safe FIFO shared by one producer side and one consumer stage
pub struct HandoffQueue<T> {
    tx: Sender<Slot<T>>,
    rx: Receiver<Slot<T>>,
    capacity: Option<usize>,
    items: Arc<AtomicUsize>,
    epoch: Arc<AtomicU64>,
}

impl<T> Clone for HandoffQueue<T> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
            rx: self.rx.clone(),
            capacity: self.capacity,
            items: Arc::clone(&self.items),
            epoch: Arc::clone(&self.epoch),
        }
    }
}

impl<T> HandoffQueue<T> {
    fn from_channel(channel: (Sender<Slot<T>>, Receiver<Slot<T>>), capacity: Option<usize>) -> Self {
        let (tx, rx) = channel;
        Self {
            tx,
            rx,
            capacity,
            items: Arc::new(AtomicUsize::new(0)),
            epoch: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Unbounded queue
    pub fn unbounded() -> Self {
        Self::from_channel(crossbeam_channel::unbounded(), None)
    }

    /// Bounded queue holding at most `capacity` items
    ///
    /// One extra channel slot is reserved so a shutdown sentinel fits next to
    /// a full load of items.
    pub fn bounded(capacity: usize) -> Self {
        Self::from_channel(crossbeam_channel::bounded(capacity + 1), Some(capacity))
    }

    /// Unbounded for `None`, bounded otherwise
    pub fn with_capacity(capacity: Option<usize>) -> Self {
        match capacity {
            Some(n) => Self::bounded(n),
            None => Self::unbounded(),
        }
    }

    /// Enqueue without blocking
    pub fn put(&self, item: T) -> Result<()> {
        let queued = self.items.fetch_add(1, Ordering::AcqRel);
        if let Some(cap) = self.capacity {
            if queued >= cap {
                self.items.fetch_sub(1, Ordering::AcqRel);
                return Err(Error::QueueFull(cap));
            }
        }
        match self.tx.try_send(Slot::Item(item)) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => {
                self.items.fetch_sub(1, Ordering::AcqRel);
                Err(Error::QueueFull(self.capacity.unwrap_or(0)))
            }
            // Both ends live in self, so the channel cannot be disconnected
            Err(TrySendError::Disconnected(_)) => {
                self.items.fetch_sub(1, Ordering::AcqRel);
                Ok(())
            }
        }
    }

    /// Block up to `timeout` for the next item
    ///
    /// Sentinels from an earlier epoch are skipped without ending the wait.
    pub fn get(&self, timeout: Duration) -> Poll<T> {
        let deadline = Instant::now() + timeout;
        loop {
            let wait = deadline.saturating_duration_since(Instant::now());
            match self.rx.recv_timeout(wait) {
                Ok(Slot::Item(item)) => {
                    self.items.fetch_sub(1, Ordering::AcqRel);
                    return Poll::Item(item);
                }
                Ok(Slot::Wake(epoch)) if epoch == self.epoch.load(Ordering::Acquire) => {
                    return Poll::Woken;
                }
                Ok(Slot::Wake(_)) => {}
                Err(RecvTimeoutError::Timeout) => return Poll::Empty,
                Err(RecvTimeoutError::Disconnected) => return Poll::Woken,
            }
        }
    }

    /// Push the shutdown sentinel for the current epoch
    pub fn wake(&self) {
        let epoch = self.epoch.load(Ordering::Acquire);
        // A full bounded queue already has something to wake the consumer
        let _ = self.tx.try_send(Slot::Wake(epoch));
    }

    /// Start a new epoch; sentinels pushed before this no longer wake anyone
    pub fn rearm(&self) {
        self.epoch.fetch_add(1, Ordering::AcqRel);
    }

    /// Number of queued items, sentinels excluded
    pub fn len(&self) -> usize {
        self.items.load(Ordering::Acquire)
    }

    /// True when no item is queued
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Configured capacity, `None` when unbounded
    pub fn capacity(&self) -> Option<usize> {
        self.capacity
    }
}
