//! Mock transport for testing

use super::Transport;
use crate::config::SessionConfig;
use crate::error::{Error, Result};
use parking_lot::{Condvar, Mutex};
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

/// How long a receive waits for injected bytes before returning empty
const READ_WAIT: Duration = Duration::from_millis(10);

/// In-memory transport for unit testing
///
/// Clones share state, so a test keeps one handle while the session owns
/// another.
#[derive(Clone)]
pub struct MockTransport {
    inner: Arc<MockTransportInner>,
}

struct MockTransportInner {
    name: String,
    state: Mutex<MockState>,
    readable: Condvar,
}

#[derive(Default)]
struct MockState {
    open: bool,
    read_buffer: VecDeque<u8>,
    write_chunks: Vec<Vec<u8>>,
    fail_open: bool,
    fail_writes: bool,
    fail_reads: bool,
    open_count: usize,
    close_count: usize,
}

impl MockTransport {
    /// Create a new mock transport
    pub fn new() -> Self {
        Self::named("Mock")
    }

    /// Mock transport with a custom session name
    pub fn named(name: impl Into<String>) -> Self {
        MockTransport {
            inner: Arc::new(MockTransportInner {
                name: name.into(),
                state: Mutex::new(MockState::default()),
                readable: Condvar::new(),
            }),
        }
    }

    /// Inject data to be read
    pub fn inject_read(&self, data: &[u8]) {
        let mut state = self.inner.state.lock();
        state.read_buffer.extend(data);
        self.inner.readable.notify_all();
    }

    /// Get all written data, concatenated
    pub fn get_written(&self) -> Vec<u8> {
        self.inner.state.lock().write_chunks.concat()
    }

    /// Get written data as the individual chunks passed to `send_chunk`
    pub fn written_chunks(&self) -> Vec<Vec<u8>> {
        self.inner.state.lock().write_chunks.clone()
    }

    /// Clear written data
    pub fn clear_written(&self) {
        self.inner.state.lock().write_chunks.clear();
    }

    /// Make the next `open` calls fail with a connection error
    pub fn fail_open(&self, fail: bool) {
        self.inner.state.lock().fail_open = fail;
    }

    /// Make `send_chunk` fail with a broken pipe
    pub fn fail_writes(&self, fail: bool) {
        self.inner.state.lock().fail_writes = fail;
    }

    /// Make `receive_chunk` fail with a connection reset
    pub fn fail_reads(&self, fail: bool) {
        self.inner.state.lock().fail_reads = fail;
        self.inner.readable.notify_all();
    }

    /// True between a successful `open` and `close`
    pub fn is_open(&self) -> bool {
        self.inner.state.lock().open
    }

    /// Number of successful `open` calls
    pub fn open_count(&self) -> usize {
        self.inner.state.lock().open_count
    }

    /// Number of `close` calls
    pub fn close_count(&self) -> usize {
        self.inner.state.lock().close_count
    }
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl Transport for MockTransport {
    fn name(&self) -> &str {
        &self.inner.name
    }

    fn open(&self, config: &SessionConfig) -> Result<()> {
        let mut state = self.inner.state.lock();
        if state.fail_open {
            return Err(Error::Connection {
                address: config.address.clone(),
                source: std::io::Error::from(std::io::ErrorKind::ConnectionRefused),
            });
        }
        state.open = true;
        state.open_count += 1;
        Ok(())
    }

    fn close(&self) -> Result<()> {
        let mut state = self.inner.state.lock();
        state.open = false;
        state.close_count += 1;
        self.inner.readable.notify_all();
        Ok(())
    }

    fn receive_chunk(&self, max_size: usize) -> Result<Vec<u8>> {
        let mut state = self.inner.state.lock();
        if state.open && state.read_buffer.is_empty() && !state.fail_reads {
            let _ = self.inner.readable.wait_for(&mut state, READ_WAIT);
        }
        if !state.open {
            return Err(Error::NotOpen);
        }
        if state.fail_reads {
            return Err(Error::Io(std::io::Error::from(
                std::io::ErrorKind::ConnectionReset,
            )));
        }
        let available = state.read_buffer.len().min(max_size);
        Ok(state.read_buffer.drain(..available).collect())
    }

    fn send_chunk(&self, data: &[u8]) -> Result<()> {
        let mut state = self.inner.state.lock();
        if !state.open {
            return Err(Error::NotOpen);
        }
        if state.fail_writes {
            return Err(Error::Io(std::io::Error::from(std::io::ErrorKind::BrokenPipe)));
        }
        state.write_chunks.push(data.to_vec());
        Ok(())
    }
}
