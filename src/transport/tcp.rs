//! TCP stream transport with line framing

use super::Transport;
use crate::config::SessionConfig;
use crate::error::{Error, Result};
use crate::framing::encode_line;
use crate::message::Message;
use parking_lot::RwLock;
use std::io::{ErrorKind, Read, Write};
use std::net::{Shutdown, SocketAddr, TcpStream, ToSocketAddrs};
use std::sync::Arc;

/// Connected TCP stream
///
/// The stream sits behind an `Arc` so the reader and writer stages can use it
/// concurrently (`&TcpStream` implements both `Read` and `Write`) while
/// `close` takes it out and shuts it down, which unblocks a pending read.
pub struct TcpTransport {
    name: String,
    stream: RwLock<Option<Arc<TcpStream>>>,
}

impl TcpTransport {
    /// Unconnected transport
    pub fn new() -> Self {
        Self::named("Ip")
    }

    /// Unconnected transport with a custom session name
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            stream: RwLock::new(None),
        }
    }

    /// True while a stream is held
    pub fn is_connected(&self) -> bool {
        self.stream.read().is_some()
    }

    /// Local address of the open stream
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.current().ok()?.local_addr().ok()
    }

    fn current(&self) -> Result<Arc<TcpStream>> {
        self.stream.read().as_ref().map(Arc::clone).ok_or(Error::NotOpen)
    }

    fn connect(config: &SessionConfig) -> Result<TcpStream> {
        let addrs = resolve(&config.address)?;
        let mut last_err = None;
        for addr in addrs {
            let attempt = match config.connect_timeout() {
                Some(timeout) => TcpStream::connect_timeout(&addr, timeout),
                None => TcpStream::connect(addr),
            };
            match attempt {
                Ok(stream) => return Ok(stream),
                Err(e) => {
                    log::debug!("Connect to {} failed: {}", addr, e);
                    last_err = Some(e);
                }
            }
        }
        Err(Error::Connection {
            address: config.address.clone(),
            source: last_err
                .unwrap_or_else(|| std::io::Error::new(ErrorKind::NotFound, "no addresses")),
        })
    }
}

impl Default for TcpTransport {
    fn default() -> Self {
        Self::new()
    }
}

/// Split and resolve a `host:port` address
fn resolve(address: &str) -> Result<Vec<SocketAddr>> {
    let (host, port) = address
        .rsplit_once(':')
        .ok_or_else(|| Error::Config(format!("address '{}' is not host:port", address)))?;
    if host.is_empty() {
        return Err(Error::Config(format!("address '{}' has no host", address)));
    }
    let port: u16 = port
        .parse()
        .map_err(|_| Error::Config(format!("address '{}' has an invalid port", address)))?;
    let host = host.trim_start_matches('[').trim_end_matches(']');
    let addrs: Vec<SocketAddr> = (host, port)
        .to_socket_addrs()
        .map_err(|e| Error::Connection {
            address: address.to_string(),
            source: e,
        })?
        .collect();
    if addrs.is_empty() {
        return Err(Error::Config(format!("address '{}' did not resolve", address)));
    }
    Ok(addrs)
}

impl Transport for TcpTransport {
    fn name(&self) -> &str {
        &self.name
    }

    fn open(&self, config: &SessionConfig) -> Result<()> {
        let stream = Self::connect(config)?;
        if let Err(e) = stream.set_nodelay(true) {
            log::warn!("Failed to set TCP_NODELAY: {}", e);
        }
        log::info!(
            "Connected to {} (local {:?})",
            config.address,
            stream.local_addr().ok()
        );
        *self.stream.write() = Some(Arc::new(stream));
        Ok(())
    }

    fn close(&self) -> Result<()> {
        let Some(stream) = self.stream.write().take() else {
            return Ok(());
        };
        match stream.shutdown(Shutdown::Both) {
            Ok(()) => {}
            // Peer already tore it down
            Err(e) if e.kind() == ErrorKind::NotConnected => {}
            Err(e) => return Err(e.into()),
        }
        log::info!("TCP stream closed");
        Ok(())
    }

    fn receive_chunk(&self, max_size: usize) -> Result<Vec<u8>> {
        let stream = self.current()?;
        let mut buffer = vec![0u8; max_size];
        match (&*stream).read(&mut buffer) {
            Ok(0) => Err(Error::Disconnected),
            Ok(n) => {
                buffer.truncate(n);
                Ok(buffer)
            }
            Err(e) if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => {
                Ok(Vec::new())
            }
            Err(e) if e.kind() == ErrorKind::Interrupted => Ok(Vec::new()),
            Err(e) => Err(e.into()),
        }
    }

    fn send_chunk(&self, data: &[u8]) -> Result<()> {
        let stream = self.current()?;
        (&*stream).write_all(data)?;
        Ok(())
    }

    fn send_message(&self, message: &Message) -> Result<()> {
        let bytes = encode_line(message)?;
        self.send_chunk(&bytes)
    }
}
