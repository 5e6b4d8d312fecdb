//! Error types for SetuIO

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// Boxed error returned by subscriber callbacks
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// SetuIO error types
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Malformed address or invalid configuration value
    #[error("Configuration error: {0}")]
    Config(String),

    /// Transport could not be connected
    #[error("Connection to {address} failed: {source}")]
    Connection {
        /// Address the transport tried to reach
        address: String,
        /// Underlying socket error
        #[source]
        source: std::io::Error,
    },

    /// I/O error on an open transport
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Peer closed the stream
    #[error("Transport disconnected")]
    Disconnected,

    /// Transport used before `open` or after `close`
    #[error("Transport not open")]
    NotOpen,

    /// Session opened twice without a `close` in between
    #[error("Session already open")]
    AlreadyOpen,

    /// Character cannot be represented in the single-byte line encoding
    #[error("Cannot encode {0:?} as a single byte")]
    Encoding(char),

    /// Bounded hand-off queue is at capacity
    #[error("Queue full (capacity {0})")]
    QueueFull(usize),

    /// Subscriber callback failed during a post
    #[error("Subscriber '{subscriber}' failed on {event}: {source}")]
    Callback {
        /// Event channel being posted
        event: String,
        /// Name of the failing subscriber
        subscriber: String,
        /// Error returned by the callback
        #[source]
        source: BoxError,
    },

    /// Stage or timer thread could not be spawned
    #[error("Failed to spawn thread: {0}")]
    ThreadSpawn(String),

    /// Stage did not finish within the close timeout
    #[error("Stage '{stage}' did not stop within the close timeout")]
    ShutdownTimeout {
        /// Thread name of the stage
        stage: String,
    },

    /// Configuration file could not be parsed
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
}

impl Error {
    /// True for errors that mean the peer or the local side tore the stream down.
    ///
    /// The reader stage sees one of these as the normal way out of a blocking
    /// receive once the session is closing.
    pub fn is_disconnect(&self) -> bool {
        match self {
            Error::Disconnected | Error::NotOpen => true,
            Error::Io(e) => matches!(
                e.kind(),
                std::io::ErrorKind::UnexpectedEof
                    | std::io::ErrorKind::ConnectionReset
                    | std::io::ErrorKind::ConnectionAborted
                    | std::io::ErrorKind::BrokenPipe
                    | std::io::ErrorKind::NotConnected
            ),
            _ => false,
        }
    }
}
