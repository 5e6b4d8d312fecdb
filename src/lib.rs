//! SetuIO - line-oriented device session harness
//!
//! A session moves messages between a byte-stream transport and two event
//! buses through three worker threads:
//!
//! - **reader**: transport → inbound queue
//! - **distributor**: inbound queue → RX bus (`<Name>InEvent`)
//! - **writer**: outbound queue → transport → TX bus (`<Name>OutEvent`)
//!
//! [`LineEndpoint`] is a session over TCP that frames newline-terminated
//! text. [`MockTransport`] stands in for a device in tests.

pub mod bus;
pub mod config;
pub mod debug;
pub mod endpoint;
pub mod error;
pub mod framing;
pub mod message;
pub mod queue;
pub mod session;
pub mod timer;
pub mod transport;

// Re-export commonly used types
pub use bus::{CallbackResult, Cookie, EventBus, EventPacket};
pub use config::{DebugConfig, SessionConfig};
pub use debug::DebugLogger;
pub use endpoint::LineEndpoint;
pub use error::{Error, Result};
pub use message::Message;
pub use session::{Channel, DeviceSession, StageKind, StageSet, StageStatus};
pub use timer::PeriodicEmitter;
pub use transport::{MockTransport, TcpTransport, Transport};
