//! Inbound stream delivery.
//!
//! Provides:
//! - The ordered, sticky-terminal backlog channel fed by the connection
//! - A buffered reader that blocks until enough bytes have arrived
//! - A flow-control reader that reports consumed bytes for window updates
//! - Call cancellation

pub mod buffer;
pub mod context;
pub mod link;
pub mod reader;
pub mod transport;

pub use buffer::{RecvBuffer, RecvSlot};
pub use context::CallContext;
pub use link::LinkBuffer;
pub use reader::{CloseStream, RecvBufferReader};
pub use transport::{TransportReader, WindowHandler};

use bytes::Bytes;
use thiserror::Error;

/// Terminal condition of an inbound stream.
///
/// Cloneable so a reader can cache it and hand it back on every later call.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StreamError {
    /// The peer finished the stream cleanly.
    #[error("end of stream")]
    Eof,

    #[error("context canceled")]
    Canceled,

    #[error("context deadline exceeded")]
    DeadlineExceeded,

    #[error("transport failure: {0}")]
    Transport(String),

    #[error("stream data is not valid UTF-8")]
    InvalidUtf8,
}

impl StreamError {
    pub fn transport(msg: impl Into<String>) -> Self {
        Self::Transport(msg.into())
    }

    pub fn is_eof(&self) -> bool {
        matches!(self, Self::Eof)
    }

    /// Whether the error came from the call context rather than the transport.
    pub fn is_context(&self) -> bool {
        matches!(self, Self::Canceled | Self::DeadlineExceeded)
    }
}

/// Every I/O failure is a transport failure, including a truncated read.
/// Only an explicit end-of-stream message is a clean [`StreamError::Eof`].
impl From<std::io::Error> for StreamError {
    fn from(e: std::io::Error) -> Self {
        Self::Transport(e.to_string())
    }
}

/// One unit delivered from the connection to a stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecvMsg {
    /// A chunk of stream data.
    Data(Bytes),
    /// End of stream or failure. Nothing follows it.
    Terminal(StreamError),
}

impl RecvMsg {
    pub fn data(buf: impl Into<Bytes>) -> Self {
        Self::Data(buf.into())
    }

    pub fn eof() -> Self {
        Self::Terminal(StreamError::Eof)
    }

    pub fn error(err: StreamError) -> Self {
        Self::Terminal(err)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Terminal(_))
    }
}
