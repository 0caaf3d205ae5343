//! Error types for the messaging layer

use std::io;
use thiserror::Error;

/// Result type for messaging operations
pub type Result<T> = std::result::Result<T, MessagingError>;

/// Messaging layer errors
///
/// Setup failures (`Setup`, `InvalidAddress`, `DuplicateNode`, `UnknownNode`)
/// are reported synchronously to the caller and never retried. Transport
/// failures (`Connection`, `Io`) are observed as disconnects; `send_to` on the
/// server never surfaces them. Protocol failures (`UnknownMessageType`,
/// `PayloadUnderrun`, `MessageTooLarge`) are returned uniformly as errors.
#[derive(Debug, Error)]
pub enum MessagingError {
    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Setup error (bind/listen or other startup failure)
    #[error("Setup error: {0}")]
    Setup(String),

    /// Address parse error
    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    /// Connection error
    #[error("Connection error: {0}")]
    Connection(String),

    /// Operation requires an established connection
    #[error("Not connected")]
    NotConnected,

    /// Timeout error
    #[error("Operation timed out: {0}")]
    Timeout(String),

    /// Payload too large for the wire format
    #[error("Message too large: {0} bytes (max: {1} bytes)")]
    MessageTooLarge(usize, usize),

    /// Typed read past the end of a payload
    #[error("Payload underrun: needed {0} bytes, {1} remaining")]
    PayloadUnderrun(usize, usize),

    /// Malformed payload content
    #[error("Decode error: {0}")]
    Decode(String),

    /// Message type with no redirection entry
    #[error("Unknown message type [{0}]: no redirection setup")]
    UnknownMessageType(i32),

    /// Node name already registered
    #[error("Node [{0}] already exists")]
    DuplicateNode(String),

    /// Node name not registered
    #[error("Node [{0}] does not exist")]
    UnknownNode(String),
}

impl MessagingError {
    /// Create a setup error
    pub fn setup<S: Into<String>>(msg: S) -> Self {
        Self::Setup(msg.into())
    }

    /// Create an invalid address error
    pub fn invalid_address<S: Into<String>>(msg: S) -> Self {
        Self::InvalidAddress(msg.into())
    }

    /// Create a connection error
    pub fn connection<S: Into<String>>(msg: S) -> Self {
        Self::Connection(msg.into())
    }

    /// Create a timeout error
    pub fn timeout<S: Into<String>>(msg: S) -> Self {
        Self::Timeout(msg.into())
    }

    /// True for errors that indicate a failed or closed transport,
    /// as opposed to setup or protocol misuse.
    #[must_use]
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            Self::Io(_) | Self::Connection(_) | Self::NotConnected | Self::Timeout(_)
        )
    }
}
