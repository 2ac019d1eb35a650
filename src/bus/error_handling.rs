//! Error types for the message bus system

use thiserror::Error;

/// Errors that can occur within the message bus system
#[derive(Error, Debug)]
pub enum MessageBusError {
    /// Failed to send a message to subscribers
    #[error("Failed to send message: {reason}")]
    SendFailed { reason: String },

    /// Channel is disconnected
    #[error("Channel disconnected for subject: {subject}")]
    ChannelDisconnected { subject: String },
}

/// Result type for message bus operations
pub type MessageBusResult<T> = Result<T, MessageBusError>;

/// Errors for async message reception
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AsyncRecvError {
    #[error("Timeout while waiting for message")]
    Timeout,
    #[error("Channel disconnected")]
    Disconnected,
}

/// Errors for async try_recv
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AsyncTryRecvError {
    #[error("No message available")]
    Empty,
    #[error("Channel disconnected")]
    Disconnected,
}
