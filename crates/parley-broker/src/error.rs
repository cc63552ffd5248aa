//! Error types for the broker.

use thiserror::Error;

/// Errors that can occur in broker operations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BrokerError {
    /// The broker has been shut down, or is shutting down.
    #[error("broker closed")]
    Closed,

    /// `run` was called on a broker whose dispatch loop already started.
    #[error("broker is already running")]
    AlreadyRunning,

    /// The inbound queue is full (non-blocking submission only).
    #[error("inbound queue full")]
    QueueFull,

    /// Message failed routing validation.
    #[error("malformed message: {0}")]
    MalformedMessage(String),

    /// Recipient endpoint is full; the message was dropped for it.
    #[error("endpoint full")]
    EndpointFull,

    /// Recipient endpoint was closed.
    #[error("endpoint closed")]
    EndpointClosed,

    /// Invalid configuration value.
    #[error("invalid config: {0}")]
    InvalidConfig(String),
}

/// Errors returned by the user directory.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum UserError {
    /// User data failed validation.
    #[error("invalid user: {0}")]
    InvalidUser(String),

    /// No user with the given id.
    #[error("user not found: {0}")]
    NotFound(String),

    /// The directory's cancellation token has fired.
    #[error("operation cancelled")]
    Cancelled,
}

/// A specialized Result type for broker operations.
pub type Result<T> = std::result::Result<T, BrokerError>;
