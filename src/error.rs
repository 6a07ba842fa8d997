//! Error types for the relay.

use thiserror::Error;

use crate::types::ProducerId;

/// Failures reported by [`crate::channel::BoundedChannel`] operations.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelError {
    /// Send attempted on, or woken by, a closed channel.
    #[error("send on closed channel")]
    Closed,

    /// `close` called on a channel that is already closed.
    #[error("channel already closed")]
    AlreadyClosed,

    /// No space freed up before the send deadline.
    #[error("channel full: send timed out")]
    Timeout,

    /// The sender's cancellation token fired while it waited for space.
    #[error("send cancelled while channel full")]
    Cancelled,

    #[error("channel capacity must be at least 1")]
    InvalidCapacity,
}

/// A producer stopped on a channel error; `sent` counts what it delivered
/// before failing.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("{source} after {sent} message(s)")]
pub struct ProducerError {
    pub sent: u64,
    #[source]
    pub source: ChannelError,
}

/// Command-line and configuration failures.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("unknown option: {0}")]
    UnknownOption(String),

    #[error("missing value for {0}")]
    MissingValue(String),

    #[error("invalid value for {option}: {value}")]
    InvalidValue { option: String, value: String },

    #[error("duplicate producer id: {0}")]
    DuplicateProducer(ProducerId),

    #[error("{option} must be > 0")]
    MustBePositive { option: &'static str },
}
