//! Error types for retry configuration, cancellation and HTTP fetches.

use std::time::Duration;
use thiserror::Error;

/// Invalid retry configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// `max_attempts` was zero.
    #[error("max_attempts must be at least 1")]
    ZeroAttempts,

    /// `backoff_multiplier` was below 1 or not finite.
    #[error("backoff_multiplier must be a finite number >= 1, got {0}")]
    InvalidMultiplier(f64),

    /// `max_delay` was shorter than `initial_delay`.
    #[error("max_delay ({max:?}) must not be shorter than initial_delay ({initial:?})")]
    DelayOrder {
        /// Configured initial delay.
        initial: Duration,
        /// Configured maximum delay.
        max: Duration,
    },

    /// The serialized configuration could not be parsed.
    #[error("invalid retry config: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Outcome of a retry sequence that may be cancelled.
///
/// `Failed` carries the operation's own error, untouched.
#[derive(Debug, Error)]
pub enum Interrupted<E> {
    /// The sequence ended with the operation's error.
    #[error("{0}")]
    Failed(E),

    /// The cancellation token fired before an attempt or during a wait.
    #[error("retry cancelled after {attempts} attempt(s)")]
    Cancelled {
        /// Attempts that ran to completion.
        attempts: u32,
        /// Error from the most recent attempt, if any ran.
        last_error: Option<E>,
    },
}

impl<E> Interrupted<E> {
    /// Whether the sequence was cancelled.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled { .. })
    }

    /// The last operation error, if one was captured.
    pub fn into_error(self) -> Option<E> {
        match self {
            Self::Failed(error) => Some(error),
            Self::Cancelled { last_error, .. } => last_error,
        }
    }
}

/// Errors from a single HTTP fetch.
///
/// Display strings of the transient variants contain the keywords the
/// network classifier looks for.
#[derive(Debug, Error)]
pub enum FetchError {
    /// The request timed out.
    #[error("request timeout")]
    Timeout,

    /// The connection could not be established.
    #[error("connection error: {0}")]
    Connection(String),

    /// Any other transport-level failure.
    #[error("network error: {0}")]
    Network(String),

    /// The server answered with a non-success status.
    #[error("HTTP {status}: {body}")]
    Status {
        /// HTTP status code.
        status: u16,
        /// Response body.
        body: String,
    },

    /// The response body could not be decoded.
    #[error("invalid response body: {0}")]
    Decode(String),

    /// Other error.
    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

impl FetchError {
    /// Create a status error.
    pub fn status(status: u16, body: impl Into<String>) -> Self {
        Self::Status {
            status,
            body: body.into(),
        }
    }

    /// Create a connection error.
    pub fn connection(msg: impl Into<String>) -> Self {
        Self::Connection(msg.into())
    }

    /// Get the HTTP status if the server answered.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            Self::Status { status, .. } => Some(*status),
            _ => None,
        }
    }
}
