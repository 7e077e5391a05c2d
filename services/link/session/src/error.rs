//! Session and transport error types.

use std::time::Duration;
use thiserror::Error;

/// Failures while establishing a transport connection
#[derive(Error, Debug)]
pub enum TransportError {
    /// Connect did not finish within the timeout
    #[error("connect timed out after {0:?}")]
    Timeout(Duration),

    /// Resolve, refuse, reset, or any other socket error
    #[error("connect failed: {0}")]
    Io(#[from] std::io::Error),
}

/// Failures when handing a message to a session
#[derive(Error, Debug)]
pub enum SessionError {
    /// The session's I/O loop has already stopped
    #[error("session closed")]
    Closed,
}
