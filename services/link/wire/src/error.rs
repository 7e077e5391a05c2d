//! Wire protocol error types.

use thiserror::Error;

/// Errors raised while framing or parsing messages
#[derive(Error, Debug)]
pub enum CodecError {
    /// Frame exceeds the configured size limit
    #[error("size limit exceeded: {0}")]
    Size(usize),

    /// Frame carries a kind code no message maps to
    #[error("unknown message kind {0}")]
    UnknownKind(u32),

    /// Malformed frame structure
    #[error("malformed frame")]
    Malformed,

    /// Message body could not be (de)serialized
    #[error("json body invalid: {0}")]
    Json(#[from] serde_json::Error),
}
