//! Connection status value type.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle state of the link to the companion peer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ConnectionStatus {
    /// No session and no connect attempt in progress
    #[default]
    Disconnected,
    /// A connect attempt is in progress
    Connecting,
    /// Transport is up, login not yet answered
    Connected,
    /// Peer accepted the login
    LoggedIn,
    /// Peer rejected the login
    LoginFailed,
}

impl ConnectionStatus {
    /// Whether a live session backs this status
    pub fn has_session(self) -> bool {
        matches!(
            self,
            ConnectionStatus::Connected | ConnectionStatus::LoggedIn | ConnectionStatus::LoginFailed
        )
    }
}

impl fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ConnectionStatus::Disconnected => "disconnected",
            ConnectionStatus::Connecting => "connecting",
            ConnectionStatus::Connected => "connected",
            ConnectionStatus::LoggedIn => "logged in",
            ConnectionStatus::LoginFailed => "login failed",
        };
        f.write_str(name)
    }
}
