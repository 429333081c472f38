// Connection state machine

use std::fmt;

/// Lifecycle of a [`crate::RemoteConnection`].
///
/// ```text
/// DISCONNECTED -> CONNECTING -> AUTHENTICATING -> CONNECTED
///       ^              |               |              |
///       +--------------+---------------+--------------+   (transport loss)
/// any state -> FAILED                                      (host key / auth rejected)
/// FAILED -> CONNECTING                                     (explicit retry)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Authenticating,
    Connected,
    Failed,
}

impl ConnectionState {
    pub fn can_transition(self, to: ConnectionState) -> bool {
        use ConnectionState::*;

        match (self, to) {
            (Disconnected, Connecting) | (Failed, Connecting) => true,
            (Connecting, Authenticating) => true,
            (Authenticating, Connected) => true,
            (Connecting, Disconnected) | (Authenticating, Disconnected) | (Connected, Disconnected) => true,
            (Failed, Disconnected) => true,
            (Failed, Failed) => false,
            (_, Failed) => true,
            (Disconnected, _) | (Connecting, _) | (Authenticating, _) | (Connected, _) | (Failed, _) => false,
        }
    }

    /// A connect attempt is under way
    pub fn is_busy(self) -> bool {
        matches!(self, ConnectionState::Connecting | ConnectionState::Authenticating)
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ConnectionState::Disconnected => "DISCONNECTED",
            ConnectionState::Connecting => "CONNECTING",
            ConnectionState::Authenticating => "AUTHENTICATING",
            ConnectionState::Connected => "CONNECTED",
            ConnectionState::Failed => "FAILED",
        };
        f.write_str(name)
    }
}
