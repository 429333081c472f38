// Remote substrate errors

use thiserror::Error;

use duct_core::domain::DomainError;
use duct_core::port::ExecutionError;

/// Why a connection attempt did not reach CONNECTED
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConnectError {
    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Host key for {host} does not match the trusted key")]
    HostKeyMismatch { host: String },

    #[error("Authentication rejected for {username}")]
    AuthRejected { username: String },

    #[error("Unusable key material: {0}")]
    KeyMaterial(String),

    #[error("Connection is shut down")]
    Shutdown,
}

impl ConnectError {
    /// Host identity and credential problems park the connection in FAILED;
    /// anything else leaves it DISCONNECTED.
    pub fn is_rejection(&self) -> bool {
        matches!(
            self,
            ConnectError::HostKeyMismatch { .. }
                | ConnectError::AuthRejected { .. }
                | ConnectError::KeyMaterial(_)
        )
    }
}

impl From<ConnectError> for ExecutionError {
    fn from(e: ConnectError) -> Self {
        ExecutionError::Connect(e.to_string())
    }
}

/// Registry errors
#[derive(Error, Debug)]
pub enum RegistryError {
    #[error("Invalid remote settings: {0}")]
    InvalidSettings(#[from] DomainError),

    #[error("Trust store {path}: {source}")]
    TrustStore {
        path: String,
        #[source]
        source: std::io::Error,
    },
}
