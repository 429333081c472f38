// SSH transport port
// The connection state machine drives this; russh_transport implements it

use async_trait::async_trait;
use std::sync::Arc;

use duct_core::port::{CommandOutput, ExecutionError};

use crate::credentials::{Credentials, Target};
use crate::error::ConnectError;
use crate::known_hosts::KnownHosts;

/// Opens transports to a target
#[async_trait]
pub trait SshTransport: Send + Sync {
    /// Connect and complete key exchange. The presented host key is checked
    /// against `trust`; a mismatch is [`ConnectError::HostKeyMismatch`].
    async fn open(
        &self,
        target: &Target,
        trust: Arc<KnownHosts>,
    ) -> Result<Arc<dyn TransportSession>, ConnectError>;
}

/// One established transport, multiplexing independent command channels
#[async_trait]
pub trait TransportSession: Send + Sync {
    /// Authenticate with each credential method in order until one is accepted
    async fn authenticate(&self, username: &str, credentials: &Credentials) -> Result<(), ConnectError>;

    /// Run `command_line` on a fresh channel and collect its output
    ///
    /// # Errors
    /// - ExecutionError::Channel if the channel could not be opened or broke
    /// - ExecutionError::Killed if the remote process died on a signal
    async fn exec(&self, command_line: &str) -> Result<CommandOutput, ExecutionError>;

    /// Resolves once the transport has gone away
    async fn closed(&self);

    /// Disconnect; pending and future channels fail
    async fn close(&self);
}
