// Duct Infrastructure - Remote Execution Substrate
// Implements: CommandExecutor + RemoteLink over a shared, auto-reconnecting SSH transport

pub mod connection;
pub mod credentials;
pub mod error;
pub mod fingerprint;
pub mod known_hosts;
pub mod registry;
pub mod russh_transport;
pub mod state;
pub mod transport;

pub use connection::RemoteConnection;
pub use credentials::{AuthMethod, Credentials, Target};
pub use error::{ConnectError, RegistryError};
pub use fingerprint::Fingerprint;
pub use known_hosts::{KnownHosts, Verdict};
pub use registry::ConnectionRegistry;
pub use russh_transport::RusshTransport;
pub use state::ConnectionState;
pub use transport::{SshTransport, TransportSession};
