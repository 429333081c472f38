// Remote Link Port
// Connection management surface of a shared remote transport

use async_trait::async_trait;

use crate::port::ExecutionError;

/// Handle on a shared remote connection, as seen by a source.
///
/// The same connection also implements [`crate::port::CommandExecutor`];
/// sources only use this trait to ask for the connection to be established.
#[async_trait]
pub trait RemoteLink: Send + Sync {
    /// Establish the connection. A no-op while a connect is already in progress
    /// or the link is already up.
    async fn connect(&self) -> Result<(), ExecutionError>;

    /// Whether commands can currently be executed
    fn is_connected(&self) -> bool;

    /// Target description for logs
    fn describe(&self) -> String;
}

pub mod mocks {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    /// Counts connect calls; connects succeed unless told otherwise
    #[derive(Default)]
    pub struct MockRemoteLink {
        connects: AtomicUsize,
        connected: AtomicBool,
        reject: AtomicBool,
        in_flight: AtomicBool,
    }

    impl MockRemoteLink {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn rejecting() -> Self {
            let link = Self::default();
            link.reject.store(true, Ordering::SeqCst);
            link
        }

        /// Connect returns at once because another attempt already owns the link
        pub fn in_flight() -> Self {
            let link = Self::default();
            link.in_flight.store(true, Ordering::SeqCst);
            link
        }

        pub fn connects(&self) -> usize {
            self.connects.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl RemoteLink for MockRemoteLink {
        async fn connect(&self) -> Result<(), ExecutionError> {
            self.connects.fetch_add(1, Ordering::SeqCst);
            if self.reject.load(Ordering::SeqCst) {
                return Err(ExecutionError::Connect("authentication rejected".to_string()));
            }
            if !self.in_flight.load(Ordering::SeqCst) {
                self.connected.store(true, Ordering::SeqCst);
            }
            Ok(())
        }

        fn is_connected(&self) -> bool {
            self.connected.load(Ordering::SeqCst)
        }

        fn describe(&self) -> String {
            "mock-remote".to_string()
        }
    }
}
