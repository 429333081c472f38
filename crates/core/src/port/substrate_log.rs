// Substrate Log Port
// Explicit logging sink for the remote execution substrate

use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
}

/// Sink for connection lifecycle messages.
///
/// Injected into the remote substrate so quiet operation is a matter of
/// passing [`NoopLog`] rather than silencing a library.
pub trait SubstrateLog: Send + Sync {
    fn record(&self, level: LogLevel, target: &str, message: &str);
}

/// Forwards to `tracing` with the connection target as a field
pub struct TracingLog;

impl SubstrateLog for TracingLog {
    fn record(&self, level: LogLevel, target: &str, message: &str) {
        match level {
            LogLevel::Debug => debug!(remote = %target, "{}", message),
            LogLevel::Info => info!(remote = %target, "{}", message),
            LogLevel::Warn => warn!(remote = %target, "{}", message),
        }
    }
}

/// Discards everything
pub struct NoopLog;

impl SubstrateLog for NoopLog {
    fn record(&self, _level: LogLevel, _target: &str, _message: &str) {}
}

pub mod mocks {
    use super::*;
    use parking_lot::Mutex;

    /// Keeps every record for assertions
    #[derive(Default)]
    pub struct MemoryLog {
        records: Mutex<Vec<(LogLevel, String, String)>>,
    }

    impl MemoryLog {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn messages(&self) -> Vec<String> {
            self.records.lock().iter().map(|(_, _, m)| m.clone()).collect()
        }

        pub fn contains(&self, needle: &str) -> bool {
            self.records.lock().iter().any(|(_, _, m)| m.contains(needle))
        }
    }

    impl SubstrateLog for MemoryLog {
        fn record(&self, level: LogLevel, target: &str, message: &str) {
            self.records
                .lock()
                .push((level, target.to_string(), message.to_string()));
        }
    }
}
