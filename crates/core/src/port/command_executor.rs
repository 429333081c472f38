// Command Executor Port
// Abstraction for running a command either as a local subprocess or over a remote channel

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::time::Duration;
use thiserror::Error;

/// Exit code reported when a remote command is attempted without a usable connection
pub const NOT_CONNECTED_EXIT_CODE: i32 = 255;

/// Message reported alongside [`NOT_CONNECTED_EXIT_CODE`]
pub const NOT_CONNECTED_MESSAGE: &str = "SSH not ready";

/// Captured output of a finished command
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
}

impl CommandOutput {
    /// Synthetic result for a remote command issued while disconnected
    pub fn not_connected() -> Self {
        Self {
            stdout: String::new(),
            stderr: NOT_CONNECTED_MESSAGE.to_string(),
            exit_code: NOT_CONNECTED_EXIT_CODE,
        }
    }

    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// Execution errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ExecutionError {
    #[error("Spawn failed: {0}")]
    SpawnFailed(String),

    #[error("Process timeout after {0}ms")]
    Timeout(u64),

    #[error("Process killed: {0}")]
    Killed(String),

    #[error("Command channel failed: {0}")]
    Channel(String),

    #[error("Connection failed: {0}")]
    Connect(String),

    #[error("IO error: {0}")]
    IoError(String),
}

/// Command Executor trait
///
/// Implementations:
/// - ProcessRunner: spawns a local child process
/// - RemoteConnection: opens a channel on a shared SSH transport
#[async_trait]
pub trait CommandExecutor: Send + Sync {
    /// Run `command` with `args` and extra `env` assignments, bounded by `timeout`
    ///
    /// # Errors
    /// - ExecutionError::SpawnFailed if the command cannot be started
    /// - ExecutionError::Timeout if the command outlives `timeout`
    /// - ExecutionError::Killed if the command was terminated by a signal
    /// - ExecutionError::Channel if a remote channel broke mid-command
    async fn run(
        &self,
        command: &str,
        args: &[String],
        env: &BTreeMap<String, String>,
        timeout: Duration,
    ) -> Result<CommandOutput, ExecutionError>;

    /// Short description for logs ("local", "ssh://user@host:22")
    fn describe(&self) -> String;
}

// ============================================================================
// Mock Implementations for Testing
// ============================================================================

pub mod mocks {
    use super::*;
    use parking_lot::Mutex;
    use std::sync::Arc;

    /// Recorded invocation
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub struct RecordedCall {
        pub command: String,
        pub args: Vec<String>,
        pub env: BTreeMap<String, String>,
    }

    /// Mock executor returning a canned result and recording calls
    pub struct MockCommandExecutor {
        result: Mutex<Result<CommandOutput, ExecutionError>>,
        calls: Arc<Mutex<Vec<RecordedCall>>>,
    }

    impl MockCommandExecutor {
        pub fn new(result: Result<CommandOutput, ExecutionError>) -> Self {
            Self {
                result: Mutex::new(result),
                calls: Arc::new(Mutex::new(Vec::new())),
            }
        }

        pub fn with_stdout(stdout: impl Into<String>) -> Self {
            Self::new(Ok(CommandOutput {
                stdout: stdout.into(),
                stderr: String::new(),
                exit_code: 0,
            }))
        }

        pub fn set_result(&self, result: Result<CommandOutput, ExecutionError>) {
            *self.result.lock() = result;
        }

        pub fn calls(&self) -> Vec<RecordedCall> {
            self.calls.lock().clone()
        }
    }

    #[async_trait]
    impl CommandExecutor for MockCommandExecutor {
        async fn run(
            &self,
            command: &str,
            args: &[String],
            env: &BTreeMap<String, String>,
            _timeout: Duration,
        ) -> Result<CommandOutput, ExecutionError> {
            self.calls.lock().push(RecordedCall {
                command: command.to_string(),
                args: args.to_vec(),
                env: env.clone(),
            });
            self.result.lock().clone()
        }

        fn describe(&self) -> String {
            "mock".to_string()
        }
    }
}
