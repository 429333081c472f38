// Scheduling constants (no magic values)
use std::time::Duration;

/// Delay before re-establishing a transport that dropped after authenticating (1s)
pub const RECONNECT_DELAY: Duration = Duration::from_secs(1);

/// Default timeout for commands run on behalf of a source (30s)
pub const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(30);

/// How long shutdown waits on each plugin teardown hook (5s)
pub const GRACEFUL_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);
