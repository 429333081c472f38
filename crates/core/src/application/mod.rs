// Application Layer - Scheduling, queueing and fan-out

pub mod agent;
pub mod constants;
pub mod dispatcher;
pub mod output;
pub mod shutdown;
pub mod source;

// Re-exports
pub use agent::Agent;
pub use dispatcher::FanOutDispatcher;
pub use output::{Admission, FlushOutcome, Output};
pub use shutdown::{shutdown_channel, ShutdownSender, ShutdownToken};
pub use source::{ExecutionChannel, Source, TickOutcome};
