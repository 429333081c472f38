// Port Layer - Interfaces for plugins and infrastructure adapters

pub mod command_executor;
pub mod dispatcher;
pub mod output_plugin;
pub mod remote_link;
pub mod source_plugin;
pub mod substrate_log;
pub mod time_provider; // For deterministic testing

// Re-exports
pub use command_executor::{CommandExecutor, CommandOutput, ExecutionError};
pub use dispatcher::Dispatcher;
pub use output_plugin::{DeliveryError, OutputPlugin};
pub use remote_link::RemoteLink;
pub use source_plugin::{SampleContext, SampleError, SourcePlugin};
pub use substrate_log::{LogLevel, NoopLog, SubstrateLog, TracingLog};
pub use time_provider::TimeProvider;
