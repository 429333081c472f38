// Duct Infrastructure - Local System Adapters
// Implements: CommandExecutor for local subprocesses

pub mod process_runner;

pub use process_runner::ProcessRunner;
