// Duct Core - Domain Logic, Ports & Scheduling Substrate
// NO infrastructure dependencies: processes, SSH and HTTP live in adapter crates

pub mod application;
pub mod domain;
pub mod error;
pub mod port;

pub use error::{AppError, Result};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
