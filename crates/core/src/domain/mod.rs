// Domain Layer - Events and component settings

pub mod aggregation;
pub mod config;
pub mod error;
pub mod event;
pub mod settings;

// Re-exports
pub use aggregation::Aggregation;
pub use config::ComponentConfig;
pub use error::DomainError;
pub use event::{Event, EventBuilder, EventKind, EventState, EventTemplate};
pub use settings::{OutputSettings, RemoteSettings, SourceSettings};
