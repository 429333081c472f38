// Plugin construction errors

use thiserror::Error;

use duct_core::domain::DomainError;

#[derive(Error, Debug)]
pub enum PluginError {
    #[error("Unknown source plugin '{0}'")]
    UnknownSource(String),

    #[error("Unknown output plugin '{0}'")]
    UnknownOutput(String),

    #[error(transparent)]
    Config(#[from] DomainError),

    #[error("Could not build HTTP client: {0}")]
    Client(String),
}
