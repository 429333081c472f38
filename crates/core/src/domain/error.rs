// Domain Error Types

use thiserror::Error;

#[derive(Error, Debug)]
pub enum DomainError {
    #[error("Missing required setting '{0}'")]
    MissingSetting(String),

    #[error("Invalid value for '{key}': {reason}")]
    InvalidSetting { key: String, reason: String },

    #[error("Validation error: {0}")]
    ValidationError(String),
}

pub type Result<T> = std::result::Result<T, DomainError>;
