// Central Error Type for the Application

use thiserror::Error;

/// Application-level error type
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Domain error: {0}")]
    Domain(#[from] crate::domain::DomainError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Execution error: {0}")]
    Execution(#[from] crate::port::ExecutionError),

    #[error("Delivery error: {0}")]
    Delivery(#[from] crate::port::DeliveryError),
}

/// Result type alias using AppError
pub type Result<T> = std::result::Result<T, AppError>;
