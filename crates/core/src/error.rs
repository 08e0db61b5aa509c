// Central Error Type for the Application

use thiserror::Error;

/// Application-level error type (fatal to the agent)
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Transport error: {0}")]
    Transport(#[from] crate::port::TransportError),

    #[error("Configuration error: {0}")]
    Config(String),
}

/// Result type alias using AppError
pub type Result<T> = std::result::Result<T, AppError>;
