//! Error types for revolver

use thiserror::Error;

/// Core error type for revolver operations
#[derive(Debug, Error)]
pub enum RevolverError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Driver error: {0}")]
    DriverError(String),
}

impl RevolverError {
    pub fn config(msg: impl Into<String>) -> Self {
        Self::ConfigError(msg.into())
    }

    pub fn driver(msg: impl Into<String>) -> Self {
        Self::DriverError(msg.into())
    }
}

pub type Result<T> = std::result::Result<T, RevolverError>;
