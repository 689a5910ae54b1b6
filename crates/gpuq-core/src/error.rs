//! Error types for gpuq

use thiserror::Error;

/// Main error type for gpuq
#[derive(Error, Debug)]
pub enum GpuqError {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// The resource query facility could not be invoked
    #[error("Monitor error: {0}")]
    Monitor(String),

    /// The resource query output did not have the expected layout
    #[error("Parse error: {0}")]
    Parse(String),

    /// Control channel error
    #[error("Control error: {0}")]
    Control(String),

    /// Runtime error
    #[error("Runtime error: {0}")]
    Runtime(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl GpuqError {
    /// Whether this error must abort the scheduler.
    ///
    /// Losing visibility of the accelerator's process table leaves the
    /// reconciler blind, so monitor and parse failures are fatal, as is a
    /// broken configuration. Everything else is recovered by the caller.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            GpuqError::Monitor(_) | GpuqError::Parse(_) | GpuqError::Config(_)
        )
    }
}

/// Result type for gpuq operations
pub type GpuqResult<T> = Result<T, GpuqError>;

impl From<serde_json::Error> for GpuqError {
    fn from(err: serde_json::Error) -> Self {
        GpuqError::Serialization(err.to_string())
    }
}

impl From<toml::de::Error> for GpuqError {
    fn from(err: toml::de::Error) -> Self {
        GpuqError::Config(err.to_string())
    }
}
