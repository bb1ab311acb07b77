//! Common error types for MMPS

use thiserror::Error;

/// Common result type for MMPS operations
pub type Result<T> = std::result::Result<T, Error>;

/// Common error types across the MMPS crates
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration loading or validation error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Invalid user input (e.g. empty problem statement)
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}
