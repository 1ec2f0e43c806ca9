//! Error types for sidney-core.

use thiserror::Error;

/// Result type alias for sidney-core operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur when addressing a chip instance.
///
/// None of these are fatal: the legacy numeric surface folds every variant
/// into its sentinel return value.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum Error {
    /// Handle does not name a live chip instance (never created, destroyed,
    /// or reused under a newer generation).
    #[error("Invalid chip handle")]
    InvalidHandle,

    /// Register address outside 0x00..=0x1D.
    #[error("Invalid register address: {0:#04x}")]
    InvalidRegister(u8),

    /// All instance slots are in use.
    #[error("Chip pool exhausted ({capacity} instances)")]
    PoolExhausted { capacity: usize },

    /// Analogue-IO command id not recognised.
    #[error("Unknown IO command: {0}")]
    UnknownCommand(i32),

    /// Invalid configuration parameter.
    #[error("Invalid config: {0}")]
    InvalidConfig(String),
}
