//! Error types for sidney-synth.

use thiserror::Error;

/// Result type alias for sidney-synth operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in sidney-synth.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum Error {
    /// A register write into a chip failed.
    #[error(transparent)]
    Chip(#[from] sidney_core::Error),

    /// Controller index outside the controller map.
    #[error("Unknown control index: {0}")]
    UnknownControl(u16),

    /// Invalid configuration parameter.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}
