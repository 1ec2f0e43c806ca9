//! Centralized error type for the sidney umbrella crate.
//!
//! Wraps the member crates' errors so `?` propagates naturally across crate boundaries.

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    #[error(transparent)]
    Core(#[from] sidney_core::Error),

    #[error(transparent)]
    Synth(#[from] sidney_synth::Error),

    /// The control queue had no room; the message was dropped.
    #[error("Control queue full")]
    QueueFull,
}

pub type Result<T> = std::result::Result<T, Error>;
