//! Centralized error type for the candide umbrella crate.
//!
//! Wraps the subsystem errors so `?` propagates naturally across crate boundaries.

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    #[error("MIDI: {0}")]
    Midi(#[from] candide_midi::Error),

    #[error("Synth: {0}")]
    Synth(#[from] candide_synth::Error),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

pub type Result<T> = std::result::Result<T, Error>;
