//! Error types for candide-synth.

use thiserror::Error;

use crate::voice::VoiceIndex;

/// Result type alias for candide-synth operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in candide-synth.
///
/// Voice handling itself never fails at runtime; these only guard
/// construction and explicit API misuse.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum Error {
    /// Invalid configuration parameter.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Voice index outside the pool.
    #[error("Voice {0} out of range (pool holds {1})")]
    VoiceOutOfRange(VoiceIndex, usize),
}
