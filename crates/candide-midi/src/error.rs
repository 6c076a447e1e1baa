//! Error types for the MIDI/MPE protocol side.

use thiserror::Error;

use crate::zone::ZoneId;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    #[error("Invalid zone config for {zone:?}: {reason}")]
    InvalidZoneConfig { zone: ZoneId, reason: String },

    #[error("Channel {0} out of range (expected 0-15)")]
    InvalidChannel(u8),

    #[error("Channel {0} is not claimed by any zone")]
    UnassignedChannel(u8),
}

pub type Result<T> = std::result::Result<T, Error>;
