//! Engine configuration.

use std::time::Duration;

use candide_midi::ZoneLayout;
use candide_synth::{
    ControllerThresholds, Instrument, ReleaseMode, ResetPolicy, DEFAULT_RELEASE_GRACE,
};
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Everything an [`crate::MpeEngine`] needs at construction. Nothing here
/// changes after the engine is built; zones and instrument change at runtime
/// through MIDI and hardware events.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Voice slots, fixed for the engine's lifetime.
    pub voice_capacity: usize,
    pub release_mode: ReleaseMode,
    /// How long a Releasing voice waits before it is freed anyway.
    pub release_grace: Duration,
    pub reset_policy: ResetPolicy,
    pub thresholds: ControllerThresholds,
    pub initial_zones: ZoneLayout,
    pub initial_instrument: Instrument,
    pub midi_queue_capacity: usize,
    pub hardware_queue_capacity: usize,
    /// Diagnostics kept before the oldest are discarded.
    pub diagnostics_capacity: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            voice_capacity: 16,
            release_mode: ReleaseMode::default(),
            release_grace: DEFAULT_RELEASE_GRACE,
            reset_policy: ResetPolicy::default(),
            thresholds: ControllerThresholds::default(),
            initial_zones: ZoneLayout::default(),
            initial_instrument: Instrument::default(),
            midi_queue_capacity: 1024,
            hardware_queue_capacity: 32,
            diagnostics_capacity: 64,
        }
    }
}

impl EngineConfig {
    pub fn validate(&self) -> Result<()> {
        if self.voice_capacity == 0 {
            return Err(Error::InvalidConfig(
                "voice_capacity must be at least 1".to_string(),
            ));
        }
        if self.midi_queue_capacity == 0 || self.hardware_queue_capacity == 0 {
            return Err(Error::InvalidConfig(
                "queue capacities must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}
