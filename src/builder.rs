//! Builder for configuring and constructing an `MpeEngine`.

use std::time::Duration;

use candide_midi::ZoneLayout;
use candide_synth::{ControllerThresholds, Instrument, ReleaseMode, ResetPolicy};

use crate::{EngineConfig, MpeEngine, Result};

/// Fluent front end over [`EngineConfig`]. Anything not set keeps its
/// default: 16 voices, lower zone on channels 2-15, grace-period releases.
///
/// # Example
///
/// ```
/// use candide::prelude::*;
///
/// let engine = MpeEngine::builder()
///     .voice_capacity(8)
///     .zones(7, 7)
///     .reset_policy(ResetPolicy::RestoreInheritance)
///     .build()
///     .unwrap();
///
/// assert!(engine.current_zones().upper.is_some());
/// ```
#[derive(Debug, Clone, Default)]
pub struct MpeEngineBuilder {
    config: EngineConfig,
}

impl MpeEngineBuilder {
    /// Start from an existing configuration.
    pub fn from_config(config: EngineConfig) -> Self {
        Self { config }
    }

    /// Default: 16
    pub fn voice_capacity(mut self, voices: usize) -> Self {
        self.config.voice_capacity = voices;
        self
    }

    pub fn release_mode(mut self, mode: ReleaseMode) -> Self {
        self.config.release_mode = mode;
        self
    }

    /// Default: 500 ms
    pub fn release_grace(mut self, grace: Duration) -> Self {
        self.config.release_grace = grace;
        self
    }

    pub fn reset_policy(mut self, policy: ResetPolicy) -> Self {
        self.config.reset_policy = policy;
        self
    }

    pub fn thresholds(mut self, thresholds: ControllerThresholds) -> Self {
        self.config.thresholds = thresholds;
        self
    }

    /// Member counts for the power-on zones; 0 leaves a zone disabled.
    pub fn zones(mut self, lower_members: u8, upper_members: u8) -> Self {
        self.config.initial_zones = ZoneLayout {
            lower_members,
            upper_members,
        };
        self
    }

    pub fn instrument(mut self, instrument: Instrument) -> Self {
        self.config.initial_instrument = instrument;
        self
    }

    /// Default: 1024 bytes
    pub fn midi_queue_capacity(mut self, capacity: usize) -> Self {
        self.config.midi_queue_capacity = capacity;
        self
    }

    /// Default: 32 events
    pub fn hardware_queue_capacity(mut self, capacity: usize) -> Self {
        self.config.hardware_queue_capacity = capacity;
        self
    }

    /// Default: 64 entries
    pub fn diagnostics_capacity(mut self, capacity: usize) -> Self {
        self.config.diagnostics_capacity = capacity;
        self
    }

    #[inline]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn build(self) -> Result<MpeEngine> {
        MpeEngine::new(self.config)
    }
}
