//! Test helpers and fixtures for Candide integration tests
//!
//! Every test drives a real [`MpeEngine`] from MIDI bytes into a recording
//! backend (`Vec<VoiceCommand>`), with the clock advanced by hand.
//!
//! ## Tolerance Levels
//!
//! Use the appropriate tolerance from [`tolerances`] module:
//! - `FLOAT_EPSILON` (1e-6): Normalized pressure and timbre
//! - `BEND_EPSILON` (0.01): Semitone values from 14-bit bend

#![allow(dead_code)]

pub mod tolerances;

use std::time::{Duration, Instant};

use candide::prelude::*;

/// Default pool size for tests.
pub const TEST_VOICES: usize = 16;

/// Engine with default zones (lower, 14 members) and `voices` slots.
pub fn test_engine(voices: usize) -> MpeEngine {
    MpeEngine::builder()
        .voice_capacity(voices)
        .build()
        .expect("Failed to create test engine")
}

/// Engine with both zones enabled, 7 members each.
pub fn dual_zone_engine(voices: usize) -> MpeEngine {
    MpeEngine::builder()
        .voice_capacity(voices)
        .zones(7, 7)
        .build()
        .expect("Failed to create dual-zone engine")
}

/// Install a subscriber so `RUST_LOG`-style output shows up with `--nocapture`.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::DEBUG)
        .try_init();
}

/// Encode events as MIDI bytes, explicit status on each.
pub fn bytes(events: &[MpeEvent]) -> Vec<u8> {
    events.iter().flat_map(MpeEvent::to_bytes).collect()
}

/// Recording backend plus a manual clock.
pub struct Rig {
    pub engine: MpeEngine,
    pub out: Vec<VoiceCommand>,
    pub now: Instant,
}

impl Rig {
    pub fn new(engine: MpeEngine) -> Self {
        let mut rig = Self {
            engine,
            out: Vec::new(),
            now: Instant::now(),
        };
        rig.engine.tick(rig.now, &mut rig.out);
        rig
    }

    pub fn send(&mut self, events: &[MpeEvent]) -> &mut Self {
        let data = bytes(events);
        self.engine.process_bytes(self.now, &data, &mut self.out);
        self
    }

    pub fn send_bytes(&mut self, data: &[u8]) -> &mut Self {
        self.engine.process_bytes(self.now, data, &mut self.out);
        self
    }

    /// Move the clock without ticking; later sends are stamped with it.
    pub fn skip(&mut self, by: Duration) -> &mut Self {
        self.now += by;
        self
    }

    pub fn advance(&mut self, by: Duration) -> &mut Self {
        self.now += by;
        self.engine.tick(self.now, &mut self.out);
        self
    }

    /// Take everything the backend saw since the last call.
    pub fn take(&mut self) -> Vec<VoiceCommand> {
        std::mem::take(&mut self.out)
    }
}

/// Short names of commands, for asserting order.
pub fn kinds(commands: &[VoiceCommand]) -> Vec<&'static str> {
    commands
        .iter()
        .map(|c| match c {
            VoiceCommand::Allocate { .. } => "allocate",
            VoiceCommand::Update { .. } => "update",
            VoiceCommand::Release { cut: true, .. } => "cut",
            VoiceCommand::Release { .. } => "release",
            VoiceCommand::Parameter { .. } => "parameter",
            VoiceCommand::InstrumentChanged(_) => "instrument",
            VoiceCommand::VolumeChanged(_) => "volume",
        })
        .collect()
}

/// The only update in `commands`; panics otherwise.
pub fn single_update(commands: &[VoiceCommand]) -> (VoiceIndex, VoiceUpdate) {
    let updates: Vec<_> = commands
        .iter()
        .filter_map(|c| match *c {
            VoiceCommand::Update { voice, update } => Some((voice, update)),
            _ => None,
        })
        .collect();
    assert_eq!(updates.len(), 1, "expected one update in {commands:?}");
    updates[0]
}
