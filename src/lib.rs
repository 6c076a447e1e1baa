//! # Candide - MPE Processing Core
//!
//! Turns a MIDI byte stream into per-voice synthesis commands.
//!
//! ## Architecture
//!
//! Candide is an umbrella crate that coordinates:
//! - **candide-midi** - Byte parser, RPN assembly, MPE zone layout
//! - **candide-synth** - Voice pool, per-note expression, lifecycle, parameter mapping
//!
//! [`MpeEngine`] owns one of each and runs them in a single cooperative
//! loop. Audio rendering happens elsewhere, behind [`SynthBackend`].
//!
//! ## Quick Start
//!
//! ```
//! use candide::prelude::*;
//! use std::time::Instant;
//!
//! let mut engine = MpeEngine::builder().voice_capacity(8).build().unwrap();
//! let mut midi = engine.connect_midi();
//! let mut backend: Vec<VoiceCommand> = Vec::new();
//!
//! midi.push_slice(&[0x92, 64, 90]);
//! engine.tick(Instant::now(), &mut backend);
//! assert!(matches!(backend[0], VoiceCommand::Allocate { note: 64, .. }));
//! ```

pub use candide_midi as midi;
pub use candide_synth as synth;

mod builder;
mod config;
mod diagnostics;
mod engine;
mod error;
pub mod hardware;

pub use builder::MpeEngineBuilder;
pub use config::EngineConfig;
pub use diagnostics::Diagnostic;
pub use engine::MpeEngine;
pub use error::{Error, Result};
pub use hardware::{hardware_channel, EncoderTracker, HardwareEvent, VolumeFilter};

pub use candide_midi::{
    midi_byte_channel, MidiByteConsumer, MidiByteProducer, MidiParser, MpeEvent, ParserStats,
    Zone, ZoneId, ZoneLayout, Zones,
};
pub use candide_synth::{
    voice_command_channel, Instrument, MappingBackend, ReleaseMode, ResetPolicy, SynthBackend,
    VoiceCommand, VoiceIndex, VoiceState, VoiceUpdate,
};

pub mod prelude {
    //! Everything a host loop usually needs.

    pub use crate::{
        hardware_channel, midi_byte_channel, voice_command_channel, Diagnostic, EncoderTracker,
        EngineConfig, Error, HardwareEvent, Instrument, MappingBackend, MpeEngine,
        MpeEngineBuilder, MpeEvent, ReleaseMode, ResetPolicy, Result, SynthBackend, VoiceCommand,
        VoiceIndex, VoiceState, VoiceUpdate, VolumeFilter, ZoneId,
    };
}
