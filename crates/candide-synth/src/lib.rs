//! Voice side of the Candide core.
//!
//! A fixed [`VoicePool`] hands out slots per note, [`ControllerTracker`]
//! merges member-channel and master-channel expression into each voice,
//! [`Lifecycle`] turns state transitions into [`SynthBackend`] calls, and
//! [`MappingBackend`] shapes expression into synthesis parameters for the
//! selected [`Instrument`].
//!
//! ```
//! use candide_midi::ZoneId;
//! use candide_synth::{
//!     Lifecycle, ReleaseMode, VoiceCommand, VoicePool, DEFAULT_RELEASE_GRACE,
//! };
//!
//! let mut pool = VoicePool::new(4);
//! let mut lifecycle = Lifecycle::new(4, ReleaseMode::GracePeriod, DEFAULT_RELEASE_GRACE);
//! let mut backend: Vec<VoiceCommand> = Vec::new();
//!
//! let voice = pool.on_note_on(1, 60, 100, ZoneId::Lower).unwrap().voice();
//! lifecycle.activate(&mut pool, voice, &mut backend);
//! assert!(matches!(backend[0], VoiceCommand::Allocate { note: 60, .. }));
//! ```

pub mod error;
pub use error::{Error, Result};

mod voice;
pub use voice::{NoteOnOutcome, Steal, Voice, VoiceIndex, VoicePool, VoiceState};

mod expression;
pub use expression::{
    ControllerThresholds, ControllerTracker, Dimension, Expression, Overrides, ResetPolicy,
    Updates, VoiceUpdate,
};

mod lifecycle;
pub use lifecycle::{Expired, Lifecycle, ReleaseMode, DEFAULT_RELEASE_GRACE};

pub mod backend;
pub use backend::{
    voice_command_channel, voice_command_channel_with_capacity, SynthBackend, VoiceCommand,
    VoiceCommandConsumer, VoiceCommandProducer,
};

mod mapping;
pub use mapping::{
    Curve, MappingBackend, ParameterMap, Route, Source, Target, DEFAULT_PITCH_SPAN,
    MAX_INLINE_ROUTES,
};

mod instrument;
pub use instrument::Instrument;
