//! MIDI/MPE protocol side of the Candide core.
//!
//! Turns a raw MIDI 1.0 byte stream into [`MpeEvent`]s and keeps the MPE zone
//! layout that decides which channel belongs to which zone. Nothing in this
//! crate allocates voices or knows about synthesis.
//!
//! ```
//! use candide_midi::{MidiParser, MpeEvent, ZoneId, ZoneManager};
//!
//! let mut parser = MidiParser::new();
//! let mut zones = ZoneManager::new();
//!
//! // RPN 6 on channel 1: lower zone with 4 member channels
//! let bytes = [0xB0, 101, 0, 100, 6, 6, 4];
//! for event in parser.parse(bytes) {
//!     if let MpeEvent::ZoneChange { zone, member_count } = event {
//!         zones.configure(zone, zone.master_channel(), member_count).unwrap();
//!     }
//! }
//! assert_eq!(zones.zone(ZoneId::Lower).unwrap().member_count, 4);
//! ```

pub mod error;
pub use error::{Error, Result};

mod event;
pub use event::{
    ControllerValue, MidiChannel, MpeEvent, CC_TIMBRE, CC_TIMBRE_LSB, IMPLICIT_NOTE_OFF_VELOCITY,
};

mod parser;
pub use parser::{Events, MidiParser, ParserStats};

mod rpn;

pub mod scale;
pub use scale::{bend_to_semitones, unit_from_14bit, unit_from_7bit};

mod zone;
pub use zone::{
    ChannelRole, ChannelRoute, Zone, ZoneId, ZoneLayout, ZoneManager, Zones,
    DEFAULT_MASTER_BEND_RANGE, DEFAULT_MEMBER_BEND_RANGE, MAX_MEMBER_CHANNELS,
};

pub mod input_buffer;
pub use input_buffer::{
    midi_byte_channel, midi_byte_channel_with_capacity, MidiByteConsumer, MidiByteProducer,
};
