//! Decoded MPE events - the single interchange type between the parser and
//! the rest of the pipeline.

use serde::{Deserialize, Serialize};

use crate::zone::ZoneId;

/// MIDI channel (0-15, where 0 = channel 1)
pub type MidiChannel = u8;

/// Release velocity used when a note-on with velocity 0 stands in for a note-off.
pub const IMPLICIT_NOTE_OFF_VELOCITY: u8 = 64;

/// CC number carrying MPE timbre.
pub const CC_TIMBRE: u8 = 74;

/// LSB partner of [`CC_TIMBRE`] for 14-bit timbre.
pub const CC_TIMBRE_LSB: u8 = CC_TIMBRE + 32;

/// A controller value at the resolution it arrived with.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ControllerValue {
    /// 7-bit value (0-127)
    Coarse(u8),
    /// 14-bit value (0-16383)
    Fine(u16),
}

impl ControllerValue {
    /// Linear map onto `0.0..=1.0`.
    #[inline]
    pub fn normalized(self) -> f32 {
        match self {
            ControllerValue::Coarse(v) => crate::scale::unit_from_7bit(v),
            ControllerValue::Fine(v) => crate::scale::unit_from_14bit(v),
        }
    }

    /// Value expressed in 14-bit steps, for resolution-independent comparison.
    #[inline]
    pub fn as_14bit(self) -> u16 {
        match self {
            ControllerValue::Coarse(v) => (v.min(127) as u16) << 7,
            ControllerValue::Fine(v) => v.min(16383),
        }
    }
}

/// A decoded, validated message.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum MpeEvent {
    NoteOn {
        channel: MidiChannel,
        note: u8,
        velocity: u8,
    },
    NoteOff {
        channel: MidiChannel,
        note: u8,
        velocity: u8,
    },
    /// 14-bit bend, 8192 = center.
    PitchBend { channel: MidiChannel, value: u16 },
    ChannelPressure {
        channel: MidiChannel,
        value: ControllerValue,
    },
    /// CC 74, or CC 74 + CC 106 paired into 14 bits.
    Timbre {
        channel: MidiChannel,
        value: ControllerValue,
    },
    /// Any CC not consumed by RPN assembly, timbre or channel-mode handling.
    ControlChange {
        channel: MidiChannel,
        controller: u8,
        value: u8,
    },
    /// RPN 6 (MPE Configuration Message) on a zone's master channel.
    ZoneChange { zone: ZoneId, member_count: u8 },
    /// RPN 0 (pitch bend sensitivity).
    PitchBendRange {
        channel: MidiChannel,
        semitones: u8,
        cents: u8,
    },
    /// CC 121.
    ResetControllers { channel: MidiChannel },
    /// CC 120 / CC 123 on any channel.
    AllNotesOff,
}

impl MpeEvent {
    #[inline]
    pub fn note_on(channel: MidiChannel, note: u8, velocity: u8) -> Self {
        MpeEvent::NoteOn {
            channel,
            note,
            velocity,
        }
    }

    #[inline]
    pub fn note_off(channel: MidiChannel, note: u8, velocity: u8) -> Self {
        MpeEvent::NoteOff {
            channel,
            note,
            velocity,
        }
    }

    #[inline]
    pub fn pitch_bend(channel: MidiChannel, value: u16) -> Self {
        MpeEvent::PitchBend {
            channel,
            value: value.min(16383),
        }
    }

    #[inline]
    pub fn pressure(channel: MidiChannel, value: u8) -> Self {
        MpeEvent::ChannelPressure {
            channel,
            value: ControllerValue::Coarse(value),
        }
    }

    #[inline]
    pub fn timbre(channel: MidiChannel, value: u8) -> Self {
        MpeEvent::Timbre {
            channel,
            value: ControllerValue::Coarse(value),
        }
    }

    /// 14-bit timbre (0-16383).
    #[inline]
    pub fn timbre_fine(channel: MidiChannel, value: u16) -> Self {
        MpeEvent::Timbre {
            channel,
            value: ControllerValue::Fine(value.min(16383)),
        }
    }

    /// Channel the event arrived on; `None` for zone-level and global events.
    #[inline]
    pub fn channel(&self) -> Option<MidiChannel> {
        match *self {
            MpeEvent::NoteOn { channel, .. }
            | MpeEvent::NoteOff { channel, .. }
            | MpeEvent::PitchBend { channel, .. }
            | MpeEvent::ChannelPressure { channel, .. }
            | MpeEvent::Timbre { channel, .. }
            | MpeEvent::ControlChange { channel, .. }
            | MpeEvent::PitchBendRange { channel, .. }
            | MpeEvent::ResetControllers { channel } => Some(channel),
            MpeEvent::ZoneChange { .. } | MpeEvent::AllNotesOff => None,
        }
    }

    #[inline]
    pub fn is_note_on(&self) -> bool {
        matches!(self, MpeEvent::NoteOn { .. })
    }

    #[inline]
    pub fn is_note_off(&self) -> bool {
        matches!(self, MpeEvent::NoteOff { .. })
    }

    /// Encode as MIDI 1.0 bytes with explicit status on every message.
    ///
    /// RPN events expand to the full select + data-entry sequence. 14-bit
    /// timbre becomes CC 74 followed by CC 106. 14-bit pressure is truncated
    /// to its upper 7 bits, MIDI 1.0 has no wider form.
    pub fn to_bytes(&self) -> Vec<u8> {
        match *self {
            MpeEvent::NoteOn {
                channel,
                note,
                velocity,
            } => vec![0x90 | (channel & 0x0F), note & 0x7F, velocity & 0x7F],
            MpeEvent::NoteOff {
                channel,
                note,
                velocity,
            } => vec![0x80 | (channel & 0x0F), note & 0x7F, velocity & 0x7F],
            MpeEvent::PitchBend { channel, value } => vec![
                0xE0 | (channel & 0x0F),
                (value & 0x7F) as u8,
                ((value >> 7) & 0x7F) as u8,
            ],
            MpeEvent::ChannelPressure { channel, value } => {
                vec![0xD0 | (channel & 0x0F), (value.as_14bit() >> 7) as u8]
            }
            MpeEvent::Timbre {
                channel,
                value: ControllerValue::Coarse(value),
            } => vec![0xB0 | (channel & 0x0F), CC_TIMBRE, value & 0x7F],
            MpeEvent::Timbre {
                channel,
                value: ControllerValue::Fine(value),
            } => {
                let status = 0xB0 | (channel & 0x0F);
                vec![
                    status,
                    CC_TIMBRE,
                    ((value >> 7) & 0x7F) as u8,
                    status,
                    CC_TIMBRE_LSB,
                    (value & 0x7F) as u8,
                ]
            }
            MpeEvent::ControlChange {
                channel,
                controller,
                value,
            } => vec![0xB0 | (channel & 0x0F), controller & 0x7F, value & 0x7F],
            MpeEvent::ZoneChange { zone, member_count } => {
                rpn_bytes(zone.master_channel(), 6, member_count, None)
            }
            MpeEvent::PitchBendRange {
                channel,
                semitones,
                cents,
            } => rpn_bytes(channel, 0, semitones, Some(cents)),
            MpeEvent::ResetControllers { channel } => vec![0xB0 | (channel & 0x0F), 121, 0],
            MpeEvent::AllNotesOff => vec![0xB0, 123, 0],
        }
    }
}

fn rpn_bytes(channel: MidiChannel, parameter: u8, msb: u8, lsb: Option<u8>) -> Vec<u8> {
    let status = 0xB0 | (channel & 0x0F);
    let mut bytes = vec![
        status,
        101,
        0,
        status,
        100,
        parameter & 0x7F,
        status,
        6,
        msb & 0x7F,
    ];
    if let Some(lsb) = lsb {
        bytes.extend_from_slice(&[status, 38, lsb & 0x7F]);
    }
    bytes
}
