//! Byte-stream MIDI parser with running status.
//!
//! Never blocks and never fails: malformed input is counted and dropped,
//! and parsing resumes at the next status byte. At most one channel message
//! is in flight at any time.

use crate::event::{
    ControllerValue, MpeEvent, CC_TIMBRE, CC_TIMBRE_LSB, IMPLICIT_NOTE_OFF_VELOCITY,
};
use crate::rpn::{RpnAssembler, RpnOutcome};

const SYSEX_START: u8 = 0xF0;
const SYSEX_END: u8 = 0xF7;
const REALTIME_FIRST: u8 = 0xF8;

const CC_ALL_SOUND_OFF: u8 = 120;
const CC_RESET_ALL_CONTROLLERS: u8 = 121;
const CC_ALL_NOTES_OFF: u8 = 123;

/// Counters for what the parser saw and threw away.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ParserStats {
    /// Events handed to the caller.
    pub events: u64,
    /// Partial messages cut short by a new status byte, plus data bytes
    /// that arrived with no status to attach to.
    pub malformed: u64,
    /// SysEx, System Common and Real-Time bytes skipped.
    pub skipped: u64,
}

/// Incremental MIDI 1.0 parser producing [`MpeEvent`]s.
#[derive(Debug, Clone, Default)]
pub struct MidiParser {
    running_status: Option<u8>,
    data: [u8; 2],
    len: usize,
    in_sysex: bool,
    /// Data bytes still owed to a System Common message.
    common_remaining: u8,
    rpn: RpnAssembler,
    /// Last CC 74 per channel, for pairing with CC 106
    timbre_msb: [Option<u8>; 16],
    stats: ParserStats,
}

impl MidiParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one byte; returns an event when it completes a message.
    pub fn push(&mut self, byte: u8) -> Option<MpeEvent> {
        if byte >= REALTIME_FIRST {
            self.stats.skipped += 1;
            return None;
        }

        if byte & 0x80 != 0 {
            self.status_byte(byte);
            return None;
        }

        if self.in_sysex {
            self.stats.skipped += 1;
            return None;
        }
        if self.common_remaining > 0 {
            self.common_remaining -= 1;
            self.stats.skipped += 1;
            return None;
        }

        let Some(status) = self.running_status else {
            self.stats.malformed += 1;
            tracing::trace!("Discarding data byte {:#04x} with no running status", byte);
            return None;
        };

        self.data[self.len] = byte;
        self.len += 1;
        if self.len < data_len(status) {
            return None;
        }
        self.len = 0;

        let event = self.decode(status);
        if event.is_some() {
            self.stats.events += 1;
        }
        event
    }

    /// Lazily parse `bytes`. Dropping the iterator early keeps all state, so
    /// the next call picks up mid-message where this one stopped.
    pub fn parse<I>(&mut self, bytes: I) -> Events<'_, I::IntoIter>
    where
        I: IntoIterator<Item = u8>,
    {
        Events {
            parser: self,
            bytes: bytes.into_iter(),
        }
    }

    #[inline]
    pub fn stats(&self) -> ParserStats {
        self.stats
    }

    #[inline]
    pub fn running_status(&self) -> Option<u8> {
        self.running_status
    }

    /// Forget running status, any partial message and RPN selections.
    pub fn reset(&mut self) {
        self.running_status = None;
        self.len = 0;
        self.in_sysex = false;
        self.common_remaining = 0;
        self.rpn.reset();
        self.timbre_msb = [None; 16];
    }

    fn status_byte(&mut self, byte: u8) {
        if self.len > 0 {
            self.stats.malformed += 1;
            tracing::trace!(
                "Status {:#04x} cut short a partial message ({} data bytes)",
                byte,
                self.len
            );
            self.len = 0;
        }

        match byte {
            SYSEX_START => {
                self.in_sysex = true;
                self.common_remaining = 0;
                self.stats.skipped += 1;
            }
            SYSEX_END => {
                self.in_sysex = false;
                self.stats.skipped += 1;
            }
            0xF1..=0xF6 => {
                self.in_sysex = false;
                self.running_status = None;
                self.common_remaining = match byte {
                    0xF1 | 0xF3 => 1,
                    0xF2 => 2,
                    _ => 0,
                };
                self.stats.skipped += 1;
            }
            _ => {
                self.in_sysex = false;
                self.common_remaining = 0;
                self.running_status = Some(byte);
            }
        }
    }

    fn decode(&mut self, status: u8) -> Option<MpeEvent> {
        let channel = status & 0x0F;
        let [d0, d1] = self.data;
        match status & 0xF0 {
            0x80 => Some(MpeEvent::NoteOff {
                channel,
                note: d0,
                velocity: d1,
            }),
            0x90 if d1 == 0 => Some(MpeEvent::NoteOff {
                channel,
                note: d0,
                velocity: IMPLICIT_NOTE_OFF_VELOCITY,
            }),
            0x90 => Some(MpeEvent::NoteOn {
                channel,
                note: d0,
                velocity: d1,
            }),
            0xB0 => match self.rpn.handle_cc(channel, d0, d1) {
                RpnOutcome::Event(event) => Some(event),
                RpnOutcome::Consumed => None,
                RpnOutcome::PassThrough => match d0 {
                    CC_ALL_SOUND_OFF | CC_ALL_NOTES_OFF => Some(MpeEvent::AllNotesOff),
                    CC_RESET_ALL_CONTROLLERS => Some(MpeEvent::ResetControllers { channel }),
                    CC_TIMBRE => {
                        self.timbre_msb[channel as usize] = Some(d1);
                        Some(MpeEvent::Timbre {
                            channel,
                            value: ControllerValue::Coarse(d1),
                        })
                    }
                    CC_TIMBRE_LSB => match self.timbre_msb[channel as usize] {
                        Some(msb) => Some(MpeEvent::Timbre {
                            channel,
                            value: ControllerValue::Fine(((msb as u16) << 7) | d1 as u16),
                        }),
                        None => {
                            tracing::trace!("Timbre LSB on ch {} with no MSB", channel);
                            None
                        }
                    },
                    // Remaining channel mode messages carry no MPE meaning.
                    122..=127 => None,
                    _ => Some(MpeEvent::ControlChange {
                        channel,
                        controller: d0,
                        value: d1,
                    }),
                },
            },
            0xD0 => Some(MpeEvent::ChannelPressure {
                channel,
                value: ControllerValue::Coarse(d0),
            }),
            0xE0 => Some(MpeEvent::PitchBend {
                channel,
                value: (d0 as u16) | ((d1 as u16) << 7),
            }),
            // Poly pressure and program change
            _ => None,
        }
    }
}

/// Data bytes following a channel-voice status.
#[inline]
fn data_len(status: u8) -> usize {
    match status & 0xF0 {
        0xC0 | 0xD0 => 1,
        _ => 2,
    }
}

/// Lazy event iterator returned by [`MidiParser::parse`].
pub struct Events<'p, I> {
    parser: &'p mut MidiParser,
    bytes: I,
}

impl<I: Iterator<Item = u8>> Iterator for Events<'_, I> {
    type Item = MpeEvent;

    fn next(&mut self) -> Option<MpeEvent> {
        for byte in self.bytes.by_ref() {
            if let Some(event) = self.parser.push(byte) {
                return Some(event);
            }
        }
        None
    }
}
