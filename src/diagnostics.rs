//! Runtime conditions worth surfacing to the host.
//!
//! None of these are errors: the engine already resolved each one (stole a
//! voice, dropped a note, force-freed a slot, kept the old zones) and keeps
//! running. They are queued so a host can show or count them.

use std::collections::VecDeque;

use candide_midi::{MidiChannel, ZoneId};
use candide_synth::VoiceIndex;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Diagnostic {
    /// An Active voice was cut to make room.
    VoiceStolen {
        voice: VoiceIndex,
        stolen_note: u8,
        stolen_channel: MidiChannel,
        note: u8,
        channel: MidiChannel,
    },
    /// Every slot was held by another zone; the note was not played.
    NoteDropped {
        zone: ZoneId,
        note: u8,
        channel: MidiChannel,
    },
    /// A release was never acknowledged and the slot was force-freed.
    UnacknowledgedRelease { voice: VoiceIndex },
    /// A Zone-Change from the wire was invalid; previous zones kept.
    ZoneRejected {
        zone: ZoneId,
        member_count: u8,
        reason: String,
    },
}

/// Bounded FIFO; the oldest entry goes when full.
#[derive(Debug, Clone)]
pub(crate) struct DiagnosticLog {
    entries: VecDeque<Diagnostic>,
    capacity: usize,
    discarded: u64,
}

impl DiagnosticLog {
    pub(crate) fn new(capacity: usize) -> Self {
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity,
            discarded: 0,
        }
    }

    pub(crate) fn push(&mut self, diagnostic: Diagnostic) {
        if self.capacity == 0 {
            self.discarded += 1;
            return;
        }
        if self.entries.len() == self.capacity {
            self.entries.pop_front();
            self.discarded += 1;
        }
        self.entries.push_back(diagnostic);
    }

    pub(crate) fn drain(&mut self) -> impl Iterator<Item = Diagnostic> + '_ {
        self.entries.drain(..)
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    pub(crate) fn discarded(&self) -> u64 {
        self.discarded
    }
}
