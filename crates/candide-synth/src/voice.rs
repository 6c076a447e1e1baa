//! Fixed-capacity voice pool with zone-aware stealing.
//!
//! Slot selection for a new note, in order:
//! - a Free slot (lowest index)
//! - the Releasing slot released longest ago
//! - the Active slot with the oldest `allocation_time` in the note's own zone
//!
//! A zone never steals from another zone. All methods are RT-safe: the pool
//! is allocated once and only indexed afterwards.

use std::fmt;

use candide_midi::{MidiChannel, ZoneId};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::expression::{Expression, Overrides};

/// Position of a voice in the pool. Stable for the pool's lifetime.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct VoiceIndex(pub usize);

impl VoiceIndex {
    #[inline]
    pub fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for VoiceIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// State of a single voice slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum VoiceState {
    /// Available for allocation
    #[default]
    Free,
    /// Claimed by a note-on, allocate event not yet emitted
    Allocating,
    /// Sounding, receiving controller updates
    Active,
    /// Release emitted, waiting for acknowledgement or grace expiry
    Releasing,
}

/// One voice slot.
#[derive(Debug, Clone, PartialEq)]
pub struct Voice {
    pub state: VoiceState,
    /// MIDI note number (0-127)
    pub note: u8,
    pub channel: MidiChannel,
    pub zone: ZoneId,
    pub velocity_on: u8,
    pub velocity_off: u8,
    /// Current effective pitch (semitones), pressure and timbre
    pub expression: Expression,
    /// Dimensions that received a per-note value since allocation
    pub overrides: Overrides,
    /// Monotonic allocation counter; lower is older
    pub allocation_time: u64,
    release_time: u64,
}

impl Default for Voice {
    fn default() -> Self {
        Self {
            state: VoiceState::Free,
            note: 0,
            channel: 0,
            zone: ZoneId::Lower,
            velocity_on: 0,
            velocity_off: 0,
            expression: Expression::default(),
            overrides: Overrides::default(),
            allocation_time: 0,
            release_time: 0,
        }
    }
}

impl Voice {
    #[inline]
    pub fn is_free(&self) -> bool {
        self.state == VoiceState::Free
    }

    /// Allocating or Active.
    #[inline]
    pub fn is_held(&self) -> bool {
        matches!(self.state, VoiceState::Allocating | VoiceState::Active)
    }

    #[inline]
    pub fn is_sounding(&self) -> bool {
        self.state != VoiceState::Free
    }
}

/// The Active voice that was cut to make room for a new note.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Steal {
    pub voice: VoiceIndex,
    pub note: u8,
    pub channel: MidiChannel,
    pub zone: ZoneId,
    pub allocation_time: u64,
}

/// Where a note-on found its slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoteOnOutcome {
    /// Slot was Free
    Allocated { voice: VoiceIndex },
    /// Slot was still Releasing; its release was already emitted
    Reclaimed { voice: VoiceIndex },
    /// An Active voice in the same zone was cut
    Stolen { voice: VoiceIndex, steal: Steal },
}

impl NoteOnOutcome {
    #[inline]
    pub fn voice(&self) -> VoiceIndex {
        match *self {
            NoteOnOutcome::Allocated { voice }
            | NoteOnOutcome::Reclaimed { voice }
            | NoteOnOutcome::Stolen { voice, .. } => voice,
        }
    }

    #[inline]
    pub fn steal(&self) -> Option<&Steal> {
        match self {
            NoteOnOutcome::Stolen { steal, .. } => Some(steal),
            _ => None,
        }
    }
}

/// Flat, fixed-capacity array of voices, addressed by [`VoiceIndex`].
#[derive(Debug, Clone)]
pub struct VoicePool {
    voices: Vec<Voice>,
    allocation_clock: u64,
    release_clock: u64,
}

impl VoicePool {
    pub fn new(capacity: usize) -> Self {
        Self {
            voices: vec![Voice::default(); capacity],
            allocation_clock: 0,
            release_clock: 0,
        }
    }

    /// Like [`VoicePool::new`] but rejects an empty pool.
    pub fn try_new(capacity: usize) -> Result<Self> {
        if capacity == 0 {
            return Err(Error::InvalidConfig(
                "voice pool needs at least one voice".to_string(),
            ));
        }
        Ok(Self::new(capacity))
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.voices.len()
    }

    #[inline]
    pub fn voice(&self, index: VoiceIndex) -> Option<&Voice> {
        self.voices.get(index.0)
    }

    /// Checked lookup for indices that come from outside the pool.
    pub fn get(&self, index: VoiceIndex) -> Result<&Voice> {
        self.voices
            .get(index.0)
            .ok_or(Error::VoiceOutOfRange(index, self.voices.len()))
    }

    #[inline]
    pub(crate) fn voice_mut(&mut self, index: VoiceIndex) -> Option<&mut Voice> {
        self.voices.get_mut(index.0)
    }

    #[inline]
    pub fn voices(&self) -> &[Voice] {
        &self.voices
    }

    #[inline]
    pub(crate) fn voices_mut(&mut self) -> &mut [Voice] {
        &mut self.voices
    }

    /// Allocating + Active voices.
    pub fn active_count(&self) -> usize {
        self.voices.iter().filter(|v| v.is_held()).count()
    }

    pub fn free_count(&self) -> usize {
        self.voices.iter().filter(|v| v.is_free()).count()
    }

    pub fn count_in(&self, state: VoiceState) -> usize {
        self.voices.iter().filter(|v| v.state == state).count()
    }

    /// Indices of voices in `state`, lowest first.
    pub fn indices_in(&self, state: VoiceState) -> impl Iterator<Item = VoiceIndex> + '_ {
        self.voices
            .iter()
            .enumerate()
            .filter(move |(_, v)| v.state == state)
            .map(|(i, _)| VoiceIndex(i))
    }

    /// Active voices on `channel`.
    pub fn active_on_channel(
        &self,
        channel: MidiChannel,
    ) -> impl Iterator<Item = VoiceIndex> + '_ {
        self.voices
            .iter()
            .enumerate()
            .filter(move |(_, v)| v.state == VoiceState::Active && v.channel == channel)
            .map(|(i, _)| VoiceIndex(i))
    }

    /// Active voices belonging to `zone`.
    pub fn active_in_zone(&self, zone: ZoneId) -> impl Iterator<Item = VoiceIndex> + '_ {
        self.voices
            .iter()
            .enumerate()
            .filter(move |(_, v)| v.state == VoiceState::Active && v.zone == zone)
            .map(|(i, _)| VoiceIndex(i))
    }

    /// Claim a slot for a new note; the slot is left in `Allocating`.
    ///
    /// Returns `None` only when every slot is held by another zone.
    pub fn on_note_on(
        &mut self,
        channel: MidiChannel,
        note: u8,
        velocity: u8,
        zone: ZoneId,
    ) -> Option<NoteOnOutcome> {
        let outcome = if let Some(slot) = self.find_free_slot() {
            NoteOnOutcome::Allocated {
                voice: VoiceIndex(slot),
            }
        } else if let Some(slot) = self.find_slot_to_reclaim() {
            NoteOnOutcome::Reclaimed {
                voice: VoiceIndex(slot),
            }
        } else if let Some(slot) = self.find_slot_to_steal(zone) {
            let victim = &self.voices[slot];
            let steal = Steal {
                voice: VoiceIndex(slot),
                note: victim.note,
                channel: victim.channel,
                zone: victim.zone,
                allocation_time: victim.allocation_time,
            };
            tracing::warn!(
                "Voice pool exhausted: stealing voice {} (note {} ch {}) for note {} ch {}",
                slot,
                steal.note,
                steal.channel,
                note,
                channel
            );
            NoteOnOutcome::Stolen {
                voice: VoiceIndex(slot),
                steal,
            }
        } else {
            tracing::warn!(
                "No voice available in {:?} zone for note {} ch {}",
                zone,
                note,
                channel
            );
            return None;
        };

        self.allocation_clock += 1;
        self.voices[outcome.voice().0] = Voice {
            state: VoiceState::Allocating,
            note,
            channel,
            zone,
            velocity_on: velocity,
            velocity_off: 0,
            expression: Expression::default(),
            overrides: Overrides::default(),
            allocation_time: self.allocation_clock,
            release_time: 0,
        };
        Some(outcome)
    }

    /// Move the oldest Active voice playing `(channel, note)` to Releasing.
    ///
    /// No match is a stale note-off: logged and ignored.
    pub fn on_note_off(
        &mut self,
        channel: MidiChannel,
        note: u8,
        velocity: u8,
    ) -> Option<VoiceIndex> {
        let slot = self
            .voices
            .iter()
            .enumerate()
            .filter(|(_, v)| v.state == VoiceState::Active && v.channel == channel && v.note == note)
            .min_by_key(|(_, v)| v.allocation_time)
            .map(|(i, _)| i);

        let Some(slot) = slot else {
            tracing::debug!("Stale note-off: note {} ch {}", note, channel);
            return None;
        };

        self.mark_releasing(VoiceIndex(slot), velocity);
        Some(VoiceIndex(slot))
    }

    pub(crate) fn mark_releasing(&mut self, index: VoiceIndex, velocity: u8) {
        self.release_clock += 1;
        let clock = self.release_clock;
        if let Some(voice) = self.voice_mut(index) {
            voice.state = VoiceState::Releasing;
            voice.velocity_off = velocity;
            voice.release_time = clock;
        }
    }

    pub(crate) fn set_state(&mut self, index: VoiceIndex, state: VoiceState) {
        if let Some(voice) = self.voice_mut(index) {
            voice.state = state;
        }
    }

    /// Return every slot to Free without emitting anything.
    pub fn reset(&mut self) {
        self.voices.fill(Voice::default());
        self.allocation_clock = 0;
        self.release_clock = 0;
    }

    fn find_free_slot(&self) -> Option<usize> {
        self.voices.iter().position(Voice::is_free)
    }

    fn find_slot_to_reclaim(&self) -> Option<usize> {
        self.voices
            .iter()
            .enumerate()
            .filter(|(_, v)| v.state == VoiceState::Releasing)
            .min_by_key(|(_, v)| v.release_time)
            .map(|(i, _)| i)
    }

    /// Allocating slots are never candidates.
    fn find_slot_to_steal(&self, zone: ZoneId) -> Option<usize> {
        self.voices
            .iter()
            .enumerate()
            .filter(|(_, v)| v.state == VoiceState::Active && v.zone == zone)
            .min_by_key(|(i, v)| (v.allocation_time, *i))
            .map(|(i, _)| i)
    }
}
