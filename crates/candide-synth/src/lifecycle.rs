//! Voice lifecycle: `Free -> Allocating -> Active -> Releasing -> Free`.
//!
//! The pool decides *which* slot a note gets; this state machine decides
//! what the backend hears about it and when a released slot becomes free
//! again. A Releasing voice frees on acknowledgement or when its grace
//! period runs out, whichever comes first. A leaked slot would shrink
//! polyphony for good, so expiry always frees.

use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

use crate::backend::SynthBackend;
use crate::expression::{Updates, VoiceUpdate};
use crate::voice::{Steal, VoiceIndex, VoicePool, VoiceState};

/// Matches the cleanup window of the reference firmware.
pub const DEFAULT_RELEASE_GRACE: Duration = Duration::from_millis(500);

/// How Releasing voices get back to Free.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ReleaseMode {
    /// No acknowledgement channel; the grace period is the normal path.
    #[default]
    GracePeriod,
    /// The backend acknowledges releases; expiry means it never did.
    Acknowledged,
}

/// Voices force-freed in one expiry pass.
pub type Expired = SmallVec<[VoiceIndex; 4]>;

#[derive(Debug, Clone)]
pub struct Lifecycle {
    mode: ReleaseMode,
    grace: Duration,
    deadlines: Vec<Option<Instant>>,
}

impl Lifecycle {
    pub fn new(capacity: usize, mode: ReleaseMode, grace: Duration) -> Self {
        Self {
            mode,
            grace,
            deadlines: vec![None; capacity],
        }
    }

    #[inline]
    pub fn mode(&self) -> ReleaseMode {
        self.mode
    }

    #[inline]
    pub fn grace(&self) -> Duration {
        self.grace
    }

    /// When a Releasing voice will be freed if nothing acknowledges it.
    #[inline]
    pub fn deadline(&self, voice: VoiceIndex) -> Option<Instant> {
        self.deadlines.get(voice.0).copied().flatten()
    }

    /// Allocating -> Active. Emits `allocate` with the voice's current
    /// expression as the initial snapshot.
    pub fn activate<B: SynthBackend + ?Sized>(
        &mut self,
        pool: &mut VoicePool,
        voice: VoiceIndex,
        backend: &mut B,
    ) -> bool {
        let Some(slot) = pool.voice(voice) else {
            return false;
        };
        if slot.state != VoiceState::Allocating {
            return false;
        }
        self.clear_deadline(voice);
        backend.allocate(voice, slot.note, slot.velocity_on, slot.expression);
        tracing::debug!(
            "Voice {} active: note {} ch {} vel {}",
            voice,
            slot.note,
            slot.channel,
            slot.velocity_on
        );
        pool.set_state(voice, VoiceState::Active);
        true
    }

    /// Forward controller updates for Active voices.
    pub fn update<B: SynthBackend + ?Sized>(
        &self,
        pool: &VoicePool,
        updates: &Updates,
        backend: &mut B,
    ) -> usize {
        let mut sent = 0;
        for &(voice, update) in updates {
            if self.update_one(pool, voice, update, backend) {
                sent += 1;
            }
        }
        sent
    }

    fn update_one<B: SynthBackend + ?Sized>(
        &self,
        pool: &VoicePool,
        voice: VoiceIndex,
        update: VoiceUpdate,
        backend: &mut B,
    ) -> bool {
        let active = pool
            .voice(voice)
            .is_some_and(|v| v.state == VoiceState::Active);
        if !active || update.is_empty() {
            return false;
        }
        backend.update(voice, update);
        true
    }

    /// Emit `release` for a voice the pool just moved to Releasing and
    /// start its grace period.
    pub fn release<B: SynthBackend + ?Sized>(
        &mut self,
        pool: &VoicePool,
        voice: VoiceIndex,
        now: Instant,
        backend: &mut B,
    ) -> bool {
        let Some(slot) = pool.voice(voice) else {
            return false;
        };
        if slot.state != VoiceState::Releasing {
            return false;
        }
        backend.release(voice, slot.velocity_off, false);
        if let Some(deadline) = self.deadlines.get_mut(voice.0) {
            *deadline = Some(now + self.grace);
        }
        tracing::debug!("Voice {} releasing (vel {})", voice, slot.velocity_off);
        true
    }

    /// Cut the previous occupant of a stolen slot. Must be called before
    /// the new occupant is activated.
    pub fn cut<B: SynthBackend + ?Sized>(&mut self, steal: &Steal, backend: &mut B) {
        self.clear_deadline(steal.voice);
        backend.release(steal.voice, 0, true);
        tracing::debug!(
            "Voice {} cut: note {} ch {} stolen",
            steal.voice,
            steal.note,
            steal.channel
        );
    }

    /// Releasing -> Free on the backend's acknowledgement.
    ///
    /// Returns `false` (and changes nothing) if the voice was not Releasing,
    /// e.g. it was already reclaimed or expired.
    pub fn acknowledge(&mut self, pool: &mut VoicePool, voice: VoiceIndex) -> bool {
        let releasing = pool
            .voice(voice)
            .is_some_and(|v| v.state == VoiceState::Releasing);
        if !releasing {
            tracing::debug!("Ignoring acknowledgement for voice {} (not releasing)", voice);
            return false;
        }
        self.clear_deadline(voice);
        pool.set_state(voice, VoiceState::Free);
        true
    }

    /// Free every Releasing voice whose grace period ended at or before
    /// `now`. In [`ReleaseMode::Acknowledged`] each one is an unacknowledged
    /// release: logged at warn and returned. Otherwise nothing is returned.
    pub fn expire(&mut self, pool: &mut VoicePool, now: Instant) -> Expired {
        let mut unacknowledged = Expired::new();
        for i in 0..self.deadlines.len() {
            let voice = VoiceIndex(i);
            let Some(deadline) = self.deadlines[i] else {
                continue;
            };
            if deadline > now {
                continue;
            }
            self.deadlines[i] = None;

            let releasing = pool
                .voice(voice)
                .is_some_and(|v| v.state == VoiceState::Releasing);
            if !releasing {
                continue;
            }
            pool.set_state(voice, VoiceState::Free);

            match self.mode {
                ReleaseMode::GracePeriod => {
                    tracing::trace!("Voice {} freed after grace period", voice);
                }
                ReleaseMode::Acknowledged => {
                    tracing::warn!(
                        "Voice {} release not acknowledged within {:?}, force-freed",
                        voice,
                        self.grace
                    );
                    unacknowledged.push(voice);
                }
            }
        }
        unacknowledged
    }

    /// Cut one sounding voice and free it immediately.
    pub fn force_release<B: SynthBackend + ?Sized>(
        &mut self,
        pool: &mut VoicePool,
        voice: VoiceIndex,
        backend: &mut B,
    ) -> bool {
        let sounding = pool.voice(voice).is_some_and(|v| v.is_sounding());
        if !sounding {
            return false;
        }
        self.clear_deadline(voice);
        backend.release(voice, 0, true);
        pool.set_state(voice, VoiceState::Free);
        true
    }

    /// Cut every Active and Releasing voice, bypassing the grace period.
    /// Returns how many were cut.
    pub fn all_notes_off<B: SynthBackend + ?Sized>(
        &mut self,
        pool: &mut VoicePool,
        backend: &mut B,
    ) -> usize {
        let mut count = 0;
        for i in 0..pool.capacity() {
            let voice = VoiceIndex(i);
            let cuttable = pool
                .voice(voice)
                .is_some_and(|v| matches!(v.state, VoiceState::Active | VoiceState::Releasing));
            if cuttable && self.force_release(pool, voice, backend) {
                count += 1;
            }
        }
        if count > 0 {
            tracing::debug!("All notes off: {} voices cut", count);
        }
        count
    }

    fn clear_deadline(&mut self, voice: VoiceIndex) {
        if let Some(deadline) = self.deadlines.get_mut(voice.0) {
            *deadline = None;
        }
    }
}
