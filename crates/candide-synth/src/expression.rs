//! Per-voice expression tracking with MPE two-tier precedence.
//!
//! Each zone keeps a baseline fed by its master channel. A voice follows that
//! baseline until its own member channel sends a value for a dimension; from
//! then on that dimension is overridden for the rest of the voice's life and
//! master-channel changes no longer reach it.

use candide_midi::{
    bend_to_semitones, unit_from_7bit, ChannelRole, ChannelRoute, ControllerValue, MidiChannel,
    MpeEvent, Zone, ZoneId,
};
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

use crate::voice::{VoiceIndex, VoicePool, VoiceState};

const BEND_CENTER: ControllerValue = ControllerValue::Fine(8192);
const PRESSURE_DEFAULT: ControllerValue = ControllerValue::Coarse(0);
const TIMBRE_DEFAULT: ControllerValue = ControllerValue::Coarse(64);

/// Updates produced by one event; inline for the common single-voice case.
pub type Updates = SmallVec<[(VoiceIndex, VoiceUpdate); 4]>;

/// Expressive dimensions tracked per voice.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Dimension {
    Pitch,
    Pressure,
    Timbre,
}

impl Dimension {
    pub const ALL: [Dimension; 3] = [Dimension::Pitch, Dimension::Pressure, Dimension::Timbre];

    #[inline]
    fn slot(self) -> usize {
        self as usize
    }

    /// Dimension carried by `event`, with its raw value.
    pub fn of_event(event: &MpeEvent) -> Option<(MidiChannel, Dimension, ControllerValue)> {
        match *event {
            MpeEvent::PitchBend { channel, value } => {
                Some((channel, Dimension::Pitch, ControllerValue::Fine(value)))
            }
            MpeEvent::ChannelPressure { channel, value } => {
                Some((channel, Dimension::Pressure, value))
            }
            MpeEvent::Timbre { channel, value } => Some((channel, Dimension::Timbre, value)),
            _ => None,
        }
    }
}

/// Effective expressive state of a voice.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Expression {
    /// Semitones relative to the note
    pub pitch: f32,
    /// 0.0..=1.0
    pub pressure: f32,
    /// 0.0..=1.0 (CC74)
    pub timbre: f32,
}

impl Default for Expression {
    /// Centered bend, no pressure, CC74 at 64.
    fn default() -> Self {
        Self {
            pitch: 0.0,
            pressure: 0.0,
            timbre: unit_from_7bit(64),
        }
    }
}

impl Expression {
    #[inline]
    pub fn get(&self, dimension: Dimension) -> f32 {
        match dimension {
            Dimension::Pitch => self.pitch,
            Dimension::Pressure => self.pressure,
            Dimension::Timbre => self.timbre,
        }
    }

    #[inline]
    pub fn set(&mut self, dimension: Dimension, value: f32) {
        match dimension {
            Dimension::Pitch => self.pitch = value,
            Dimension::Pressure => self.pressure = value,
            Dimension::Timbre => self.timbre = value,
        }
    }
}

/// Dimensions that received a per-note value since allocation.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Overrides {
    pub pitch: bool,
    pub pressure: bool,
    pub timbre: bool,
}

impl Overrides {
    #[inline]
    pub fn get(&self, dimension: Dimension) -> bool {
        match dimension {
            Dimension::Pitch => self.pitch,
            Dimension::Pressure => self.pressure,
            Dimension::Timbre => self.timbre,
        }
    }

    #[inline]
    pub fn set(&mut self, dimension: Dimension, value: bool) {
        match dimension {
            Dimension::Pitch => self.pitch = value,
            Dimension::Pressure => self.pressure = value,
            Dimension::Timbre => self.timbre = value,
        }
    }
}

/// Changed fields only; `None` means unchanged.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct VoiceUpdate {
    pub pitch: Option<f32>,
    pub pressure: Option<f32>,
    pub timbre: Option<f32>,
}

impl VoiceUpdate {
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.pitch.is_none() && self.pressure.is_none() && self.timbre.is_none()
    }

    #[inline]
    pub fn get(&self, dimension: Dimension) -> Option<f32> {
        match dimension {
            Dimension::Pitch => self.pitch,
            Dimension::Pressure => self.pressure,
            Dimension::Timbre => self.timbre,
        }
    }

    #[inline]
    pub fn set(&mut self, dimension: Dimension, value: f32) {
        match dimension {
            Dimension::Pitch => self.pitch = Some(value),
            Dimension::Pressure => self.pressure = Some(value),
            Dimension::Timbre => self.timbre = Some(value),
        }
    }

    /// Fields of `new` that differ from `old`.
    pub fn between(old: &Expression, new: &Expression) -> Self {
        let mut update = Self::default();
        for dimension in Dimension::ALL {
            if old.get(dimension) != new.get(dimension) {
                update.set(dimension, new.get(dimension));
            }
        }
        update
    }
}

/// What Reset All Controllers (CC 121) does to per-note overrides.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResetPolicy {
    /// Overridden dimensions jump to their defaults and stay per-note.
    #[default]
    KeepOverrides,
    /// Overrides are cleared; voices follow the zone baseline again.
    RestoreInheritance,
}

/// Minimum change, in 14-bit steps, before a controller value is applied.
///
/// All zero (the default) passes every change through.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ControllerThresholds {
    pub pitch_bend: u16,
    pub pressure: u16,
    pub timbre: u16,
}

impl ControllerThresholds {
    /// Filters sensor jitter from controllers that chatter around a value:
    /// 64 bend steps, 2 coarse steps of pressure and timbre.
    pub fn coarse() -> Self {
        Self {
            pitch_bend: 64,
            pressure: 2 << 7,
            timbre: 2 << 7,
        }
    }

    #[inline]
    fn get(&self, dimension: Dimension) -> u16 {
        match dimension {
            Dimension::Pitch => self.pitch_bend,
            Dimension::Pressure => self.pressure,
            Dimension::Timbre => self.timbre,
        }
    }

    #[inline]
    fn suppresses(&self, dimension: Dimension, last: u16, next: u16) -> bool {
        last.abs_diff(next) < self.get(dimension)
    }
}

#[derive(Clone, Copy, Debug, Default)]
struct ChannelState {
    /// Voice that receives this channel's per-note values
    bound: Option<VoiceIndex>,
    /// Values received while no voice was bound to the channel
    pending: [Option<ControllerValue>; 3],
    /// Last applied value, for threshold comparison
    last: [Option<u16>; 3],
}

#[derive(Clone, Copy, Debug)]
struct Baseline([ControllerValue; 3]);

impl Default for Baseline {
    fn default() -> Self {
        Self([BEND_CENTER, PRESSURE_DEFAULT, TIMBRE_DEFAULT])
    }
}

#[inline]
fn zone_slot(zone: ZoneId) -> usize {
    match zone {
        ZoneId::Lower => 0,
        ZoneId::Upper => 1,
    }
}

#[inline]
fn scaled(dimension: Dimension, value: ControllerValue, bend_range: f32) -> f32 {
    match dimension {
        Dimension::Pitch => bend_to_semitones(value.as_14bit(), bend_range),
        Dimension::Pressure | Dimension::Timbre => value.normalized(),
    }
}

#[inline]
fn default_value(dimension: Dimension) -> ControllerValue {
    Baseline::default().0[dimension.slot()]
}

/// Tracks channel and zone controller state and merges it into voices.
#[derive(Debug, Clone, Default)]
pub struct ControllerTracker {
    channels: [ChannelState; 16],
    baselines: [Baseline; 2],
    thresholds: ControllerThresholds,
    reset_policy: ResetPolicy,
}

impl ControllerTracker {
    pub fn new(thresholds: ControllerThresholds, reset_policy: ResetPolicy) -> Self {
        Self {
            thresholds,
            reset_policy,
            ..Default::default()
        }
    }

    #[inline]
    pub fn reset_policy(&self) -> ResetPolicy {
        self.reset_policy
    }

    /// Zone-wide values as a voice without overrides would see them.
    pub fn baseline(&self, zone: &Zone) -> Expression {
        let raw = &self.baselines[zone_slot(zone.id)].0;
        let mut expression = Expression::default();
        for dimension in Dimension::ALL {
            expression.set(
                dimension,
                scaled(dimension, raw[dimension.slot()], zone.master_pitch_bend_range),
            );
        }
        expression
    }

    /// Seed a freshly allocated voice: zone baseline, then any values its
    /// member channel sent before the note-on (those count as per-note).
    pub fn on_note_on(
        &mut self,
        voice: VoiceIndex,
        route: ChannelRoute,
        zone: &Zone,
        pool: &mut VoicePool,
    ) -> Expression {
        let mut expression = self.baseline(zone);
        let mut overrides = Overrides::default();

        let Some(slot) = pool.voice_mut(voice) else {
            return expression;
        };

        if route.is_member() {
            let state = &mut self.channels[(slot.channel & 0x0F) as usize];
            state.bound = Some(voice);
            state.last = [None; 3];
            for dimension in Dimension::ALL {
                if let Some(value) = state.pending[dimension.slot()].take() {
                    expression.set(dimension, scaled(dimension, value, zone.pitch_bend_range));
                    overrides.set(dimension, true);
                }
            }
        }

        slot.expression = expression;
        slot.overrides = overrides;
        expression
    }

    /// Apply a pitch bend, channel pressure or CC74 event.
    ///
    /// Returns one update per voice whose effective value changed. Other
    /// event kinds are ignored.
    pub fn apply(
        &mut self,
        event: &MpeEvent,
        route: ChannelRoute,
        zone: &Zone,
        pool: &mut VoicePool,
    ) -> Updates {
        let Some((channel, dimension, value)) = Dimension::of_event(event) else {
            return Updates::new();
        };
        match route.role {
            ChannelRole::Member => self.apply_member(channel, dimension, value, zone, pool),
            ChannelRole::Master => self.apply_master(dimension, value, zone, pool),
        }
    }

    /// Reset All Controllers on `channel`: bend re-centers and pressure
    /// drops to zero. Timbre is untouched.
    pub fn reset_controllers(
        &mut self,
        channel: MidiChannel,
        route: ChannelRoute,
        zone: &Zone,
        pool: &mut VoicePool,
    ) -> Updates {
        let dimensions = [Dimension::Pitch, Dimension::Pressure];
        let mut updates = Updates::new();

        match route.role {
            ChannelRole::Member => {
                let bound = self.bound_voice(channel, pool);
                let state = &mut self.channels[(channel & 0x0F) as usize];
                state.pending = [None; 3];
                state.last = [None; 3];
                let baseline = self.baseline(zone);

                if let Some(index) = bound {
                    if let Some(voice) = pool.voice_mut(index) {
                        let before = voice.expression;
                        for dimension in dimensions {
                            if !voice.overrides.get(dimension) {
                                continue;
                            }
                            match self.reset_policy {
                                ResetPolicy::KeepOverrides => voice.expression.set(
                                    dimension,
                                    scaled(
                                        dimension,
                                        default_value(dimension),
                                        zone.pitch_bend_range,
                                    ),
                                ),
                                ResetPolicy::RestoreInheritance => {
                                    voice.overrides.set(dimension, false);
                                    voice.expression.set(dimension, baseline.get(dimension));
                                }
                            }
                        }
                        push_update(&mut updates, index, &before, &voice.expression);
                    }
                }
            }
            ChannelRole::Master => {
                let raw = &mut self.baselines[zone_slot(zone.id)].0;
                for dimension in dimensions {
                    raw[dimension.slot()] = default_value(dimension);
                }
                let baseline = self.baseline(zone);
                let restore = self.reset_policy == ResetPolicy::RestoreInheritance;

                for (i, voice) in pool.voices_mut().iter_mut().enumerate() {
                    if voice.state != VoiceState::Active || voice.zone != zone.id {
                        continue;
                    }
                    let before = voice.expression;
                    for dimension in dimensions {
                        if restore {
                            voice.overrides.set(dimension, false);
                        }
                        if !voice.overrides.get(dimension) {
                            voice.expression.set(dimension, baseline.get(dimension));
                        }
                    }
                    push_update(&mut updates, VoiceIndex(i), &before, &voice.expression);
                }
            }
        }

        tracing::debug!(
            "Reset controllers on ch {} ({:?}, {:?}): {} voices changed",
            channel,
            route.role,
            self.reset_policy,
            updates.len()
        );
        updates
    }

    /// Forget a zone's baseline and the state of `channels`. Called when the
    /// zone is enabled or disabled.
    pub fn reset_zone(&mut self, zone: ZoneId, channels: impl IntoIterator<Item = MidiChannel>) {
        self.baselines[zone_slot(zone)] = Baseline::default();
        self.reset_channels(channels);
    }

    /// Forget binding, pending and threshold state of `channels`; the zone
    /// baseline is kept.
    pub fn reset_channels(&mut self, channels: impl IntoIterator<Item = MidiChannel>) {
        for channel in channels {
            self.channels[(channel & 0x0F) as usize] = ChannelState::default();
        }
    }

    /// Whether `channel` holds a value waiting for its next note-on.
    pub fn has_pending(&self, channel: MidiChannel) -> bool {
        self.channels[(channel & 0x0F) as usize]
            .pending
            .iter()
            .any(Option::is_some)
    }

    fn apply_member(
        &mut self,
        channel: MidiChannel,
        dimension: Dimension,
        value: ControllerValue,
        zone: &Zone,
        pool: &mut VoicePool,
    ) -> Updates {
        let state = &mut self.channels[(channel & 0x0F) as usize];
        let raw = value.as_14bit();
        if let Some(last) = state.last[dimension.slot()] {
            if self.thresholds.suppresses(dimension, last, raw) {
                tracing::trace!("ch {} {:?} change below threshold", channel, dimension);
                return Updates::new();
            }
        }
        state.last[dimension.slot()] = Some(raw);

        let mut updates = Updates::new();
        let Some(index) = self.bound_voice(channel, pool) else {
            self.channels[(channel & 0x0F) as usize].pending[dimension.slot()] = Some(value);
            return updates;
        };
        let Some(voice) = pool.voice_mut(index) else {
            return updates;
        };

        let target = scaled(dimension, value, zone.pitch_bend_range);
        voice.overrides.set(dimension, true);
        if voice.expression.get(dimension) != target {
            voice.expression.set(dimension, target);
            let mut update = VoiceUpdate::default();
            update.set(dimension, target);
            updates.push((index, update));
        }
        updates
    }

    /// The voice `channel` controls: the one its latest note-on bound, or
    /// the newest Active voice still on the channel once that one is gone.
    fn bound_voice(&mut self, channel: MidiChannel, pool: &VoicePool) -> Option<VoiceIndex> {
        let state = &mut self.channels[(channel & 0x0F) as usize];
        if let Some(index) = state.bound {
            let live = pool
                .voice(index)
                .is_some_and(|v| v.state == VoiceState::Active && v.channel == channel);
            if live {
                return Some(index);
            }
        }
        state.bound = pool
            .voices()
            .iter()
            .enumerate()
            .filter(|(_, v)| v.state == VoiceState::Active && v.channel == channel)
            .max_by_key(|(_, v)| v.allocation_time)
            .map(|(i, _)| VoiceIndex(i));
        state.bound
    }

    fn apply_master(
        &mut self,
        dimension: Dimension,
        value: ControllerValue,
        zone: &Zone,
        pool: &mut VoicePool,
    ) -> Updates {
        let baseline = &mut self.baselines[zone_slot(zone.id)].0[dimension.slot()];
        if self
            .thresholds
            .suppresses(dimension, baseline.as_14bit(), value.as_14bit())
        {
            tracing::trace!("{:?} zone {:?} change below threshold", zone.id, dimension);
            return Updates::new();
        }
        *baseline = value;

        let target = scaled(dimension, value, zone.master_pitch_bend_range);
        let mut updates = Updates::new();
        for (i, voice) in pool.voices_mut().iter_mut().enumerate() {
            if voice.state != VoiceState::Active
                || voice.zone != zone.id
                || voice.overrides.get(dimension)
            {
                continue;
            }
            if voice.expression.get(dimension) != target {
                voice.expression.set(dimension, target);
                let mut update = VoiceUpdate::default();
                update.set(dimension, target);
                updates.push((VoiceIndex(i), update));
            }
        }
        updates
    }
}

#[inline]
fn push_update(updates: &mut Updates, voice: VoiceIndex, before: &Expression, after: &Expression) {
    let update = VoiceUpdate::between(before, after);
    if !update.is_empty() {
        updates.push((voice, update));
    }
}
