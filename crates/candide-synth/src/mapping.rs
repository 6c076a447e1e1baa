//! Parameter mapping from per-voice expression to synthesis parameters.
//!
//! A [`Route`] shapes one normalized source through a [`Curve`], scales it
//! into a target range and applies an amount. [`MappingBackend`] runs the
//! selected instrument's routes in front of any [`SynthBackend`].

use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

use crate::backend::SynthBackend;
use crate::expression::{Dimension, Expression, VoiceUpdate};
use crate::instrument::Instrument;
use crate::voice::VoiceIndex;

/// Maximum routes an instrument map holds without spilling to the heap.
pub const MAX_INLINE_ROUTES: usize = 8;

/// Per-note value a route reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Source {
    /// Note-on velocity (0-127 -> 0.0-1.0)
    Velocity,
    /// Pitch offset, normalized against the mapper's bend span (center = 0.5)
    Pitch,
    /// Channel pressure (0.0-1.0)
    Pressure,
    /// CC74 (0.0-1.0)
    Timbre,
}

impl From<Dimension> for Source {
    fn from(dimension: Dimension) -> Self {
        match dimension {
            Dimension::Pitch => Source::Pitch,
            Dimension::Pressure => Source::Pressure,
            Dimension::Timbre => Source::Timbre,
        }
    }
}

/// Synthesis parameter a route drives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Target {
    /// Oscillator amplitude (0.0-1.0)
    Amplitude,
    /// Oscillator bend in semitones
    Bend,
    /// Stereo position (-1.0 to 1.0)
    Pan,
    /// Filter cutoff in Hz
    FilterCutoff,
    /// Filter resonance (Q)
    FilterResonance,
    /// Envelope attack level (0.0-1.0)
    AttackLevel,
    /// Envelope sustain level (0.0-1.0)
    SustainLevel,
    /// Ring modulator frequency in Hz
    RingFrequency,
    /// Ring modulator bend in semitones
    RingBend,
}

/// Response curve applied to a normalized input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Curve {
    #[default]
    Linear,
    /// x^2 - slow start, fast finish
    Exponential,
    /// 1 - (1 - x)^2 - fast start, slow finish
    Logarithmic,
    /// Smoothstep, 3x^2 - 2x^3
    SCurve,
}

impl Curve {
    /// Shape `x`; input is clamped to 0.0..=1.0 first.
    #[inline]
    pub fn apply(self, x: f32) -> f32 {
        let x = x.clamp(0.0, 1.0);
        match self {
            Curve::Linear => x,
            Curve::Exponential => libm::powf(x, 2.0),
            Curve::Logarithmic => 1.0 - libm::powf(1.0 - x, 2.0),
            Curve::SCurve => x * x * (3.0 - 2.0 * x),
        }
    }
}

/// One source-to-target mapping.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Route {
    pub source: Source,
    pub target: Target,
    pub curve: Curve,
    /// Output at input 0.0
    pub min: f32,
    /// Output at input 1.0
    pub max: f32,
    /// Final scale factor
    pub amount: f32,
}

impl Route {
    /// Linear 0.0..=1.0, full amount.
    pub fn new(source: Source, target: Target) -> Self {
        Self {
            source,
            target,
            curve: Curve::Linear,
            min: 0.0,
            max: 1.0,
            amount: 1.0,
        }
    }

    pub fn curve(mut self, curve: Curve) -> Self {
        self.curve = curve;
        self
    }

    pub fn range(mut self, min: f32, max: f32) -> Self {
        self.min = min;
        self.max = max;
        self
    }

    pub fn with_amount(mut self, amount: f32) -> Self {
        self.amount = amount;
        self
    }

    /// `(min + curve(input) * (max - min)) * amount`
    #[inline]
    pub fn apply(&self, input: f32) -> f32 {
        let shaped = self.curve.apply(input);
        (self.min + shaped * (self.max - self.min)) * self.amount
    }
}

/// The routes of one instrument.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParameterMap {
    routes: SmallVec<[Route; MAX_INLINE_ROUTES]>,
}

impl ParameterMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_route(mut self, route: Route) -> Self {
        self.routes.push(route);
        self
    }

    pub fn add_route(&mut self, route: Route) {
        self.routes.push(route);
    }

    #[inline]
    pub fn routes(&self) -> &[Route] {
        &self.routes
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    /// Outputs of every route reading `source`, given its normalized input.
    pub fn evaluate(&self, source: Source, input: f32) -> impl Iterator<Item = (Target, f32)> + '_ {
        self.routes
            .iter()
            .filter(move |r| r.source == source)
            .map(move |r| (r.target, r.apply(input)))
    }
}

/// Default pitch span (semitones each way) for normalizing [`Source::Pitch`];
/// the default member-channel bend range.
pub const DEFAULT_PITCH_SPAN: f32 = candide_midi::DEFAULT_MEMBER_BEND_RANGE;

/// Wraps a backend and feeds it mapped parameters alongside the raw
/// lifecycle calls, using the current instrument's [`ParameterMap`].
///
/// Voices only carry pitch in semitones, so the pitch source is normalized
/// against a fixed span. Keep it equal to the zone's member bend range
/// ([`MappingBackend::set_pitch_span`] after an RPN 0 change), or a full
/// bend will not reach the ends of the route. Values past the span clamp.
pub struct MappingBackend<B> {
    inner: B,
    instrument: Instrument,
    map: ParameterMap,
    pitch_span: f32,
}

impl<B: SynthBackend> MappingBackend<B> {
    pub fn new(inner: B, instrument: Instrument) -> Self {
        Self {
            inner,
            instrument,
            map: instrument.parameter_map(),
            pitch_span: DEFAULT_PITCH_SPAN,
        }
    }

    /// Semitones that normalize to the ends of the pitch source.
    pub fn with_pitch_span(mut self, semitones: f32) -> Self {
        self.set_pitch_span(semitones);
        self
    }

    pub fn set_pitch_span(&mut self, semitones: f32) {
        self.pitch_span = semitones.abs().max(f32::EPSILON);
    }

    #[inline]
    pub fn pitch_span(&self) -> f32 {
        self.pitch_span
    }

    #[inline]
    pub fn instrument(&self) -> Instrument {
        self.instrument
    }

    #[inline]
    pub fn map(&self) -> &ParameterMap {
        &self.map
    }

    #[inline]
    pub fn inner(&self) -> &B {
        &self.inner
    }

    #[inline]
    pub fn inner_mut(&mut self) -> &mut B {
        &mut self.inner
    }

    pub fn into_inner(self) -> B {
        self.inner
    }

    #[inline]
    fn normalize(&self, source: Source, value: f32) -> f32 {
        match source {
            Source::Pitch => (0.5 + value / (2.0 * self.pitch_span)).clamp(0.0, 1.0),
            _ => value,
        }
    }

    fn emit(&mut self, voice: VoiceIndex, source: Source, value: f32) {
        let input = self.normalize(source, value);
        for (target, output) in self.map.evaluate(source, input) {
            self.inner.set_parameter(voice, target, output);
        }
    }
}

impl<B: SynthBackend> SynthBackend for MappingBackend<B> {
    fn allocate(&mut self, voice: VoiceIndex, note: u8, velocity: u8, initial: Expression) {
        self.inner.allocate(voice, note, velocity, initial);
        self.emit(voice, Source::Velocity, candide_midi::unit_from_7bit(velocity));
        for dimension in Dimension::ALL {
            self.emit(voice, dimension.into(), initial.get(dimension));
        }
    }

    fn update(&mut self, voice: VoiceIndex, update: VoiceUpdate) {
        self.inner.update(voice, update);
        for dimension in Dimension::ALL {
            if let Some(value) = update.get(dimension) {
                self.emit(voice, dimension.into(), value);
            }
        }
    }

    fn release(&mut self, voice: VoiceIndex, velocity: u8, cut: bool) {
        self.inner.release(voice, velocity, cut);
    }

    fn set_parameter(&mut self, voice: VoiceIndex, target: Target, value: f32) {
        self.inner.set_parameter(voice, target, value);
    }

    fn instrument_changed(&mut self, instrument: Instrument) {
        self.instrument = instrument;
        self.map = instrument.parameter_map();
        self.inner.instrument_changed(instrument);
    }

    fn volume_changed(&mut self, level: f32) {
        self.inner.volume_changed(level);
    }
}
