//! Closed set of instruments selectable from the hardware encoder.

use serde::{Deserialize, Serialize};

use crate::mapping::{Curve, ParameterMap, Route, Source, Target};

/// Instrument presets, in selection order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Instrument {
    /// Every expressive route enabled
    #[default]
    Full,
    Basic,
    EnvelopeMinimum,
    FilterMinimum,
    NoteMinimum,
    Ring,
}

impl Instrument {
    pub const ALL: [Instrument; 6] = [
        Instrument::Full,
        Instrument::Basic,
        Instrument::EnvelopeMinimum,
        Instrument::FilterMinimum,
        Instrument::NoteMinimum,
        Instrument::Ring,
    ];

    /// Selection by index wraps around the set.
    #[inline]
    pub fn from_index(index: usize) -> Self {
        Self::ALL[index % Self::ALL.len()]
    }

    #[inline]
    pub fn index(self) -> usize {
        self as usize
    }

    /// Step `delta` positions through the set, wrapping either way.
    pub fn step(self, delta: i32) -> Self {
        let len = Self::ALL.len() as i64;
        let index = (self.index() as i64 + delta as i64).rem_euclid(len);
        Self::ALL[index as usize]
    }

    #[inline]
    pub fn next(self) -> Self {
        self.step(1)
    }

    #[inline]
    pub fn previous(self) -> Self {
        self.step(-1)
    }

    pub fn name(self) -> &'static str {
        match self {
            Instrument::Full => "full",
            Instrument::Basic => "basic",
            Instrument::EnvelopeMinimum => "envelope_minimum",
            Instrument::FilterMinimum => "filter_minimum",
            Instrument::NoteMinimum => "note_minimum",
            Instrument::Ring => "ring",
        }
    }

    /// Expression routes this instrument responds to.
    pub fn parameter_map(self) -> ParameterMap {
        let amplitude = Route::new(Source::Velocity, Target::Amplitude);
        match self {
            Instrument::Full => ParameterMap::new()
                .with_route(amplitude.range(0.001, 1.0))
                .with_route(Route::new(Source::Velocity, Target::AttackLevel).range(0.001, 1.0))
                .with_route(Route::new(Source::Pitch, Target::Bend).range(-12.0, 12.0))
                .with_route(Route::new(Source::Pitch, Target::RingBend).range(-12.0, 12.0))
                .with_route(Route::new(Source::Pitch, Target::Pan).range(-1.0, 1.0))
                .with_route(Route::new(Source::Pressure, Target::SustainLevel))
                .with_route(
                    Route::new(Source::Timbre, Target::RingFrequency)
                        .curve(Curve::Exponential)
                        .range(20.0, 2000.0),
                ),
            Instrument::Basic => ParameterMap::new()
                .with_route(amplitude)
                .with_route(Route::new(Source::Pressure, Target::SustainLevel)),
            Instrument::EnvelopeMinimum => ParameterMap::new()
                .with_route(
                    Route::new(Source::Velocity, Target::AttackLevel)
                        .curve(Curve::Logarithmic)
                        .range(0.001, 1.0),
                )
                .with_route(Route::new(Source::Pressure, Target::SustainLevel).curve(Curve::SCurve)),
            Instrument::FilterMinimum => ParameterMap::new()
                .with_route(amplitude)
                .with_route(
                    Route::new(Source::Timbre, Target::FilterCutoff)
                        .curve(Curve::Exponential)
                        .range(20.0, 20000.0),
                )
                .with_route(Route::new(Source::Pressure, Target::FilterResonance).range(0.1, 2.0)),
            Instrument::NoteMinimum => ParameterMap::new().with_route(amplitude),
            Instrument::Ring => ParameterMap::new()
                .with_route(amplitude)
                .with_route(
                    Route::new(Source::Timbre, Target::RingFrequency)
                        .curve(Curve::Exponential)
                        .range(20.0, 2000.0),
                )
                .with_route(Route::new(Source::Pitch, Target::RingBend).range(-12.0, 12.0)),
        }
    }
}
