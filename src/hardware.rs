//! Front-panel input: volume pot and instrument encoder.
//!
//! Raw readings are filtered here and turned into [`HardwareEvent`]s, which
//! reach the engine through a bounded [`hardware_channel`]. The scan loop
//! that reads the pins belongs to the host.

use candide_synth::Instrument;
use crossbeam_channel::{bounded, Receiver, Sender};
use serde::{Deserialize, Serialize};

/// Lowest raw ADC reading.
pub const ADC_MIN: u16 = 1;
/// Highest raw ADC reading.
pub const ADC_MAX: u16 = 65535;
/// Raw movement needed to wake an idle pot.
pub const POT_THRESHOLD: u16 = 800;
/// Bottom share of the travel that reads as silence.
pub const POT_LOWER_TRIM: f32 = 0.05;
/// Top share of the travel that reads as full scale.
pub const POT_UPPER_TRIM: f32 = 0.0;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum HardwareEvent {
    /// Index into [`Instrument::ALL`]; wraps.
    InstrumentSelected(usize),
    /// Master volume, 0.0..=1.0.
    VolumeChanged(f32),
}

/// Bounded queue from the scan loop to the engine.
pub fn hardware_channel(capacity: usize) -> (Sender<HardwareEvent>, Receiver<HardwareEvent>) {
    bounded(capacity.max(1))
}

/// Volume pot filter with activity hysteresis.
///
/// An idle pot ignores movement up to [`POT_THRESHOLD`]. Once woken it
/// reports every change until a reading repeats exactly, then goes idle
/// again.
#[derive(Debug, Clone, Default)]
pub struct VolumeFilter {
    last: u16,
    active: bool,
}

impl VolumeFilter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Raw ADC value to 0.0..=1.0 after trims, rounded to 5 decimals.
    pub fn normalize(raw: u16) -> f32 {
        let clamped = raw.clamp(ADC_MIN, ADC_MAX);
        let unit = (clamped - ADC_MIN) as f32 / (ADC_MAX - ADC_MIN) as f32;
        let trimmed = if unit < POT_LOWER_TRIM {
            0.0
        } else if unit > 1.0 - POT_UPPER_TRIM {
            1.0
        } else {
            (unit - POT_LOWER_TRIM) / (1.0 - POT_LOWER_TRIM - POT_UPPER_TRIM)
        };
        libm::roundf(trimmed * 100_000.0) / 100_000.0
    }

    /// Power-on level. Seeds the filter so the first scan does not re-report it.
    pub fn initial(&mut self, raw: u16) -> f32 {
        self.last = raw;
        Self::normalize(raw)
    }

    /// Feed one scan. Returns a level when it should be reported.
    pub fn read(&mut self, raw: u16) -> Option<f32> {
        let change = raw.abs_diff(self.last);
        if self.active {
            if change == 0 {
                self.active = false;
                return None;
            }
        } else if change <= POT_THRESHOLD {
            return None;
        } else {
            self.active = true;
        }
        self.last = raw;
        Some(Self::normalize(raw))
    }

    /// Same as [`VolumeFilter::read`], wrapped as an event.
    pub fn event(&mut self, raw: u16) -> Option<HardwareEvent> {
        self.read(raw).map(HardwareEvent::VolumeChanged)
    }

    #[inline]
    pub fn is_active(&self) -> bool {
        self.active
    }
}

/// Turns encoder positions into instrument selections, one step per
/// position change regardless of how far it moved.
#[derive(Debug, Clone)]
pub struct EncoderTracker {
    last_position: i32,
    selected: Instrument,
}

impl EncoderTracker {
    pub fn new(selected: Instrument) -> Self {
        Self {
            last_position: 0,
            selected,
        }
    }

    #[inline]
    pub fn selected(&self) -> Instrument {
        self.selected
    }

    /// Re-zero after the host resets the encoder counter.
    pub fn reset_position(&mut self) {
        self.last_position = 0;
    }

    pub fn read(&mut self, position: i32) -> Option<HardwareEvent> {
        if position == self.last_position {
            return None;
        }
        let direction = if position > self.last_position { 1 } else { -1 };
        self.last_position = position;
        self.selected = self.selected.step(direction);
        tracing::trace!(
            "Encoder moved to {} ({:+}), selecting {}",
            position,
            direction,
            self.selected.name()
        );
        Some(HardwareEvent::InstrumentSelected(self.selected.index()))
    }
}
