//! Tolerance constants for expression tests.
//!
//! Bend scaling divides by 8191 on the upper half and 8192 on the lower,
//! so semitone values land close to, not exactly on, round numbers.

/// Floating point rounding errors in normalized (0.0..=1.0) values.
pub const FLOAT_EPSILON: f32 = 1e-6;

/// Semitone comparisons. One 14-bit step at a 48 semitone range is ~0.006.
pub const BEND_EPSILON: f32 = 0.01;

/// One 7-bit controller step in normalized units.
pub const STEP_7BIT: f32 = 1.0 / 127.0;
