//! Controller value scaling.

/// Center of the 14-bit pitch bend range.
pub const PITCH_BEND_CENTER: u16 = 8192;

/// Maximum 14-bit value.
pub const MAX_14BIT: u16 = 16383;

/// Map a 14-bit bend onto `[-range, +range]` semitones.
///
/// The two halves are scaled separately so both extremes land exactly:
/// 0 -> `-range`, 8192 -> 0.0, 16383 -> `+range`.
#[inline]
pub fn bend_to_semitones(value: u16, range: f32) -> f32 {
    let value = value.min(MAX_14BIT);
    let offset = value as f32 - PITCH_BEND_CENTER as f32;
    if offset >= 0.0 {
        offset / (MAX_14BIT - PITCH_BEND_CENTER) as f32 * range
    } else {
        offset / PITCH_BEND_CENTER as f32 * range
    }
}

/// 7-bit (0-127) -> 0.0..=1.0
#[inline]
pub fn unit_from_7bit(value: u8) -> f32 {
    value.min(127) as f32 / 127.0
}

/// 14-bit (0-16383) -> 0.0..=1.0
#[inline]
pub fn unit_from_14bit(value: u16) -> f32 {
    value.min(MAX_14BIT) as f32 / MAX_14BIT as f32
}

/// Pitch bend sensitivity from RPN 0 data (MSB semitones, LSB cents).
#[inline]
pub fn bend_range_semitones(semitones: u8, cents: u8) -> f32 {
    semitones as f32 + cents.min(99) as f32 / 100.0
}
