//! Expression integration tests
//!
//! Bend scaling, master/member precedence and controller resets, driven
//! end to end from bytes.

use approx::assert_relative_eq;
use candide::midi::bend_to_semitones;
use candide::prelude::*;
use candide::synth::ControllerThresholds;

use crate::helpers::tolerances::{BEND_EPSILON, FLOAT_EPSILON, STEP_7BIT};
use crate::helpers::*;

fn pitch_of(rig: &Rig, voice: usize) -> f32 {
    rig.engine.voice(VoiceIndex(voice)).unwrap().expression.pitch
}

#[test]
fn test_bend_quarter_up_at_range_48() {
    let mut rig = Rig::new(test_engine(TEST_VOICES));
    rig.send(&[MpeEvent::note_on(1, 60, 100)]);
    rig.take();

    rig.send(&[MpeEvent::pitch_bend(1, 12288)]);
    let (voice, update) = single_update(&rig.take());
    assert_eq!(voice, VoiceIndex(0));
    assert_relative_eq!(update.pitch.unwrap(), 24.0, epsilon = BEND_EPSILON);
    assert!(update.pressure.is_none());
    assert!(update.timbre.is_none());
}

#[test]
fn test_bend_quarter_up_at_range_24() {
    let mut rig = Rig::new(test_engine(TEST_VOICES));
    // RPN 0 on a member channel: 24 semitones for the whole zone
    rig.send(&[
        MpeEvent::PitchBendRange {
            channel: 1,
            semitones: 24,
            cents: 0,
        },
        MpeEvent::note_on(2, 60, 100),
        MpeEvent::pitch_bend(2, 12288),
    ]);
    assert_relative_eq!(pitch_of(&rig, 0), 12.0, epsilon = BEND_EPSILON);
}

#[test]
fn test_bend_endpoints_and_linearity() {
    let mut rig = Rig::new(test_engine(TEST_VOICES));
    rig.send(&[MpeEvent::note_on(1, 60, 100)]);

    for (value, expected) in [(0u16, -48.0f32), (8192, 0.0), (16383, 48.0)] {
        rig.send(&[MpeEvent::pitch_bend(1, value)]);
        assert_relative_eq!(pitch_of(&rig, 0), expected, epsilon = FLOAT_EPSILON);
    }

    // Equal input steps give equal semitone steps within each half
    let samples: Vec<f32> = (0..=8)
        .map(|i| bend_to_semitones(i * 1024, 48.0))
        .collect();
    for pair in samples.windows(2) {
        assert_relative_eq!(pair[1] - pair[0], 6.0, epsilon = BEND_EPSILON);
    }
}

#[test]
fn test_member_override_beats_master() {
    let mut rig = Rig::new(test_engine(TEST_VOICES));
    rig.send(&[
        MpeEvent::note_on(1, 60, 100),
        MpeEvent::note_on(2, 64, 100),
        MpeEvent::pitch_bend(1, 16383),
    ]);
    rig.take();

    // Master bend: only the voice without its own bend follows
    rig.send(&[MpeEvent::pitch_bend(0, 0)]);
    let (voice, update) = single_update(&rig.take());
    assert_eq!(voice, VoiceIndex(1));
    assert_relative_eq!(update.pitch.unwrap(), -2.0, epsilon = FLOAT_EPSILON);
    assert_relative_eq!(pitch_of(&rig, 0), 48.0, epsilon = FLOAT_EPSILON);

    // Other dimensions still inherit on the overridden voice
    rig.send(&[MpeEvent::timbre(0, 0)]);
    let commands = rig.take();
    assert_eq!(kinds(&commands), ["update", "update"]);
}

#[test]
fn test_new_note_inherits_master_baseline() {
    let mut rig = Rig::new(test_engine(TEST_VOICES));
    rig.send(&[MpeEvent::pressure(0, 127), MpeEvent::note_on(3, 60, 100)]);

    let commands = rig.take();
    let VoiceCommand::Allocate { initial, .. } = commands[0] else {
        panic!("expected allocate, got {:?}", commands[0]);
    };
    assert_relative_eq!(initial.pressure, 1.0);
    assert_relative_eq!(initial.timbre, 64.0 * STEP_7BIT, epsilon = FLOAT_EPSILON);
    assert_eq!(initial.pitch, 0.0);
}

#[test]
fn test_pre_note_expression_seeds_voice() {
    let mut rig = Rig::new(test_engine(TEST_VOICES));
    rig.send(&[
        MpeEvent::timbre(4, 127),
        MpeEvent::pitch_bend(4, 0),
        MpeEvent::note_on(4, 60, 100),
    ]);

    let commands = rig.take();
    assert_eq!(kinds(&commands), ["allocate"]);
    let VoiceCommand::Allocate { initial, .. } = commands[0] else {
        unreachable!();
    };
    assert_relative_eq!(initial.timbre, 1.0);
    assert_relative_eq!(initial.pitch, -48.0);

    // Seeded values count as per-note
    rig.send(&[MpeEvent::timbre(0, 0)]);
    assert!(rig.take().is_empty());
}

#[test]
fn test_reset_controllers_keeps_timbre() {
    let mut rig = Rig::new(test_engine(TEST_VOICES));
    rig.send(&[
        MpeEvent::note_on(1, 60, 100),
        MpeEvent::pitch_bend(1, 4000),
        MpeEvent::pressure(1, 90),
        MpeEvent::timbre(1, 20),
    ]);
    rig.take();

    // CC 121 on the member channel
    rig.send_bytes(&[0xB1, 121, 0]);
    let (_, update) = single_update(&rig.take());
    assert_eq!(update.pitch, Some(0.0));
    assert_eq!(update.pressure, Some(0.0));
    assert!(update.timbre.is_none());
}

#[test]
fn test_restore_inheritance_policy() {
    let mut rig = Rig::new(
        MpeEngine::builder()
            .reset_policy(ResetPolicy::RestoreInheritance)
            .build()
            .unwrap(),
    );
    rig.send(&[
        MpeEvent::pressure(0, 40),
        MpeEvent::note_on(1, 60, 100),
        MpeEvent::pressure(1, 120),
        MpeEvent::ResetControllers { channel: 1 },
    ]);
    let pressure = rig.engine.voice(VoiceIndex(0)).unwrap().expression.pressure;
    assert_relative_eq!(pressure, 40.0 * STEP_7BIT, epsilon = FLOAT_EPSILON);

    // Master reaches the voice again
    rig.take();
    rig.send(&[MpeEvent::pressure(0, 10)]);
    let (voice, _) = single_update(&rig.take());
    assert_eq!(voice, VoiceIndex(0));
}

#[test]
fn test_jitter_thresholds() {
    let mut rig = Rig::new(
        MpeEngine::builder()
            .thresholds(ControllerThresholds::coarse())
            .build()
            .unwrap(),
    );
    rig.send(&[MpeEvent::note_on(1, 60, 100), MpeEvent::pressure(1, 60)]);
    rig.take();

    rig.send(&[MpeEvent::pressure(1, 61)]);
    assert!(rig.take().is_empty());
    rig.send(&[MpeEvent::pressure(1, 62)]);
    assert_eq!(kinds(&rig.take()), ["update"]);
}

#[test]
fn test_master_range_separate_from_member_range() {
    let mut rig = Rig::new(test_engine(TEST_VOICES));
    rig.send(&[
        MpeEvent::PitchBendRange {
            channel: 0,
            semitones: 12,
            cents: 0,
        },
        MpeEvent::note_on(1, 60, 100),
        MpeEvent::pitch_bend(0, 16383),
    ]);
    assert_relative_eq!(pitch_of(&rig, 0), 12.0, epsilon = FLOAT_EPSILON);

    let zone = rig.engine.current_zones().lower.unwrap();
    assert_eq!(zone.pitch_bend_range, 48.0);
    assert_eq!(zone.master_pitch_bend_range, 12.0);
}

#[test]
fn test_repeated_channel_binds_newest_note() {
    let mut rig = Rig::new(test_engine(TEST_VOICES));
    rig.send(&[MpeEvent::note_on(1, 60, 100), MpeEvent::note_on(1, 64, 100)]);
    rig.take();

    rig.send(&[MpeEvent::pitch_bend(1, 16383)]);
    let (voice, update) = single_update(&rig.take());
    assert_eq!(voice, VoiceIndex(1));
    assert_relative_eq!(update.pitch.unwrap(), 48.0, epsilon = FLOAT_EPSILON);
    assert_eq!(pitch_of(&rig, 0), 0.0);
}

#[test]
fn test_fourteen_bit_timbre_from_cc74_and_cc106() {
    let mut rig = Rig::new(test_engine(TEST_VOICES));
    rig.send(&[MpeEvent::note_on(1, 60, 100)]);
    rig.send_bytes(&[0xB1, 74, 64, 0xB1, 106, 127]);

    let timbre = rig.engine.voice(VoiceIndex(0)).unwrap().expression.timbre;
    assert_relative_eq!(timbre, 8319.0 / 16383.0, epsilon = FLOAT_EPSILON);
}
