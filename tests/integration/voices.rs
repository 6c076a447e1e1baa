//! Voice allocation integration tests
//!
//! Pool bookkeeping, stealing order, zone isolation and the order of
//! lifecycle calls the backend sees.

use candide::prelude::*;

use crate::helpers::*;

#[test]
fn test_active_count_is_note_ons_minus_note_offs() {
    let mut rig = Rig::new(test_engine(TEST_VOICES));

    let mut expected = 0usize;
    for ch in 1..=12u8 {
        rig.send(&[MpeEvent::note_on(ch, 40 + ch, 100)]);
        expected += 1;
        if ch % 3 == 0 {
            rig.send(&[MpeEvent::note_off(ch - 1, 40 + ch - 1, 0)]);
            expected -= 1;
        }
        assert_eq!(rig.engine.active_count(), expected);
    }
    // Stale note-offs change nothing
    rig.send(&[MpeEvent::note_off(2, 42, 0), MpeEvent::note_off(13, 99, 0)]);
    assert_eq!(rig.engine.active_count(), expected);
}

#[test]
fn test_oldest_voice_stolen_first() {
    let mut rig = Rig::new(test_engine(3));
    rig.send(&[
        MpeEvent::note_on(1, 60, 100),
        MpeEvent::note_on(2, 62, 100),
        MpeEvent::note_on(3, 64, 100),
    ]);
    rig.take();

    for (ch, note, victim) in [(4u8, 65u8, 60u8), (5, 67, 62), (6, 69, 64), (7, 71, 65)] {
        rig.send(&[MpeEvent::note_on(ch, note, 100)]);
        let stolen: Vec<_> = rig
            .engine
            .drain_diagnostics()
            .filter_map(|d| match d {
                Diagnostic::VoiceStolen { stolen_note, .. } => Some(stolen_note),
                _ => None,
            })
            .collect();
        assert_eq!(stolen, vec![victim]);
    }
}

#[test]
fn test_steal_emits_exactly_one_cut_then_allocate() {
    let mut rig = Rig::new(test_engine(4));
    rig.send(&[
        MpeEvent::note_on(1, 60, 100),
        MpeEvent::note_on(2, 62, 100),
        MpeEvent::note_on(3, 64, 100),
        MpeEvent::note_on(4, 65, 100),
    ]);
    rig.take();

    rig.send(&[MpeEvent::note_on(5, 67, 110)]);
    let commands = rig.take();
    assert_eq!(kinds(&commands), ["cut", "allocate"]);
    assert_eq!(commands[0].voice(), commands[1].voice());
    assert!(matches!(
        commands[1],
        VoiceCommand::Allocate {
            note: 67,
            velocity: 110,
            ..
        }
    ));
}

#[test]
fn test_releasing_voice_reused_before_steal() {
    let mut rig = Rig::new(test_engine(2));
    rig.send(&[
        MpeEvent::note_on(1, 60, 100),
        MpeEvent::note_on(2, 62, 100),
        MpeEvent::note_off(2, 62, 30),
    ]);
    rig.take();

    rig.send(&[MpeEvent::note_on(3, 64, 100)]);
    let commands = rig.take();
    // Release already went out at note-off; no cut
    assert_eq!(kinds(&commands), ["allocate"]);
    assert_eq!(commands[0].voice(), Some(VoiceIndex(1)));
    assert_eq!(rig.engine.pending_diagnostics(), 0);
}

#[test]
fn test_no_steal_across_zones() {
    let mut rig = Rig::new(dual_zone_engine(4));
    rig.send(&[
        MpeEvent::note_on(1, 48, 100),
        MpeEvent::note_on(14, 72, 100),
        MpeEvent::note_on(2, 50, 100),
        MpeEvent::note_on(13, 74, 100),
    ]);
    rig.take();

    // Lower keeps stealing; the upper voices stay put
    for (i, ch) in (3..=6u8).enumerate() {
        rig.send(&[MpeEvent::note_on(ch, 52 + i as u8, 100)]);
    }
    let pool = rig.engine.pool();
    for index in [1, 3] {
        assert_eq!(pool.voice(VoiceIndex(index)).unwrap().zone, ZoneId::Upper);
    }
    assert_eq!(pool.voice(VoiceIndex(1)).unwrap().note, 72);
    assert_eq!(pool.voice(VoiceIndex(3)).unwrap().note, 74);
}

#[test]
fn test_note_lifecycle_order() {
    let mut rig = Rig::new(test_engine(TEST_VOICES));
    rig.send(&[
        MpeEvent::note_on(1, 60, 100),
        MpeEvent::pitch_bend(1, 12288),
        MpeEvent::pressure(1, 80),
        MpeEvent::note_off(1, 60, 64),
    ]);

    let commands = rig.take();
    assert_eq!(kinds(&commands), ["allocate", "update", "update", "release"]);
    assert!(commands.iter().all(|c| c.voice() == Some(VoiceIndex(0))));
    assert_eq!(
        commands[3],
        VoiceCommand::Release {
            voice: VoiceIndex(0),
            velocity: 64,
            cut: false,
        }
    );
}

#[test]
fn test_running_status_note_off_as_zero_velocity() {
    let mut rig = Rig::new(test_engine(TEST_VOICES));
    // Note-on, then the same note at velocity 0 under running status
    rig.send_bytes(&[0x91, 60, 100, 60, 0]);

    let commands = rig.take();
    assert_eq!(kinds(&commands), ["allocate", "release"]);
    assert!(matches!(
        commands[1],
        VoiceCommand::Release { velocity: 64, .. }
    ));
}

#[test]
fn test_all_notes_off_cuts_everything() {
    let mut rig = Rig::new(test_engine(8));
    for ch in 1..=5u8 {
        rig.send(&[MpeEvent::note_on(ch, 60, 100)]);
    }
    rig.send(&[MpeEvent::note_off(4, 60, 0)]);
    rig.take();

    // CC 123 on the master channel
    rig.send_bytes(&[0xB0, 123, 0]);
    let commands = rig.take();
    assert_eq!(kinds(&commands), ["cut"; 5]);
    assert_eq!(rig.engine.pool().free_count(), 8);

    // Nothing left to release or expire
    rig.advance(std::time::Duration::from_secs(1));
    assert!(rig.take().is_empty());
}

#[test]
fn test_duplicate_notes_on_one_channel() {
    let mut rig = Rig::new(test_engine(TEST_VOICES));
    rig.send(&[
        MpeEvent::note_on(1, 60, 100),
        MpeEvent::note_on(1, 60, 90),
        MpeEvent::note_off(1, 60, 0),
    ]);
    let commands = rig.take();
    assert_eq!(commands[2].voice(), Some(VoiceIndex(0)));
    assert_eq!(rig.engine.active_count(), 1);
}
