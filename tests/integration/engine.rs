//! Engine integration tests
//!
//! Construction, the inbound queues, diagnostics and hardware events.

use std::time::{Duration, Instant};

use candide::prelude::*;
use candide::synth::Target;
use candide::ParserStats;

use crate::helpers::*;

// ---------------------------------------------------------------------------
// Queues
// ---------------------------------------------------------------------------

#[test]
fn test_midi_queue_drained_on_tick() {
    init_tracing();
    let mut engine = test_engine(TEST_VOICES);
    let mut midi = engine.connect_midi();
    let mut out: Vec<VoiceCommand> = Vec::new();

    midi.push_slice(&bytes(&[
        MpeEvent::note_on(1, 60, 100),
        MpeEvent::note_on(2, 64, 100),
    ]));
    assert!(out.is_empty());

    let handled = engine.tick(Instant::now(), &mut out);
    assert_eq!(handled, 2);
    assert_eq!(kinds(&out), ["allocate", "allocate"]);
    assert_eq!(engine.active_count(), 2);
}

#[test]
fn test_message_split_across_ticks() {
    let mut engine = test_engine(TEST_VOICES);
    let mut midi = engine.connect_midi();
    let mut out: Vec<VoiceCommand> = Vec::new();
    let now = Instant::now();

    midi.push_slice(&[0x91, 60]);
    assert_eq!(engine.tick(now, &mut out), 0);
    midi.push_slice(&[100]);
    assert_eq!(engine.tick(now, &mut out), 1);
    assert_eq!(kinds(&out), ["allocate"]);
}

#[test]
fn test_zone_setup_over_the_wire() {
    let mut rig = Rig::new(
        MpeEngine::builder()
            .zones(0, 0)
            .build()
            .unwrap(),
    );

    rig.send(&[
        MpeEvent::ZoneChange {
            zone: ZoneId::Lower,
            member_count: 7,
        },
        MpeEvent::ZoneChange {
            zone: ZoneId::Upper,
            member_count: 7,
        },
    ]);
    let zones = rig.engine.current_zones();
    assert_eq!(zones.lower.unwrap().member_count, 7);
    assert_eq!(zones.upper.unwrap().member_count, 7);
    assert_eq!(rig.engine.pending_diagnostics(), 0);

    // Growing lower into upper is rejected, old layout kept
    rig.send(&[MpeEvent::ZoneChange {
        zone: ZoneId::Lower,
        member_count: 10,
    }]);
    assert_eq!(rig.engine.current_zones().lower.unwrap().member_count, 7);
    let diagnostics: Vec<_> = rig.engine.drain_diagnostics().collect();
    assert!(matches!(
        diagnostics.as_slice(),
        [Diagnostic::ZoneRejected {
            zone: ZoneId::Lower,
            member_count: 10,
            ..
        }]
    ));
}

#[test]
fn test_disabling_zone_cuts_its_voices() {
    let mut rig = Rig::new(dual_zone_engine(TEST_VOICES));
    rig.send(&[
        MpeEvent::note_on(1, 60, 100),
        MpeEvent::note_on(14, 72, 100),
        MpeEvent::note_on(13, 74, 100),
    ]);
    rig.take();

    rig.send(&[MpeEvent::ZoneChange {
        zone: ZoneId::Upper,
        member_count: 0,
    }]);
    assert_eq!(kinds(&rig.take()), ["cut", "cut"]);
    assert_eq!(rig.engine.active_count(), 1);
    assert!(rig.engine.current_zones().upper.is_none());

    // Channel 14 is inert now
    rig.send(&[MpeEvent::note_on(14, 72, 100)]);
    assert!(rig.take().is_empty());
}

#[test]
fn test_malformed_bytes_skipped() {
    let mut rig = Rig::new(test_engine(TEST_VOICES));

    // Data bytes with no status, then a valid note
    rig.send_bytes(&[0x3C, 0x40, 0x91, 60, 100]);
    assert_eq!(kinds(&rig.take()), ["allocate"]);

    let stats: ParserStats = rig.engine.parser_stats();
    assert_eq!(stats.malformed, 2);
    assert_eq!(stats.events, 1);
}

#[test]
fn test_interrupted_message_discarded() {
    let mut rig = Rig::new(test_engine(TEST_VOICES));

    // Note-on cut short by a new status byte
    rig.send_bytes(&[0x91, 60, 0xE2, 0x00, 0x40, 0x92, 62, 90]);
    let commands = rig.take();
    assert_eq!(kinds(&commands), ["allocate"]);
    assert!(matches!(commands[0], VoiceCommand::Allocate { note: 62, .. }));
    assert_eq!(rig.engine.parser_stats().malformed, 1);
}

// ---------------------------------------------------------------------------
// Diagnostics
// ---------------------------------------------------------------------------

#[test]
fn test_steal_reported() {
    let mut rig = Rig::new(test_engine(2));
    rig.send(&[
        MpeEvent::note_on(1, 60, 100),
        MpeEvent::note_on(2, 62, 100),
        MpeEvent::note_on(3, 64, 100),
    ]);

    let diagnostics: Vec<_> = rig.engine.drain_diagnostics().collect();
    assert_eq!(
        diagnostics,
        vec![Diagnostic::VoiceStolen {
            voice: VoiceIndex(0),
            stolen_note: 60,
            stolen_channel: 1,
            note: 64,
            channel: 3,
        }]
    );
}

#[test]
fn test_note_dropped_when_other_zone_holds_pool() {
    let mut rig = Rig::new(dual_zone_engine(2));
    rig.send(&[MpeEvent::note_on(1, 60, 100), MpeEvent::note_on(2, 62, 100)]);
    rig.take();

    rig.send(&[MpeEvent::note_on(14, 72, 100)]);
    assert!(rig.take().is_empty());
    let diagnostics: Vec<_> = rig.engine.drain_diagnostics().collect();
    assert_eq!(
        diagnostics,
        vec![Diagnostic::NoteDropped {
            zone: ZoneId::Upper,
            note: 72,
            channel: 14,
        }]
    );
}

#[test]
fn test_grace_expiry_is_silent_without_acknowledgements() {
    let mut rig = Rig::new(test_engine(4));
    rig.send(&[MpeEvent::note_on(1, 60, 100), MpeEvent::note_off(1, 60, 64)]);
    rig.advance(Duration::from_millis(499));
    assert_eq!(rig.engine.pool().count_in(VoiceState::Releasing), 1);

    rig.advance(Duration::from_millis(1));
    assert_eq!(rig.engine.pool().free_count(), 4);
    assert_eq!(rig.engine.pending_diagnostics(), 0);
}

#[test]
fn test_acknowledged_release_frees_early() {
    let mut rig = Rig::new(
        MpeEngine::builder()
            .voice_capacity(4)
            .release_mode(ReleaseMode::Acknowledged)
            .build()
            .unwrap(),
    );
    rig.send(&[MpeEvent::note_on(1, 60, 100), MpeEvent::note_off(1, 60, 64)]);
    assert_eq!(rig.engine.acknowledge_release(VoiceIndex(0)), Ok(true));
    assert_eq!(rig.engine.pool().free_count(), 4);

    rig.advance(Duration::from_secs(1));
    assert_eq!(rig.engine.pending_diagnostics(), 0);
}

#[test]
fn test_release_between_ticks_gets_full_grace() {
    let mut rig = Rig::new(
        MpeEngine::builder()
            .voice_capacity(2)
            .release_mode(ReleaseMode::Acknowledged)
            .build()
            .unwrap(),
    );
    rig.skip(Duration::from_millis(2000));
    rig.send(&[MpeEvent::note_on(1, 60, 100), MpeEvent::note_off(1, 60, 64)]);

    rig.advance(Duration::from_millis(1));
    assert_eq!(rig.engine.pending_diagnostics(), 0);
    assert_eq!(rig.engine.pool().count_in(VoiceState::Releasing), 1);

    rig.advance(Duration::from_millis(499));
    let diagnostics: Vec<_> = rig.engine.drain_diagnostics().collect();
    assert_eq!(
        diagnostics,
        vec![Diagnostic::UnacknowledgedRelease {
            voice: VoiceIndex(0)
        }]
    );
}

#[test]
fn test_diagnostics_log_is_bounded() {
    let mut rig = Rig::new(
        MpeEngine::builder()
            .voice_capacity(1)
            .diagnostics_capacity(2)
            .build()
            .unwrap(),
    );
    for note in 60..65 {
        rig.send(&[MpeEvent::note_on(1, note, 100)]);
    }
    assert_eq!(rig.engine.pending_diagnostics(), 2);
    assert_eq!(rig.engine.discarded_diagnostics(), 2);
}

// ---------------------------------------------------------------------------
// Hardware
// ---------------------------------------------------------------------------

#[test]
fn test_instrument_change_cuts_all_voices_first() {
    let mut engine = test_engine(TEST_VOICES);
    let hardware = engine.connect_hardware();
    let mut out: Vec<VoiceCommand> = Vec::new();

    engine.process_bytes(
        Instant::now(),
        &bytes(&[
            MpeEvent::note_on(1, 60, 100),
            MpeEvent::note_on(2, 62, 100),
            MpeEvent::note_on(3, 64, 100),
            MpeEvent::note_off(3, 64, 0),
        ]),
        &mut out,
    );
    out.clear();

    hardware
        .try_send(HardwareEvent::InstrumentSelected(Instrument::Ring.index()))
        .unwrap();
    engine.tick(Instant::now(), &mut out);

    assert_eq!(kinds(&out), ["cut", "cut", "cut", "instrument"]);
    assert_eq!(out[3], VoiceCommand::InstrumentChanged(Instrument::Ring));
    assert_eq!(engine.pool().free_count(), TEST_VOICES);
    assert_eq!(engine.instrument(), Instrument::Ring);
}

#[test]
fn test_encoder_and_pot_through_queue() {
    let mut engine = test_engine(4);
    let hardware = engine.connect_hardware();
    let mut out: Vec<VoiceCommand> = Vec::new();

    let mut encoder = EncoderTracker::new(engine.instrument());
    let mut pot = VolumeFilter::new();
    pot.initial(10_000);

    for event in [encoder.read(-1), pot.event(40_000), pot.event(40_000)]
        .into_iter()
        .flatten()
    {
        hardware.try_send(event).unwrap();
    }
    engine.tick(Instant::now(), &mut out);

    assert_eq!(engine.instrument(), Instrument::Ring);
    assert_eq!(kinds(&out), ["instrument", "volume"]);
    assert!((engine.volume() - VolumeFilter::normalize(40_000)).abs() < 1e-6);
}

#[test]
fn test_mapping_backend_follows_instrument() {
    let mut engine = test_engine(4);
    let mut backend = MappingBackend::new(Vec::<VoiceCommand>::new(), engine.instrument());

    engine.handle_hardware(
        HardwareEvent::InstrumentSelected(Instrument::FilterMinimum.index()),
        &mut backend,
    );
    assert_eq!(backend.instrument(), Instrument::FilterMinimum);

    engine.process_bytes(
        Instant::now(),
        &bytes(&[MpeEvent::timbre(1, 127), MpeEvent::note_on(1, 60, 127)]),
        &mut backend,
    );
    let cutoff = backend.inner().iter().find_map(|c| match *c {
        VoiceCommand::Parameter {
            target: Target::FilterCutoff,
            value,
            ..
        } => Some(value),
        _ => None,
    });
    assert!((cutoff.unwrap() - 20000.0).abs() < 0.01);
}

#[test]
fn test_config_from_json() {
    let config: EngineConfig = serde_json::from_str(
        r#"{
            "voice_capacity": 6,
            "release_mode": "Acknowledged",
            "initial_zones": { "lower_members": 5, "upper_members": 5 },
            "initial_instrument": "Basic"
        }"#,
    )
    .unwrap();

    let engine = MpeEngine::new(config).unwrap();
    assert_eq!(engine.pool().capacity(), 6);
    assert_eq!(engine.instrument(), Instrument::Basic);
    assert_eq!(engine.current_zones().upper.unwrap().member_count, 5);
}
