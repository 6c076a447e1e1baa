//! MpeEngine that owns every component and drives them from bytes.

use std::time::Instant;

use candide_midi::{
    midi_byte_channel_with_capacity, MidiByteConsumer, MidiByteProducer, MidiChannel, MidiParser,
    MpeEvent, ParserStats, ZoneId, ZoneManager, Zones,
};
use candide_synth::{
    ControllerTracker, Instrument, Lifecycle, SynthBackend, Voice, VoiceIndex, VoicePool,
};
use crossbeam_channel::{Receiver, Sender};

use crate::diagnostics::{Diagnostic, DiagnosticLog};
use crate::hardware::{hardware_channel, HardwareEvent};
use crate::{EngineConfig, Error, MpeEngineBuilder, Result};

/// The processing context: parser, zones, voice pool, controller tracker
/// and lifecycle, plus the instrument and volume selected from hardware.
///
/// Single-threaded and cooperative. Feed it bytes directly with
/// [`MpeEngine::process_bytes`], or connect the queues and call
/// [`MpeEngine::tick`] from the host loop.
///
/// # Example
///
/// ```
/// use candide::prelude::*;
/// use std::time::Instant;
///
/// let mut engine = MpeEngine::builder().voice_capacity(8).build().unwrap();
/// let mut backend: Vec<VoiceCommand> = Vec::new();
///
/// // Note on, per-note bend, note off on member channel 2
/// let now = Instant::now();
/// let bytes = [0x91, 60, 100, 0xE1, 0x00, 0x60, 0x81, 60, 64];
/// engine.process_bytes(now, &bytes, &mut backend);
/// assert_eq!(backend.len(), 3);
///
/// engine.tick(now, &mut backend);
/// ```
pub struct MpeEngine {
    config: EngineConfig,
    parser: MidiParser,
    zones: ZoneManager,
    pool: VoicePool,
    tracker: ControllerTracker,
    lifecycle: Lifecycle,
    diagnostics: DiagnosticLog,
    instrument: Instrument,
    volume: f32,
    now: Instant,
    midi_input: Option<MidiByteConsumer>,
    hardware_input: Option<Receiver<HardwareEvent>>,
}

impl MpeEngine {
    pub fn builder() -> MpeEngineBuilder {
        MpeEngineBuilder::default()
    }

    pub fn new(config: EngineConfig) -> Result<Self> {
        config.validate()?;
        let zones = ZoneManager::from_layout(config.initial_zones)?;
        let pool = VoicePool::try_new(config.voice_capacity)?;
        let tracker = ControllerTracker::new(config.thresholds, config.reset_policy);
        let lifecycle = Lifecycle::new(
            config.voice_capacity,
            config.release_mode,
            config.release_grace,
        );

        tracing::info!(
            "MPE engine ready: {} voices, {:?} release, instrument {}",
            config.voice_capacity,
            config.release_mode,
            config.initial_instrument.name()
        );

        Ok(Self {
            parser: MidiParser::new(),
            zones,
            pool,
            tracker,
            lifecycle,
            diagnostics: DiagnosticLog::new(config.diagnostics_capacity),
            instrument: config.initial_instrument,
            volume: 1.0,
            now: Instant::now(),
            midi_input: None,
            hardware_input: None,
            config,
        })
    }

    /// Create the inbound byte queue; the producer goes to the MIDI reader.
    /// Calling again replaces the previous queue.
    pub fn connect_midi(&mut self) -> MidiByteProducer {
        let (producer, consumer) = midi_byte_channel_with_capacity(self.config.midi_queue_capacity);
        self.midi_input = Some(consumer);
        producer
    }

    /// Create the hardware event queue; the sender goes to the scan loop.
    pub fn connect_hardware(&mut self) -> Sender<HardwareEvent> {
        let (sender, receiver) = hardware_channel(self.config.hardware_queue_capacity);
        self.hardware_input = Some(receiver);
        sender
    }

    // =========================================================================
    // Processing
    // =========================================================================

    /// One loop iteration: drain queued MIDI bytes and hardware events, then
    /// free releases whose grace period ended. Returns the number of MIDI
    /// events handled.
    pub fn tick<B: SynthBackend + ?Sized>(&mut self, now: Instant, backend: &mut B) -> usize {
        self.now = now;
        let mut handled = 0;

        if let Some(mut input) = self.midi_input.take() {
            let pending = input.pending_count();
            for byte in input.drain(pending) {
                if self.push_byte(byte, backend) {
                    handled += 1;
                }
            }
            self.midi_input = Some(input);
        }

        if let Some(hardware) = self.hardware_input.take() {
            while let Ok(event) = hardware.try_recv() {
                self.handle_hardware(event, backend);
            }
            self.hardware_input = Some(hardware);
        }

        self.expire(now);
        handled
    }

    /// Parse and handle `bytes` as received at `now`. Returns the number of
    /// events. Releases start their grace period at `now`.
    pub fn process_bytes<B: SynthBackend + ?Sized>(
        &mut self,
        now: Instant,
        bytes: &[u8],
        backend: &mut B,
    ) -> usize {
        self.now = now;
        bytes
            .iter()
            .filter(|&&byte| self.push_byte(byte, backend))
            .count()
    }

    fn push_byte<B: SynthBackend + ?Sized>(&mut self, byte: u8, backend: &mut B) -> bool {
        match self.parser.push(byte) {
            Some(event) => {
                self.handle_event(event, backend);
                true
            }
            None => false,
        }
    }

    /// Handle one decoded event received at `now`.
    pub fn process_event<B: SynthBackend + ?Sized>(
        &mut self,
        now: Instant,
        event: MpeEvent,
        backend: &mut B,
    ) {
        self.now = now;
        self.handle_event(event, backend);
    }

    fn handle_event<B: SynthBackend + ?Sized>(&mut self, event: MpeEvent, backend: &mut B) {
        match event {
            MpeEvent::NoteOn {
                channel,
                note,
                velocity,
            } => self.note_on(channel, note, velocity, backend),
            MpeEvent::NoteOff {
                channel,
                note,
                velocity,
            } => self.note_off(channel, note, velocity, backend),
            MpeEvent::PitchBend { channel, .. }
            | MpeEvent::ChannelPressure { channel, .. }
            | MpeEvent::Timbre { channel, .. }
            | MpeEvent::ControlChange { channel, .. } => {
                self.controller(channel, &event, backend);
            }
            MpeEvent::ZoneChange { zone, member_count } => {
                if let Err(err) = self.configure_zone(zone, member_count, backend) {
                    tracing::warn!("Zone change rejected: {}", err);
                    let reason = match err {
                        Error::Midi(candide_midi::Error::InvalidZoneConfig { reason, .. }) => {
                            reason
                        }
                        other => other.to_string(),
                    };
                    self.diagnostics.push(Diagnostic::ZoneRejected {
                        zone,
                        member_count,
                        reason,
                    });
                }
            }
            MpeEvent::PitchBendRange {
                channel,
                semitones,
                cents,
            } => {
                if let Err(err) = self.zones.set_pitch_bend_range(channel, semitones, cents) {
                    tracing::debug!("Ignoring bend range on ch {}: {}", channel, err);
                }
            }
            MpeEvent::ResetControllers { channel } => self.reset_controllers(channel, backend),
            MpeEvent::AllNotesOff => {
                self.all_notes_off(backend);
            }
        }
    }

    fn note_on<B: SynthBackend + ?Sized>(
        &mut self,
        channel: MidiChannel,
        note: u8,
        velocity: u8,
        backend: &mut B,
    ) {
        let Some(route) = self.zones.route(channel) else {
            tracing::debug!("Note {} on unassigned ch {} ignored", note, channel);
            return;
        };
        let Some(zone) = self.zones.zone(route.zone).copied() else {
            return;
        };

        let Some(outcome) = self.pool.on_note_on(channel, note, velocity, route.zone) else {
            self.diagnostics.push(Diagnostic::NoteDropped {
                zone: route.zone,
                note,
                channel,
            });
            return;
        };

        if let Some(steal) = outcome.steal() {
            self.lifecycle.cut(steal, backend);
            self.diagnostics.push(Diagnostic::VoiceStolen {
                voice: steal.voice,
                stolen_note: steal.note,
                stolen_channel: steal.channel,
                note,
                channel,
            });
        }

        let voice = outcome.voice();
        self.tracker.on_note_on(voice, route, &zone, &mut self.pool);
        self.lifecycle.activate(&mut self.pool, voice, backend);
    }

    fn note_off<B: SynthBackend + ?Sized>(
        &mut self,
        channel: MidiChannel,
        note: u8,
        velocity: u8,
        backend: &mut B,
    ) {
        if let Some(voice) = self.pool.on_note_off(channel, note, velocity) {
            self.lifecycle.release(&self.pool, voice, self.now, backend);
        }
    }

    fn controller<B: SynthBackend + ?Sized>(
        &mut self,
        channel: MidiChannel,
        event: &MpeEvent,
        backend: &mut B,
    ) {
        let Some(route) = self.zones.route(channel) else {
            tracing::trace!("Controller on unassigned ch {} ignored", channel);
            return;
        };
        let Some(zone) = self.zones.zone(route.zone).copied() else {
            return;
        };
        let updates = self.tracker.apply(event, route, &zone, &mut self.pool);
        self.lifecycle.update(&self.pool, &updates, backend);
    }

    fn reset_controllers<B: SynthBackend + ?Sized>(&mut self, channel: MidiChannel, backend: &mut B) {
        let Some(route) = self.zones.route(channel) else {
            return;
        };
        let Some(zone) = self.zones.zone(route.zone).copied() else {
            return;
        };
        let updates = self
            .tracker
            .reset_controllers(channel, route, &zone, &mut self.pool);
        self.lifecycle.update(&self.pool, &updates, backend);
    }

    /// Enable, resize or disable `zone`.
    ///
    /// Voices whose channel no longer belongs to the zone are cut. Channels
    /// that joined or left the zone lose their controller state; enabling or
    /// disabling the zone also resets its master baseline. On error nothing
    /// changes.
    pub fn configure_zone<B: SynthBackend + ?Sized>(
        &mut self,
        zone: ZoneId,
        member_count: u8,
        backend: &mut B,
    ) -> Result<()> {
        let before = self.zones.zone(zone).copied();
        self.zones
            .configure(zone, zone.master_channel(), member_count)?;
        let after = self.zones.zone(zone).copied();

        let mut orphaned = 0;
        for i in 0..self.pool.capacity() {
            let voice = VoiceIndex(i);
            let lost = self.pool.voice(voice).is_some_and(|v| {
                v.is_sounding()
                    && v.zone == zone
                    && self.zones.route(v.channel).map(|r| r.zone) != Some(zone)
            });
            if lost && self.lifecycle.force_release(&mut self.pool, voice, backend) {
                orphaned += 1;
            }
        }
        if orphaned > 0 {
            tracing::debug!("{:?} zone change cut {} voices", zone, orphaned);
        }

        let in_before = |ch: MidiChannel| before.is_some_and(|z| z.handles_channel(ch));
        let in_after = |ch: MidiChannel| after.is_some_and(|z| z.handles_channel(ch));
        if before.is_some() && after.is_some() {
            // Resize: surviving voices keep inheriting the same master values
            self.tracker
                .reset_channels((0..16).filter(|&ch| in_before(ch) != in_after(ch)));
        } else {
            self.tracker
                .reset_zone(zone, (0..16).filter(|&ch| in_before(ch) || in_after(ch)));
        }
        Ok(())
    }

    /// Cut every sounding voice. Returns how many were cut.
    pub fn all_notes_off<B: SynthBackend + ?Sized>(&mut self, backend: &mut B) -> usize {
        self.lifecycle.all_notes_off(&mut self.pool, backend)
    }

    /// The backend finished a release; the slot becomes Free.
    ///
    /// Returns `Ok(false)` if the voice was no longer Releasing.
    pub fn acknowledge_release(&mut self, voice: VoiceIndex) -> Result<bool> {
        self.pool.get(voice)?;
        Ok(self.lifecycle.acknowledge(&mut self.pool, voice))
    }

    fn expire(&mut self, now: Instant) {
        for voice in self.lifecycle.expire(&mut self.pool, now) {
            self.diagnostics
                .push(Diagnostic::UnacknowledgedRelease { voice });
        }
    }

    // =========================================================================
    // Hardware
    // =========================================================================

    /// Apply an instrument selection or volume change.
    ///
    /// Selecting a different instrument cuts every voice first.
    pub fn handle_hardware<B: SynthBackend + ?Sized>(&mut self, event: HardwareEvent, backend: &mut B) {
        match event {
            HardwareEvent::InstrumentSelected(index) => {
                let instrument = Instrument::from_index(index);
                if instrument == self.instrument {
                    return;
                }
                let cut = self.all_notes_off(backend);
                self.instrument = instrument;
                backend.instrument_changed(instrument);
                tracing::info!(
                    "Instrument changed to {} ({} voices cut)",
                    instrument.name(),
                    cut
                );
            }
            HardwareEvent::VolumeChanged(level) => {
                let level = level.clamp(0.0, 1.0);
                self.volume = level;
                backend.volume_changed(level);
                tracing::debug!("Volume {}", level);
            }
        }
    }

    // =========================================================================
    // Queries
    // =========================================================================

    #[inline]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    #[inline]
    pub fn current_zones(&self) -> Zones {
        self.zones.current_zones()
    }

    #[inline]
    pub fn zones(&self) -> &ZoneManager {
        &self.zones
    }

    #[inline]
    pub fn pool(&self) -> &VoicePool {
        &self.pool
    }

    #[inline]
    pub fn voice(&self, voice: VoiceIndex) -> Option<&Voice> {
        self.pool.voice(voice)
    }

    /// Allocating + Active voices.
    #[inline]
    pub fn active_count(&self) -> usize {
        self.pool.active_count()
    }

    #[inline]
    pub fn instrument(&self) -> Instrument {
        self.instrument
    }

    #[inline]
    pub fn volume(&self) -> f32 {
        self.volume
    }

    #[inline]
    pub fn parser_stats(&self) -> ParserStats {
        self.parser.stats()
    }

    pub fn pending_diagnostics(&self) -> usize {
        self.diagnostics.len()
    }

    /// Diagnostics lost because the log was full.
    pub fn discarded_diagnostics(&self) -> u64 {
        self.diagnostics.discarded()
    }

    /// Take every queued diagnostic, oldest first.
    pub fn drain_diagnostics(&mut self) -> impl Iterator<Item = Diagnostic> + '_ {
        self.diagnostics.drain()
    }
}

impl std::fmt::Debug for MpeEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MpeEngine")
            .field("zones", &self.zones.current_zones())
            .field("active", &self.pool.active_count())
            .field("capacity", &self.pool.capacity())
            .field("instrument", &self.instrument)
            .field("volume", &self.volume)
            .finish()
    }
}
