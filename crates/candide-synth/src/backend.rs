//! Outbound interface to the synthesis backend.
//!
//! The backend renders audio; this crate only tells it which voice starts,
//! changes or stops. [`VoiceCommand`] is the same interface as data, so a
//! backend on another thread can be fed through [`voice_command_channel`]
//! without ever sharing the voice pool.

use ringbuf::{traits::*, HeapCons, HeapProd, HeapRb};
use serde::{Deserialize, Serialize};

use crate::expression::{Expression, VoiceUpdate};
use crate::instrument::Instrument;
use crate::mapping::Target;
use crate::voice::VoiceIndex;

const DEFAULT_CAPACITY: usize = 256;

/// Receives one call per voice lifecycle transition.
pub trait SynthBackend {
    /// A voice starts sounding with its initial expression.
    fn allocate(&mut self, voice: VoiceIndex, note: u8, velocity: u8, initial: Expression);

    /// Only the changed fields are set.
    fn update(&mut self, voice: VoiceIndex, update: VoiceUpdate);

    /// `cut` asks for immediate silence (steal, all-notes-off) instead of
    /// the normal release stage.
    fn release(&mut self, voice: VoiceIndex, velocity: u8, cut: bool);

    /// A mapped synthesis parameter, see [`crate::MappingBackend`].
    fn set_parameter(&mut self, _voice: VoiceIndex, _target: Target, _value: f32) {}

    fn instrument_changed(&mut self, _instrument: Instrument) {}

    /// Master volume, 0.0..=1.0.
    fn volume_changed(&mut self, _level: f32) {}
}

impl<B: SynthBackend + ?Sized> SynthBackend for &mut B {
    fn allocate(&mut self, voice: VoiceIndex, note: u8, velocity: u8, initial: Expression) {
        (**self).allocate(voice, note, velocity, initial)
    }

    fn update(&mut self, voice: VoiceIndex, update: VoiceUpdate) {
        (**self).update(voice, update)
    }

    fn release(&mut self, voice: VoiceIndex, velocity: u8, cut: bool) {
        (**self).release(voice, velocity, cut)
    }

    fn set_parameter(&mut self, voice: VoiceIndex, target: Target, value: f32) {
        (**self).set_parameter(voice, target, value)
    }

    fn instrument_changed(&mut self, instrument: Instrument) {
        (**self).instrument_changed(instrument)
    }

    fn volume_changed(&mut self, level: f32) {
        (**self).volume_changed(level)
    }
}

/// One backend call, stamped with the voice index it addresses.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub enum VoiceCommand {
    Allocate {
        voice: VoiceIndex,
        note: u8,
        velocity: u8,
        initial: Expression,
    },
    Update {
        voice: VoiceIndex,
        update: VoiceUpdate,
    },
    Release {
        voice: VoiceIndex,
        velocity: u8,
        cut: bool,
    },
    Parameter {
        voice: VoiceIndex,
        target: Target,
        value: f32,
    },
    InstrumentChanged(Instrument),
    VolumeChanged(f32),
}

impl VoiceCommand {
    #[inline]
    pub fn voice(&self) -> Option<VoiceIndex> {
        match *self {
            VoiceCommand::Allocate { voice, .. }
            | VoiceCommand::Update { voice, .. }
            | VoiceCommand::Release { voice, .. }
            | VoiceCommand::Parameter { voice, .. } => Some(voice),
            VoiceCommand::InstrumentChanged(_) | VoiceCommand::VolumeChanged(_) => None,
        }
    }

    #[inline]
    pub fn is_cut(&self) -> bool {
        matches!(self, VoiceCommand::Release { cut: true, .. })
    }

    /// Replay this command into `backend`.
    pub fn dispatch<B: SynthBackend + ?Sized>(self, backend: &mut B) {
        match self {
            VoiceCommand::Allocate {
                voice,
                note,
                velocity,
                initial,
            } => backend.allocate(voice, note, velocity, initial),
            VoiceCommand::Update { voice, update } => backend.update(voice, update),
            VoiceCommand::Release {
                voice,
                velocity,
                cut,
            } => backend.release(voice, velocity, cut),
            VoiceCommand::Parameter {
                voice,
                target,
                value,
            } => backend.set_parameter(voice, target, value),
            VoiceCommand::InstrumentChanged(instrument) => backend.instrument_changed(instrument),
            VoiceCommand::VolumeChanged(level) => backend.volume_changed(level),
        }
    }
}

/// Records every call; handy for tests and offline inspection.
impl SynthBackend for Vec<VoiceCommand> {
    fn allocate(&mut self, voice: VoiceIndex, note: u8, velocity: u8, initial: Expression) {
        self.push(VoiceCommand::Allocate {
            voice,
            note,
            velocity,
            initial,
        });
    }

    fn update(&mut self, voice: VoiceIndex, update: VoiceUpdate) {
        self.push(VoiceCommand::Update { voice, update });
    }

    fn release(&mut self, voice: VoiceIndex, velocity: u8, cut: bool) {
        self.push(VoiceCommand::Release {
            voice,
            velocity,
            cut,
        });
    }

    fn set_parameter(&mut self, voice: VoiceIndex, target: Target, value: f32) {
        self.push(VoiceCommand::Parameter {
            voice,
            target,
            value,
        });
    }

    fn instrument_changed(&mut self, instrument: Instrument) {
        self.push(VoiceCommand::InstrumentChanged(instrument));
    }

    fn volume_changed(&mut self, level: f32) {
        self.push(VoiceCommand::VolumeChanged(level));
    }
}

/// Producer side -- owned by the processing loop, used as its backend.
pub struct VoiceCommandProducer {
    producer: HeapProd<VoiceCommand>,
    dropped: u64,
}

impl VoiceCommandProducer {
    /// Returns `false` if the mailbox is full.
    #[inline]
    pub fn push(&mut self, command: VoiceCommand) -> bool {
        if self.producer.try_push(command).is_ok() {
            return true;
        }
        self.dropped += 1;
        tracing::warn!(
            "Voice command mailbox full, dropped {:?} ({} total)",
            command,
            self.dropped
        );
        false
    }

    /// Commands lost to a full mailbox.
    #[inline]
    pub fn dropped(&self) -> u64 {
        self.dropped
    }
}

impl SynthBackend for VoiceCommandProducer {
    fn allocate(&mut self, voice: VoiceIndex, note: u8, velocity: u8, initial: Expression) {
        self.push(VoiceCommand::Allocate {
            voice,
            note,
            velocity,
            initial,
        });
    }

    fn update(&mut self, voice: VoiceIndex, update: VoiceUpdate) {
        self.push(VoiceCommand::Update { voice, update });
    }

    fn release(&mut self, voice: VoiceIndex, velocity: u8, cut: bool) {
        self.push(VoiceCommand::Release {
            voice,
            velocity,
            cut,
        });
    }

    fn set_parameter(&mut self, voice: VoiceIndex, target: Target, value: f32) {
        self.push(VoiceCommand::Parameter {
            voice,
            target,
            value,
        });
    }

    fn instrument_changed(&mut self, instrument: Instrument) {
        self.push(VoiceCommand::InstrumentChanged(instrument));
    }

    fn volume_changed(&mut self, level: f32) {
        self.push(VoiceCommand::VolumeChanged(level));
    }
}

/// Consumer side -- drained by the audio thread.
pub struct VoiceCommandConsumer {
    consumer: HeapCons<VoiceCommand>,
}

impl VoiceCommandConsumer {
    #[inline]
    pub fn pop(&mut self) -> Option<VoiceCommand> {
        self.consumer.try_pop()
    }

    /// Replay everything queued into `backend`, in order. Returns the count.
    pub fn dispatch_all<B: SynthBackend + ?Sized>(&mut self, backend: &mut B) -> usize {
        let mut count = 0;
        while let Some(command) = self.consumer.try_pop() {
            command.dispatch(backend);
            count += 1;
        }
        count
    }

    #[inline]
    pub fn has_pending(&self) -> bool {
        !self.consumer.is_empty()
    }

    #[inline]
    pub fn pending_count(&self) -> usize {
        self.consumer.occupied_len()
    }
}

pub fn voice_command_channel() -> (VoiceCommandProducer, VoiceCommandConsumer) {
    voice_command_channel_with_capacity(DEFAULT_CAPACITY)
}

pub fn voice_command_channel_with_capacity(
    capacity: usize,
) -> (VoiceCommandProducer, VoiceCommandConsumer) {
    let rb = HeapRb::new(capacity.max(1));
    let (producer, consumer) = rb.split();
    (
        VoiceCommandProducer {
            producer,
            dropped: 0,
        },
        VoiceCommandConsumer { consumer },
    )
}
