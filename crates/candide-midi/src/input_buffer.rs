//! Lock-free byte queue between a MIDI transport and the processing loop.

use ringbuf::{traits::*, HeapCons, HeapProd, HeapRb};

const DEFAULT_CAPACITY: usize = 1024;

/// Producer side -- push raw bytes from the transport (UART/USB callback).
pub struct MidiByteProducer {
    producer: HeapProd<u8>,
}

impl MidiByteProducer {
    /// Returns `false` if the ring buffer is full and the byte was dropped.
    #[inline]
    pub fn push(&mut self, byte: u8) -> bool {
        self.producer.try_push(byte).is_ok()
    }

    /// Pushes as many bytes as fit; returns how many were accepted.
    #[inline]
    pub fn push_slice(&mut self, bytes: &[u8]) -> usize {
        self.producer.push_slice(bytes)
    }

    #[inline]
    pub fn free_len(&self) -> usize {
        self.producer.vacant_len()
    }
}

/// Consumer side -- drained by the processing loop.
pub struct MidiByteConsumer {
    consumer: HeapCons<u8>,
}

impl MidiByteConsumer {
    #[inline]
    pub fn pop(&mut self) -> Option<u8> {
        self.consumer.try_pop()
    }

    /// Pops up to `max` bytes, stopping early once the queue is empty.
    pub fn drain(&mut self, max: usize) -> impl Iterator<Item = u8> + '_ {
        let consumer = &mut self.consumer;
        (0..max).map_while(move |_| consumer.try_pop())
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

pub fn midi_byte_channel() -> (MidiByteProducer, MidiByteConsumer) {
    midi_byte_channel_with_capacity(DEFAULT_CAPACITY)
}

pub fn midi_byte_channel_with_capacity(capacity: usize) -> (MidiByteProducer, MidiByteConsumer) {
    let rb = HeapRb::new(capacity.max(1));
    let (producer, consumer) = rb.split();
    (MidiByteProducer { producer }, MidiByteConsumer { consumer })
}
