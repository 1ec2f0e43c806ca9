//! Control-thread handle and the messages it sends to the render thread.

use std::sync::Arc;

use midi_msg::ChannelVoiceMsg;
use ringbuf::{traits::*, HeapProd};
use sidney_core::AtomicFloat;
use sidney_synth::{KeyMode, SynthEvent};
use tracing::warn;

use crate::{Error, Result};

/// Largest master gain the handle accepts.
pub const MAX_MASTER_GAIN: f32 = 4.0;

/// Analogue-stage setting applied to the audio chip.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnalogParam {
    Gain,
    Detune,
    Leakage,
    SnRatio,
    DcBias,
    PoleMix,
}

/// One change handed from the control thread to the render thread.
///
/// Messages are applied in order, in full, before the next block renders.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ControlMessage {
    Event(SynthEvent),
    KeyMode(KeyMode),
    Split(u8),
    /// Raw register write on the audio chip.
    Register { addr: u8, value: u8 },
    Analog { param: AnalogParam, value: f32 },
    /// Chip clock in Hz, applied to both chips and the voice manager.
    ClockRate(f64),
    /// Host sample rate in Hz, applied to both chips and the voice manager.
    SampleRate(f64),
    /// Reset both chips and reload the current patch.
    Reset,
}

/// Control-side handle to a [`SidneyEngine`](crate::SidneyEngine).
///
/// Every method is wait-free. When the queue is full the message is dropped,
/// logged and reported as [`Error::QueueFull`].
///
/// # Example
/// ```
/// use sidney::prelude::*;
///
/// let (mut engine, mut handle) = SidneyEngine::builder().build()?;
/// handle.note_on(60, 100)?;
///
/// let mut block = [0.0f32; 128];
/// engine.render(&mut block);
/// assert_eq!(engine.voices().held_keys(), 1);
/// # Ok::<(), sidney::Error>(())
/// ```
pub struct SidneyHandle {
    producer: HeapProd<ControlMessage>,
    gain: Arc<AtomicFloat>,
}

impl SidneyHandle {
    pub(crate) fn new(producer: HeapProd<ControlMessage>, gain: Arc<AtomicFloat>) -> Self {
        Self { producer, gain }
    }

    /// Queue a message for the next block.
    pub fn send(&mut self, msg: ControlMessage) -> Result<()> {
        if let Err(msg) = self.producer.try_push(msg) {
            warn!(?msg, "control queue full, message dropped");
            return Err(Error::QueueFull);
        }
        Ok(())
    }

    pub fn note_on(&mut self, key: u8, velocity: u8) -> Result<()> {
        self.send(ControlMessage::Event(SynthEvent::NoteOn { key, velocity }))
    }

    pub fn note_off(&mut self, key: u8) -> Result<()> {
        self.send(ControlMessage::Event(SynthEvent::NoteOff { key, velocity: 0 }))
    }

    /// Pitch bend, -1..1 of the bend range.
    pub fn pitch_bend(&mut self, amount: f32) -> Result<()> {
        self.send(ControlMessage::Event(SynthEvent::PitchBend(amount)))
    }

    /// Controller-map change with a normalized value.
    pub fn control(&mut self, index: u16, value: f32) -> Result<()> {
        self.send(ControlMessage::Event(SynthEvent::Control { index, value }))
    }

    /// Forward a MIDI channel voice message. Messages the voice manager has
    /// no use for are ignored.
    pub fn midi(&mut self, msg: &ChannelVoiceMsg) -> Result<()> {
        match SynthEvent::from_midi(msg) {
            Some(event) => self.send(ControlMessage::Event(event)),
            None => Ok(()),
        }
    }

    pub fn key_mode(&mut self, mode: KeyMode) -> Result<()> {
        self.send(ControlMessage::KeyMode(mode))
    }

    pub fn split(&mut self, key: u8) -> Result<()> {
        self.send(ControlMessage::Split(key))
    }

    pub fn write_register(&mut self, addr: u8, value: u8) -> Result<()> {
        self.send(ControlMessage::Register { addr, value })
    }

    pub fn analog(&mut self, param: AnalogParam, value: f32) -> Result<()> {
        self.send(ControlMessage::Analog { param, value })
    }

    pub fn clock_rate(&mut self, clock_rate: f64) -> Result<()> {
        self.send(ControlMessage::ClockRate(clock_rate))
    }

    pub fn sample_rate(&mut self, sample_rate: f64) -> Result<()> {
        self.send(ControlMessage::SampleRate(sample_rate))
    }

    pub fn reset(&mut self) -> Result<()> {
        self.send(ControlMessage::Reset)
    }

    /// Set the master gain. Takes effect at the next block.
    pub fn set_gain(&self, gain: f32) -> f32 {
        self.gain.set_clamped(gain, 0.0, MAX_MASTER_GAIN)
    }

    pub fn gain(&self) -> f32 {
        self.gain.get()
    }

    /// Messages queued but not yet applied.
    pub fn pending(&self) -> usize {
        self.producer.occupied_len()
    }
}

impl std::fmt::Debug for SidneyHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SidneyHandle")
            .field("pending", &self.pending())
            .field("gain", &self.gain())
            .finish()
    }
}
