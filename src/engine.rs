//! SidneyEngine: the render-thread side of the engine.

use std::sync::Arc;

use ringbuf::{traits::*, HeapCons};
use sidney_core::{AtomicFloat, ChipConfig, ChipCore};
use sidney_synth::VoiceManager;
use tracing::{debug, warn};

use crate::handle::{AnalogParam, ControlMessage};
use crate::{Result, SidneyEngineBuilder};

/// The audio chip and the modulation chip.
///
/// The modulation chip is a full chip instance whose third voice runs free
/// as the LFO (`OSC3`) and modulation envelope (`ENV3`). Its output is never
/// mixed into the audio.
#[derive(Debug, Clone)]
pub struct ChipPair {
    audio: ChipCore,
    modulation: ChipCore,
}

impl ChipPair {
    pub fn new(config: ChipConfig) -> Result<Self> {
        Ok(Self {
            audio: ChipCore::new(config.clone())?,
            modulation: ChipCore::new(config)?,
        })
    }

    /// Start-of-block voice manager pass over both chips.
    #[inline]
    pub fn begin_block(&mut self, voices: &mut VoiceManager) -> Result<()> {
        voices.begin_block(&mut self.audio, &mut self.modulation)?;
        Ok(())
    }

    /// Per-sample voice manager pass.
    #[inline]
    pub fn drive(&mut self, voices: &mut VoiceManager) -> Result<()> {
        voices.tick(&mut self.audio, &self.modulation)?;
        Ok(())
    }

    /// Advance both chips one sample and return the audio chip's output.
    #[inline]
    pub fn clock(&mut self) -> f32 {
        let out = self.audio.clock();
        self.modulation.clock();
        out
    }

    pub fn reset(&mut self) {
        self.audio.reset();
        self.modulation.reset();
    }

    /// Change the clock of both chips, returning the applied rate.
    pub fn set_clock_rate(&mut self, clock_rate: f64) -> f64 {
        self.modulation.set_clock_rate(clock_rate);
        self.audio.set_clock_rate(clock_rate)
    }

    /// Change the host sample rate of both chips, returning the applied rate.
    pub fn set_sample_rate(&mut self, sample_rate: f64) -> f64 {
        self.modulation.set_sample_rate(sample_rate);
        self.audio.set_sample_rate(sample_rate)
    }

    pub fn audio(&self) -> &ChipCore {
        &self.audio
    }

    pub fn audio_mut(&mut self) -> &mut ChipCore {
        &mut self.audio
    }

    pub fn modulation(&self) -> &ChipCore {
        &self.modulation
    }

    pub fn modulation_mut(&mut self) -> &mut ChipCore {
        &mut self.modulation
    }
}

/// Render-thread engine: a [`ChipPair`] driven by a [`VoiceManager`].
///
/// Control messages queued by the [`SidneyHandle`](crate::SidneyHandle) are
/// applied at the start of each [`render`](Self::render) call, never inside
/// a block. `render` does not allocate or lock.
///
/// # Example
///
/// ```
/// use sidney::prelude::*;
///
/// let (mut engine, mut handle) = SidneyEngine::builder()
///     .sample_rate(48_000.0)
///     .key_mode(KeyMode::Mono)
///     .build()?;
///
/// handle.note_on(57, 110)?;
/// let mut block = vec![0.0f32; 256];
/// engine.render(&mut block);
/// assert!(block.iter().all(|s| s.is_finite()));
/// # Ok::<(), sidney::Error>(())
/// ```
pub struct SidneyEngine {
    chips: ChipPair,
    voices: VoiceManager,
    consumer: HeapCons<ControlMessage>,
    gain: Arc<AtomicFloat>,
}

impl SidneyEngine {
    pub fn builder() -> SidneyEngineBuilder {
        SidneyEngineBuilder::default()
    }

    pub(crate) fn new(
        chips: ChipPair,
        voices: VoiceManager,
        consumer: HeapCons<ControlMessage>,
        gain: Arc<AtomicFloat>,
    ) -> Self {
        Self {
            chips,
            voices,
            consumer,
            gain,
        }
    }

    /// Fill `out` with the next block of samples.
    pub fn render(&mut self, out: &mut [f32]) {
        self.drain_messages();

        if let Err(err) = self.chips.begin_block(&mut self.voices) {
            warn!(%err, "voice block setup failed");
        }

        let gain = self.gain.get();
        for sample in out.iter_mut() {
            if let Err(err) = self.chips.drive(&mut self.voices) {
                warn!(%err, "voice update failed");
            }
            *sample = self.chips.clock() * gain;
        }
    }

    fn drain_messages(&mut self) {
        while let Some(msg) = self.consumer.try_pop() {
            if let Err(err) = self.apply(msg) {
                warn!(%err, ?msg, "control message rejected");
            }
        }
    }

    fn apply(&mut self, msg: ControlMessage) -> Result<()> {
        match msg {
            ControlMessage::Event(event) => self.voices.handle_event(event)?,
            ControlMessage::KeyMode(mode) => self.voices.set_key_mode(mode),
            ControlMessage::Split(key) => self.voices.set_split(key),
            ControlMessage::Register { addr, value } => {
                self.chips.audio_mut().write_register(addr, value)?;
            }
            ControlMessage::ClockRate(rate) => {
                let rate = self.chips.set_clock_rate(rate);
                self.voices.set_clock_rate(rate);
                debug!(rate, "clock rate changed");
            }
            ControlMessage::Analog { param, value } => {
                let audio = self.chips.audio_mut();
                let applied = match param {
                    AnalogParam::Gain => audio.set_gain(value),
                    AnalogParam::Detune => audio.set_detune(value),
                    AnalogParam::Leakage => audio.set_leakage(value),
                    AnalogParam::SnRatio => audio.set_sn_ratio(value),
                    AnalogParam::DcBias => audio.set_dc_bias(value),
                    AnalogParam::PoleMix => audio.set_pole_mix(value),
                };
                debug!(?param, value, applied, "analog setting");
            }
            ControlMessage::SampleRate(rate) => {
                self.set_sample_rate(rate);
            }
            ControlMessage::Reset => {
                self.chips.reset();
                self.voices.reload();
            }
        }
        Ok(())
    }

    /// Follow a host sample-rate change on the chips and the voice manager.
    /// Returns the applied (clamped) rate.
    pub fn set_sample_rate(&mut self, sample_rate: f64) -> f64 {
        let rate = self.chips.set_sample_rate(sample_rate);
        self.voices.set_sample_rate(rate);
        debug!(rate, "sample rate changed");
        rate
    }

    pub fn chips(&self) -> &ChipPair {
        &self.chips
    }

    pub fn voices(&self) -> &VoiceManager {
        &self.voices
    }

    pub fn sample_rate(&self) -> f64 {
        self.chips.audio().config().sample_rate
    }

    /// Current master gain.
    pub fn gain(&self) -> f32 {
        self.gain.get()
    }
}

impl std::fmt::Debug for SidneyEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SidneyEngine")
            .field("sample_rate", &self.sample_rate())
            .field("key_mode", &self.voices.key_mode())
            .field("gain", &self.gain())
            .finish()
    }
}
