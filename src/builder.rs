//! Builder for configuring and constructing a `SidneyEngine`.

use std::sync::Arc;

use ringbuf::{traits::*, HeapRb};
use sidney_core::{AnalogConfig, AtomicFloat, ChipConfig, DEFAULT_SAMPLE_RATE, PAL_CLOCK};
use sidney_synth::{KeyMode, VoiceManager, VoiceManagerConfig, DEFAULT_MOD_BLOCK};
use tracing::info;

use crate::engine::ChipPair;
use crate::handle::ControlMessage;
use crate::{Result, SidneyEngine, SidneyHandle};

/// Default capacity of the control queue, in messages.
pub const DEFAULT_QUEUE_CAPACITY: usize = 1024;

/// Builds a [`SidneyEngine`] and its [`SidneyHandle`].
///
/// The engine goes to the render thread, the handle to the control thread.
///
/// # Example
///
/// ```
/// use sidney::prelude::*;
///
/// let (engine, handle) = SidneyEngine::builder()
///     .sample_rate(48_000.0)
///     .clock_rate(NTSC_CLOCK)
///     .key_mode(KeyMode::Poly3)
///     .queue_capacity(64)
///     .build()?;
///
/// assert_eq!(engine.sample_rate(), 48_000.0);
/// assert_eq!(handle.pending(), 0);
/// # Ok::<(), sidney::Error>(())
/// ```
#[derive(Debug, Clone)]
pub struct SidneyEngineBuilder {
    sample_rate: f64,
    clock_rate: f64,
    key_mode: KeyMode,
    queue_capacity: usize,
    mod_block: usize,
    analog: AnalogConfig,
}

impl Default for SidneyEngineBuilder {
    fn default() -> Self {
        Self {
            sample_rate: DEFAULT_SAMPLE_RATE,
            clock_rate: PAL_CLOCK,
            key_mode: KeyMode::default(),
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            mod_block: DEFAULT_MOD_BLOCK,
            analog: AnalogConfig::default(),
        }
    }
}

impl SidneyEngineBuilder {
    /// Default: 44100
    pub fn sample_rate(mut self, sample_rate: f64) -> Self {
        self.sample_rate = sample_rate;
        self
    }

    /// Default: PAL clock
    pub fn clock_rate(mut self, clock_rate: f64) -> Self {
        self.clock_rate = clock_rate;
        self
    }

    /// Default: `Poly1`
    pub fn key_mode(mut self, key_mode: KeyMode) -> Self {
        self.key_mode = key_mode;
        self
    }

    /// Messages the control queue holds before sends fail. Minimum 1.
    pub fn queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity;
        self
    }

    /// Samples between modulation updates. Default: 16
    pub fn mod_block(mut self, samples: usize) -> Self {
        self.mod_block = samples;
        self
    }

    /// Analogue-stage settings of the audio chip. Out-of-range fields are clamped.
    pub fn analog(mut self, analog: AnalogConfig) -> Self {
        self.analog = analog;
        self
    }

    pub fn build(self) -> Result<(SidneyEngine, SidneyHandle)> {
        let chip_config = ChipConfig {
            sample_rate: self.sample_rate,
            clock_rate: self.clock_rate,
            analog: self.analog,
        };
        chip_config.validate()?;
        let chips = ChipPair::new(chip_config)?;

        let mut voices = VoiceManager::new(VoiceManagerConfig {
            sample_rate: self.sample_rate,
            clock_rate: self.clock_rate,
            mod_block: self.mod_block,
        })?;
        voices.set_key_mode(self.key_mode);

        let rb = HeapRb::<ControlMessage>::new(self.queue_capacity.max(1));
        let (producer, consumer) = rb.split();
        let gain = Arc::new(AtomicFloat::new(1.0));

        info!(
            sample_rate = self.sample_rate,
            clock_rate = self.clock_rate,
            key_mode = ?self.key_mode,
            "engine built"
        );

        Ok((
            SidneyEngine::new(chips, voices, consumer, Arc::clone(&gain)),
            SidneyHandle::new(producer, gain),
        ))
    }
}
