//! Chip instance configuration.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};

/// PAL system clock in Hz.
pub const PAL_CLOCK: f64 = 985_248.0;

/// NTSC system clock in Hz.
pub const NTSC_CLOCK: f64 = 1_022_727.0;

/// Default host sample rate.
pub const DEFAULT_SAMPLE_RATE: f64 = 44_100.0;

pub const MIN_SAMPLE_RATE: f64 = 8_000.0;
pub const MAX_SAMPLE_RATE: f64 = 384_000.0;
pub const MIN_CLOCK_RATE: f64 = 100_000.0;
pub const MAX_CLOCK_RATE: f64 = 4_000_000.0;

/// Analogue-stage settings, each also settable through the IO surface.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalogConfig {
    /// Output gain applied after the volume register.
    pub gain: f32,
    /// Phase-rate spread between the independently detuned waveforms in
    /// multi-oscillator mode (fraction of the base increment).
    pub detune: f32,
    /// Fraction of the raw waveform that bleeds through a closed envelope.
    pub leakage: f32,
    /// Noise injected ahead of the filter, relative to full scale.
    pub sn_ratio: f32,
    /// Constant added ahead of the filter.
    pub dc_bias: f32,
    /// Feed-forward mix of the intermediate ladder poles (0 = pure 24 dB).
    pub pole_mix: f32,
}

impl AnalogConfig {
    pub const MAX_GAIN: f32 = 8.0;
    pub const MAX_DETUNE: f32 = 0.1;

    /// Clamp every field into its valid range.
    pub fn clamped(self) -> Self {
        Self {
            gain: self.gain.clamp(0.0, Self::MAX_GAIN),
            detune: self.detune.clamp(0.0, Self::MAX_DETUNE),
            leakage: self.leakage.clamp(0.0, 1.0),
            sn_ratio: self.sn_ratio.clamp(0.0, 1.0),
            dc_bias: self.dc_bias.clamp(-1.0, 1.0),
            pole_mix: self.pole_mix.clamp(0.0, 1.0),
        }
    }
}

impl Default for AnalogConfig {
    fn default() -> Self {
        Self {
            gain: 1.0,
            detune: 0.003,
            leakage: 0.002,
            sn_ratio: 0.0005,
            dc_bias: 1.0e-6,
            pole_mix: 0.0,
        }
    }
}

/// Configuration for one chip instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChipConfig {
    /// Host sample rate in Hz.
    pub sample_rate: f64,
    /// Nominal chip clock in Hz; frequency registers count in clock ticks.
    pub clock_rate: f64,
    pub analog: AnalogConfig,
}

impl Default for ChipConfig {
    fn default() -> Self {
        Self {
            sample_rate: DEFAULT_SAMPLE_RATE,
            clock_rate: PAL_CLOCK,
            analog: AnalogConfig::default(),
        }
    }
}

impl ChipConfig {
    pub fn with_sample_rate(sample_rate: f64) -> Self {
        Self {
            sample_rate,
            ..Default::default()
        }
    }

    pub fn validate(&self) -> Result<()> {
        if !(MIN_SAMPLE_RATE..=MAX_SAMPLE_RATE).contains(&self.sample_rate) {
            return Err(Error::InvalidConfig(format!(
                "sample_rate {} out of range (8000-384000 Hz)",
                self.sample_rate
            )));
        }
        if !(MIN_CLOCK_RATE..=MAX_CLOCK_RATE).contains(&self.clock_rate) {
            return Err(Error::InvalidConfig(format!(
                "clock_rate {} out of range (100000-4000000 Hz)",
                self.clock_rate
            )));
        }
        Ok(())
    }
}
