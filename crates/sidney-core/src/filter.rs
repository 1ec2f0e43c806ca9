//! Analogue filter stage.
//!
//! Two topologies share the cutoff/resonance/mode registers:
//! - **State-variable** (default, 12 dB/oct): a 2x oversampled Chamberlin
//!   filter with simultaneous low/band/high-pass taps combined per mode bits.
//! - **Ladder** (24 dB/oct): five cascaded one-pole sections with
//!   frequency and amplitude pre-correction. Resonance is fed back from the
//!   fourth pole, the fifth smooths the top octave, and a feed-forward mix
//!   of the intermediate poles softens the roll-off. The output is averaged
//!   with the previous one to compensate the half-sample delay.
//!
//! Both inject a little noise (signal-to-noise emulation) and a DC bias
//! ahead of the filter so the recursions never sit on exact zero.

use crate::config::AnalogConfig;
use crate::registers::FilterMode;
use std::f32::consts::PI;

/// Largest 11-bit cutoff register value.
pub const CUTOFF_MAX: u16 = 0x7FF;

/// Cutoff at register value 0.
pub const MIN_CUTOFF_HZ: f32 = 30.0;

/// Cutoff at register value 0x7FF.
pub const MAX_CUTOFF_HZ: f32 = 12_000.0;

/// Ladder resonance feedback at full resonance.
const LADDER_MAX_FEEDBACK: f32 = 3.9;

/// Highest cutoff relative to the sample rate either topology is run at.
const MAX_CUTOFF_RATIO: f32 = 0.45;

/// Margin kept below the state-variable stability limit.
const SVF_STABILITY_MARGIN: f32 = 0.9;

/// Cutoff of the fifth ladder pole relative to the other four.
const LADDER_TOP_POLE_RATIO: f32 = 2.0;

/// One-pole coefficient for `fc` with matched frequency pre-correction.
#[inline]
fn one_pole_coefficient(fc: f32, sample_rate: f32) -> f32 {
    1.0 - (-2.0 * PI * fc / sample_rate).exp()
}

/// Normalized cutoff (0..1) to Hz.
#[inline]
pub fn cutoff_to_hz(norm: f32) -> f32 {
    MIN_CUTOFF_HZ * (MAX_CUTOFF_HZ / MIN_CUTOFF_HZ).powf(norm.clamp(0.0, 1.0))
}

/// Filter topology, selected by the engine control register.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Topology {
    #[default]
    StateVariable,
    Ladder,
}

/// Persistent filter memory.
///
/// `delay` holds low/band/high/previous-input for the state-variable
/// topology, and the five poles plus the previous output for the ladder.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FilterState {
    /// Normalized cutoff (0..1).
    pub cutoff: f32,
    /// Normalized resonance (0..1).
    pub resonance: f32,
    pub delay: [f32; 6],
}

#[derive(Debug, Clone)]
pub struct AnalogFilter {
    state: FilterState,
    topology: Topology,
    mode: FilterMode,
    sample_rate: f32,
    sn_ratio: f32,
    dc_bias: f32,
    pole_mix: f32,
    // Derived coefficients
    svf_f: f32,
    svf_q: f32,
    ladder_g: f32,
    ladder_top_g: f32,
    ladder_k: f32,
}

impl AnalogFilter {
    pub fn new(sample_rate: f64, analog: &AnalogConfig) -> Self {
        let mut filter = Self {
            state: FilterState::default(),
            topology: Topology::StateVariable,
            mode: FilterMode::empty(),
            sample_rate: sample_rate as f32,
            sn_ratio: analog.sn_ratio,
            dc_bias: analog.dc_bias,
            pole_mix: analog.pole_mix,
            svf_f: 0.0,
            svf_q: 0.0,
            ladder_g: 0.0,
            ladder_top_g: 0.0,
            ladder_k: 0.0,
        };
        filter.update_coefficients();
        filter
    }

    /// Set the 11-bit cutoff register value.
    pub fn set_cutoff_register(&mut self, cutoff: u16) {
        self.state.cutoff = cutoff.min(CUTOFF_MAX) as f32 / CUTOFF_MAX as f32;
        self.update_coefficients();
    }

    /// Set the 4-bit resonance nibble.
    pub fn set_resonance(&mut self, nibble: u8) {
        self.state.resonance = (nibble & 0x0F) as f32 / 15.0;
        self.update_coefficients();
    }

    pub fn set_mode(&mut self, mode: FilterMode) {
        self.mode = mode;
    }

    pub fn set_topology(&mut self, topology: Topology) {
        if topology != self.topology {
            self.topology = topology;
            self.state.delay = [0.0; 6];
        }
    }

    pub fn set_sample_rate(&mut self, sample_rate: f64) {
        self.sample_rate = sample_rate as f32;
        self.update_coefficients();
    }

    pub fn set_sn_ratio(&mut self, ratio: f32) {
        self.sn_ratio = ratio;
    }

    pub fn set_dc_bias(&mut self, bias: f32) {
        self.dc_bias = bias;
    }

    pub fn set_pole_mix(&mut self, mix: f32) {
        self.pole_mix = mix;
    }

    /// Forget all delay memory.
    pub fn clear(&mut self) {
        self.state.delay = [0.0; 6];
    }

    /// Normalized cutoff (register / 0x7FF).
    #[inline]
    pub fn cutoff(&self) -> f32 {
        self.state.cutoff
    }

    /// Nearest 11-bit register encoding of the decoded cutoff.
    #[inline]
    pub fn cutoff_register(&self) -> u16 {
        (self.state.cutoff * CUTOFF_MAX as f32).round() as u16
    }

    #[inline]
    pub fn cutoff_hz(&self) -> f32 {
        cutoff_to_hz(self.state.cutoff)
    }

    #[inline]
    pub fn resonance(&self) -> f32 {
        self.state.resonance
    }

    pub fn topology(&self) -> Topology {
        self.topology
    }

    pub fn mode(&self) -> FilterMode {
        self.mode
    }

    pub fn state(&self) -> &FilterState {
        &self.state
    }

    fn update_coefficients(&mut self) {
        let fc = self.cutoff_hz().min(self.sample_rate * MAX_CUTOFF_RATIO);
        let res = self.state.resonance;

        // Run at twice the host rate. Stable only while f^2 + 2fq < 4.
        let q = 1.4 * (1.0 - res) + 0.1;
        let f_limit = SVF_STABILITY_MARGIN * ((q * q + 4.0).sqrt() - q);
        self.svf_f = (2.0 * (PI * fc / (2.0 * self.sample_rate)).sin()).min(f_limit);
        self.svf_q = q;

        let g = one_pole_coefficient(fc, self.sample_rate);
        let top_fc = (fc * LADDER_TOP_POLE_RATIO).min(self.sample_rate * MAX_CUTOFF_RATIO);
        self.ladder_g = g;
        self.ladder_top_g = one_pole_coefficient(top_fc, self.sample_rate);
        // Amplitude pre-correction: less feedback is needed as g grows
        self.ladder_k = LADDER_MAX_FEEDBACK * res * (1.0 - 0.15 * g * g);
    }

    /// Filter one pre-mixed sample. `noise` is a bipolar noise tap.
    #[inline]
    pub fn process(&mut self, input: f32, noise: f32) -> f32 {
        let input = input + noise * self.sn_ratio + self.dc_bias;
        let (low, band, high) = match self.topology {
            Topology::StateVariable => self.process_svf(input),
            Topology::Ladder => self.process_ladder(input),
        };

        let mut out = 0.0;
        if self.mode.contains(FilterMode::LOW_PASS) {
            out += low;
        }
        if self.mode.contains(FilterMode::BAND_PASS) {
            out += band;
        }
        if self.mode.contains(FilterMode::HIGH_PASS) {
            out += high;
        }
        out
    }

    #[inline]
    fn process_svf(&mut self, input: f32) -> (f32, f32, f32) {
        let f = self.svf_f;
        let q = self.svf_q;
        let s = &mut self.state.delay;
        let halfway = 0.5 * (s[3] + input);
        for x in [halfway, input] {
            s[0] += f * s[1];
            s[2] = x - s[0] - q * s[1];
            s[1] += f * s[2];
        }
        s[3] = input;
        (s[0], s[1], s[2])
    }

    #[inline]
    fn process_ladder(&mut self, input: f32) -> (f32, f32, f32) {
        let g = self.ladder_g;
        let top_g = self.ladder_top_g;
        let k = self.ladder_k;
        let mix = self.pole_mix;
        let s = &mut self.state.delay;

        // Passband gain compensation for the resonance feedback
        let x = (input * (1.0 + 0.5 * k) - k * s[3]).tanh();
        s[0] += g * (x - s[0]);
        s[1] += g * (s[0] - s[1]);
        s[2] += g * (s[1] - s[2]);
        s[3] += g * (s[2] - s[3]);
        s[4] += top_g * (s[3] - s[4]);

        let fed_forward = (1.0 - mix) * s[4] + mix * 0.5 * (s[1] + s[2]);
        let low = 0.5 * (fed_forward + s[5]);
        s[5] = fed_forward;

        (low, s[1] - s[3], x - s[3])
    }
}
