//! One oscillator + envelope + noise bundle.

use crate::envelope::{EnvelopeGenerator, RateTable, ENVELOPE_MAX};
use crate::noise::NoiseGenerator;
use crate::oscillator::{self, Bank, Oscillator, WAVE_MAX, WAVE_ZERO};
use crate::registers::VoiceControl;

/// 12-bit waveform value to a bipolar float.
#[inline]
fn centered(wave: u16) -> f32 {
    (wave as f32 - WAVE_ZERO as f32) / WAVE_ZERO as f32
}

/// How selected waveforms are combined.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MixMode {
    /// Bitwise AND of the selected waveforms, as the hardware multiplexes them.
    #[default]
    And,
    /// Each waveform from its own detuned accumulator, averaged.
    Multi,
}

/// State of the ring-modulating/syncing neighbour, sampled before rendering.
#[derive(Debug, Clone, Copy, Default)]
pub struct Neighbour {
    pub msb: bool,
    pub msb_rising: bool,
    pub previous: f32,
}

/// A single chip voice.
#[derive(Debug, Clone)]
pub struct Voice {
    pub(crate) oscillator: Oscillator,
    pub(crate) envelope: EnvelopeGenerator,
    pub(crate) noise: NoiseGenerator,
    control: VoiceControl,
    /// Last 12-bit waveform value (feeds the OSC3 tap).
    wave: u16,
    output: f32,
    previous: f32,
    seed: u32,
}

impl Voice {
    pub fn new(index: usize, scale: f64, detune: f32, rates: &RateTable) -> Self {
        let seed = index as u32 + 1;
        Self {
            oscillator: Oscillator::new(scale, detune),
            envelope: EnvelopeGenerator::new(rates),
            noise: NoiseGenerator::new(seed),
            control: VoiceControl::empty(),
            wave: 0,
            output: 0.0,
            previous: 0.0,
            seed,
        }
    }

    /// Decode the control register.
    pub fn set_control(&mut self, control: VoiceControl) {
        self.control = control;
        self.envelope.set_gate(control.contains(VoiceControl::GATE));
        if control.contains(VoiceControl::TEST) {
            self.oscillator.hold();
        }
    }

    #[inline]
    pub fn control(&self) -> VoiceControl {
        self.control
    }

    /// Back to power-on state. Keeps the derived oscillator scale.
    pub fn reset(&mut self) {
        self.control = VoiceControl::empty();
        self.oscillator.reset_phase();
        self.envelope.reset();
        self.noise.reseed(self.seed);
        self.wave = 0;
        self.output = 0.0;
        self.previous = 0.0;
    }

    /// Advance oscillator, noise and envelope by one sample.
    #[inline]
    pub fn advance(&mut self) {
        self.previous = self.output;
        self.noise.step();
        if self.control.contains(VoiceControl::TEST) {
            self.oscillator.hold();
        } else {
            self.oscillator.advance();
            if self.oscillator.noise_clock() {
                self.noise.latch();
            }
        }
        self.envelope.clock();
    }

    /// Snapshot used by the next voice for sync and ring modulation.
    #[inline]
    pub fn as_neighbour(&self) -> Neighbour {
        Neighbour {
            msb: self.oscillator.msb(),
            msb_rising: self.oscillator.msb_rising(),
            previous: self.previous,
        }
    }

    /// Hard sync against the previous voice's rising sign bit.
    #[inline]
    pub fn apply_sync(&mut self, source: &Neighbour) {
        if self.control.contains(VoiceControl::SYNC) && source.msb_rising {
            self.oscillator.reset_phase();
        }
    }

    /// Compute this sample's waveform and envelope-scaled output.
    #[inline]
    pub fn render(&mut self, mode: MixMode, source: &Neighbour, leakage: f32) -> f32 {
        let ring = self.control.contains(VoiceControl::RING_MOD);
        let mixed = match mode {
            MixMode::And => self.and_waveform(ring && source.msb).map(|wave| {
                self.wave = wave;
                centered(wave)
            }),
            MixMode::Multi => self.multi_waveform().map(|mut sum| {
                if ring {
                    sum *= source.previous;
                }
                self.wave = ((sum + 1.0) * WAVE_ZERO as f32).clamp(0.0, WAVE_MAX as f32) as u16;
                sum
            }),
        };

        self.output = match mixed {
            Some(value) => {
                let env = self.envelope.counter() as f32 / ENVELOPE_MAX as f32;
                value * (env * (1.0 - leakage) + leakage)
            }
            None => {
                self.wave = 0;
                0.0
            }
        };
        self.output
    }

    fn and_waveform(&self, ring_msb: bool) -> Option<u16> {
        let osc = &self.oscillator;
        let phase = osc.phase();
        let mut wave = WAVE_MAX;
        let mut selected = false;
        if self.control.contains(VoiceControl::TRIANGLE) {
            wave &= oscillator::triangle(phase, ring_msb);
            selected = true;
        }
        if self.control.contains(VoiceControl::RAMP) {
            wave &= osc.ramp();
            selected = true;
        }
        if self.control.contains(VoiceControl::SQUARE) {
            wave &= oscillator::pulse(phase, osc.pulse_width());
            selected = true;
        }
        if self.control.contains(VoiceControl::NOISE) {
            wave &= self.noise.last();
            selected = true;
        }
        selected.then_some(wave)
    }

    fn multi_waveform(&self) -> Option<f32> {
        let osc = &self.oscillator;
        let mut sum = 0.0;
        let mut count = 0u32;
        if self.control.contains(VoiceControl::TRIANGLE) {
            sum += centered(oscillator::triangle(osc.bank_phase(Bank::Triangle), false));
            count += 1;
        }
        if self.control.contains(VoiceControl::RAMP) {
            sum += centered(oscillator::ramp(osc.bank_phase(Bank::Ramp)));
            count += 1;
        }
        if self.control.contains(VoiceControl::SQUARE) {
            sum += centered(oscillator::pulse(osc.bank_phase(Bank::Pulse), osc.pulse_width()));
            count += 1;
        }
        if self.control.contains(VoiceControl::NOISE) {
            sum += centered(self.noise.last());
            count += 1;
        }
        (count > 0).then(|| sum / count as f32)
    }

    /// Last 12-bit waveform value.
    #[inline]
    pub fn wave(&self) -> u16 {
        self.wave
    }

    #[inline]
    pub fn output(&self) -> f32 {
        self.output
    }

    #[inline]
    pub fn previous(&self) -> f32 {
        self.previous
    }

    pub fn oscillator(&self) -> &Oscillator {
        &self.oscillator
    }

    pub fn envelope(&self) -> &EnvelopeGenerator {
        &self.envelope
    }

    pub fn noise(&self) -> &NoiseGenerator {
        &self.noise
    }
}
