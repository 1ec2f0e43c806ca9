//! ADSR envelope generator.
//!
//! An 8-bit up/down counter driven every sample by the gate flag. The
//! sixteen rate codes are converted once per sample rate into a
//! "hold N samples, then step S" pair, so attack stays linear and
//! decay/release keep their approximately exponential shape on any host
//! rate. Decay and release run an extra sub-counter whose period grows as
//! the counter falls, which is what stretches them to three times the
//! nominal attack time.

/// Attack time per rate code in milliseconds.
pub const ATTACK_MS: [f64; 16] = [
    2.0, 8.0, 16.0, 24.0, 38.0, 56.0, 68.0, 80.0, 100.0, 250.0, 500.0, 800.0, 1000.0, 3000.0,
    5000.0, 8000.0,
];

/// Envelope counter ceiling.
pub const ENVELOPE_MAX: u8 = 0xFF;

/// Sustain nibble to counter level.
#[inline]
pub fn sustain_level(nibble: u8) -> u8 {
    (nibble & 0x0F) * 0x11
}

/// Sub-counter period at a given counter level.
#[inline]
fn exponential_period(counter: u8) -> u32 {
    match counter {
        0x5D..=0xFF => 1,
        0x36..=0x5C => 2,
        0x1A..=0x35 => 4,
        0x0E..=0x19 => 8,
        0x06..=0x0D => 16,
        _ => 30,
    }
}

/// Envelope phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EnvelopeState {
    Attack,
    Decay,
    Sustain,
    #[default]
    Release,
}

/// "Hold N samples, then step S" pair for one rate code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateStep {
    /// Samples between steps (at least 1).
    pub hold: u32,
    /// Counter change per step (1-255).
    pub step: u8,
}

impl RateStep {
    /// Derive the pair for `ms` milliseconds over the full 0..255 range.
    pub fn for_duration(ms: f64, sample_rate: f64) -> Self {
        let samples_per_step = ms * sample_rate / 1000.0 / ENVELOPE_MAX as f64;
        if samples_per_step >= 1.0 {
            Self {
                hold: samples_per_step.round() as u32,
                step: 1,
            }
        } else {
            Self {
                hold: 1,
                step: (1.0 / samples_per_step).round().clamp(1.0, 255.0) as u8,
            }
        }
    }

    /// Samples a linear attack needs to climb from 0 to 255.
    pub fn samples_to_full_scale(&self) -> u32 {
        self.hold * (ENVELOPE_MAX as u32).div_ceil(self.step as u32)
    }
}

/// Per-sample-rate conversion of all sixteen rate codes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateTable {
    steps: [RateStep; 16],
}

impl RateTable {
    pub fn new(sample_rate: f64) -> Self {
        let mut steps = [RateStep { hold: 1, step: 1 }; 16];
        for (step, ms) in steps.iter_mut().zip(ATTACK_MS) {
            *step = RateStep::for_duration(ms, sample_rate);
        }
        Self { steps }
    }

    #[inline]
    pub fn get(&self, code: u8) -> RateStep {
        self.steps[(code & 0x0F) as usize]
    }
}

/// One ADSR counter.
#[derive(Debug, Clone)]
pub struct EnvelopeGenerator {
    state: EnvelopeState,
    counter: u8,
    /// Samples since the last step.
    held: u32,
    /// Exponential sub-counter for decay/release.
    sub: u32,
    gate: bool,
    attack: RateStep,
    decay: RateStep,
    release: RateStep,
    attack_code: u8,
    decay_code: u8,
    release_code: u8,
    sustain: u8,
}

impl EnvelopeGenerator {
    pub fn new(rates: &RateTable) -> Self {
        Self {
            state: EnvelopeState::Release,
            counter: 0,
            held: 0,
            sub: 0,
            gate: false,
            attack: rates.get(0),
            decay: rates.get(0),
            release: rates.get(0),
            attack_code: 0,
            decay_code: 0,
            release_code: 0,
            sustain: 0,
        }
    }

    /// Apply the gate bit. Edges are acted on immediately so an off/on pair
    /// written between two samples still retriggers the attack.
    pub fn set_gate(&mut self, gate: bool) {
        if gate && !self.gate {
            self.state = EnvelopeState::Attack;
            self.held = 0;
            self.sub = 0;
        } else if !gate && self.gate && self.state != EnvelopeState::Release {
            self.state = EnvelopeState::Release;
            self.held = 0;
            self.sub = 0;
        }
        self.gate = gate;
    }

    /// Decode the attack/decay register byte.
    pub fn set_attack_decay(&mut self, value: u8, rates: &RateTable) {
        self.attack_code = value >> 4;
        self.decay_code = value & 0x0F;
        self.attack = rates.get(self.attack_code);
        self.decay = rates.get(self.decay_code);
    }

    /// Decode the sustain/release register byte.
    pub fn set_sustain_release(&mut self, value: u8, rates: &RateTable) {
        self.sustain = sustain_level(value >> 4);
        self.release_code = value & 0x0F;
        self.release = rates.get(self.release_code);
    }

    /// Re-derive the step pairs after a sample-rate change.
    pub fn rebuild(&mut self, rates: &RateTable) {
        self.attack = rates.get(self.attack_code);
        self.decay = rates.get(self.decay_code);
        self.release = rates.get(self.release_code);
    }

    /// Return to the silent idle state.
    pub fn reset(&mut self) {
        self.state = EnvelopeState::Release;
        self.counter = 0;
        self.held = 0;
        self.sub = 0;
        self.gate = false;
    }

    /// Advance one sample and return the counter.
    #[inline]
    pub fn clock(&mut self) -> u8 {
        match self.state {
            EnvelopeState::Attack => {
                self.held += 1;
                if self.held >= self.attack.hold {
                    self.held = 0;
                    self.counter = self.counter.saturating_add(self.attack.step);
                    if self.counter == ENVELOPE_MAX {
                        self.state = EnvelopeState::Decay;
                        self.sub = 0;
                    }
                }
            }
            EnvelopeState::Decay => {
                if self.fall_towards(self.sustain, self.decay) {
                    self.state = EnvelopeState::Sustain;
                }
            }
            EnvelopeState::Sustain => {
                // Lowering sustain while held resumes the decay
                if self.counter > self.sustain {
                    self.fall_towards(self.sustain, self.decay);
                }
            }
            EnvelopeState::Release => {
                self.fall_towards(0, self.release);
            }
        }
        self.counter
    }

    /// One decay/release sample. Returns true once the counter sits at `target`.
    #[inline]
    fn fall_towards(&mut self, target: u8, rate: RateStep) -> bool {
        if self.counter <= target {
            return true;
        }
        self.held += 1;
        if self.held < rate.hold {
            return false;
        }
        self.held = 0;
        self.sub += 1;
        if self.sub < exponential_period(self.counter) {
            return false;
        }
        self.sub = 0;
        self.counter = self.counter.saturating_sub(rate.step).max(target);
        self.counter <= target
    }

    #[inline]
    pub fn counter(&self) -> u8 {
        self.counter
    }

    #[inline]
    pub fn state(&self) -> EnvelopeState {
        self.state
    }

    #[inline]
    pub fn gate(&self) -> bool {
        self.gate
    }

    /// Sustain level as a counter value.
    #[inline]
    pub fn sustain(&self) -> u8 {
        self.sustain
    }

    pub fn attack_step(&self) -> RateStep {
        self.attack
    }

    pub fn decay_step(&self) -> RateStep {
        self.decay
    }

    pub fn release_step(&self) -> RateStep {
        self.release
    }
}
