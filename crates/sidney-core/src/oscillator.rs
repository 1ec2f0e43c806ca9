//! Phase-accumulating digital oscillator.
//!
//! A 24-bit accumulator advanced once per host sample. Waveforms are read
//! from its top bits as 12-bit values:
//! - ramp: the high 12 bits
//! - pulse: ramp compared against the 12-bit pulse width
//! - triangle: ramp folded by XOR-ing on the sign bit (optionally ring modulated)
//!
//! In multi-oscillator mode each waveform additionally owns an independently
//! detuned accumulator so the summed waveforms beat against each other.

/// Width of the phase accumulator.
pub const PHASE_BITS: u32 = 24;

/// Phase values are always taken modulo 2^24.
pub const PHASE_MASK: u32 = (1 << PHASE_BITS) - 1;

/// Full-scale 12-bit waveform value.
pub const WAVE_MAX: u16 = 0xFFF;

/// Mid-scale 12-bit waveform value (digital zero).
pub const WAVE_ZERO: u16 = 0x800;

const MSB: u32 = 1 << (PHASE_BITS - 1);

/// Bit whose rising edge clocks the voice's noise latch.
const NOISE_CLOCK_BIT: u32 = 1 << 19;

/// Detune direction for the triangle, ramp and pulse accumulators.
const MULTI_SPREAD: [f64; 3] = [-1.0, 0.0, 1.0];

/// Index of each waveform's accumulator in multi mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Bank {
    Triangle = 0,
    Ramp = 1,
    Pulse = 2,
}

/// Convert a frequency in Hz to the 16-bit frequency register value for a
/// given chip clock. Saturates at the register's range.
pub fn frequency_to_register(hz: f64, clock_rate: f64) -> u16 {
    if hz <= 0.0 || clock_rate <= 0.0 {
        return 0;
    }
    (hz * (1u32 << PHASE_BITS) as f64 / clock_rate)
        .round()
        .clamp(0.0, u16::MAX as f64) as u16
}

/// Inverse of [`frequency_to_register`].
pub fn register_to_frequency(reg: u16, clock_rate: f64) -> f64 {
    reg as f64 * clock_rate / (1u32 << PHASE_BITS) as f64
}

#[inline]
pub fn ramp(phase: u32) -> u16 {
    (phase >> 12) as u16
}

#[inline]
pub fn pulse(phase: u32, pulse_width: u16) -> u16 {
    if ramp(phase) >= pulse_width {
        WAVE_MAX
    } else {
        0
    }
}

/// Triangle from the ramp, folding on the (optionally ring-modulated) sign bit.
#[inline]
pub fn triangle(phase: u32, ring_msb: bool) -> u16 {
    let msb = (phase & MSB != 0) ^ ring_msb;
    let folded = if msb { !phase } else { phase };
    ((folded >> 11) & WAVE_MAX as u32) as u16
}

/// One digital oscillator.
#[derive(Debug, Clone)]
pub struct Oscillator {
    phase: u32,
    /// 16-bit frequency register value.
    frequency: u16,
    /// Per-sample phase increment derived from `frequency`.
    increment: u32,
    /// 12-bit pulse width register value.
    pulse_width: u16,
    /// High 12 bits of the last advanced phase.
    ramp: u16,
    /// Detuned accumulators for multi mode.
    multi: [u32; 3],
    multi_increment: [u32; 3],
    /// Chip clock ticks per host sample.
    scale: f64,
    detune: f64,
    msb_rising: bool,
    noise_clock: bool,
}

impl Oscillator {
    pub fn new(scale: f64, detune: f32) -> Self {
        let mut osc = Self {
            phase: 0,
            frequency: 0,
            increment: 0,
            pulse_width: 0,
            ramp: 0,
            multi: [0; 3],
            multi_increment: [0; 3],
            scale,
            detune: detune as f64,
            msb_rising: false,
            noise_clock: false,
        };
        osc.update_increments();
        osc
    }

    /// Set the 16-bit frequency register value.
    pub fn set_frequency(&mut self, frequency: u16) {
        self.frequency = frequency;
        self.update_increments();
    }

    /// Set the 12-bit pulse width. Higher bits are ignored.
    pub fn set_pulse_width(&mut self, pulse_width: u16) {
        self.pulse_width = pulse_width & WAVE_MAX;
    }

    /// Rebuild the per-sample increments for a new clock/sample-rate ratio.
    pub fn set_scale(&mut self, scale: f64) {
        self.scale = scale;
        self.update_increments();
    }

    pub fn set_detune(&mut self, detune: f32) {
        self.detune = detune as f64;
        self.update_increments();
    }

    /// Override the per-sample increment directly (bypasses the register scale).
    pub fn set_increment(&mut self, increment: u32) {
        self.increment = increment & PHASE_MASK;
        self.multi_increment = [self.increment; 3];
    }

    fn update_increments(&mut self) {
        let base = self.frequency as f64 * self.scale;
        self.increment = base.round().min(PHASE_MASK as f64) as u32;
        for (inc, spread) in self.multi_increment.iter_mut().zip(MULTI_SPREAD) {
            let detuned = base * (1.0 + self.detune * spread);
            *inc = detuned.round().clamp(0.0, PHASE_MASK as f64) as u32;
        }
    }

    /// Advance all accumulators by one sample.
    #[inline]
    pub fn advance(&mut self) {
        let previous = self.phase;
        self.phase = (self.phase + self.increment) & PHASE_MASK;
        self.msb_rising = previous & MSB == 0 && self.phase & MSB != 0;
        self.noise_clock = previous & NOISE_CLOCK_BIT == 0 && self.phase & NOISE_CLOCK_BIT != 0;
        for (phase, inc) in self.multi.iter_mut().zip(self.multi_increment) {
            *phase = (*phase + inc) & PHASE_MASK;
        }
        self.ramp = ramp(self.phase);
    }

    /// Test bit: hold every accumulator at zero.
    #[inline]
    pub fn hold(&mut self) {
        self.reset_phase();
    }

    /// Hard sync: restart every accumulator.
    #[inline]
    pub fn reset_phase(&mut self) {
        self.phase = 0;
        self.multi = [0; 3];
        self.ramp = 0;
        self.msb_rising = false;
        self.noise_clock = false;
    }

    #[inline]
    pub fn phase(&self) -> u32 {
        self.phase
    }

    #[inline]
    pub fn bank_phase(&self, bank: Bank) -> u32 {
        self.multi[bank as usize]
    }

    #[inline]
    pub fn frequency(&self) -> u16 {
        self.frequency
    }

    #[inline]
    pub fn increment(&self) -> u32 {
        self.increment
    }

    #[inline]
    pub fn pulse_width(&self) -> u16 {
        self.pulse_width
    }

    #[inline]
    pub fn ramp(&self) -> u16 {
        self.ramp
    }

    #[inline]
    pub fn msb(&self) -> bool {
        self.phase & MSB != 0
    }

    /// True when the last advance carried the sign bit from 0 to 1.
    #[inline]
    pub fn msb_rising(&self) -> bool {
        self.msb_rising
    }

    /// True when the last advance should re-latch the noise source.
    #[inline]
    pub fn noise_clock(&self) -> bool {
        self.noise_clock
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_waveform_extraction() {
        assert_eq!(ramp(0xFFF000), 0xFFF);
        assert_eq!(ramp(0x800000), 0x800);
        assert_eq!(pulse(0x7FF000, 0x800), 0);
        assert_eq!(pulse(0x800000, 0x800), WAVE_MAX);
        // Triangle peaks at the sign flip and returns to zero at the wrap
        assert_eq!(triangle(0x000000, false), 0);
        assert_eq!(triangle(0x7FFFFF, false), WAVE_MAX);
        assert_eq!(triangle(0xFFFFFF, false), 0);
        // Ring modulation inverts the fold
        assert_eq!(triangle(0x000000, true), WAVE_MAX);
    }

    #[test]
    fn test_register_frequency_conversion() {
        let reg = frequency_to_register(440.0, 985_248.0);
        assert_eq!(reg, 7493);
        let hz = register_to_frequency(reg, 985_248.0);
        assert!((hz - 440.0).abs() < 0.05);
        assert_eq!(frequency_to_register(1.0e9, 985_248.0), u16::MAX);
        assert_eq!(frequency_to_register(-5.0, 985_248.0), 0);
    }

    #[test]
    fn test_increment_scaled_by_clock_ratio() {
        let mut osc = Oscillator::new(985_248.0 / 44_100.0, 0.0);
        osc.set_frequency(7493);
        let per_second = osc.increment() as f64 * 44_100.0 / (1u32 << PHASE_BITS) as f64;
        assert!((per_second - 440.0).abs() < 0.05);
    }

    #[test]
    fn test_msb_rising_once_per_cycle() {
        let mut osc = Oscillator::new(1.0, 0.0);
        osc.set_increment(1 << 16);
        let rises = (0..1024)
            .filter(|_| {
                osc.advance();
                osc.msb_rising()
            })
            .count();
        // 1024 steps of 2^16 = 4 full cycles
        assert_eq!(rises, 4);
    }

    #[test]
    fn test_hold_zeroes_phase() {
        let mut osc = Oscillator::new(1.0, 0.0);
        osc.set_increment(12345);
        osc.advance();
        osc.hold();
        assert_eq!(osc.phase(), 0);
        assert_eq!(osc.bank_phase(Bank::Pulse), 0);
    }

    #[test]
    fn test_detuned_banks_drift_apart() {
        let mut osc = Oscillator::new(20.0, 0.05);
        osc.set_frequency(1000);
        for _ in 0..100 {
            osc.advance();
        }
        assert!(osc.bank_phase(Bank::Triangle) < osc.bank_phase(Bank::Ramp));
        assert!(osc.bank_phase(Bank::Pulse) > osc.bank_phase(Bank::Ramp));
    }

    proptest! {
        #[test]
        fn prop_phase_wraps_to_start(shift in 8u32..=23) {
            let increment = 1u32 << shift;
            let mut osc = Oscillator::new(1.0, 0.0);
            osc.set_increment(increment);
            let start = osc.phase();
            for _ in 0..((1u32 << PHASE_BITS) / increment) {
                osc.advance();
            }
            prop_assert_eq!(osc.phase(), start);
        }

        #[test]
        fn prop_phase_is_modular_sum(increment in 1u32..PHASE_MASK, steps in 1u32..2000) {
            let mut osc = Oscillator::new(1.0, 0.0);
            osc.set_increment(increment);
            for _ in 0..steps {
                osc.advance();
            }
            let expected = ((increment as u64 * steps as u64) % (1u64 << PHASE_BITS)) as u32;
            prop_assert_eq!(osc.phase(), expected);
            prop_assert!(osc.phase() <= PHASE_MASK);
        }
    }
}
