//! Pseudo-random noise source.
//!
//! Two 24-bit accumulators: a maximal-length LFSR (taps 24, 23, 22, 17) and
//! an additive accumulator fed from it. Both advance every sample; their
//! XOR is the raw noise word. The voice latches a 12-bit sample of it when
//! its oscillator clocks the noise, so noise "pitch" follows frequency.

use crate::oscillator::{PHASE_MASK, WAVE_MAX, WAVE_ZERO};

const LFSR_SEED: u32 = 0x7F_FFF8;
const ACCUMULATOR_SEED: u32 = 0x15_A4E3;

#[derive(Debug, Clone)]
pub struct NoiseGenerator {
    lfsr: u32,
    accumulator: u32,
    last: u16,
}

impl NoiseGenerator {
    /// Create a generator. `seed` decorrelates generators sharing a chip.
    pub fn new(seed: u32) -> Self {
        let mut noise = Self {
            lfsr: 0,
            accumulator: 0,
            last: WAVE_ZERO,
        };
        noise.reseed(seed);
        noise
    }

    /// Restore the power-on state.
    pub fn reseed(&mut self, seed: u32) {
        // A zero LFSR would lock up
        self.lfsr = (LFSR_SEED ^ seed.wrapping_mul(0x9E37)) & PHASE_MASK;
        if self.lfsr == 0 {
            self.lfsr = LFSR_SEED;
        }
        self.accumulator = (ACCUMULATOR_SEED ^ seed) & PHASE_MASK;
        self.last = WAVE_ZERO;
    }

    /// Advance both accumulators one sample.
    #[inline]
    pub fn step(&mut self) {
        let bit = ((self.lfsr >> 23) ^ (self.lfsr >> 22) ^ (self.lfsr >> 21) ^ (self.lfsr >> 16)) & 1;
        self.lfsr = ((self.lfsr << 1) | bit) & PHASE_MASK;
        self.accumulator = (self.accumulator + self.lfsr) & PHASE_MASK;
    }

    /// Current 12-bit noise word.
    #[inline]
    pub fn value(&self) -> u16 {
        (((self.lfsr ^ self.accumulator) >> 12) as u16) & WAVE_MAX
    }

    /// Latch the current word as the voice's noise waveform.
    #[inline]
    pub fn latch(&mut self) {
        self.last = self.value();
    }

    /// Last latched 12-bit sample.
    #[inline]
    pub fn last(&self) -> u16 {
        self.last
    }

    /// Current word as a bipolar float, for the filter's noise floor.
    #[inline]
    pub fn bipolar(&self) -> f32 {
        (self.value() as f32 - WAVE_ZERO as f32) / WAVE_ZERO as f32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reseed_is_deterministic() {
        let mut a = NoiseGenerator::new(1);
        let mut b = NoiseGenerator::new(1);
        for _ in 0..1000 {
            a.step();
            b.step();
        }
        assert_eq!(a.value(), b.value());

        a.reseed(1);
        let mut fresh = NoiseGenerator::new(1);
        a.step();
        fresh.step();
        assert_eq!(a.value(), fresh.value());
    }

    #[test]
    fn test_values_spread_across_range() {
        let mut noise = NoiseGenerator::new(0);
        let mut low = 0;
        let mut high = 0;
        for _ in 0..10_000 {
            noise.step();
            if noise.value() < WAVE_ZERO {
                low += 1;
            } else {
                high += 1;
            }
            assert!(noise.bipolar() >= -1.0 && noise.bipolar() < 1.0);
        }
        assert!(low > 3000 && high > 3000, "low {low} high {high}");
    }

    #[test]
    fn test_latch_holds_between_clocks() {
        let mut noise = NoiseGenerator::new(3);
        noise.step();
        noise.latch();
        let held = noise.last();
        for _ in 0..10 {
            noise.step();
        }
        assert_eq!(noise.last(), held);
    }
}
