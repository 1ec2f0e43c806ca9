//! Key-to-frequency table.
//!
//! Pre-computes 12-TET frequencies for all 128 MIDI keys for RT-safe lookup.

/// Reference pitch for A4.
pub const A4_FREQ: f64 = 440.0;

/// MIDI key number for A4.
pub const A4_NOTE: u8 = 69;

/// Frequency ratio of `semitones` equal-tempered steps.
#[inline]
pub fn semitone_ratio(semitones: f64) -> f64 {
    (semitones / 12.0).exp2()
}

/// 128-entry key-to-Hz table.
#[derive(Debug, Clone)]
pub struct FrequencyTable {
    table: [f64; 128],
    reference_freq: f64,
}

impl FrequencyTable {
    /// Equal temperament around A4 = 440 Hz.
    pub fn new() -> Self {
        Self::with_reference(A4_FREQ)
    }

    /// Equal temperament around a custom A4.
    pub fn with_reference(reference_freq: f64) -> Self {
        let mut table = [0.0; 128];
        for (key, freq) in table.iter_mut().enumerate() {
            *freq = reference_freq * semitone_ratio(key as f64 - A4_NOTE as f64);
        }
        Self {
            table,
            reference_freq,
        }
    }

    /// Frequency of `key`. Keys above 127 clamp to 127.
    #[inline]
    pub fn frequency(&self, key: u8) -> f64 {
        self.table[key.min(127) as usize]
    }

    /// Frequency of `key` shifted by `semitones` (fractional allowed).
    #[inline]
    pub fn shifted(&self, key: u8, semitones: f64) -> f64 {
        self.frequency(key) * semitone_ratio(semitones)
    }

    pub fn reference_freq(&self) -> f64 {
        self.reference_freq
    }
}

impl Default for FrequencyTable {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_reference_keys() {
        let table = FrequencyTable::new();
        assert_relative_eq!(table.frequency(69), 440.0);
        assert_relative_eq!(table.frequency(57), 220.0, epsilon = 1e-9);
        assert_relative_eq!(table.frequency(60), 261.6256, epsilon = 1e-3);
    }

    #[test]
    fn test_shift() {
        let table = FrequencyTable::new();
        assert_relative_eq!(table.shifted(69, 12.0), 880.0, epsilon = 1e-9);
        assert_relative_eq!(table.shifted(69, -24.0), 110.0, epsilon = 1e-9);
        assert_relative_eq!(table.shifted(69, 1.0), table.frequency(70), epsilon = 1e-9);
    }

    #[test]
    fn test_custom_reference() {
        let table = FrequencyTable::with_reference(432.0);
        assert_relative_eq!(table.frequency(A4_NOTE), 432.0);
        assert_eq!(table.reference_freq(), 432.0);
    }
}
