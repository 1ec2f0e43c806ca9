//! Fixed-capacity arpeggiator.
//!
//! The table holds the currently held keys of the arpeggiated region in
//! ascending order and is rebuilt every block. A step counter is
//! decremented by the sub-block size; each time it runs out the next entry
//! plays. Optional wave-scanning rotates the arpeggiated voice through
//! triangle, ramp and square on every step.

use sidney_core::VoiceControl;

/// Most keys the table holds.
pub const ARP_CAPACITY: usize = 16;

const WAVE_SCAN: [VoiceControl; 3] = [
    VoiceControl::TRIANGLE,
    VoiceControl::RAMP,
    VoiceControl::SQUARE,
];

/// Samples per step for a normalized rate `p` (0..1): `sr / (0.5 * 100^p)`.
#[inline]
pub fn samples_per_step(rate: f32, sample_rate: f64) -> u32 {
    let steps_per_second = 0.5 * 100f64.powf(rate.clamp(0.0, 1.0) as f64);
    (sample_rate / steps_per_second).round().max(1.0) as u32
}

/// One arpeggiator step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArpStep {
    pub key: u8,
    /// Waveform for this step when wave-scanning.
    pub wave: Option<VoiceControl>,
}

#[derive(Debug, Clone)]
pub struct Arpeggiator {
    keys: [u8; ARP_CAPACITY],
    len: usize,
    position: usize,
    /// Samples left until the next step.
    countdown: i64,
    samples_per_step: u32,
    rate: f32,
    sample_rate: f64,
    retrigger: bool,
    wave_scan: bool,
    wave_index: usize,
    /// True once the first entry of a fresh table has played.
    running: bool,
}

impl Arpeggiator {
    pub fn new(sample_rate: f64) -> Self {
        let rate = 0.5;
        Self {
            keys: [0; ARP_CAPACITY],
            len: 0,
            position: 0,
            countdown: 0,
            samples_per_step: samples_per_step(rate, sample_rate),
            rate,
            sample_rate,
            retrigger: true,
            wave_scan: false,
            wave_index: 0,
            running: false,
        }
    }

    /// Replace the table with `keys` (any order). Keys past the capacity are
    /// dropped, keeping the lowest.
    pub fn rebuild(&mut self, keys: impl IntoIterator<Item = u8>) {
        let mut len = 0;
        for key in keys {
            if len == ARP_CAPACITY {
                break;
            }
            self.keys[len] = key;
            len += 1;
        }
        self.keys[..len].sort_unstable();
        self.len = len;
        if len == 0 {
            self.running = false;
            self.position = 0;
        } else if self.position >= len {
            self.position = 0;
        }
    }

    /// Advance by `samples` and return the step to play, if any.
    ///
    /// A table that just became non-empty plays its first entry at once.
    pub fn advance(&mut self, samples: usize) -> Option<ArpStep> {
        if self.len == 0 {
            return None;
        }
        if !self.running {
            self.running = true;
            self.position = 0;
            self.countdown = self.samples_per_step as i64;
            return Some(self.step());
        }
        self.countdown -= samples as i64;
        if self.countdown > 0 {
            return None;
        }
        self.countdown += self.samples_per_step as i64;
        self.position = (self.position + 1) % self.len;
        Some(self.step())
    }

    fn step(&mut self) -> ArpStep {
        let wave = self.wave_scan.then(|| {
            let wave = WAVE_SCAN[self.wave_index];
            self.wave_index = (self.wave_index + 1) % WAVE_SCAN.len();
            wave
        });
        ArpStep {
            key: self.keys[self.position],
            wave,
        }
    }

    /// Set the normalized rate (0..1).
    pub fn set_rate(&mut self, rate: f32) {
        self.rate = rate.clamp(0.0, 1.0);
        self.samples_per_step = samples_per_step(self.rate, self.sample_rate);
    }

    pub fn set_sample_rate(&mut self, sample_rate: f64) {
        self.sample_rate = sample_rate;
        self.samples_per_step = samples_per_step(self.rate, sample_rate);
    }

    pub fn set_retrigger(&mut self, retrigger: bool) {
        self.retrigger = retrigger;
    }

    pub fn set_wave_scan(&mut self, wave_scan: bool) {
        self.wave_scan = wave_scan;
        self.wave_index = 0;
    }

    pub fn keys(&self) -> &[u8] {
        &self.keys[..self.len]
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn samples_per_step(&self) -> u32 {
        self.samples_per_step
    }

    pub fn retrigger(&self) -> bool {
        self.retrigger
    }

    pub fn wave_scan(&self) -> bool {
        self.wave_scan
    }
}
