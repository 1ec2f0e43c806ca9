//! Exponential pitch glide.
//!
//! A new target sets a per-sample multiplier `(target / current)^(1 / n)`,
//! where `n` is the glide time in samples, so pitch moves by equal musical
//! intervals every sample. The multiplier never carries the frequency past
//! its target.
//!
//! # Example
//!
//! ```
//! use sidney_synth::Glide;
//!
//! let mut glide = Glide::new(44_100.0);
//! glide.jump(440.0);
//! glide.set_time(0.05);
//! glide.set_target(880.0);
//!
//! for _ in 0..2205 {
//!     glide.tick();
//! }
//! assert!((glide.current() - 880.0).abs() < 1e-6);
//! ```

/// Per-voice glide state. All methods are RT-safe.
#[derive(Debug, Clone)]
pub struct Glide {
    current: f64,
    target: f64,
    multiplier: f64,
    /// Glide time in seconds
    time: f32,
    sample_rate: f64,
}

impl Glide {
    pub fn new(sample_rate: f64) -> Self {
        Self {
            current: 0.0,
            target: 0.0,
            multiplier: 1.0,
            time: 0.0,
            sample_rate,
        }
    }

    /// Set the glide time used by the next [`Glide::set_target`].
    pub fn set_time(&mut self, seconds: f32) {
        self.time = seconds.max(0.0);
    }

    pub fn set_sample_rate(&mut self, sample_rate: f64) {
        self.sample_rate = sample_rate;
    }

    /// Head for `freq`, gliding from the current frequency when a glide
    /// time is set and there is a frequency to glide from.
    pub fn set_target(&mut self, freq: f64) {
        let samples = (self.time as f64 * self.sample_rate).round();
        if samples < 1.0 || self.current <= 0.0 || freq <= 0.0 {
            self.jump(freq);
            return;
        }
        let multiplier = (freq / self.current).powf(1.0 / samples);
        if multiplier == 1.0 {
            self.jump(freq);
            return;
        }
        self.target = freq;
        self.multiplier = multiplier;
    }

    /// Snap to `freq` without gliding.
    pub fn jump(&mut self, freq: f64) {
        self.current = freq;
        self.target = freq;
        self.multiplier = 1.0;
    }

    /// Advance one sample and return the current frequency.
    #[inline]
    pub fn tick(&mut self) -> f64 {
        if self.multiplier != 1.0 {
            let next = self.current * self.multiplier;
            let arrived = if self.multiplier > 1.0 {
                next >= self.target
            } else {
                next <= self.target
            };
            if arrived {
                self.jump(self.target);
            } else {
                self.current = next;
            }
        }
        self.current
    }

    #[inline]
    pub fn current(&self) -> f64 {
        self.current
    }

    #[inline]
    pub fn target(&self) -> f64 {
        self.target
    }

    #[inline]
    pub fn is_complete(&self) -> bool {
        self.multiplier == 1.0
    }

    pub fn time(&self) -> f32 {
        self.time
    }
}
