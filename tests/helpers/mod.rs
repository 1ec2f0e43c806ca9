//! Test helpers and fixtures for sidney integration tests
//!
//! ## Tolerance Levels
//!
//! Use the appropriate tolerance from [`tolerances`] module:
//! - `FLOAT_EPSILON` (1e-6): Exact operations (unity gain, identical chips)
//! - `PITCH_TOLERANCE` (3%): Frequency estimated from zero crossings
//! - `SILENCE_THRESHOLD` (0.0001): Silence detection (-80dB)

#![allow(dead_code)]

pub mod tolerances;

use sidney::prelude::*;

/// Default test sample rate
pub const TEST_SAMPLE_RATE: f64 = 44_100.0;

/// Standard buffer size for deterministic testing
pub const TEST_BUFFER_SIZE: usize = 512;

/// Create an engine and its handle in the given key-mode.
pub fn test_engine(mode: KeyMode) -> (SidneyEngine, SidneyHandle) {
    SidneyEngine::builder()
        .sample_rate(TEST_SAMPLE_RATE)
        .key_mode(mode)
        .build()
        .expect("Failed to create test engine")
}

/// Render `num_samples` in `TEST_BUFFER_SIZE` blocks.
pub fn render(engine: &mut SidneyEngine, num_samples: usize) -> Vec<f32> {
    let mut out = vec![0.0; num_samples];
    for block in out.chunks_mut(TEST_BUFFER_SIZE) {
        engine.render(block);
    }
    out
}

/// Calculate RMS of a signal.
pub fn rms(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum_sq: f32 = samples.iter().map(|s| s * s).sum();
    (sum_sq / samples.len() as f32).sqrt()
}

/// Calculate peak amplitude of a signal.
pub fn peak(samples: &[f32]) -> f32 {
    samples
        .iter()
        .map(|s| s.abs())
        .fold(0.0_f32, |a, b| a.max(b))
}

/// Subtract the mean.
pub fn remove_dc(samples: &[f32]) -> Vec<f32> {
    if samples.is_empty() {
        return Vec::new();
    }
    let mean = samples.iter().sum::<f32>() / samples.len() as f32;
    samples.iter().map(|s| s - mean).collect()
}

/// Count sign changes between consecutive samples.
pub fn zero_crossings(samples: &[f32]) -> usize {
    samples
        .windows(2)
        .filter(|w| (w[0] < 0.0) != (w[1] < 0.0))
        .count()
}

/// Estimate the fundamental of a signal crossing its mean twice per cycle.
pub fn estimate_frequency(samples: &[f32], sample_rate: f64) -> f64 {
    let crossings = zero_crossings(&remove_dc(samples)) as f64;
    crossings / 2.0 / (samples.len() as f64 / sample_rate)
}

/// Assert that a signal is approximately silent (all values near zero).
pub fn assert_silence(samples: &[f32], tolerance: f32) {
    let max = peak(samples);
    assert!(
        max <= tolerance,
        "Expected silence, but peak amplitude was {}",
        max
    );
}

/// Assert that a signal has content (not silent).
pub fn assert_has_audio(samples: &[f32], min_rms: f32) {
    let r = rms(samples);
    assert!(
        r >= min_rms,
        "Expected audio content with RMS >= {}, but RMS was {}",
        min_rms,
        r
    );
}
