//! Tolerance constants for audio testing.

/// Floating point rounding errors (exact gain, identical signal paths).
pub const FLOAT_EPSILON: f32 = 1e-6;

/// Relative pitch error accepted when estimating frequency from zero crossings.
pub const PITCH_TOLERANCE: f64 = 0.03;

/// Silence threshold (~-80dB).
pub const SILENCE_THRESHOLD: f32 = 0.0001;
