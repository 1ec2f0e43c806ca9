//! Modulation routing.
//!
//! The modulation chip's voice 3 runs free as an LFO (its OSC3 tap) and an
//! ADSR (its ENV3 tap). A bitmask of seventeen routes connects those two
//! sources, and note velocity ("touch"), to each audio voice's pulse width
//! and frequency and to the shared filter cutoff. Each destination group has
//! a depth. Routes are evaluated once per sub-block, not per sample.

use bitflags::bitflags;
use sidney_core::registers::VOICE_COUNT;

/// Widest frequency swing at full depth, in semitones.
pub const MAX_PITCH_DEPTH: f32 = 12.0;

/// Number of route bits.
pub const ROUTE_COUNT: usize = 17;

bitflags! {
    /// Enabled modulation routes.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct ModRoutes: u32 {
        const LFO_PW_1 = 1 << 0;
        const LFO_PW_2 = 1 << 1;
        const LFO_PW_3 = 1 << 2;
        const LFO_FREQ_1 = 1 << 3;
        const LFO_FREQ_2 = 1 << 4;
        const LFO_FREQ_3 = 1 << 5;
        const LFO_CUTOFF = 1 << 6;
        const ENV_PW_1 = 1 << 7;
        const ENV_PW_2 = 1 << 8;
        const ENV_PW_3 = 1 << 9;
        const ENV_FREQ_1 = 1 << 10;
        const ENV_FREQ_2 = 1 << 11;
        const ENV_FREQ_3 = 1 << 12;
        const ENV_CUTOFF = 1 << 13;
        /// Scale the LFO by note velocity.
        const TOUCH_LFO = 1 << 14;
        /// Scale the modulation envelope by note velocity.
        const TOUCH_ENV = 1 << 15;
        /// Open the cutoff with the latest note velocity.
        const TOUCH_CUTOFF = 1 << 16;
    }
}

impl ModRoutes {
    /// Route with bit position `index` (0-16).
    pub fn nth(index: usize) -> Option<Self> {
        (index < ROUTE_COUNT).then(|| Self::from_bits_retain(1 << index))
    }

    #[inline]
    pub fn lfo_pw(voice: usize) -> Self {
        Self::from_bits_retain(Self::LFO_PW_1.bits() << voice)
    }

    #[inline]
    pub fn lfo_freq(voice: usize) -> Self {
        Self::from_bits_retain(Self::LFO_FREQ_1.bits() << voice)
    }

    #[inline]
    pub fn env_pw(voice: usize) -> Self {
        Self::from_bits_retain(Self::ENV_PW_1.bits() << voice)
    }

    #[inline]
    pub fn env_freq(voice: usize) -> Self {
        Self::from_bits_retain(Self::ENV_FREQ_1.bits() << voice)
    }
}

/// Route depths, each 0..1.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ModDepths {
    pub lfo_pw: f32,
    pub lfo_freq: f32,
    pub lfo_cutoff: f32,
    pub env_pw: f32,
    pub env_freq: f32,
    pub env_cutoff: f32,
    pub touch_cutoff: f32,
}

/// Source values sampled from the modulation chip.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ModSources {
    /// Bipolar LFO (-1..1).
    pub lfo: f32,
    /// Unipolar envelope (0..1).
    pub env: f32,
}

impl ModSources {
    /// Decode the OSC3 and ENV3 tap bytes.
    #[inline]
    pub fn from_taps(osc3: u8, env3: u8) -> Self {
        Self {
            lfo: (osc3 as f32 - 128.0) / 128.0,
            env: env3 as f32 / 255.0,
        }
    }
}

/// Offsets produced by one evaluation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ModFrame {
    /// Pulse-width offset per voice as a fraction of full scale.
    pub pulse_width: [f32; VOICE_COUNT],
    /// Pitch offset per voice in semitones.
    pub pitch: [f32; VOICE_COUNT],
    /// Cutoff offset as a fraction of full scale.
    pub cutoff: f32,
}

impl Default for ModFrame {
    fn default() -> Self {
        Self {
            pulse_width: [0.0; VOICE_COUNT],
            pitch: [0.0; VOICE_COUNT],
            cutoff: 0.0,
        }
    }
}

/// Evaluate the routes for one sub-block.
///
/// `route_voice[v]` names the voice whose per-voice route bits apply to
/// physical voice `v` (key-modes with shared timbre read voice 1's bits).
/// `touch[v]` is the velocity of the note on voice `v`; `last_touch` is the
/// velocity of the most recent note.
pub fn evaluate(
    routes: ModRoutes,
    depths: &ModDepths,
    sources: ModSources,
    route_voice: [usize; VOICE_COUNT],
    touch: [f32; VOICE_COUNT],
    last_touch: f32,
) -> ModFrame {
    let mut frame = ModFrame::default();
    let gated = |bit: ModRoutes| if routes.contains(bit) { 1.0 } else { 0.0 };

    for voice in 0..VOICE_COUNT {
        let src = route_voice[voice];
        let lfo = if routes.contains(ModRoutes::TOUCH_LFO) {
            sources.lfo * touch[voice]
        } else {
            sources.lfo
        };
        let env = if routes.contains(ModRoutes::TOUCH_ENV) {
            sources.env * touch[voice]
        } else {
            sources.env
        };

        frame.pulse_width[voice] = lfo * depths.lfo_pw * gated(ModRoutes::lfo_pw(src))
            + env * depths.env_pw * gated(ModRoutes::env_pw(src));
        frame.pitch[voice] = MAX_PITCH_DEPTH
            * (lfo * depths.lfo_freq * gated(ModRoutes::lfo_freq(src))
                + env * depths.env_freq * gated(ModRoutes::env_freq(src)));
    }

    let lfo = if routes.contains(ModRoutes::TOUCH_LFO) {
        sources.lfo * last_touch
    } else {
        sources.lfo
    };
    let env = if routes.contains(ModRoutes::TOUCH_ENV) {
        sources.env * last_touch
    } else {
        sources.env
    };
    frame.cutoff = lfo * depths.lfo_cutoff * gated(ModRoutes::LFO_CUTOFF)
        + env * depths.env_cutoff * gated(ModRoutes::ENV_CUTOFF)
        + last_touch * depths.touch_cutoff * gated(ModRoutes::TOUCH_CUTOFF);
    frame
}
