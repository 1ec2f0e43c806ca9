//! Controller map.
//!
//! A hundred controller indices address every patch parameter the voice
//! manager owns. Values are normalized to 0..1: switches are on above 0.5,
//! selectors round to the nearest option, everything else scales linearly.
//!
//! | Index | Control |
//! |-------|---------|
//! | 0-47  | per voice `v` at `16 * v` (see [`VoiceParam`]) |
//! | 48-55 | cutoff, resonance, low/band/high-pass, voice-3 off, volume, ladder |
//! | 56-65 | LFO rate and waveforms, modulation ADSR, modulation retrigger |
//! | 66-72 | route depths (see [`Depth`]) |
//! | 73-89 | the modulation routes, one per [`ModRoutes`] bit |
//! | 90-99 | key-mode, split, arpeggiator, bend range, mix, routing, pots |

use crate::modulation::{ModRoutes, ROUTE_COUNT};
use crate::{Error, Result};

/// Number of controller indices.
pub const CONTROL_COUNT: u16 = 100;

const VOICE_PARAMS_PER_VOICE: u16 = 16;
const VOICE_CONTROLS: u16 = 3 * VOICE_PARAMS_PER_VOICE;
const ROUTE_BASE: u16 = 73;

/// Per-voice parameter, in controller order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VoiceParam {
    /// Fine tune, -1..+1 semitone.
    Tune,
    /// Coarse transpose, -24..+24 semitones.
    Transpose,
    /// Glide time.
    Glide,
    PulseWidth,
    Triangle,
    Ramp,
    Square,
    Noise,
    Sync,
    RingMod,
    Attack,
    Decay,
    Sustain,
    Release,
    /// Route this voice through the filter.
    FilterRoute,
    Test,
}

const VOICE_PARAMS: [VoiceParam; VOICE_PARAMS_PER_VOICE as usize] = [
    VoiceParam::Tune,
    VoiceParam::Transpose,
    VoiceParam::Glide,
    VoiceParam::PulseWidth,
    VoiceParam::Triangle,
    VoiceParam::Ramp,
    VoiceParam::Square,
    VoiceParam::Noise,
    VoiceParam::Sync,
    VoiceParam::RingMod,
    VoiceParam::Attack,
    VoiceParam::Decay,
    VoiceParam::Sustain,
    VoiceParam::Release,
    VoiceParam::FilterRoute,
    VoiceParam::Test,
];

/// Modulation depth, in controller order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Depth {
    LfoPulseWidth,
    LfoFrequency,
    LfoCutoff,
    EnvPulseWidth,
    EnvFrequency,
    EnvCutoff,
    TouchCutoff,
}

const DEPTHS: [Depth; 7] = [
    Depth::LfoPulseWidth,
    Depth::LfoFrequency,
    Depth::LfoCutoff,
    Depth::EnvPulseWidth,
    Depth::EnvFrequency,
    Depth::EnvCutoff,
    Depth::TouchCutoff,
];

/// A decoded controller index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Control {
    Voice(usize, VoiceParam),
    Cutoff,
    Resonance,
    LowPass,
    BandPass,
    HighPass,
    Voice3Off,
    Volume,
    Ladder,
    LfoRate,
    LfoTriangle,
    LfoRamp,
    LfoSquare,
    LfoNoise,
    ModAttack,
    ModDecay,
    ModSustain,
    ModRelease,
    ModRetrigger,
    Depth(Depth),
    Route(ModRoutes),
    KeyMode,
    SplitPoint,
    ArpRate,
    ArpRetrigger,
    ArpWaveScan,
    BendRange,
    MultiMix,
    ExternalRoute,
    PotX,
    PotY,
}

const GLOBALS: [Control; 18] = [
    Control::Cutoff,
    Control::Resonance,
    Control::LowPass,
    Control::BandPass,
    Control::HighPass,
    Control::Voice3Off,
    Control::Volume,
    Control::Ladder,
    Control::LfoRate,
    Control::LfoTriangle,
    Control::LfoRamp,
    Control::LfoSquare,
    Control::LfoNoise,
    Control::ModAttack,
    Control::ModDecay,
    Control::ModSustain,
    Control::ModRelease,
    Control::ModRetrigger,
];

const PERFORMANCE: [Control; 10] = [
    Control::KeyMode,
    Control::SplitPoint,
    Control::ArpRate,
    Control::ArpRetrigger,
    Control::ArpWaveScan,
    Control::BendRange,
    Control::MultiMix,
    Control::ExternalRoute,
    Control::PotX,
    Control::PotY,
];

const GLOBAL_BASE: u16 = VOICE_CONTROLS;
const DEPTH_BASE: u16 = GLOBAL_BASE + GLOBALS.len() as u16;
const PERFORMANCE_BASE: u16 = ROUTE_BASE + ROUTE_COUNT as u16;

impl Control {
    /// Decode a controller index.
    pub fn from_index(index: u16) -> Result<Self> {
        let unknown = Error::UnknownControl(index);
        Ok(match index {
            i if i < VOICE_CONTROLS => Control::Voice(
                (i / VOICE_PARAMS_PER_VOICE) as usize,
                VOICE_PARAMS[(i % VOICE_PARAMS_PER_VOICE) as usize],
            ),
            i if i < DEPTH_BASE => GLOBALS[(i - GLOBAL_BASE) as usize],
            i if i < ROUTE_BASE => Control::Depth(DEPTHS[(i - DEPTH_BASE) as usize]),
            i if i < PERFORMANCE_BASE => {
                Control::Route(ModRoutes::nth((i - ROUTE_BASE) as usize).ok_or(unknown)?)
            }
            i if i < CONTROL_COUNT => PERFORMANCE[(i - PERFORMANCE_BASE) as usize],
            _ => return Err(unknown),
        })
    }

    /// Controller index of this control.
    pub fn index(self) -> u16 {
        fn position<T: PartialEq>(table: &[T], item: &T) -> u16 {
            table.iter().position(|t| t == item).unwrap_or(0) as u16
        }
        match self {
            Control::Voice(voice, param) => {
                voice as u16 * VOICE_PARAMS_PER_VOICE + position(&VOICE_PARAMS, &param)
            }
            Control::Depth(depth) => DEPTH_BASE + position(&DEPTHS, &depth),
            Control::Route(route) => ROUTE_BASE + route.bits().trailing_zeros() as u16,
            other if GLOBALS.contains(&other) => GLOBAL_BASE + position(&GLOBALS, &other),
            other => PERFORMANCE_BASE + position(&PERFORMANCE, &other),
        }
    }
}

/// Switch value: on above 0.5.
#[inline]
pub fn switch(value: f32) -> bool {
    value > 0.5
}

/// Selector value: nearest of `options` choices.
#[inline]
pub fn selector(value: f32, options: usize) -> usize {
    let last = options.saturating_sub(1);
    ((value.clamp(0.0, 1.0) * last as f32).round() as usize).min(last)
}

/// Linear value onto `0..=max`.
#[inline]
pub fn scaled(value: f32, max: u16) -> u16 {
    (value.clamp(0.0, 1.0) * max as f32).round() as u16
}

/// Linear value onto a 4-bit nibble.
#[inline]
pub fn nibble(value: f32) -> u8 {
    scaled(value, 0x0F) as u8
}
