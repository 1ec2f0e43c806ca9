//! Patch parameters owned by the voice manager.
//!
//! These are the values the controller map edits. The voice manager turns
//! them into register bytes when it flushes a changed patch at the start
//! of a block.

use sidney_core::{ChipControl, FilterMode, FilterRouting, VoiceControl};

/// Longest glide time a controller can select, in seconds.
pub const MAX_GLIDE_SECONDS: f32 = 2.0;

/// Transpose range in semitones either side of zero.
pub const MAX_TRANSPOSE: i8 = 24;

/// LFO frequency at rate 0 and rate 1.
pub const LFO_MIN_HZ: f64 = 0.05;
pub const LFO_MAX_HZ: f64 = 20.0;

/// Waveform/modifier bits a patch may set on a voice (everything but gate).
pub const TIMBRE_BITS: VoiceControl = VoiceControl::from_bits_retain(
    VoiceControl::WAVEFORMS.bits()
        | VoiceControl::SYNC.bits()
        | VoiceControl::RING_MOD.bits()
        | VoiceControl::TEST.bits(),
);

/// Timbre and tuning of one voice.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VoicePatch {
    /// Fine tune in semitones (-1..1).
    pub tune: f32,
    /// Coarse transpose in semitones.
    pub transpose: i8,
    /// Glide time in seconds.
    pub glide: f32,
    /// 12-bit pulse width.
    pub pulse_width: u16,
    /// Waveform and sync/ring/test bits.
    pub waveform: VoiceControl,
    pub attack: u8,
    pub decay: u8,
    pub sustain: u8,
    pub release: u8,
    /// Route through the filter.
    pub filter_route: bool,
}

impl Default for VoicePatch {
    fn default() -> Self {
        Self {
            tune: 0.0,
            transpose: 0,
            glide: 0.0,
            pulse_width: 0x800,
            waveform: VoiceControl::RAMP,
            attack: 0,
            decay: 9,
            sustain: 0x0C,
            release: 6,
            filter_route: true,
        }
    }
}

impl VoicePatch {
    /// Total pitch offset in semitones.
    #[inline]
    pub fn pitch_offset(&self) -> f64 {
        self.transpose as f64 + self.tune as f64
    }

    #[inline]
    pub fn attack_decay(&self) -> u8 {
        (self.attack & 0x0F) << 4 | (self.decay & 0x0F)
    }

    #[inline]
    pub fn sustain_release(&self) -> u8 {
        (self.sustain & 0x0F) << 4 | (self.release & 0x0F)
    }

    /// Set or clear one waveform/modifier bit.
    pub fn set_wave_bit(&mut self, bit: VoiceControl, on: bool) {
        self.waveform.set(bit & TIMBRE_BITS, on);
    }
}

/// Shared filter, volume and engine settings.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FilterPatch {
    /// 11-bit cutoff.
    pub cutoff: u16,
    /// Resonance nibble.
    pub resonance: u8,
    /// Filter taps and voice-3 off.
    pub mode: FilterMode,
    /// Volume nibble.
    pub volume: u8,
    pub ladder: bool,
    pub multi: bool,
    pub external: bool,
    pub pot_x: u8,
    pub pot_y: u8,
}

impl Default for FilterPatch {
    fn default() -> Self {
        Self {
            cutoff: 0x400,
            resonance: 0,
            mode: FilterMode::LOW_PASS,
            volume: 0x0F,
            ladder: false,
            multi: false,
            external: false,
            pot_x: 0,
            pot_y: 0,
        }
    }
}

impl FilterPatch {
    /// Resonance/routing register byte for the given voice routes.
    pub fn resonance_routing(&self, voices: FilterRouting) -> u8 {
        let mut routing = voices;
        routing.set(FilterRouting::EXTERNAL, self.external);
        (self.resonance & 0x0F) << 4 | routing.bits()
    }

    pub fn mode_volume(&self) -> u8 {
        self.mode.bits() | (self.volume & 0x0F)
    }

    pub fn control(&self) -> ChipControl {
        let mut control = ChipControl::empty();
        control.set(ChipControl::LADDER, self.ladder);
        control.set(ChipControl::MULTI, self.multi);
        control
    }
}

/// Settings of the modulation chip's voice 3.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ModPatch {
    /// Normalized LFO rate (0..1).
    pub lfo_rate: f32,
    pub lfo_wave: VoiceControl,
    pub attack: u8,
    pub decay: u8,
    pub sustain: u8,
    pub release: u8,
    /// Restart the modulation envelope on every new key.
    pub retrigger: bool,
}

impl Default for ModPatch {
    fn default() -> Self {
        Self {
            lfo_rate: 0.5,
            lfo_wave: VoiceControl::TRIANGLE,
            attack: 4,
            decay: 8,
            sustain: 0x08,
            release: 8,
            retrigger: false,
        }
    }
}

impl ModPatch {
    /// LFO frequency in Hz, exponential over the rate.
    pub fn lfo_hz(&self) -> f64 {
        LFO_MIN_HZ * (LFO_MAX_HZ / LFO_MIN_HZ).powf(self.lfo_rate.clamp(0.0, 1.0) as f64)
    }

    #[inline]
    pub fn attack_decay(&self) -> u8 {
        (self.attack & 0x0F) << 4 | (self.decay & 0x0F)
    }

    #[inline]
    pub fn sustain_release(&self) -> u8 {
        (self.sustain & 0x0F) << 4 | (self.release & 0x0F)
    }

    pub fn set_wave_bit(&mut self, bit: VoiceControl, on: bool) {
        self.lfo_wave.set(bit & VoiceControl::WAVEFORMS, on);
    }
}
