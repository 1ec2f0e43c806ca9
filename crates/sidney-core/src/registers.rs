//! Register map and typed bit layouts.
//!
//! The byte layout is fixed for compatibility with existing control callers:
//! three 7-byte voice blocks, four shared filter registers, two paddle inputs,
//! two read-only voice-3 taps and one engine-specific control register.

use bitflags::bitflags;

/// Size of the raw register bank. Only `0x00..=0x1D` are addressable.
pub const BANK_SIZE: usize = 32;

/// Highest valid register address.
pub const LAST_REGISTER: u8 = 0x1D;

/// Number of physical voices per chip.
pub const VOICE_COUNT: usize = 3;

/// Stride between consecutive voice register blocks.
pub const VOICE_STRIDE: u8 = 7;

pub const V1_FREQ_LO: u8 = 0x00;
pub const V1_FREQ_HI: u8 = 0x01;
pub const V1_PW_LO: u8 = 0x02;
pub const V1_PW_HI: u8 = 0x03;
pub const V1_CONTROL: u8 = 0x04;
pub const V1_ATTACK_DECAY: u8 = 0x05;
pub const V1_SUSTAIN_RELEASE: u8 = 0x06;
pub const CUTOFF_LO: u8 = 0x15;
pub const CUTOFF_HI: u8 = 0x16;
pub const RES_ROUTING: u8 = 0x17;
pub const MODE_VOLUME: u8 = 0x18;
pub const POT_X: u8 = 0x19;
pub const POT_Y: u8 = 0x1A;
pub const OSC3: u8 = 0x1B;
pub const ENV3: u8 = 0x1C;
pub const CONTROL: u8 = 0x1D;

/// Register address of a per-voice register.
#[inline]
pub const fn voice_register(voice: usize, reg: VoiceRegister) -> u8 {
    voice as u8 * VOICE_STRIDE + reg as u8
}

/// Offset of a register inside a voice block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum VoiceRegister {
    FreqLo = 0,
    FreqHi = 1,
    PulseWidthLo = 2,
    PulseWidthHi = 3,
    Control = 4,
    AttackDecay = 5,
    SustainRelease = 6,
}

impl VoiceRegister {
    fn from_offset(offset: u8) -> Option<Self> {
        Some(match offset {
            0 => Self::FreqLo,
            1 => Self::FreqHi,
            2 => Self::PulseWidthLo,
            3 => Self::PulseWidthHi,
            4 => Self::Control,
            5 => Self::AttackDecay,
            6 => Self::SustainRelease,
            _ => return None,
        })
    }
}

/// Decoded register address.
///
/// Replaces an address-indexed dispatch table: `ChipCore` matches on this
/// to route a write to the sub-unit it configures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Register {
    /// Per-voice register (voice index 0-2).
    Voice(usize, VoiceRegister),
    CutoffLo,
    CutoffHi,
    ResonanceRouting,
    ModeVolume,
    PotX,
    PotY,
    Osc3,
    Env3,
    Control,
}

impl Register {
    /// Decode an address. Returns `None` past `0x1D`.
    pub fn decode(addr: u8) -> Option<Self> {
        if addr < CUTOFF_LO {
            let voice = (addr / VOICE_STRIDE) as usize;
            return VoiceRegister::from_offset(addr % VOICE_STRIDE).map(|r| Self::Voice(voice, r));
        }
        Some(match addr {
            CUTOFF_LO => Self::CutoffLo,
            CUTOFF_HI => Self::CutoffHi,
            RES_ROUTING => Self::ResonanceRouting,
            MODE_VOLUME => Self::ModeVolume,
            POT_X => Self::PotX,
            POT_Y => Self::PotY,
            OSC3 => Self::Osc3,
            ENV3 => Self::Env3,
            CONTROL => Self::Control,
            _ => return None,
        })
    }

    /// Address of this register.
    pub fn address(self) -> u8 {
        match self {
            Self::Voice(voice, reg) => voice_register(voice, reg),
            Self::CutoffLo => CUTOFF_LO,
            Self::CutoffHi => CUTOFF_HI,
            Self::ResonanceRouting => RES_ROUTING,
            Self::ModeVolume => MODE_VOLUME,
            Self::PotX => POT_X,
            Self::PotY => POT_Y,
            Self::Osc3 => OSC3,
            Self::Env3 => ENV3,
            Self::Control => CONTROL,
        }
    }

    /// True for the voice-3 taps, which reflect chip state rather than store a byte.
    pub fn is_read_only(self) -> bool {
        matches!(self, Self::Osc3 | Self::Env3)
    }
}

bitflags! {
    /// Voice control register (`0x04`, `0x0B`, `0x12`).
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct VoiceControl: u8 {
        const GATE = 0x01;
        const SYNC = 0x02;
        const RING_MOD = 0x04;
        const TEST = 0x08;
        const TRIANGLE = 0x10;
        const RAMP = 0x20;
        const SQUARE = 0x40;
        const NOISE = 0x80;

        const WAVEFORMS = Self::TRIANGLE.bits() | Self::RAMP.bits() | Self::SQUARE.bits() | Self::NOISE.bits();
    }
}

bitflags! {
    /// Low nibble of `0x17`: which voices pass through the filter.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct FilterRouting: u8 {
        const VOICE1 = 0x01;
        const VOICE2 = 0x02;
        const VOICE3 = 0x04;
        const EXTERNAL = 0x08;
    }
}

impl FilterRouting {
    /// Routing bit for voice `index` (0-2).
    #[inline]
    pub fn voice(index: usize) -> Self {
        Self::from_bits_truncate(1 << index)
    }
}

bitflags! {
    /// High nibble of `0x18`: filter taps and the voice-3 disconnect.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct FilterMode: u8 {
        const LOW_PASS = 0x10;
        const BAND_PASS = 0x20;
        const HIGH_PASS = 0x40;
        const VOICE3_OFF = 0x80;
    }
}

bitflags! {
    /// Engine control register (`0x1D`).
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct ChipControl: u8 {
        /// Hardware reset. Self-clearing.
        const RESET = 0x01;
        /// Select the 24 dB ladder filter instead of the state-variable filter.
        const LADDER = 0x02;
        /// Sum independently detuned waveforms instead of AND-ing them.
        const MULTI = 0x04;
        /// Trace every register write.
        const DEBUG = 0x08;
    }
}

/// Raw register storage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegisterBank {
    raw: [u8; BANK_SIZE],
}

impl RegisterBank {
    pub fn new() -> Self {
        Self { raw: [0; BANK_SIZE] }
    }

    #[inline]
    pub fn get(&self, addr: u8) -> u8 {
        self.raw[addr as usize % BANK_SIZE]
    }

    /// Store a byte, returning the previous one.
    #[inline]
    pub fn set(&mut self, addr: u8, value: u8) -> u8 {
        let slot = &mut self.raw[addr as usize % BANK_SIZE];
        core::mem::replace(slot, value)
    }

    /// 16-bit little-endian pair starting at `lo`.
    #[inline]
    pub fn word(&self, lo: u8) -> u16 {
        u16::from_le_bytes([self.get(lo), self.get(lo + 1)])
    }

    pub fn clear(&mut self) {
        self.raw = [0; BANK_SIZE];
    }

    pub fn as_bytes(&self) -> &[u8; BANK_SIZE] {
        &self.raw
    }
}

impl Default for RegisterBank {
    fn default() -> Self {
        Self::new()
    }
}

/// Split an 11-bit cutoff into its `(lo, hi)` register pair.
#[inline]
pub fn encode_cutoff(cutoff: u16) -> (u8, u8) {
    let cutoff = cutoff.min(0x7FF);
    ((cutoff & 0x07) as u8, (cutoff >> 3) as u8)
}

/// Join a `(lo, hi)` register pair into an 11-bit cutoff. Bits 3-7 of `lo` are dropped.
#[inline]
pub fn decode_cutoff(lo: u8, hi: u8) -> u16 {
    ((hi as u16) << 3) | (lo as u16 & 0x07)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_voice_blocks() {
        assert_eq!(
            Register::decode(0x00),
            Some(Register::Voice(0, VoiceRegister::FreqLo))
        );
        assert_eq!(
            Register::decode(0x0B),
            Some(Register::Voice(1, VoiceRegister::Control))
        );
        assert_eq!(
            Register::decode(0x14),
            Some(Register::Voice(2, VoiceRegister::SustainRelease))
        );
        assert_eq!(Register::decode(0x1D), Some(Register::Control));
        assert_eq!(Register::decode(0x1E), None);
        assert_eq!(Register::decode(0xFF), None);
    }

    #[test]
    fn test_address_roundtrip() {
        for addr in 0..=LAST_REGISTER {
            let reg = Register::decode(addr).unwrap();
            assert_eq!(reg.address(), addr);
        }
    }

    #[test]
    fn test_voice_control_layout() {
        let ctrl = VoiceControl::from_bits_truncate(0x21);
        assert!(ctrl.contains(VoiceControl::GATE));
        assert!(ctrl.contains(VoiceControl::RAMP));
        assert!(!ctrl.contains(VoiceControl::TRIANGLE));
        assert_eq!(VoiceControl::WAVEFORMS.bits(), 0xF0);
    }

    #[test]
    fn test_cutoff_pair() {
        assert_eq!(encode_cutoff(0x7FF), (0x07, 0xFF));
        assert_eq!(decode_cutoff(0x07, 0xFF), 0x7FF);
        // Upper bits of the low byte are not part of the cutoff
        assert_eq!(decode_cutoff(0xF9, 0x10), (0x10 << 3) | 0x01);
    }

    #[test]
    fn test_bank_set_returns_previous() {
        let mut bank = RegisterBank::new();
        assert_eq!(bank.set(0x04, 0x41), 0);
        assert_eq!(bank.set(0x04, 0x40), 0x41);
        bank.set(0x00, 0x34);
        bank.set(0x01, 0x12);
        assert_eq!(bank.word(0x00), 0x1234);
    }
}
