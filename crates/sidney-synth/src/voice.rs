//! Voice manager: maps held keys onto the audio chip's three voices.
//!
//! Five key-modes decide the assignment:
//! - `Mono`: all three voices play the newest held key (a three-oscillator
//!   mono voice), gliding legato between keys.
//! - `Poly1`: three-voice polyphony with voice 1's timbre and routes shared
//!   by every voice; a full pool steals the middle-pitch voice.
//! - `Poly2`: as `Poly1`, but each voice keeps its own modulation routes.
//! - `Poly3`: keys at or above the split are polyphonic over voices 1 and 3,
//!   keys below it feed the arpeggiator on voice 2.
//! - `Poly4`: the mirror of `Poly3`.
//!
//! The manager owns no chip state. It talks to both chips only through
//! [`RegisterBus`] writes: patch registers at the start of a block, key
//! assignment once per block, modulation once per sub-block and frequency
//! whenever the glided, bent and modulated pitch changes.
//!
//! All methods are RT-safe (no allocations after construction).

use serde::{Deserialize, Serialize};
use sidney_core::config::{MAX_CLOCK_RATE, MAX_SAMPLE_RATE, MIN_CLOCK_RATE, MIN_SAMPLE_RATE};
use sidney_core::registers::{
    encode_cutoff, voice_register, CONTROL, CUTOFF_HI, CUTOFF_LO, ENV3, MODE_VOLUME, OSC3, POT_X,
    POT_Y, RES_ROUTING, VOICE_COUNT,
};
use sidney_core::{
    frequency_to_register, FilterMode, FilterRouting, RegisterBus, VoiceControl, VoiceRegister,
    DEFAULT_SAMPLE_RATE, PAL_CLOCK,
};
use tracing::info;

use crate::arpeggiator::{ArpStep, Arpeggiator, ARP_CAPACITY};
use crate::controls::{nibble, scaled, selector, switch, Control, Depth, VoiceParam};
use crate::glide::Glide;
use crate::modulation::{self, ModDepths, ModFrame, ModRoutes, ModSources};
use crate::patch::{FilterPatch, ModPatch, VoicePatch, MAX_GLIDE_SECONDS, MAX_TRANSPOSE};
use crate::tuning::{semitone_ratio, FrequencyTable};
use crate::{Error, Result, SynthEvent};

/// Default sub-block length for modulation and arpeggiator updates.
pub const DEFAULT_MOD_BLOCK: usize = 16;

/// Default split key for `Poly3`/`Poly4`.
pub const DEFAULT_SPLIT: u8 = 60;

/// Default pitch-bend range in semitones.
pub const DEFAULT_BEND_RANGE: f32 = 2.0;

/// Widest selectable pitch-bend range in semitones.
pub const MAX_BEND_RANGE: f32 = 24.0;

/// The arpeggiated voice in the split modes.
const ARP_VOICE: usize = 1;

/// The modulation chip's source voice.
const MOD_VOICE: usize = 2;

/// Polyphony policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum KeyMode {
    Mono,
    #[default]
    Poly1,
    Poly2,
    Poly3,
    Poly4,
}

impl KeyMode {
    pub const ALL: [KeyMode; 5] = [
        KeyMode::Mono,
        KeyMode::Poly1,
        KeyMode::Poly2,
        KeyMode::Poly3,
        KeyMode::Poly4,
    ];

    /// True for the modes that split the keyboard around an arpeggiator.
    #[inline]
    pub fn is_split(self) -> bool {
        matches!(self, KeyMode::Poly3 | KeyMode::Poly4)
    }

    /// Which voice's timbre each physical voice plays.
    fn timbre_sources(self) -> [usize; VOICE_COUNT] {
        match self {
            KeyMode::Mono => [0, 1, 2],
            KeyMode::Poly1 | KeyMode::Poly2 => [0, 0, 0],
            KeyMode::Poly3 | KeyMode::Poly4 => [0, 1, 0],
        }
    }

    /// Which voice's route bits each physical voice follows.
    fn route_sources(self) -> [usize; VOICE_COUNT] {
        match self {
            KeyMode::Poly1 => [0, 0, 0],
            KeyMode::Mono | KeyMode::Poly2 => [0, 1, 2],
            KeyMode::Poly3 | KeyMode::Poly4 => [0, 1, 0],
        }
    }
}

/// Configuration for the voice manager.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VoiceManagerConfig {
    /// Host sample rate in Hz.
    pub sample_rate: f64,
    /// Clock of the chips being driven, for frequency register conversion.
    pub clock_rate: f64,
    /// Samples between modulation/arpeggiator updates.
    pub mod_block: usize,
}

impl Default for VoiceManagerConfig {
    fn default() -> Self {
        Self {
            sample_rate: DEFAULT_SAMPLE_RATE,
            clock_rate: PAL_CLOCK,
            mod_block: DEFAULT_MOD_BLOCK,
        }
    }
}

impl VoiceManagerConfig {
    pub fn validate(&self) -> Result<()> {
        if !(MIN_SAMPLE_RATE..=MAX_SAMPLE_RATE).contains(&self.sample_rate) {
            return Err(Error::InvalidConfig(format!(
                "sample_rate {} out of range",
                self.sample_rate
            )));
        }
        if !(MIN_CLOCK_RATE..=MAX_CLOCK_RATE).contains(&self.clock_rate) {
            return Err(Error::InvalidConfig(format!(
                "clock_rate {} out of range",
                self.clock_rate
            )));
        }
        if !(1..=1024).contains(&self.mod_block) {
            return Err(Error::InvalidConfig(format!(
                "mod_block {} out of range (1-1024)",
                self.mod_block
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct KeyPress {
    /// Touch (velocity / 127)
    velocity: f32,
    /// Press order, newest highest
    order: u64,
}

/// How a key is played under the current key-mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Lane {
    Mono,
    Poly(&'static [usize], Steal),
    Arp,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Steal {
    Middle,
    Oldest,
}

const ALL_VOICES: [usize; 3] = [0, 1, 2];
const SPLIT_POOL: [usize; 2] = [0, 2];

/// Bookkeeping for one physical voice.
#[derive(Debug, Clone)]
struct VoiceSlot {
    key: Option<u8>,
    velocity: f32,
    order: u64,
    gate: bool,
    glide: Glide,
    /// Waveform chosen by arpeggiator wave-scanning.
    wave_override: Option<VoiceControl>,
    // Last values written, to skip redundant writes
    written_freq: Option<u16>,
    written_pw: Option<u16>,
    written_control: Option<u8>,
}

impl VoiceSlot {
    fn new(sample_rate: f64) -> Self {
        Self {
            key: None,
            velocity: 0.0,
            order: 0,
            gate: false,
            glide: Glide::new(sample_rate),
            wave_override: None,
            written_freq: None,
            written_pw: None,
            written_control: None,
        }
    }

    fn forget_writes(&mut self) {
        self.written_freq = None;
        self.written_pw = None;
        self.written_control = None;
    }
}

/// Polyphony, glide, modulation and arpeggiator state for one voice group.
#[derive(Debug, Clone)]
pub struct VoiceManager {
    config: VoiceManagerConfig,
    key_mode: KeyMode,
    split: u8,
    table: FrequencyTable,

    /// Held keys as reported by note events
    keys: [Option<KeyPress>; 128],
    /// Held keys as last seen by the block scan
    known: [bool; 128],
    press_counter: u64,

    slots: [VoiceSlot; VOICE_COUNT],
    mono_key: Option<u8>,
    arp_key: Option<u8>,
    arp: Arpeggiator,

    voices: [VoicePatch; VOICE_COUNT],
    filter: FilterPatch,
    lfo: ModPatch,
    routes: ModRoutes,
    depths: ModDepths,
    bend: f32,
    bend_range: f32,

    patch_dirty: bool,
    countdown: usize,
    frame: ModFrame,
    last_touch: f32,
    mod_gate: bool,
    mod_retrigger: bool,
    written_cutoff: Option<u16>,
}

impl VoiceManager {
    pub fn new(config: VoiceManagerConfig) -> Result<Self> {
        config.validate()?;
        let sample_rate = config.sample_rate;
        Ok(Self {
            key_mode: KeyMode::default(),
            split: DEFAULT_SPLIT,
            table: FrequencyTable::new(),
            keys: [None; 128],
            known: [false; 128],
            press_counter: 0,
            slots: [
                VoiceSlot::new(sample_rate),
                VoiceSlot::new(sample_rate),
                VoiceSlot::new(sample_rate),
            ],
            mono_key: None,
            arp_key: None,
            arp: Arpeggiator::new(sample_rate),
            voices: [VoicePatch::default(); VOICE_COUNT],
            filter: FilterPatch::default(),
            lfo: ModPatch::default(),
            routes: ModRoutes::empty(),
            depths: ModDepths::default(),
            bend: 0.0,
            bend_range: DEFAULT_BEND_RANGE,
            patch_dirty: true,
            countdown: 0,
            frame: ModFrame::default(),
            last_touch: 1.0,
            mod_gate: false,
            mod_retrigger: false,
            written_cutoff: None,
            config,
        })
    }

    // --- Events (applied at the next block) ---

    /// Record a key press. Velocity 0 is a release.
    pub fn note_on(&mut self, key: u8, velocity: u8) {
        if velocity == 0 {
            self.note_off(key);
            return;
        }
        let Some(entry) = self.keys.get_mut(key as usize) else {
            return;
        };
        if entry.is_none() {
            self.press_counter += 1;
            *entry = Some(KeyPress {
                velocity: velocity.min(127) as f32 / 127.0,
                order: self.press_counter,
            });
        }
    }

    pub fn note_off(&mut self, key: u8) {
        if let Some(entry) = self.keys.get_mut(key as usize) {
            *entry = None;
        }
    }

    /// Pitch bend, -1..1 of the bend range.
    pub fn pitch_bend(&mut self, amount: f32) {
        self.bend = amount.clamp(-1.0, 1.0);
    }

    pub fn handle_event(&mut self, event: SynthEvent) -> Result<()> {
        match event {
            SynthEvent::NoteOn { key, velocity } => self.note_on(key, velocity),
            SynthEvent::NoteOff { key, .. } => self.note_off(key),
            SynthEvent::PitchBend(amount) => self.pitch_bend(amount),
            SynthEvent::Control { index, value } => self.set_control_index(index, value)?,
        }
        Ok(())
    }

    /// Switch key-mode. Every voice is released and held keys are assigned
    /// again under the new mode at the next block.
    pub fn set_key_mode(&mut self, mode: KeyMode) {
        if mode == self.key_mode {
            return;
        }
        info!(from = ?self.key_mode, to = ?mode, "key mode changed");
        self.key_mode = mode;
        self.release_all();
    }

    /// Move the split point of `Poly3`/`Poly4`.
    pub fn set_split(&mut self, key: u8) {
        let key = key.min(127);
        if key != self.split {
            self.split = key;
            if self.key_mode.is_split() {
                self.release_all();
            }
        }
    }

    /// Follow a change of the driven chips' clock. Frequencies are rewritten
    /// at the next block.
    pub fn set_clock_rate(&mut self, clock_rate: f64) {
        let clock_rate = clock_rate.clamp(MIN_CLOCK_RATE, MAX_CLOCK_RATE);
        if clock_rate != self.config.clock_rate {
            self.config.clock_rate = clock_rate;
            self.patch_dirty = true;
        }
    }

    /// Follow a change of the host sample rate. Glide and arpeggiator
    /// timing switch at once; a glide already in flight keeps its step.
    pub fn set_sample_rate(&mut self, sample_rate: f64) -> f64 {
        let sample_rate = sample_rate.clamp(MIN_SAMPLE_RATE, MAX_SAMPLE_RATE);
        if sample_rate != self.config.sample_rate {
            self.config.sample_rate = sample_rate;
            for slot in &mut self.slots {
                slot.glide.set_sample_rate(sample_rate);
            }
            self.arp.set_sample_rate(sample_rate);
        }
        sample_rate
    }

    /// Rewrite every patch register at the next block, as after a chip reset.
    pub fn reload(&mut self) {
        self.patch_dirty = true;
    }

    fn release_all(&mut self) {
        for slot in &mut self.slots {
            slot.key = None;
            slot.gate = false;
            slot.wave_override = None;
        }
        self.mono_key = None;
        self.arp_key = None;
        self.arp.rebuild(std::iter::empty());
        self.known = [false; 128];
        self.patch_dirty = true;
    }

    /// Apply a controller-map index with a normalized value.
    pub fn set_control_index(&mut self, index: u16, value: f32) -> Result<()> {
        self.set_control(Control::from_index(index)?, value);
        Ok(())
    }

    /// Apply a controller with a normalized value (0..1).
    pub fn set_control(&mut self, control: Control, value: f32) {
        let value = value.clamp(0.0, 1.0);
        match control {
            Control::Voice(voice, param) => {
                let Some(patch) = self.voices.get_mut(voice) else {
                    return;
                };
                match param {
                    VoiceParam::Tune => patch.tune = value * 2.0 - 1.0,
                    VoiceParam::Transpose => {
                        patch.transpose =
                            scaled(value, 2 * MAX_TRANSPOSE as u16) as i8 - MAX_TRANSPOSE
                    }
                    VoiceParam::Glide => patch.glide = value * value * MAX_GLIDE_SECONDS,
                    VoiceParam::PulseWidth => patch.pulse_width = scaled(value, 0xFFF),
                    VoiceParam::Triangle => patch.set_wave_bit(VoiceControl::TRIANGLE, switch(value)),
                    VoiceParam::Ramp => patch.set_wave_bit(VoiceControl::RAMP, switch(value)),
                    VoiceParam::Square => patch.set_wave_bit(VoiceControl::SQUARE, switch(value)),
                    VoiceParam::Noise => patch.set_wave_bit(VoiceControl::NOISE, switch(value)),
                    VoiceParam::Sync => patch.set_wave_bit(VoiceControl::SYNC, switch(value)),
                    VoiceParam::RingMod => patch.set_wave_bit(VoiceControl::RING_MOD, switch(value)),
                    VoiceParam::Test => patch.set_wave_bit(VoiceControl::TEST, switch(value)),
                    VoiceParam::Attack => patch.attack = nibble(value),
                    VoiceParam::Decay => patch.decay = nibble(value),
                    VoiceParam::Sustain => patch.sustain = nibble(value),
                    VoiceParam::Release => patch.release = nibble(value),
                    VoiceParam::FilterRoute => patch.filter_route = switch(value),
                }
            }
            Control::Cutoff => self.filter.cutoff = scaled(value, 0x7FF),
            Control::Resonance => self.filter.resonance = nibble(value),
            Control::LowPass => self.filter.mode.set(FilterMode::LOW_PASS, switch(value)),
            Control::BandPass => self.filter.mode.set(FilterMode::BAND_PASS, switch(value)),
            Control::HighPass => self.filter.mode.set(FilterMode::HIGH_PASS, switch(value)),
            Control::Voice3Off => self.filter.mode.set(FilterMode::VOICE3_OFF, switch(value)),
            Control::Volume => self.filter.volume = nibble(value),
            Control::Ladder => self.filter.ladder = switch(value),
            Control::LfoRate => self.lfo.lfo_rate = value,
            Control::LfoTriangle => self.lfo.set_wave_bit(VoiceControl::TRIANGLE, switch(value)),
            Control::LfoRamp => self.lfo.set_wave_bit(VoiceControl::RAMP, switch(value)),
            Control::LfoSquare => self.lfo.set_wave_bit(VoiceControl::SQUARE, switch(value)),
            Control::LfoNoise => self.lfo.set_wave_bit(VoiceControl::NOISE, switch(value)),
            Control::ModAttack => self.lfo.attack = nibble(value),
            Control::ModDecay => self.lfo.decay = nibble(value),
            Control::ModSustain => self.lfo.sustain = nibble(value),
            Control::ModRelease => self.lfo.release = nibble(value),
            Control::ModRetrigger => self.lfo.retrigger = switch(value),
            Control::Depth(depth) => {
                let slot = match depth {
                    Depth::LfoPulseWidth => &mut self.depths.lfo_pw,
                    Depth::LfoFrequency => &mut self.depths.lfo_freq,
                    Depth::LfoCutoff => &mut self.depths.lfo_cutoff,
                    Depth::EnvPulseWidth => &mut self.depths.env_pw,
                    Depth::EnvFrequency => &mut self.depths.env_freq,
                    Depth::EnvCutoff => &mut self.depths.env_cutoff,
                    Depth::TouchCutoff => &mut self.depths.touch_cutoff,
                };
                *slot = value;
                return;
            }
            Control::Route(route) => {
                self.routes.set(route, switch(value));
                return;
            }
            Control::KeyMode => {
                let mode = KeyMode::ALL[selector(value, KeyMode::ALL.len())];
                self.set_key_mode(mode);
                return;
            }
            Control::SplitPoint => {
                self.set_split(scaled(value, 127) as u8);
                return;
            }
            Control::ArpRate => {
                self.arp.set_rate(value);
                return;
            }
            Control::ArpRetrigger => {
                self.arp.set_retrigger(switch(value));
                return;
            }
            Control::ArpWaveScan => {
                self.arp.set_wave_scan(switch(value));
                if !switch(value) {
                    self.slots[ARP_VOICE].wave_override = None;
                }
            }
            Control::BendRange => {
                self.bend_range = value * MAX_BEND_RANGE;
                return;
            }
            Control::MultiMix => self.filter.multi = switch(value),
            Control::ExternalRoute => self.filter.external = switch(value),
            Control::PotX => self.filter.pot_x = scaled(value, 0xFF) as u8,
            Control::PotY => self.filter.pot_y = scaled(value, 0xFF) as u8,
        }
        self.patch_dirty = true;
    }

    // --- Render path ---

    /// Start of a host block: flush patch changes, assign newly pressed and
    /// released keys, rebuild the arpeggiator table and drive the
    /// modulation envelope's gate.
    pub fn begin_block<A: RegisterBus, M: RegisterBus>(
        &mut self,
        audio: &mut A,
        modc: &mut M,
    ) -> Result<()> {
        if self.patch_dirty {
            self.flush_patch(audio, modc)?;
            self.patch_dirty = false;
        }
        self.scan_keys(audio)?;
        self.update_arp_table(audio)?;
        self.update_mod_gate(modc)
    }

    /// One sample: sub-block modulation and arpeggiator when due, then
    /// glide and frequency writes.
    pub fn tick<A: RegisterBus, M: RegisterBus>(&mut self, audio: &mut A, modc: &M) -> Result<()> {
        if self.countdown == 0 {
            self.countdown = self.config.mod_block;
            self.sub_block(audio, modc)?;
        }
        self.countdown -= 1;

        let clock = self.config.clock_rate;
        let bend = (self.bend * self.bend_range) as f64;
        for (voice, slot) in self.slots.iter_mut().enumerate() {
            let base = slot.glide.tick();
            let pitch = bend + self.frame.pitch[voice] as f64;
            let reg = frequency_to_register(base * semitone_ratio(pitch), clock);
            if slot.written_freq != Some(reg) {
                let [lo, hi] = reg.to_le_bytes();
                audio.write_register(voice_register(voice, VoiceRegister::FreqLo), lo)?;
                audio.write_register(voice_register(voice, VoiceRegister::FreqHi), hi)?;
                slot.written_freq = Some(reg);
            }
        }
        Ok(())
    }

    fn sub_block<A: RegisterBus, M: RegisterBus>(&mut self, audio: &mut A, modc: &M) -> Result<()> {
        if self.key_mode.is_split() {
            if let Some(step) = self.arp.advance(self.config.mod_block) {
                self.play_arp_step(audio, step)?;
            }
        }

        let sources = ModSources::from_taps(modc.read_register(OSC3)?, modc.read_register(ENV3)?);
        let touch = [
            self.slots[0].velocity,
            self.slots[1].velocity,
            self.slots[2].velocity,
        ];
        self.frame = modulation::evaluate(
            self.routes,
            &self.depths,
            sources,
            self.key_mode.route_sources(),
            touch,
            self.last_touch,
        );

        let timbre = self.key_mode.timbre_sources();
        for voice in 0..VOICE_COUNT {
            let base = self.voices[timbre[voice]].pulse_width as f32;
            let pw = (base + self.frame.pulse_width[voice] * 2048.0).clamp(0.0, 4095.0) as u16;
            if self.slots[voice].written_pw != Some(pw) {
                let [lo, hi] = pw.to_le_bytes();
                audio.write_register(voice_register(voice, VoiceRegister::PulseWidthLo), lo)?;
                audio.write_register(voice_register(voice, VoiceRegister::PulseWidthHi), hi)?;
                self.slots[voice].written_pw = Some(pw);
            }
        }

        let cutoff =
            (self.filter.cutoff as f32 + self.frame.cutoff * 2047.0).clamp(0.0, 2047.0) as u16;
        if self.written_cutoff != Some(cutoff) {
            let (lo, hi) = encode_cutoff(cutoff);
            audio.write_register(CUTOFF_LO, lo)?;
            audio.write_register(CUTOFF_HI, hi)?;
            self.written_cutoff = Some(cutoff);
        }
        Ok(())
    }

    fn flush_patch<A: RegisterBus, M: RegisterBus>(
        &mut self,
        audio: &mut A,
        modc: &mut M,
    ) -> Result<()> {
        let timbre = self.key_mode.timbre_sources();
        let mut routing = FilterRouting::empty();
        for voice in 0..VOICE_COUNT {
            let patch = self.voices[timbre[voice]];
            audio.write_register(
                voice_register(voice, VoiceRegister::AttackDecay),
                patch.attack_decay(),
            )?;
            audio.write_register(
                voice_register(voice, VoiceRegister::SustainRelease),
                patch.sustain_release(),
            )?;
            routing.set(FilterRouting::voice(voice), patch.filter_route);

            let slot = &mut self.slots[voice];
            slot.forget_writes();
            slot.glide.set_time(patch.glide);
            self.write_control(audio, voice)?;
        }
        self.retune_held();

        audio.write_register(RES_ROUTING, self.filter.resonance_routing(routing))?;
        audio.write_register(MODE_VOLUME, self.filter.mode_volume())?;
        audio.write_register(CONTROL, self.filter.control().bits())?;
        audio.write_register(POT_X, self.filter.pot_x)?;
        audio.write_register(POT_Y, self.filter.pot_y)?;
        self.written_cutoff = None;

        let lfo = frequency_to_register(self.lfo.lfo_hz(), self.config.clock_rate);
        let [lo, hi] = lfo.to_le_bytes();
        modc.write_register(voice_register(MOD_VOICE, VoiceRegister::FreqLo), lo)?;
        modc.write_register(voice_register(MOD_VOICE, VoiceRegister::FreqHi), hi)?;
        modc.write_register(
            voice_register(MOD_VOICE, VoiceRegister::AttackDecay),
            self.lfo.attack_decay(),
        )?;
        modc.write_register(
            voice_register(MOD_VOICE, VoiceRegister::SustainRelease),
            self.lfo.sustain_release(),
        )?;
        self.write_mod_control(modc, self.mod_gate)?;
        Ok(())
    }

    /// Point every sounding voice at its key's (possibly retuned) frequency.
    fn retune_held(&mut self) {
        for voice in 0..VOICE_COUNT {
            let key = if self.key_mode.is_split() && voice == ARP_VOICE {
                self.arp_key
            } else {
                self.slots[voice].key
            };
            if let Some(key) = key {
                let freq = self.key_frequency(voice, key);
                let glide = &mut self.slots[voice].glide;
                if glide.target() != freq {
                    glide.set_target(freq);
                }
            }
        }
    }

    fn scan_keys<A: RegisterBus>(&mut self, audio: &mut A) -> Result<()> {
        let mut pressed = [0u8; 128];
        let mut pressed_len = 0;
        for key in 0..128u8 {
            let held = self.keys[key as usize].is_some();
            if held == self.known[key as usize] {
                continue;
            }
            self.known[key as usize] = held;
            if held {
                pressed[pressed_len] = key;
                pressed_len += 1;
            } else {
                self.release_key(audio, key)?;
            }
        }

        let pressed = &mut pressed[..pressed_len];
        pressed.sort_unstable_by_key(|&key| self.order_of(key));
        for &key in pressed.iter() {
            self.press_key(audio, key)?;
        }
        if let Some(&newest) = pressed.last() {
            self.last_touch = self.velocity_of(newest);
            self.mod_retrigger = self.lfo.retrigger;
        }
        Ok(())
    }

    fn lane(&self, key: u8) -> Lane {
        match self.key_mode {
            KeyMode::Mono => Lane::Mono,
            KeyMode::Poly1 | KeyMode::Poly2 => Lane::Poly(&ALL_VOICES, Steal::Middle),
            KeyMode::Poly3 if key >= self.split => Lane::Poly(&SPLIT_POOL, Steal::Oldest),
            KeyMode::Poly4 if key < self.split => Lane::Poly(&SPLIT_POOL, Steal::Oldest),
            KeyMode::Poly3 | KeyMode::Poly4 => Lane::Arp,
        }
    }

    fn press_key<A: RegisterBus>(&mut self, audio: &mut A, key: u8) -> Result<()> {
        match self.lane(key) {
            Lane::Mono => self.follow_newest(audio),
            Lane::Arp => Ok(()),
            Lane::Poly(pool, steal) => {
                if pool.iter().any(|&v| self.slots[v].key == Some(key)) {
                    return Ok(());
                }
                let voice = match pool.iter().copied().find(|&v| self.slots[v].key.is_none()) {
                    Some(free) => free,
                    None => self.victim(pool, steal),
                };
                self.assign(audio, voice, key)
            }
        }
    }

    /// Voice to steal from a full pool.
    fn victim(&self, pool: &[usize], steal: Steal) -> usize {
        match steal {
            Steal::Oldest => pool
                .iter()
                .copied()
                .min_by_key(|&v| self.slots[v].order)
                .unwrap_or(pool[0]),
            Steal::Middle => {
                let mut by_pitch = [0usize; VOICE_COUNT];
                let by_pitch = &mut by_pitch[..pool.len()];
                by_pitch.copy_from_slice(pool);
                by_pitch.sort_unstable_by_key(|&v| self.slots[v].key);
                by_pitch[by_pitch.len() / 2]
            }
        }
    }

    fn assign<A: RegisterBus>(&mut self, audio: &mut A, voice: usize, key: u8) -> Result<()> {
        let freq = self.key_frequency(voice, key);
        let (velocity, order) = (self.velocity_of(key), self.order_of(key));
        let slot = &mut self.slots[voice];
        slot.key = Some(key);
        slot.velocity = velocity;
        slot.order = order;
        slot.glide.set_target(freq);
        if slot.gate {
            self.retrigger(audio, voice)
        } else {
            slot.gate = true;
            self.write_control(audio, voice)
        }
    }

    fn release_key<A: RegisterBus>(&mut self, audio: &mut A, key: u8) -> Result<()> {
        if self.key_mode == KeyMode::Mono {
            return self.follow_newest(audio);
        }
        for voice in 0..VOICE_COUNT {
            if self.slots[voice].key != Some(key) {
                continue;
            }
            self.slots[voice].key = None;
            self.slots[voice].gate = false;
            self.write_control(audio, voice)?;
            if matches!(self.key_mode, KeyMode::Poly1 | KeyMode::Poly2) {
                self.reassign_preempted(audio, voice)?;
            }
        }
        Ok(())
    }

    /// Give a freed voice to the newest held key that lost its voice.
    fn reassign_preempted<A: RegisterBus>(&mut self, audio: &mut A, voice: usize) -> Result<()> {
        let waiting = (0..128u8)
            .filter(|&key| self.known[key as usize] && self.keys[key as usize].is_some())
            .filter(|&key| self.slots.iter().all(|slot| slot.key != Some(key)))
            .max_by_key(|&key| self.order_of(key));
        match waiting {
            Some(key) => self.assign(audio, voice, key),
            None => Ok(()),
        }
    }

    /// Mono: every voice follows the newest held key; gate only from silence.
    fn follow_newest<A: RegisterBus>(&mut self, audio: &mut A) -> Result<()> {
        let newest = (0..128u8)
            .filter(|&key| self.keys[key as usize].is_some())
            .max_by_key(|&key| self.order_of(key));
        if newest == self.mono_key {
            return Ok(());
        }
        self.mono_key = newest;
        for voice in 0..VOICE_COUNT {
            match newest {
                Some(key) => {
                    let freq = self.key_frequency(voice, key);
                    let velocity = self.velocity_of(key);
                    let slot = &mut self.slots[voice];
                    slot.key = Some(key);
                    slot.velocity = velocity;
                    if slot.gate {
                        slot.glide.set_target(freq);
                    } else {
                        slot.glide.jump(freq);
                        slot.gate = true;
                        self.write_control(audio, voice)?;
                    }
                }
                None => {
                    self.slots[voice].key = None;
                    self.slots[voice].gate = false;
                    self.write_control(audio, voice)?;
                }
            }
        }
        Ok(())
    }

    fn update_arp_table<A: RegisterBus>(&mut self, audio: &mut A) -> Result<()> {
        if !self.key_mode.is_split() {
            return Ok(());
        }
        let mut held = [0u8; ARP_CAPACITY];
        let mut len = 0;
        for key in 0..128u8 {
            if len == ARP_CAPACITY {
                break;
            }
            if self.keys[key as usize].is_some() && self.lane(key) == Lane::Arp {
                held[len] = key;
                len += 1;
            }
        }
        self.arp.rebuild(held[..len].iter().copied());

        if self.arp.is_empty() && self.arp_key.is_some() {
            self.arp_key = None;
            self.slots[ARP_VOICE].gate = false;
            self.write_control(audio, ARP_VOICE)?;
        }
        Ok(())
    }

    fn play_arp_step<A: RegisterBus>(&mut self, audio: &mut A, step: ArpStep) -> Result<()> {
        let freq = self.key_frequency(ARP_VOICE, step.key);
        let velocity = self.velocity_of(step.key);
        self.arp_key = Some(step.key);
        let slot = &mut self.slots[ARP_VOICE];
        slot.velocity = velocity;
        if step.wave.is_some() {
            slot.wave_override = step.wave;
        }
        slot.glide.set_target(freq);
        if slot.gate && self.arp.retrigger() {
            self.retrigger(audio, ARP_VOICE)
        } else {
            slot.gate = true;
            self.write_control(audio, ARP_VOICE)
        }
    }

    fn update_mod_gate<M: RegisterBus>(&mut self, modc: &mut M) -> Result<()> {
        let held = self.keys.iter().any(Option::is_some);
        if held && self.mod_gate && self.mod_retrigger {
            self.write_mod_control(modc, false)?;
            self.write_mod_control(modc, true)?;
        } else if held != self.mod_gate {
            self.write_mod_control(modc, held)?;
        }
        self.mod_gate = held;
        self.mod_retrigger = false;
        Ok(())
    }

    fn write_mod_control<M: RegisterBus>(&self, modc: &mut M, gate: bool) -> Result<()> {
        let mut control = self.lfo.lfo_wave;
        control.set(VoiceControl::GATE, gate);
        modc.write_register(voice_register(MOD_VOICE, VoiceRegister::Control), control.bits())?;
        Ok(())
    }

    /// Control byte for a voice: its timbre's waveform plus the gate.
    fn control_byte(&self, voice: usize) -> u8 {
        let timbre = self.key_mode.timbre_sources()[voice];
        let slot = &self.slots[voice];
        let mut control = self.voices[timbre].waveform;
        if let Some(wave) = slot.wave_override {
            control.remove(VoiceControl::WAVEFORMS);
            control.insert(wave);
        }
        control.set(VoiceControl::GATE, slot.gate);
        control.bits()
    }

    fn write_control<A: RegisterBus>(&mut self, audio: &mut A, voice: usize) -> Result<()> {
        let control = self.control_byte(voice);
        if self.slots[voice].written_control != Some(control) {
            audio.write_register(voice_register(voice, VoiceRegister::Control), control)?;
            self.slots[voice].written_control = Some(control);
        }
        Ok(())
    }

    /// Gate off then on within one call, restarting the attack.
    fn retrigger<A: RegisterBus>(&mut self, audio: &mut A, voice: usize) -> Result<()> {
        let control = self.control_byte(voice);
        let addr = voice_register(voice, VoiceRegister::Control);
        audio.write_register(addr, control & !VoiceControl::GATE.bits())?;
        audio.write_register(addr, control)?;
        self.slots[voice].written_control = Some(control);
        Ok(())
    }

    fn key_frequency(&self, voice: usize, key: u8) -> f64 {
        let timbre = self.key_mode.timbre_sources()[voice];
        self.table.shifted(key, self.voices[timbre].pitch_offset())
    }

    fn velocity_of(&self, key: u8) -> f32 {
        self.keys[key as usize].map_or(1.0, |press| press.velocity)
    }

    fn order_of(&self, key: u8) -> u64 {
        self.keys[key as usize].map_or(0, |press| press.order)
    }

    // --- Accessors ---

    pub fn config(&self) -> &VoiceManagerConfig {
        &self.config
    }

    pub fn key_mode(&self) -> KeyMode {
        self.key_mode
    }

    pub fn split(&self) -> u8 {
        self.split
    }

    /// Key currently sounding on `voice`.
    pub fn assigned_key(&self, voice: usize) -> Option<u8> {
        if self.key_mode.is_split() && voice == ARP_VOICE {
            return self.arp_key;
        }
        self.slots.get(voice).and_then(|slot| slot.key)
    }

    pub fn gate(&self, voice: usize) -> bool {
        self.slots.get(voice).is_some_and(|slot| slot.gate)
    }

    /// Glided frequency of `voice` before bend and modulation.
    pub fn voice_frequency(&self, voice: usize) -> Option<f64> {
        self.slots.get(voice).map(|slot| slot.glide.current())
    }

    pub fn held_keys(&self) -> usize {
        self.keys.iter().filter(|key| key.is_some()).count()
    }

    pub fn arpeggiator(&self) -> &Arpeggiator {
        &self.arp
    }

    pub fn routes(&self) -> ModRoutes {
        self.routes
    }

    pub fn set_routes(&mut self, routes: ModRoutes) {
        self.routes = routes;
    }

    pub fn depths(&self) -> &ModDepths {
        &self.depths
    }

    pub fn modulation(&self) -> &ModFrame {
        &self.frame
    }

    pub fn voice_patch(&self, voice: usize) -> Option<&VoicePatch> {
        self.voices.get(voice)
    }

    pub fn filter_patch(&self) -> &FilterPatch {
        &self.filter
    }

    pub fn mod_patch(&self) -> &ModPatch {
        &self.lfo
    }

    pub fn bend_range(&self) -> f32 {
        self.bend_range
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sidney_core::{ChipConfig, ChipCore, EnvelopeState};

    struct Rig {
        vm: VoiceManager,
        audio: ChipCore,
        modc: ChipCore,
    }

    impl Rig {
        fn new(mode: KeyMode) -> Self {
            let mut vm = VoiceManager::new(VoiceManagerConfig::default()).unwrap();
            vm.set_key_mode(mode);
            Self {
                vm,
                audio: ChipCore::new(ChipConfig::default()).unwrap(),
                modc: ChipCore::new(ChipConfig::default()).unwrap(),
            }
        }

        fn block(&mut self, samples: usize) {
            self.vm.begin_block(&mut self.audio, &mut self.modc).unwrap();
            for _ in 0..samples {
                self.vm.tick(&mut self.audio, &self.modc).unwrap();
                self.audio.clock();
                self.modc.clock();
            }
        }

        fn press(&mut self, keys: &[u8]) {
            for &key in keys {
                self.vm.note_on(key, 100);
            }
            self.block(16);
        }

        fn release(&mut self, keys: &[u8]) {
            for &key in keys {
                self.vm.note_off(key);
            }
            self.block(16);
        }

        fn freq_reg(&self, voice: usize) -> u16 {
            self.audio
                .registers()
                .word(voice_register(voice, VoiceRegister::FreqLo))
        }

        fn voice_of(&self, key: u8) -> Option<usize> {
            (0..VOICE_COUNT).find(|&v| self.vm.assigned_key(v) == Some(key))
        }
    }

    fn reg_for(key: u8) -> u16 {
        frequency_to_register(FrequencyTable::new().frequency(key), PAL_CLOCK)
    }

    /// Arpeggiated voice as seen right after each pitch change.
    #[derive(Debug, Clone, Copy)]
    struct ArpSnapshot {
        freq: u16,
        control: VoiceControl,
        envelope: EnvelopeState,
    }

    fn arp_steps(rig: &mut Rig, blocks: usize) -> Vec<ArpSnapshot> {
        let mut steps = Vec::new();
        let mut last = rig.freq_reg(ARP_VOICE);
        for _ in 0..blocks {
            rig.vm.begin_block(&mut rig.audio, &mut rig.modc).unwrap();
            for _ in 0..256 {
                rig.vm.tick(&mut rig.audio, &rig.modc).unwrap();
                rig.audio.clock();
                rig.modc.clock();
                let freq = rig.freq_reg(ARP_VOICE);
                if freq != last {
                    let voice = rig.audio.voice(ARP_VOICE).unwrap();
                    steps.push(ArpSnapshot {
                        freq,
                        control: voice.control(),
                        envelope: voice.envelope().state(),
                    });
                    last = freq;
                }
            }
        }
        steps
    }

    fn pulse_widths(rig: &Rig) -> [u16; VOICE_COUNT] {
        std::array::from_fn(|voice| {
            rig.audio
                .registers()
                .word(voice_register(voice, VoiceRegister::PulseWidthLo))
        })
    }

    #[test]
    fn test_config_validation() {
        let config = VoiceManagerConfig {
            mod_block: 0,
            ..Default::default()
        };
        assert!(matches!(
            VoiceManager::new(config),
            Err(Error::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_poly1_assigns_distinct_voices() {
        let mut rig = Rig::new(KeyMode::Poly1);
        rig.press(&[64, 60, 67]);
        let mut keys: Vec<u8> = (0..VOICE_COUNT)
            .map(|v| rig.vm.assigned_key(v).unwrap())
            .collect();
        keys.sort_unstable();
        assert_eq!(keys, vec![60, 64, 67]);
        for voice in 0..VOICE_COUNT {
            assert!(rig.vm.gate(voice));
            let key = rig.vm.assigned_key(voice).unwrap();
            assert_eq!(rig.freq_reg(voice), reg_for(key));
        }
    }

    #[test]
    fn test_poly1_release_then_press_reuses_freed_voice() {
        let mut rig = Rig::new(KeyMode::Poly1);
        rig.press(&[60, 64, 67]);
        let freed = rig.voice_of(60).unwrap();
        let others: Vec<(usize, Option<u8>)> = (0..VOICE_COUNT)
            .filter(|&v| v != freed)
            .map(|v| (v, rig.vm.assigned_key(v)))
            .collect();

        rig.release(&[60]);
        assert_eq!(rig.vm.assigned_key(freed), None);
        assert!(!rig.vm.gate(freed));

        rig.press(&[72]);
        assert_eq!(rig.voice_of(72), Some(freed));
        for (voice, key) in others {
            assert_eq!(rig.vm.assigned_key(voice), key);
        }
    }

    #[test]
    fn test_poly1_steals_middle_and_restores_preempted() {
        let mut rig = Rig::new(KeyMode::Poly1);
        rig.press(&[60, 64, 67]);
        let middle = rig.voice_of(64).unwrap();

        rig.press(&[72]);
        assert_eq!(rig.voice_of(72), Some(middle));
        assert_eq!(rig.voice_of(64), None);

        rig.release(&[72]);
        assert_eq!(rig.voice_of(64), Some(middle));
        assert_eq!(rig.freq_reg(middle), reg_for(64));
    }

    #[test]
    fn test_poly1_shares_voice_one_timbre() {
        let mut rig = Rig::new(KeyMode::Poly1);
        rig.vm.set_control(Control::Voice(0, VoiceParam::Square), 1.0);
        rig.vm.set_control(Control::Voice(0, VoiceParam::Ramp), 0.0);
        rig.press(&[60, 64, 67]);
        for voice in 0..VOICE_COUNT {
            let control = rig.audio.voice(voice).unwrap().control();
            assert_eq!(control, VoiceControl::SQUARE | VoiceControl::GATE);
        }
    }

    #[test]
    fn test_mono_legato_glide() {
        let mut rig = Rig::new(KeyMode::Mono);
        for voice in 0..VOICE_COUNT {
            rig.vm.set_control(Control::Voice(voice, VoiceParam::Glide), 0.5);
        }
        rig.press(&[60]);
        rig.block(512);
        for voice in 0..VOICE_COUNT {
            assert_eq!(rig.vm.assigned_key(voice), Some(60));
            assert!(rig.vm.gate(voice));
        }
        let envelope = |rig: &Rig| rig.audio.voice(0).unwrap().envelope().state();
        assert_ne!(envelope(&rig), EnvelopeState::Attack);

        // Legato: no retrigger, pitch glides upwards
        rig.vm.note_on(64, 100);
        rig.block(1);
        assert_eq!(rig.vm.assigned_key(0), Some(64));
        assert_ne!(envelope(&rig), EnvelopeState::Attack);
        let table = FrequencyTable::new();
        let mut last = rig.vm.voice_frequency(0).unwrap();
        for _ in 0..20 {
            rig.block(64);
            let now = rig.vm.voice_frequency(0).unwrap();
            assert!(now >= last && now <= table.frequency(64));
            last = now;
        }
        assert!(last > table.frequency(60));

        // Fall back to the still-held key
        rig.release(&[64]);
        assert_eq!(rig.vm.assigned_key(0), Some(60));
        assert!(rig.vm.gate(0));

        rig.release(&[60]);
        assert!(!rig.vm.gate(0));
        assert_eq!(envelope(&rig), EnvelopeState::Release);
    }

    #[test]
    fn test_poly4_arpeggiates_in_ascending_order() {
        let mut rig = Rig::new(KeyMode::Poly4);
        rig.vm.set_control(Control::ArpRate, 1.0);
        let period = rig.vm.arpeggiator().samples_per_step() as usize;
        assert_eq!(period, 882);
        for key in [67, 60, 64] {
            rig.vm.note_on(key, 100);
        }

        let mut changes = Vec::new();
        let mut last = rig.freq_reg(ARP_VOICE);
        let mut sample = 0usize;
        for _ in 0..30 {
            rig.vm.begin_block(&mut rig.audio, &mut rig.modc).unwrap();
            for _ in 0..256 {
                rig.vm.tick(&mut rig.audio, &rig.modc).unwrap();
                rig.audio.clock();
                rig.modc.clock();
                let reg = rig.freq_reg(ARP_VOICE);
                if reg != last {
                    changes.push((sample, reg));
                    last = reg;
                }
                sample += 1;
            }
        }

        let expected = [reg_for(60), reg_for(64), reg_for(67)];
        assert!(changes.len() >= 8);
        for (i, &(_, reg)) in changes.iter().enumerate() {
            assert_eq!(reg, expected[i % 3], "step {i}");
        }
        for pair in changes.windows(2) {
            let gap = pair[1].0 - pair[0].0;
            assert!(gap.abs_diff(period) <= 16, "gap {gap}");
        }
        // Poly pool untouched
        assert_eq!(rig.vm.assigned_key(0), None);
        assert_eq!(rig.vm.assigned_key(2), None);
    }

    #[test]
    fn test_poly3_split_routes_keys() {
        let mut rig = Rig::new(KeyMode::Poly3);
        rig.press(&[72, 48]);
        assert_eq!(rig.vm.assigned_key(0), Some(72));
        assert_eq!(rig.vm.assigned_key(ARP_VOICE), Some(48));
        assert_eq!(rig.vm.assigned_key(2), None);
        assert_eq!(rig.freq_reg(ARP_VOICE), reg_for(48));

        rig.release(&[48]);
        assert!(!rig.vm.gate(ARP_VOICE));
        assert_eq!(rig.vm.assigned_key(ARP_VOICE), None);
    }

    #[test]
    fn test_split_pool_steals_oldest() {
        let mut rig = Rig::new(KeyMode::Poly3);
        rig.press(&[70]);
        rig.press(&[80]);
        rig.press(&[90]);
        assert_eq!(rig.voice_of(70), None);
        assert!(rig.voice_of(80).is_some());
        assert!(rig.voice_of(90).is_some());
    }

    #[test]
    fn test_key_mode_change_reassigns_held_keys() {
        let mut rig = Rig::new(KeyMode::Poly1);
        rig.press(&[60]);
        rig.press(&[64]);
        rig.vm.set_control_index(90, 0.0).unwrap();
        assert_eq!(rig.vm.key_mode(), KeyMode::Mono);
        rig.block(16);
        for voice in 0..VOICE_COUNT {
            assert_eq!(rig.vm.assigned_key(voice), Some(64));
        }
    }

    #[test]
    fn test_controls_reach_registers() {
        let mut rig = Rig::new(KeyMode::Poly1);
        rig.vm.set_control(Control::Cutoff, 1.0);
        rig.vm.set_control(Control::Volume, 0.0);
        rig.vm.set_control(Control::Ladder, 1.0);
        rig.block(16);
        assert_eq!(rig.audio.filter().cutoff_register(), 0x7FF);
        assert_eq!(rig.audio.volume(), 0);
        assert_eq!(
            rig.audio.filter().topology(),
            sidney_core::Topology::Ladder
        );
        assert_eq!(
            rig.vm.set_control_index(100, 0.5),
            Err(Error::UnknownControl(100))
        );
    }

    #[test]
    fn test_clock_rate_change_rewrites_frequency() {
        let mut rig = Rig::new(KeyMode::Poly1);
        rig.press(&[69]);
        let voice = rig.voice_of(69).unwrap();
        rig.vm.set_clock_rate(sidney_core::NTSC_CLOCK);
        rig.block(16);
        assert_eq!(
            rig.freq_reg(voice),
            frequency_to_register(440.0, sidney_core::NTSC_CLOCK)
        );
    }

    #[test]
    fn test_sample_rate_change_retimes_arp_and_glide() {
        let mut rig = Rig::new(KeyMode::Mono);
        rig.vm.set_control(Control::ArpRate, 1.0);
        // 0.1^2 * 2 s = 20 ms of glide
        rig.vm.set_control(Control::Voice(0, VoiceParam::Glide), 0.1);
        rig.press(&[60]);

        assert_eq!(rig.vm.set_sample_rate(22_050.0), 22_050.0);
        assert_eq!(rig.vm.config().sample_rate, 22_050.0);
        assert_eq!(rig.vm.arpeggiator().samples_per_step(), 441);
        assert_eq!(rig.vm.set_sample_rate(1.0), MIN_SAMPLE_RATE);

        rig.vm.set_sample_rate(22_050.0);
        rig.vm.note_on(72, 100);
        rig.block(300);
        let target = FrequencyTable::new().frequency(72);
        assert!(rig.vm.voice_frequency(0).unwrap() < target);
        // 441 samples at the new rate, half of what 44.1 kHz would need
        rig.block(160);
        assert_eq!(rig.vm.voice_frequency(0), Some(target));
    }

    #[test]
    fn test_pitch_bend_shifts_frequency() {
        let mut rig = Rig::new(KeyMode::Poly1);
        rig.press(&[69]);
        let voice = rig.voice_of(69).unwrap();
        rig.vm.pitch_bend(1.0);
        rig.block(16);
        let expected = frequency_to_register(440.0 * semitone_ratio(2.0), PAL_CLOCK);
        assert_eq!(rig.freq_reg(voice), expected);
    }

    #[test]
    fn test_transpose_and_tune() {
        let mut rig = Rig::new(KeyMode::Poly1);
        rig.vm.set_control(Control::Voice(0, VoiceParam::Transpose), 0.75);
        assert_eq!(rig.vm.voice_patch(0).unwrap().transpose, 12);
        rig.press(&[57]);
        let voice = rig.voice_of(57).unwrap();
        assert_eq!(rig.freq_reg(voice), reg_for(69));
    }

    #[test]
    fn test_lfo_modulates_pulse_width() {
        let mut rig = Rig::new(KeyMode::Poly1);
        rig.vm.set_control(Control::LfoRate, 1.0);
        rig.vm.set_control(Control::Depth(Depth::LfoPulseWidth), 1.0);
        rig.vm.set_control(Control::Route(ModRoutes::LFO_PW_1), 1.0);
        rig.press(&[60]);

        let pw_reg = voice_register(0, VoiceRegister::PulseWidthLo);
        let mut seen = std::collections::BTreeSet::new();
        for _ in 0..20 {
            rig.block(256);
            seen.insert(rig.audio.registers().word(pw_reg));
        }
        assert!(seen.len() > 5, "pulse width values {seen:?}");
    }

    #[test]
    fn test_poly3_arpeggiates_every_low_key() {
        let mut rig = Rig::new(KeyMode::Poly3);
        rig.vm.set_control(Control::ArpRate, 1.0);
        for key in [55, 48, 72, 52] {
            rig.vm.note_on(key, 100);
        }

        let steps = arp_steps(&mut rig, 30);
        let expected = [reg_for(48), reg_for(52), reg_for(55)];
        assert!(steps.len() >= 8, "{} steps", steps.len());
        for (i, step) in steps.iter().enumerate() {
            assert_eq!(step.freq, expected[i % 3], "step {i}");
        }
        assert_eq!(rig.vm.assigned_key(0), Some(72));
        assert_eq!(rig.freq_reg(0), reg_for(72));
        assert_eq!(rig.vm.assigned_key(2), None);
    }

    #[test]
    fn test_arp_retrigger_restarts_attack() {
        let mut rig = Rig::new(KeyMode::Poly4);
        rig.vm.set_control(Control::ArpRate, 1.0);
        for key in [60, 64, 67] {
            rig.vm.note_on(key, 100);
        }
        let steps = arp_steps(&mut rig, 30);
        assert!(steps.len() >= 8);
        for (i, step) in steps.iter().enumerate() {
            assert_eq!(step.envelope, EnvelopeState::Attack, "step {i}");
        }
    }

    #[test]
    fn test_arp_without_retrigger_keeps_envelope() {
        let mut rig = Rig::new(KeyMode::Poly4);
        rig.vm.set_control(Control::ArpRate, 1.0);
        rig.vm.set_control(Control::ArpRetrigger, 0.0);
        for key in [60, 64, 67] {
            rig.vm.note_on(key, 100);
        }

        let steps = arp_steps(&mut rig, 30);
        assert!(steps.len() >= 8);
        // Only the first step opens the gate
        assert_eq!(steps[0].envelope, EnvelopeState::Attack);
        for (i, step) in steps.iter().enumerate().skip(1) {
            assert_ne!(step.envelope, EnvelopeState::Attack, "step {i}");
            assert!(step.control.contains(VoiceControl::GATE));
        }
        let expected = [reg_for(60), reg_for(64), reg_for(67)];
        for (i, step) in steps.iter().enumerate() {
            assert_eq!(step.freq, expected[i % 3], "step {i}");
        }
    }

    #[test]
    fn test_arp_wave_scan_rotates_waveform() {
        let mut rig = Rig::new(KeyMode::Poly4);
        rig.vm.set_control(Control::ArpRate, 1.0);
        rig.vm.set_control(Control::ArpWaveScan, 1.0);
        for key in [60, 64, 67] {
            rig.vm.note_on(key, 100);
        }

        let steps = arp_steps(&mut rig, 30);
        assert!(steps.len() >= 8);
        let scan = [VoiceControl::TRIANGLE, VoiceControl::RAMP, VoiceControl::SQUARE];
        for (i, step) in steps.iter().enumerate() {
            assert_eq!(
                step.control & VoiceControl::WAVEFORMS,
                scan[i % 3],
                "step {i}"
            );
        }

        // Turning the scan off restores the patch waveform
        rig.vm.set_control(Control::ArpWaveScan, 0.0);
        rig.block(16);
        let control = rig.audio.voice(ARP_VOICE).unwrap().control();
        assert_eq!(control & VoiceControl::WAVEFORMS, VoiceControl::RAMP);
    }

    #[test]
    fn test_poly2_routes_per_voice() {
        let mut rig = Rig::new(KeyMode::Poly2);
        rig.vm.set_control(Control::LfoRate, 1.0);
        rig.vm.set_control(Control::Depth(Depth::LfoPulseWidth), 1.0);
        rig.vm.set_control(Control::Route(ModRoutes::LFO_PW_2), 1.0);
        rig.press(&[60, 64, 67]);

        let mut seen: [std::collections::BTreeSet<u16>; VOICE_COUNT] = Default::default();
        for _ in 0..20 {
            rig.block(256);
            for (voice, pw) in pulse_widths(&rig).into_iter().enumerate() {
                seen[voice].insert(pw);
            }
        }
        assert_eq!(seen[0].len(), 1, "voice 1 {:?}", seen[0]);
        assert!(seen[1].len() > 5, "voice 2 {:?}", seen[1]);
        assert_eq!(seen[2].len(), 1, "voice 3 {:?}", seen[2]);

        // Poly1 follows voice 1's routes only, so the same bit moves nothing
        rig.vm.set_key_mode(KeyMode::Poly1);
        rig.block(256);
        let settled = pulse_widths(&rig);
        for _ in 0..20 {
            rig.block(256);
            assert_eq!(pulse_widths(&rig), settled);
        }
    }

    #[test]
    fn test_mod_gate_follows_held_keys() {
        let mut rig = Rig::new(KeyMode::Poly1);
        let mod_gate = |rig: &Rig| {
            rig.modc
                .voice(MOD_VOICE)
                .unwrap()
                .control()
                .contains(VoiceControl::GATE)
        };
        rig.block(16);
        assert!(!mod_gate(&rig));
        rig.press(&[60]);
        assert!(mod_gate(&rig));
        rig.release(&[60]);
        assert!(!mod_gate(&rig));
    }

    #[test]
    fn test_events_dispatch() {
        let mut vm = VoiceManager::new(VoiceManagerConfig::default()).unwrap();
        vm.handle_event(SynthEvent::NoteOn {
            key: 60,
            velocity: 90,
        })
        .unwrap();
        assert_eq!(vm.held_keys(), 1);
        vm.handle_event(SynthEvent::NoteOn {
            key: 60,
            velocity: 0,
        })
        .unwrap();
        assert_eq!(vm.held_keys(), 0);
        vm.handle_event(SynthEvent::Control {
            index: 95,
            value: 0.5,
        })
        .unwrap();
        assert_eq!(vm.bend_range(), 12.0);
    }
}
