//! One emulated chip: register bank, three voices and the analogue filter.
//!
//! Every register write is decoded into its sub-unit inside the same call,
//! so the raw bank and the derived state never disagree. `clock` produces
//! one host sample; nothing on that path allocates or can fail.

use crate::config::{
    AnalogConfig, ChipConfig, MAX_CLOCK_RATE, MAX_SAMPLE_RATE, MIN_CLOCK_RATE, MIN_SAMPLE_RATE,
};
use crate::envelope::RateTable;
use crate::filter::{AnalogFilter, Topology};
use crate::oscillator::frequency_to_register;
use crate::registers::{
    decode_cutoff, voice_register, ChipControl, FilterMode, FilterRouting, Register, RegisterBank,
    VoiceControl, VoiceRegister, CONTROL, CUTOFF_HI, CUTOFF_LO, VOICE_COUNT,
};
use crate::voice::{MixMode, Voice};
use crate::{Error, RegisterBus, Result};
use tracing::debug;

/// Frequency every voice is tuned to after a reset.
pub const DEFAULT_TONE_HZ: f64 = 440.0;

/// Pulse width every voice gets after a reset (50% duty).
pub const DEFAULT_PULSE_WIDTH: u16 = 0x800;

/// Index of the voice preceding `voice` in ring order (v1 <- v3, v2 <- v1, v3 <- v2).
#[inline]
const fn ring_source(voice: usize) -> usize {
    (voice + VOICE_COUNT - 1) % VOICE_COUNT
}

/// A single chip instance.
#[derive(Debug, Clone)]
pub struct ChipCore {
    config: ChipConfig,
    bank: RegisterBank,
    voices: [Voice; VOICE_COUNT],
    filter: AnalogFilter,
    rates: RateTable,
    control: ChipControl,
    routing: FilterRouting,
    mode: FilterMode,
    volume: u8,
    output: f32,
}

impl ChipCore {
    /// Create a chip and bring it to its reset state.
    pub fn new(config: ChipConfig) -> Result<Self> {
        config.validate()?;
        let config = ChipConfig {
            analog: config.analog.clamped(),
            ..config
        };
        let rates = RateTable::new(config.sample_rate);
        let scale = config.clock_rate / config.sample_rate;
        let detune = config.analog.detune;
        let mut chip = Self {
            voices: [
                Voice::new(0, scale, detune, &rates),
                Voice::new(1, scale, detune, &rates),
                Voice::new(2, scale, detune, &rates),
            ],
            filter: AnalogFilter::new(config.sample_rate, &config.analog),
            bank: RegisterBank::new(),
            rates,
            control: ChipControl::empty(),
            routing: FilterRouting::empty(),
            mode: FilterMode::empty(),
            volume: 0,
            output: 0.0,
            config,
        };
        chip.reset();
        Ok(chip)
    }

    /// Hardware reset.
    ///
    /// Reseeds noise, clears the register bank, retunes every voice to the
    /// default tone, clears filter memory and rebuilds the rate tables from
    /// the configured sample rate.
    pub fn reset(&mut self) {
        debug!(sample_rate = self.config.sample_rate, "chip reset");
        self.bank.clear();
        self.rates = RateTable::new(self.config.sample_rate);
        self.control = ChipControl::empty();
        self.routing = FilterRouting::empty();
        self.mode = FilterMode::empty();
        self.volume = 0;
        self.output = 0.0;

        let scale = self.scale();
        let tone = frequency_to_register(DEFAULT_TONE_HZ, self.config.clock_rate);
        for index in 0..VOICE_COUNT {
            let voice = &mut self.voices[index];
            voice.reset();
            voice.oscillator.set_scale(scale);
            voice.oscillator.set_frequency(tone);
            voice.oscillator.set_pulse_width(DEFAULT_PULSE_WIDTH);
            voice.envelope.rebuild(&self.rates);
            voice.envelope.set_attack_decay(0, &self.rates);
            voice.envelope.set_sustain_release(0, &self.rates);

            let [freq_lo, freq_hi] = tone.to_le_bytes();
            let [pw_lo, pw_hi] = DEFAULT_PULSE_WIDTH.to_le_bytes();
            self.bank.set(voice_register(index, VoiceRegister::FreqLo), freq_lo);
            self.bank.set(voice_register(index, VoiceRegister::FreqHi), freq_hi);
            self.bank.set(voice_register(index, VoiceRegister::PulseWidthLo), pw_lo);
            self.bank.set(voice_register(index, VoiceRegister::PulseWidthHi), pw_hi);
        }

        self.filter.clear();
        self.filter.set_sample_rate(self.config.sample_rate);
        self.filter.set_cutoff_register(0);
        self.filter.set_resonance(0);
        self.filter.set_mode(FilterMode::empty());
        self.filter.set_topology(Topology::StateVariable);
    }

    /// Write a register, returning the byte it held before.
    ///
    /// Writing one of the voice-3 taps changes nothing and returns its
    /// current derived value.
    pub fn write_register(&mut self, addr: u8, value: u8) -> Result<u8> {
        let register = Register::decode(addr).ok_or(Error::InvalidRegister(addr))?;
        if register.is_read_only() {
            return Ok(self.tap(register));
        }

        let previous = self.bank.set(addr, value);
        if self.control.contains(ChipControl::DEBUG) {
            debug!(addr, value, previous, "register write");
        }

        match register {
            Register::Voice(index, VoiceRegister::FreqLo | VoiceRegister::FreqHi) => {
                let frequency = self.bank.word(voice_register(index, VoiceRegister::FreqLo));
                self.voices[index].oscillator.set_frequency(frequency);
            }
            Register::Voice(index, VoiceRegister::PulseWidthLo | VoiceRegister::PulseWidthHi) => {
                let pulse_width = self.bank.word(voice_register(index, VoiceRegister::PulseWidthLo));
                self.voices[index].oscillator.set_pulse_width(pulse_width);
            }
            Register::Voice(index, VoiceRegister::Control) => {
                self.voices[index].set_control(VoiceControl::from_bits_retain(value));
            }
            Register::Voice(index, VoiceRegister::AttackDecay) => {
                self.voices[index].envelope.set_attack_decay(value, &self.rates);
            }
            Register::Voice(index, VoiceRegister::SustainRelease) => {
                self.voices[index].envelope.set_sustain_release(value, &self.rates);
            }
            Register::CutoffLo | Register::CutoffHi => {
                let cutoff = decode_cutoff(self.bank.get(CUTOFF_LO), self.bank.get(CUTOFF_HI));
                self.filter.set_cutoff_register(cutoff);
            }
            Register::ResonanceRouting => {
                self.filter.set_resonance(value >> 4);
                self.routing = FilterRouting::from_bits_truncate(value);
            }
            Register::ModeVolume => {
                self.mode = FilterMode::from_bits_truncate(value);
                self.filter.set_mode(self.mode);
                self.volume = value & 0x0F;
            }
            Register::PotX | Register::PotY => {}
            Register::Control => {
                let control = ChipControl::from_bits_truncate(value);
                if control.contains(ChipControl::RESET) {
                    self.reset();
                }
                let kept = control - ChipControl::RESET;
                self.bank.set(CONTROL, kept.bits());
                self.apply_control(kept);
            }
            Register::Osc3 | Register::Env3 => {}
        }
        Ok(previous)
    }

    /// Read a register. The voice-3 taps return live derived values.
    pub fn read_register(&self, addr: u8) -> Result<u8> {
        let register = Register::decode(addr).ok_or(Error::InvalidRegister(addr))?;
        Ok(if register.is_read_only() {
            self.tap(register)
        } else {
            self.bank.get(addr)
        })
    }

    fn tap(&self, register: Register) -> u8 {
        let voice = &self.voices[VOICE_COUNT - 1];
        match register {
            Register::Osc3 => (voice.wave() >> 4) as u8,
            Register::Env3 => voice.envelope().counter(),
            _ => self.bank.get(register.address()),
        }
    }

    fn apply_control(&mut self, control: ChipControl) {
        self.control = control;
        self.filter.set_topology(if control.contains(ChipControl::LADDER) {
            Topology::Ladder
        } else {
            Topology::StateVariable
        });
    }

    /// Advance every voice and the filter by one host sample.
    #[inline]
    pub fn clock(&mut self) -> f32 {
        let mix = self.mix_mode();
        let leakage = self.config.analog.leakage;

        for voice in &mut self.voices {
            voice.advance();
        }

        let before_sync = [
            self.voices[0].as_neighbour(),
            self.voices[1].as_neighbour(),
            self.voices[2].as_neighbour(),
        ];
        for (index, voice) in self.voices.iter_mut().enumerate() {
            voice.apply_sync(&before_sync[ring_source(index)]);
        }

        let neighbours = [
            self.voices[0].as_neighbour(),
            self.voices[1].as_neighbour(),
            self.voices[2].as_neighbour(),
        ];
        let mut filtered = 0.0;
        let mut bypass = 0.0;
        for (index, voice) in self.voices.iter_mut().enumerate() {
            let out = voice.render(mix, &neighbours[ring_source(index)], leakage);
            if self.routing.contains(FilterRouting::voice(index)) {
                filtered += out;
            } else if !(index == VOICE_COUNT - 1 && self.mode.contains(FilterMode::VOICE3_OFF)) {
                bypass += out;
            }
        }

        let noise = self.voices[0].noise().bipolar();
        let filtered = self.filter.process(filtered, noise);
        self.output = (filtered + bypass) * (self.volume as f32 / 15.0) * self.config.analog.gain;
        self.output
    }

    /// Fill `out` with consecutive samples.
    pub fn render(&mut self, out: &mut [f32]) {
        for sample in out.iter_mut() {
            *sample = self.clock();
        }
    }

    fn scale(&self) -> f64 {
        self.config.clock_rate / self.config.sample_rate
    }

    // --- Analogue settings. Each clamps and returns the applied value. ---

    pub fn set_gain(&mut self, gain: f32) -> f32 {
        self.config.analog.gain = gain.clamp(0.0, AnalogConfig::MAX_GAIN);
        self.config.analog.gain
    }

    pub fn set_detune(&mut self, detune: f32) -> f32 {
        let detune = detune.clamp(0.0, AnalogConfig::MAX_DETUNE);
        self.config.analog.detune = detune;
        for voice in &mut self.voices {
            voice.oscillator.set_detune(detune);
        }
        detune
    }

    pub fn set_leakage(&mut self, leakage: f32) -> f32 {
        self.config.analog.leakage = leakage.clamp(0.0, 1.0);
        self.config.analog.leakage
    }

    pub fn set_sn_ratio(&mut self, ratio: f32) -> f32 {
        let ratio = ratio.clamp(0.0, 1.0);
        self.config.analog.sn_ratio = ratio;
        self.filter.set_sn_ratio(ratio);
        ratio
    }

    pub fn set_dc_bias(&mut self, bias: f32) -> f32 {
        let bias = bias.clamp(-1.0, 1.0);
        self.config.analog.dc_bias = bias;
        self.filter.set_dc_bias(bias);
        bias
    }

    pub fn set_pole_mix(&mut self, mix: f32) -> f32 {
        let mix = mix.clamp(0.0, 1.0);
        self.config.analog.pole_mix = mix;
        self.filter.set_pole_mix(mix);
        mix
    }

    /// Change the nominal chip clock. Frequency registers keep their values,
    /// so pitch scales with the clock.
    pub fn set_clock_rate(&mut self, clock_rate: f64) -> f64 {
        self.config.clock_rate = clock_rate.clamp(MIN_CLOCK_RATE, MAX_CLOCK_RATE);
        let scale = self.scale();
        for voice in &mut self.voices {
            voice.oscillator.set_scale(scale);
        }
        self.config.clock_rate
    }

    /// Change the host sample rate and rebuild everything derived from it.
    pub fn set_sample_rate(&mut self, sample_rate: f64) -> f64 {
        self.config.sample_rate = sample_rate.clamp(MIN_SAMPLE_RATE, MAX_SAMPLE_RATE);
        self.rates = RateTable::new(self.config.sample_rate);
        let scale = self.scale();
        for voice in &mut self.voices {
            voice.oscillator.set_scale(scale);
            voice.envelope.rebuild(&self.rates);
        }
        self.filter.set_sample_rate(self.config.sample_rate);
        self.config.sample_rate
    }

    // --- Accessors ---

    pub fn config(&self) -> &ChipConfig {
        &self.config
    }

    pub fn registers(&self) -> &RegisterBank {
        &self.bank
    }

    pub fn voice(&self, index: usize) -> Option<&Voice> {
        self.voices.get(index)
    }

    pub fn filter(&self) -> &AnalogFilter {
        &self.filter
    }

    pub fn control(&self) -> ChipControl {
        self.control
    }

    pub fn routing(&self) -> FilterRouting {
        self.routing
    }

    pub fn filter_mode(&self) -> FilterMode {
        self.mode
    }

    pub fn volume(&self) -> u8 {
        self.volume
    }

    pub fn mix_mode(&self) -> MixMode {
        if self.control.contains(ChipControl::MULTI) {
            MixMode::Multi
        } else {
            MixMode::And
        }
    }

    /// Last sample produced by `clock`.
    pub fn output(&self) -> f32 {
        self.output
    }
}

impl RegisterBus for ChipCore {
    fn write_register(&mut self, addr: u8, value: u8) -> Result<u8> {
        ChipCore::write_register(self, addr, value)
    }

    fn read_register(&self, addr: u8) -> Result<u8> {
        ChipCore::read_register(self, addr)
    }
}
