//! Three-voice sound chip emulator.
//!
//! # Primary API
//!
//! - [`ChipCore`]: one chip instance (register bank, voices, filter)
//! - [`ChipPool`] / [`ChipHandle`]: generation-checked instance arena
//! - [`ChipHost`]: the numeric register/IO surface over a pool
//! - [`RegisterBus`]: anything that accepts chip register writes
//!
//! # Example
//!
//! ```
//! use sidney_core::{ChipConfig, ChipCore, VoiceControl, registers};
//!
//! let mut chip = ChipCore::new(ChipConfig::default())?;
//! chip.write_register(registers::V1_SUSTAIN_RELEASE, 0xF0)?;
//! chip.write_register(registers::MODE_VOLUME, 0x0F)?;
//! chip.write_register(registers::V1_CONTROL, (VoiceControl::RAMP | VoiceControl::GATE).bits())?;
//!
//! let mut block = [0.0f32; 256];
//! chip.render(&mut block);
//! # Ok::<(), sidney_core::Error>(())
//! ```

pub mod error;
pub use error::{Error, Result};

pub mod config;
pub use config::{AnalogConfig, ChipConfig, DEFAULT_SAMPLE_RATE, NTSC_CLOCK, PAL_CLOCK};

pub mod registers;
pub use registers::{
    ChipControl, FilterMode, FilterRouting, Register, RegisterBank, VoiceControl, VoiceRegister,
};

pub mod envelope;
pub use envelope::{EnvelopeGenerator, EnvelopeState, RateStep, RateTable};

pub mod noise;
pub use noise::NoiseGenerator;

pub mod oscillator;
pub use oscillator::{frequency_to_register, register_to_frequency, Oscillator};

pub mod voice;
pub use voice::{MixMode, Voice};

pub mod filter;
pub use filter::{AnalogFilter, FilterState, Topology};

mod chip;
pub use chip::{ChipCore, DEFAULT_PULSE_WIDTH, DEFAULT_TONE_HZ};

pub mod pool;
pub use pool::{ChipHandle, ChipPool, POOL_CAPACITY};

pub mod io;
pub use io::{ChipHost, IoCommand, IO_FAILURE, REGISTER_FAILURE};

mod lockfree;
pub use lockfree::AtomicFloat;

/// A sink for chip register writes.
///
/// The voice manager drives chips only through this trait, never by
/// touching chip internals.
pub trait RegisterBus {
    /// Write `value` to `addr`, returning the byte previously held.
    fn write_register(&mut self, addr: u8, value: u8) -> Result<u8>;

    fn read_register(&self, addr: u8) -> Result<u8>;
}
