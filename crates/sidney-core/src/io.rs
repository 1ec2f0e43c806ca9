//! Numeric chip surface.
//!
//! [`ChipHost`] owns a [`ChipPool`] and exposes the two calls existing
//! control callers use: a register write and an analogue-IO command. The
//! typed methods return [`Result`]; the `*_raw` methods fold every error
//! into the legacy sentinel (`-1` / `-1.0`) and never panic.

use crate::config::{ChipConfig, DEFAULT_SAMPLE_RATE, MAX_SAMPLE_RATE, MIN_SAMPLE_RATE};
use crate::pool::{ChipHandle, ChipPool};
use crate::{Error, Result};

/// Sentinel returned by the numeric register/handle calls on failure.
pub const REGISTER_FAILURE: i32 = -1;

/// Sentinel returned by the numeric IO call on failure.
pub const IO_FAILURE: f32 = -1.0;

/// Analogue-IO command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum IoCommand {
    /// Create an instance; param is the host sample rate.
    Init = 0,
    Destroy = 1,
    /// Produce one sample.
    Clock = 2,
    Gain = 3,
    Detune = 4,
    Leakage = 5,
    SnRatio = 6,
    DcBias = 7,
    PoleMix = 8,
    ClockRate = 9,
}

impl IoCommand {
    pub fn from_id(id: i32) -> Result<Self> {
        Ok(match id {
            0 => Self::Init,
            1 => Self::Destroy,
            2 => Self::Clock,
            3 => Self::Gain,
            4 => Self::Detune,
            5 => Self::Leakage,
            6 => Self::SnRatio,
            7 => Self::DcBias,
            8 => Self::PoleMix,
            9 => Self::ClockRate,
            _ => return Err(Error::UnknownCommand(id)),
        })
    }

    pub fn id(self) -> i32 {
        self as i32
    }
}

/// Owner of every chip instance reachable through numeric handles.
#[derive(Debug, Default)]
pub struct ChipHost {
    pool: ChipPool,
}

impl ChipHost {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a chip at `sample_rate`. Non-positive selects the default,
    /// anything else is clamped to the supported range.
    pub fn init(&mut self, sample_rate: f64) -> Result<ChipHandle> {
        let sample_rate = if sample_rate > 0.0 {
            sample_rate.clamp(MIN_SAMPLE_RATE, MAX_SAMPLE_RATE)
        } else {
            DEFAULT_SAMPLE_RATE
        };
        self.pool.create(ChipConfig::with_sample_rate(sample_rate))
    }

    pub fn destroy(&mut self, handle: ChipHandle) -> Result<()> {
        self.pool.destroy(handle)
    }

    pub fn write_register(&mut self, handle: ChipHandle, addr: u8, value: u8) -> Result<u8> {
        self.pool.get_mut(handle)?.write_register(addr, value)
    }

    pub fn read_register(&self, handle: ChipHandle, addr: u8) -> Result<u8> {
        self.pool.get(handle)?.read_register(addr)
    }

    /// Run an IO command against an existing instance. `Init` is not
    /// instance-bound and goes through [`ChipHost::init`].
    pub fn io(&mut self, handle: ChipHandle, command: IoCommand, param: f32) -> Result<f32> {
        if command == IoCommand::Destroy {
            self.destroy(handle)?;
            return Ok(0.0);
        }
        let chip = self.pool.get_mut(handle)?;
        Ok(match command {
            IoCommand::Init => return Err(Error::InvalidHandle),
            IoCommand::Destroy => 0.0,
            IoCommand::Clock => chip.clock(),
            IoCommand::Gain => chip.set_gain(param),
            IoCommand::Detune => chip.set_detune(param),
            IoCommand::Leakage => chip.set_leakage(param),
            IoCommand::SnRatio => chip.set_sn_ratio(param),
            IoCommand::DcBias => chip.set_dc_bias(param),
            IoCommand::PoleMix => chip.set_pole_mix(param),
            IoCommand::ClockRate => chip.set_clock_rate(param as f64) as f32,
        })
    }

    /// Numeric register write. Returns the previous byte or `-1`.
    pub fn register_raw(&mut self, handle: i32, addr: i32, value: i32) -> i32 {
        let (Some(handle), Ok(addr)) = (ChipHandle::from_raw(handle), u8::try_from(addr)) else {
            return REGISTER_FAILURE;
        };
        // Values wider than a byte keep their low eight bits
        self.write_register(handle, addr, value as u8)
            .map_or(REGISTER_FAILURE, i32::from)
    }

    /// Numeric IO call. `Init` ignores `handle` and returns the new raw
    /// handle; every failure returns `-1.0`.
    pub fn io_raw(&mut self, handle: i32, command: i32, param: f32) -> f32 {
        let Ok(command) = IoCommand::from_id(command) else {
            return IO_FAILURE;
        };
        if command == IoCommand::Init {
            return self
                .init(param as f64)
                .map_or(IO_FAILURE, |handle| handle.to_raw() as f32);
        }
        ChipHandle::from_raw(handle)
            .ok_or(Error::InvalidHandle)
            .and_then(|handle| self.io(handle, command, param))
            .unwrap_or(IO_FAILURE)
    }

    pub fn pool(&self) -> &ChipPool {
        &self.pool
    }

    pub fn pool_mut(&mut self) -> &mut ChipPool {
        &mut self.pool
    }
}
