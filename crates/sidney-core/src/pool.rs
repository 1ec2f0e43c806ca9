//! Fixed-capacity chip instance pool with generation-checked handles.
//!
//! A slot's generation is bumped every time its chip is destroyed, so a
//! handle kept past `destroy` never reaches the next occupant.

use crate::chip::ChipCore;
use crate::config::ChipConfig;
use crate::{Error, Result};
use tracing::debug;

/// Number of chip instances the pool can hold.
pub const POOL_CAPACITY: usize = 16;

/// Generations are kept to 15 bits so a raw handle survives a round trip
/// through the `f32` IO surface exactly.
const GENERATION_MASK: u32 = 0x7FFF;

/// Opaque handle naming one live chip instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ChipHandle {
    slot: u8,
    generation: u32,
}

impl ChipHandle {
    /// Numeric form used by the legacy surface: `(generation << 8) | slot`.
    pub fn to_raw(self) -> i32 {
        ((self.generation << 8) | self.slot as u32) as i32
    }

    /// Parse a numeric handle. Negative values are never valid.
    pub fn from_raw(raw: i32) -> Option<Self> {
        if raw < 0 {
            return None;
        }
        let raw = raw as u32;
        let generation = raw >> 8;
        if generation == 0 || generation > GENERATION_MASK {
            return None;
        }
        Some(Self {
            slot: (raw & 0xFF) as u8,
            generation,
        })
    }

    pub fn slot(self) -> usize {
        self.slot as usize
    }

    pub fn generation(self) -> u32 {
        self.generation
    }
}

#[derive(Debug)]
struct Slot {
    generation: u32,
    chip: Option<Box<ChipCore>>,
}

/// Arena of chip instances.
#[derive(Debug)]
pub struct ChipPool {
    slots: Vec<Slot>,
}

impl ChipPool {
    pub fn new() -> Self {
        Self {
            slots: (0..POOL_CAPACITY)
                .map(|_| Slot {
                    generation: 1,
                    chip: None,
                })
                .collect(),
        }
    }

    /// Create a chip in the first free slot.
    pub fn create(&mut self, config: ChipConfig) -> Result<ChipHandle> {
        let (index, slot) = self
            .slots
            .iter_mut()
            .enumerate()
            .find(|(_, slot)| slot.chip.is_none())
            .ok_or(Error::PoolExhausted {
                capacity: POOL_CAPACITY,
            })?;
        slot.chip = Some(Box::new(ChipCore::new(config)?));
        let handle = ChipHandle {
            slot: index as u8,
            generation: slot.generation,
        };
        debug!(slot = index, generation = handle.generation, "chip created");
        Ok(handle)
    }

    /// Destroy a chip. The handle (and every copy of it) becomes stale.
    pub fn destroy(&mut self, handle: ChipHandle) -> Result<()> {
        let slot = self.slot_mut(handle)?;
        slot.chip = None;
        slot.generation = (slot.generation + 1) & GENERATION_MASK;
        if slot.generation == 0 {
            slot.generation = 1;
        }
        debug!(slot = handle.slot(), "chip destroyed");
        Ok(())
    }

    pub fn get(&self, handle: ChipHandle) -> Result<&ChipCore> {
        self.slots
            .get(handle.slot())
            .filter(|slot| slot.generation == handle.generation)
            .and_then(|slot| slot.chip.as_deref())
            .ok_or(Error::InvalidHandle)
    }

    pub fn get_mut(&mut self, handle: ChipHandle) -> Result<&mut ChipCore> {
        self.slot_mut(handle)?
            .chip
            .as_deref_mut()
            .ok_or(Error::InvalidHandle)
    }

    fn slot_mut(&mut self, handle: ChipHandle) -> Result<&mut Slot> {
        self.slots
            .get_mut(handle.slot())
            .filter(|slot| slot.generation == handle.generation && slot.chip.is_some())
            .ok_or(Error::InvalidHandle)
    }

    /// Number of live chips.
    pub fn len(&self) -> usize {
        self.slots.iter().filter(|slot| slot.chip.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        POOL_CAPACITY
    }
}

impl Default for ChipPool {
    fn default() -> Self {
        Self::new()
    }
}
