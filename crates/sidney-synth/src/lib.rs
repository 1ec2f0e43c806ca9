//! Voice management for the sidney chip engine.
//!
//! Turns note, bend and controller events into register writes on two
//! chips: an audio chip that sounds the notes and a modulation chip whose
//! third voice supplies the LFO (`OSC3`) and envelope (`ENV3`) taps.
//!
//! - **[`VoiceManager`]** - Key-modes, voice assignment and stealing
//! - **[`Glide`]** - Exponential pitch glide
//! - **[`ModRoutes`]** - Modulation route bitmask
//! - **[`Arpeggiator`]** - Fixed-capacity arpeggiator for the split modes
//! - **[`Control`]** - The 100-entry controller map
//! - **[`SynthEvent`]** - Events, with conversion from MIDI
//!
//! # Quick Start
//!
//! ```
//! use sidney_core::{ChipConfig, ChipCore};
//! use sidney_synth::{KeyMode, VoiceManager, VoiceManagerConfig};
//!
//! let mut audio = ChipCore::new(ChipConfig::default())?;
//! let mut modc = ChipCore::new(ChipConfig::default())?;
//! let mut voices = VoiceManager::new(VoiceManagerConfig::default())?;
//! voices.set_key_mode(KeyMode::Mono);
//! voices.note_on(60, 100);
//!
//! voices.begin_block(&mut audio, &mut modc)?;
//! for _ in 0..64 {
//!     voices.tick(&mut audio, &modc)?;
//!     audio.clock();
//!     modc.clock();
//! }
//! assert_eq!(voices.assigned_key(0), Some(60));
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod error;
pub use error::{Error, Result};

mod tuning;
pub use tuning::{semitone_ratio, FrequencyTable, A4_FREQ, A4_NOTE};

mod glide;
pub use glide::Glide;

pub mod modulation;
pub use modulation::{ModDepths, ModFrame, ModRoutes, ModSources};

pub mod arpeggiator;
pub use arpeggiator::{ArpStep, Arpeggiator, ARP_CAPACITY};

pub mod controls;
pub use controls::{Control, Depth, VoiceParam, CONTROL_COUNT};

mod event;
pub use event::SynthEvent;

pub mod patch;
pub use patch::{FilterPatch, ModPatch, VoicePatch};

mod voice;
pub use voice::{
    KeyMode, VoiceManager, VoiceManagerConfig, DEFAULT_BEND_RANGE, DEFAULT_MOD_BLOCK,
    DEFAULT_SPLIT, MAX_BEND_RANGE,
};
