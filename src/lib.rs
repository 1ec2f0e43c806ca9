//! # Sidney - Three-Voice Chip Synthesizer Engine
//!
//! A sound chip emulator driven by a polyphonic voice manager.
//!
//! ## Architecture
//!
//! Sidney is an umbrella crate that coordinates:
//! - **sidney-core** - Chip emulation (oscillators, ADSR, noise, analogue filter, instance pool)
//! - **sidney-synth** - Voice management (key-modes, glide, modulation routes, arpeggiator)
//!
//! The engine owns a [`ChipPair`]: an audio chip that sounds the notes and a
//! modulation chip whose third voice is a free-running LFO and envelope.
//! A [`SidneyHandle`] on the control thread feeds a wait-free queue that the
//! [`SidneyEngine`] drains at the start of every block.
//!
//! ## Quick Start
//!
//! ```
//! use sidney::prelude::*;
//!
//! let (mut engine, mut handle) = SidneyEngine::builder()
//!     .sample_rate(44_100.0)
//!     .key_mode(KeyMode::Poly1)
//!     .build()?;
//!
//! // Control thread
//! handle.note_on(60, 100)?;
//! handle.note_on(64, 100)?;
//! handle.control(48, 0.8)?; // filter cutoff
//!
//! // Render thread
//! let mut block = [0.0f32; 512];
//! engine.render(&mut block);
//! # Ok::<(), sidney::Error>(())
//! ```

/// Re-export of sidney-core for direct chip access
pub use sidney_core as core;

/// Re-export of sidney-synth for direct voice-manager access
pub use sidney_synth as synth;

pub use sidney_core::{
    AnalogConfig, AtomicFloat, ChipConfig, ChipCore, ChipHandle, ChipHost, ChipPool, IoCommand,
    RegisterBus, NTSC_CLOCK, PAL_CLOCK,
};

pub use sidney_synth::{
    Control, KeyMode, ModRoutes, SynthEvent, VoiceManager, VoiceManagerConfig,
};

mod error;
pub use error::{Error, Result};

mod builder;
mod engine;
mod handle;

pub use builder::{SidneyEngineBuilder, DEFAULT_QUEUE_CAPACITY};
pub use engine::{ChipPair, SidneyEngine};
pub use handle::{AnalogParam, ControlMessage, SidneyHandle, MAX_MASTER_GAIN};

/// Convenience prelude for common imports
pub mod prelude {
    // Main engine
    pub use crate::{SidneyEngine, SidneyEngineBuilder, SidneyHandle};

    // Control messages
    pub use crate::{AnalogParam, ControlMessage};

    // Voice manager
    pub use crate::{Control, KeyMode, ModRoutes, SynthEvent};

    // Chip
    pub use crate::{AnalogConfig, ChipConfig, ChipCore, RegisterBus, NTSC_CLOCK, PAL_CLOCK};

    pub use crate::{Error, Result};
}
