//! Note and controller events consumed by the voice manager.

use midi_msg::{ChannelVoiceMsg, ControlChange};

use crate::controls::CONTROL_COUNT;

/// A note or controller event.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SynthEvent {
    NoteOn { key: u8, velocity: u8 },
    NoteOff { key: u8, velocity: u8 },
    /// Pitch bend, -1..1 of the bend range.
    PitchBend(f32),
    /// Controller-map change with a normalized value.
    Control { index: u16, value: f32 },
}

impl SynthEvent {
    /// Convert a MIDI channel voice message.
    ///
    /// Note-on with velocity 0 is a note-off. Control-change numbers below
    /// the size of the controller map address it directly. Anything else is
    /// not for the voice manager and yields `None`.
    pub fn from_midi(msg: &ChannelVoiceMsg) -> Option<Self> {
        match *msg {
            ChannelVoiceMsg::NoteOn { note, velocity: 0 } => Some(Self::NoteOff {
                key: note,
                velocity: 0,
            }),
            ChannelVoiceMsg::NoteOn { note, velocity } => Some(Self::NoteOn {
                key: note,
                velocity,
            }),
            ChannelVoiceMsg::NoteOff { note, velocity } => Some(Self::NoteOff {
                key: note,
                velocity,
            }),
            ChannelVoiceMsg::PitchBend { bend } => {
                Some(Self::PitchBend((bend as f32 - 8192.0) / 8192.0))
            }
            ChannelVoiceMsg::ControlChange {
                control: ControlChange::CC { control, value },
            } if (control as u16) < CONTROL_COUNT => Some(Self::Control {
                index: control as u16,
                value: value as f32 / 127.0,
            }),
            _ => None,
        }
    }
}
