//! External I/O Integration
//!
//! Bridges the voice engine with its collaborators: note events arriving from
//! a keyboard or MIDI controller, and the sound output that turns voice state
//! into audio.

use crate::config::Waveform;
use crate::polyphony::VoiceId;
use crate::voice::Voice;
use alloc::vec::Vec;
use serde::{Deserialize, Serialize};

/// A note event from any input source
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "type")]
pub enum NoteEvent {
    On { note: u8, velocity: u8 },
    Off { note: u8 },
}

impl NoteEvent {
    /// Decode a raw MIDI message.
    ///
    /// Note On with velocity 0 is a Note Off. The channel is ignored and every
    /// other message type yields `None`.
    pub fn from_midi(msg: &[u8]) -> Option<Self> {
        let (&status, data) = msg.split_first()?;
        match (status & 0xF0, data) {
            (0x90, &[note, velocity, ..]) if velocity > 0 => Some(NoteEvent::On {
                note: note & 0x7F,
                velocity: velocity & 0x7F,
            }),
            (0x80, &[note, _, ..]) | (0x90, &[note, _, ..]) => {
                Some(NoteEvent::Off { note: note & 0x7F })
            }
            _ => None,
        }
    }

    pub fn note(&self) -> u8 {
        match *self {
            NoteEvent::On { note, .. } | NoteEvent::Off { note } => note,
        }
    }
}

/// Sound output collaborator.
///
/// The engine calls these as voice state changes. An implementation typically
/// owns one oscillator and gain stage per `VoiceId` and shapes its gain to
/// follow [`Voice::envelope_at`]. Every method defaults to doing nothing.
pub trait VoiceSink {
    /// A new voice was created and triggered from silence
    fn voice_started(&mut self, _id: VoiceId, _voice: &Voice) {}

    /// An existing voice was retriggered; its attack starts from
    /// [`Voice::start_level`]
    fn voice_retriggered(&mut self, _id: VoiceId, _voice: &Voice) {}

    /// A voice's pitch changed
    fn frequency_changed(&mut self, _id: VoiceId, _frequency: f64, _now: f64) {}

    /// A voice entered its release phase
    fn voice_released(&mut self, _id: VoiceId, _voice: &Voice) {}

    /// A voice's oscillator shape changed
    fn waveform_changed(&mut self, _id: VoiceId, _waveform: Waveform) {}

    /// The output volume changed
    fn master_volume_changed(&mut self, _volume: f64) {}

    /// A voice went dormant; release whatever resources back it
    fn voice_disposed(&mut self, _id: VoiceId, _note: u8) {}
}

/// Sink that ignores everything
impl VoiceSink for () {}

/// A recorded sink callback
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "snake_case", tag = "type")]
pub enum SinkEvent {
    Started {
        id: VoiceId,
        note: u8,
        frequency: f64,
    },
    Retriggered {
        id: VoiceId,
        note: u8,
        start_level: f64,
    },
    Frequency {
        id: VoiceId,
        frequency: f64,
    },
    Released {
        id: VoiceId,
        note: u8,
    },
    Waveform {
        id: VoiceId,
        waveform: Waveform,
    },
    MasterVolume {
        volume: f64,
    },
    Disposed {
        id: VoiceId,
        note: u8,
    },
}

/// Sink that records every callback in order
#[derive(Debug, Clone, Default)]
pub struct EventLog {
    events: Vec<SinkEvent>,
}

impl EventLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> &[SinkEvent] {
        &self.events
    }

    /// Take all recorded events, leaving the log empty
    pub fn drain(&mut self) -> Vec<SinkEvent> {
        core::mem::take(&mut self.events)
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn clear(&mut self) {
        self.events.clear();
    }
}

impl VoiceSink for EventLog {
    fn voice_started(&mut self, id: VoiceId, voice: &Voice) {
        self.events.push(SinkEvent::Started {
            id,
            note: voice.note(),
            frequency: voice.frequency(),
        });
    }

    fn voice_retriggered(&mut self, id: VoiceId, voice: &Voice) {
        self.events.push(SinkEvent::Retriggered {
            id,
            note: voice.note(),
            start_level: voice.start_level(),
        });
    }

    fn frequency_changed(&mut self, id: VoiceId, frequency: f64, _now: f64) {
        self.events.push(SinkEvent::Frequency { id, frequency });
    }

    fn voice_released(&mut self, id: VoiceId, voice: &Voice) {
        self.events.push(SinkEvent::Released {
            id,
            note: voice.note(),
        });
    }

    fn waveform_changed(&mut self, id: VoiceId, waveform: Waveform) {
        self.events.push(SinkEvent::Waveform { id, waveform });
    }

    fn master_volume_changed(&mut self, volume: f64) {
        self.events.push(SinkEvent::MasterVolume { volume });
    }

    fn voice_disposed(&mut self, id: VoiceId, note: u8) {
        self.events.push(SinkEvent::Disposed { id, note });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_note_on() {
        assert_eq!(
            NoteEvent::from_midi(&[0x90, 60, 100]),
            Some(NoteEvent::On {
                note: 60,
                velocity: 100
            })
        );
        // Channel is ignored
        assert_eq!(
            NoteEvent::from_midi(&[0x93, 64, 1]),
            Some(NoteEvent::On {
                note: 64,
                velocity: 1
            })
        );
    }

    #[test]
    fn test_note_off() {
        assert_eq!(
            NoteEvent::from_midi(&[0x80, 60, 64]),
            Some(NoteEvent::Off { note: 60 })
        );
        // Note On with zero velocity
        assert_eq!(
            NoteEvent::from_midi(&[0x90, 60, 0]),
            Some(NoteEvent::Off { note: 60 })
        );
    }

    #[test]
    fn test_ignored_messages() {
        assert_eq!(NoteEvent::from_midi(&[]), None);
        assert_eq!(NoteEvent::from_midi(&[0x90, 60]), None);
        assert_eq!(NoteEvent::from_midi(&[0xB0, 1, 127]), None);
        assert_eq!(NoteEvent::from_midi(&[0xE0, 0, 64]), None);
        assert_eq!(NoteEvent::from_midi(&[0xD0, 100]), None);
    }

    #[test]
    fn test_event_note() {
        assert_eq!(NoteEvent::On { note: 61, velocity: 9 }.note(), 61);
        assert_eq!(NoteEvent::Off { note: 62 }.note(), 62);
    }

    #[test]
    fn test_event_log_drain() {
        let mut log = EventLog::new();
        log.master_volume_changed(0.5);
        assert_eq!(log.len(), 1);
        let events = log.drain();
        assert_eq!(events, vec![SinkEvent::MasterVolume { volume: 0.5 }]);
        assert!(log.is_empty());
    }
}
