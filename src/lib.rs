//! # Tonetile: Continuous-Time Voice Engine
//!
//! `tonetile` is the core of a polyphonic tone generator. Note events come in,
//! and out come per-voice amplitudes and pitches that drive both a sound
//! output and a rotating tile pattern.
//!
//! ## Architecture
//!
//! The library is organized bottom-up:
//!
//! - **Envelope Model** - pure ADSR math built from exponential approach curves
//! - **Voice** - one note's frequency, envelope timestamps and lifecycle
//! - **Voice Registry** - arena of live voices with a reaper that disposes
//!   voices once they decay to silence
//! - **Tuning** - equal, just, Pythagorean and nearest-harmonic intonation
//! - **Note Router** - turns keyboard/MIDI events into registry operations
//!   using an explicit settings snapshot
//!
//! Envelopes are evaluated from stored timestamps on every query instead of
//! being stepped per tick, so they can be sampled at any time without drift.
//!
//! ## Quick Start
//!
//! ```rust
//! use tonetile::prelude::*;
//!
//! let mut router = NoteRouter::new(&EngineConfig::default());
//! let settings = Settings::default();
//! let mut sink = EventLog::new();
//!
//! // Press and release middle C
//! router.note_on(60, 0.0, &settings, &mut sink);
//! router.note_off(60, 0.5, &mut sink);
//!
//! // Drive the engine from a periodic tick
//! let report = router.tick(0.6, &mut sink);
//! assert_eq!(report.levels.len(), 1);
//!
//! // Long after release the voice is reaped
//! let report = router.tick(5.0, &mut sink);
//! assert_eq!(report.reaped, vec![60]);
//! ```

#![cfg_attr(not(feature = "std"), no_std)]

extern crate alloc;

pub mod config;
pub mod envelope;
pub mod io;
pub mod polyphony;
pub mod router;
pub mod tuning;
pub mod visual;
pub mod voice;

/// Prelude module for convenient imports
pub mod prelude {
    // Envelope Model
    pub use crate::envelope::{envelope_at, exp_approach, AdsrParams, Envelope, EnvelopePhase};

    // Voice
    pub use crate::voice::{DormancyRule, Voice, VoiceState};

    // Voice Registry & Reaper
    pub use crate::polyphony::{NoteOn, TickReport, VoiceId, VoiceLevel, VoiceRegistry};

    // Tuning
    pub use crate::tuning::{
        note_name, HarmonicMatch, Intonation, NearestHarmonicTable, Tuner,
    };

    // Routing and I/O
    pub use crate::io::{EventLog, NoteEvent, SinkEvent, VoiceSink};
    pub use crate::router::NoteRouter;

    // Configuration
    pub use crate::config::{ConfigError, EngineConfig, Settings, Waveform};

    // Visuals
    pub use crate::visual::{TileLayer, TilePlan, Viewport};
}

// Re-export key types at crate root for convenience
pub use prelude::*;
