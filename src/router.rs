//! Note Router
//!
//! Turns note events from any input source into voice registry operations.
//! The router owns the registry and the tuner; parameters arrive as an
//! explicit [`Settings`] snapshot on each call, read at trigger time for the
//! envelope and at explicit retune time for the intonation.
//!
//! Input is best-effort: notes outside the playable range, note-offs for
//! notes with no voice and unrecognised MIDI messages are dropped silently.

use crate::config::{EngineConfig, Settings};
use crate::io::{NoteEvent, VoiceSink};
use crate::polyphony::{NoteOn, TickReport, VoiceRegistry};
use crate::tuning::Tuner;
use crate::visual::{TilePlan, Viewport};
use core::ops::RangeInclusive;

/// Routes note events into the voice registry
#[derive(Debug, Clone)]
pub struct NoteRouter {
    registry: VoiceRegistry,
    tuner: Tuner,
    range: RangeInclusive<u8>,
    visible_threshold: f64,
}

impl NoteRouter {
    /// Build a router from a startup configuration.
    ///
    /// This computes the nearest-harmonic table, which is the only expensive
    /// step and happens exactly once.
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            registry: VoiceRegistry::with_dormancy(config.dormancy_rule()),
            tuner: Tuner::with_reference(config.harmonic_limit, config.reference_pitch),
            range: config.note_range(),
            visible_threshold: config.visible_threshold,
        }
    }

    pub fn registry(&self) -> &VoiceRegistry {
        &self.registry
    }

    pub fn tuner(&self) -> &Tuner {
        &self.tuner
    }

    pub fn note_range(&self) -> &RangeInclusive<u8> {
        &self.range
    }

    /// Whether a note is inside the playable range
    pub fn accepts(&self, note: u8) -> bool {
        self.range.contains(&note)
    }

    /// Dispatch a note event. Returns whether it changed any voice.
    pub fn handle<S: VoiceSink + ?Sized>(
        &mut self,
        event: NoteEvent,
        now: f64,
        settings: &Settings,
        sink: &mut S,
    ) -> bool {
        match event {
            NoteEvent::On { note, .. } => self.note_on(note, now, settings, sink).is_some(),
            NoteEvent::Off { note } => self.note_off(note, now, sink),
        }
    }

    /// Decode and dispatch a raw MIDI message
    pub fn handle_midi<S: VoiceSink + ?Sized>(
        &mut self,
        msg: &[u8],
        now: f64,
        settings: &Settings,
        sink: &mut S,
    ) -> bool {
        match NoteEvent::from_midi(msg) {
            Some(event) => self.handle(event, now, settings, sink),
            None => {
                tracing::trace!(len = msg.len(), "ignored MIDI message");
                false
            }
        }
    }

    /// Start or retrigger a note with the current settings
    pub fn note_on<S: VoiceSink + ?Sized>(
        &mut self,
        note: u8,
        now: f64,
        settings: &Settings,
        sink: &mut S,
    ) -> Option<NoteOn> {
        if !self.accepts(note) {
            tracing::trace!(note, "note outside playable range");
            return None;
        }
        let frequency = self.tuner.frequency_for_note(note, settings.intonation);
        tracing::trace!(note, frequency, "note on");
        let outcome = self
            .registry
            .note_on(note, frequency, now, settings.envelope, sink);
        if let NoteOn::Created(id) = outcome {
            sink.waveform_changed(id, settings.waveform);
        }
        Some(outcome)
    }

    /// Release a note. Returns `false` if nothing was released.
    pub fn note_off<S: VoiceSink + ?Sized>(&mut self, note: u8, now: f64, sink: &mut S) -> bool {
        if !self.accepts(note) {
            return false;
        }
        tracing::trace!(note, "note off");
        self.registry.note_off(note, now, sink)
    }

    /// Release every held note
    pub fn all_notes_off<S: VoiceSink + ?Sized>(&mut self, now: f64, sink: &mut S) -> usize {
        self.registry.all_notes_off(now, sink)
    }

    /// Retune held notes to the snapshot's intonation
    pub fn retune_held<S: VoiceSink + ?Sized>(
        &mut self,
        now: f64,
        settings: &Settings,
        sink: &mut S,
    ) -> usize {
        let tuner = &self.tuner;
        let intonation = settings.intonation;
        self.registry.retune_all(
            now,
            |note| tuner.frequency_for_note(note, intonation),
            sink,
        )
    }

    /// Retrigger held notes with the snapshot's envelope, after an ADSR edit
    pub fn retrigger_held<S: VoiceSink + ?Sized>(
        &mut self,
        now: f64,
        settings: &Settings,
        sink: &mut S,
    ) -> usize {
        self.registry.retrigger_held(now, settings.envelope, sink)
    }

    /// Push the snapshot's waveform to every live voice
    pub fn apply_waveform<S: VoiceSink + ?Sized>(&self, settings: &Settings, sink: &mut S) {
        for (id, _) in self.registry.iter() {
            sink.waveform_changed(id, settings.waveform);
        }
    }

    /// Push the snapshot's master volume to the sound output
    pub fn set_master_volume<S: VoiceSink + ?Sized>(&self, settings: &Settings, sink: &mut S) {
        sink.master_volume_changed(settings.master_volume);
    }

    /// Evaluate every voice and reap the dormant ones
    pub fn tick<S: VoiceSink + ?Sized>(&mut self, now: f64, sink: &mut S) -> TickReport {
        self.registry.tick(now, sink)
    }

    /// Tile layers for a tick report under the snapshot's intonation
    pub fn tile_plan(
        &self,
        report: &TickReport,
        settings: &Settings,
        viewport: &Viewport,
    ) -> TilePlan {
        TilePlan::from_report(
            report,
            &self.tuner,
            settings.intonation,
            viewport,
            self.visible_threshold,
        )
    }

    /// Dispose every voice immediately
    pub fn panic<S: VoiceSink + ?Sized>(&mut self, sink: &mut S) {
        self.registry.panic(sink);
    }
}

impl Default for NoteRouter {
    fn default() -> Self {
        Self::new(&EngineConfig::default())
    }
}
