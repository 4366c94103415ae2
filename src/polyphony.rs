//! Polyphony Support
//!
//! The voice registry owns every live voice, keyed by note number, and reaps
//! released voices once they have decayed to silence.
//!
//! # Architecture
//!
//! - Voices live in a [`SlotMap`] arena. A [`VoiceId`] stays valid for the
//!   life of its voice and resolves to `None` once the voice is reaped, so a
//!   collaborator holding an old id can never reach a different voice.
//! - A note → `VoiceId` index gives at most one voice per note.
//! - The held set tracks which notes have their key down. A released voice
//!   leaves the held set immediately but stays registered until dormant.
//!
//! Nothing here blocks or allocates per sample. All mutation goes through
//! `&mut self`, so a concurrent host needs one lock around the registry.

use crate::envelope::AdsrParams;
use crate::io::VoiceSink;
use crate::voice::{DormancyRule, Voice, VoiceState};
use alloc::collections::{BTreeMap, BTreeSet};
use alloc::vec::Vec;
use serde::Serialize;
use slotmap::{new_key_type, SlotMap};

new_key_type! {
    /// Stable handle to a voice in the registry
    pub struct VoiceId;
}

/// Result of a note-on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoteOn {
    /// A new voice was created
    Created(VoiceId),
    /// An existing voice for the same note was retriggered
    Retriggered(VoiceId),
}

impl NoteOn {
    pub fn id(&self) -> VoiceId {
        match *self {
            NoteOn::Created(id) | NoteOn::Retriggered(id) => id,
        }
    }
}

/// Level of one voice at a tick
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct VoiceLevel {
    pub id: VoiceId,
    pub note: u8,
    pub frequency: f64,
    pub level: f64,
    pub state: VoiceState,
}

/// Everything a tick produced
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TickReport {
    /// Time the tick was evaluated at
    pub time: f64,
    /// Every voice that survived the tick, in note order
    pub levels: Vec<VoiceLevel>,
    /// Notes whose voices were disposed during this tick
    pub reaped: Vec<u8>,
}

/// Registry of live voices
#[derive(Debug, Clone, Default)]
pub struct VoiceRegistry {
    voices: SlotMap<VoiceId, Voice>,
    by_note: BTreeMap<u8, VoiceId>,
    held: BTreeSet<u8>,
    dormancy: DormancyRule,
}

impl VoiceRegistry {
    /// Create an empty registry with the default reaping rule
    pub fn new() -> Self {
        Self::with_dormancy(DormancyRule::default())
    }

    /// Create an empty registry with a custom reaping rule
    pub fn with_dormancy(dormancy: DormancyRule) -> Self {
        Self {
            voices: SlotMap::with_key(),
            by_note: BTreeMap::new(),
            held: BTreeSet::new(),
            dormancy,
        }
    }

    pub fn dormancy(&self) -> &DormancyRule {
        &self.dormancy
    }

    /// Number of registered voices, held or releasing
    pub fn len(&self) -> usize {
        self.voices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.voices.is_empty()
    }

    /// Number of notes with their key down
    pub fn held_count(&self) -> usize {
        self.held.len()
    }

    /// Notes with their key down, ascending
    pub fn held_notes(&self) -> impl Iterator<Item = u8> + '_ {
        self.held.iter().copied()
    }

    pub fn is_held(&self, note: u8) -> bool {
        self.held.contains(&note)
    }

    pub fn get(&self, id: VoiceId) -> Option<&Voice> {
        self.voices.get(id)
    }

    pub fn id_for_note(&self, note: u8) -> Option<VoiceId> {
        self.by_note.get(&note).copied()
    }

    pub fn voice_for_note(&self, note: u8) -> Option<&Voice> {
        self.id_for_note(note).and_then(|id| self.voices.get(id))
    }

    /// All voices in note order
    pub fn iter(&self) -> impl Iterator<Item = (VoiceId, &Voice)> + '_ {
        self.by_note
            .values()
            .filter_map(move |&id| self.voices.get(id).map(|v| (id, v)))
    }

    /// Start a note.
    ///
    /// Creates and triggers a voice if the note has none. Otherwise the
    /// existing voice takes the new frequency and is retriggered from its
    /// current level, even if it was releasing.
    pub fn note_on<S: VoiceSink + ?Sized>(
        &mut self,
        note: u8,
        frequency: f64,
        now: f64,
        params: AdsrParams,
        sink: &mut S,
    ) -> NoteOn {
        self.held.insert(note);

        if let Some(id) = self.id_for_note(note) {
            if let Some(voice) = self.voices.get_mut(id) {
                voice.set_frequency(frequency);
                let start = voice.trigger(now, params);
                tracing::debug!(note, start, "voice retriggered");
                sink.frequency_changed(id, frequency, now);
                sink.voice_retriggered(id, voice);
                return NoteOn::Retriggered(id);
            }
        }

        let id = self.voices.insert(Voice::new(note, frequency, now, params));
        self.by_note.insert(note, id);
        tracing::debug!(note, frequency, "voice created");
        sink.voice_started(id, &self.voices[id]);
        NoteOn::Created(id)
    }

    /// Release a note.
    ///
    /// The voice stays registered until the reaper finds it dormant. Returns
    /// `false` if the note had no voice or was already releasing.
    pub fn note_off<S: VoiceSink + ?Sized>(&mut self, note: u8, now: f64, sink: &mut S) -> bool {
        self.held.remove(&note);

        let Some(id) = self.id_for_note(note) else {
            return false;
        };
        let Some(voice) = self.voices.get_mut(id) else {
            return false;
        };
        if !voice.release(now) {
            return false;
        }
        tracing::debug!(note, level = voice.envelope_at(now), "voice released");
        sink.voice_released(id, voice);
        true
    }

    /// Release every held note
    pub fn all_notes_off<S: VoiceSink + ?Sized>(&mut self, now: f64, sink: &mut S) -> usize {
        let held: Vec<u8> = self.held.iter().copied().collect();
        let mut count = 0;
        for note in held {
            if self.note_off(note, now, sink) {
                count += 1;
            }
        }
        count
    }

    /// Recompute the frequency of every held note.
    ///
    /// Releasing voices keep the pitch they were released at. Returns the
    /// number of voices retuned.
    pub fn retune_all<S, F>(&mut self, now: f64, mut frequency_fn: F, sink: &mut S) -> usize
    where
        S: VoiceSink + ?Sized,
        F: FnMut(u8) -> f64,
    {
        let mut count = 0;
        for &note in &self.held {
            let Some(&id) = self.by_note.get(&note) else {
                continue;
            };
            let Some(voice) = self.voices.get_mut(id) else {
                continue;
            };
            let frequency = frequency_fn(note);
            voice.set_frequency(frequency);
            sink.frequency_changed(id, frequency, now);
            count += 1;
        }
        tracing::debug!(count, "retuned held voices");
        count
    }

    /// Retrigger every held note with a new parameter snapshot
    pub fn retrigger_held<S: VoiceSink + ?Sized>(
        &mut self,
        now: f64,
        params: AdsrParams,
        sink: &mut S,
    ) -> usize {
        let mut count = 0;
        for &note in &self.held {
            let Some(&id) = self.by_note.get(&note) else {
                continue;
            };
            let Some(voice) = self.voices.get_mut(id) else {
                continue;
            };
            voice.trigger(now, params);
            sink.voice_retriggered(id, voice);
            count += 1;
        }
        tracing::debug!(count, "retriggered held voices");
        count
    }

    /// Evaluate every voice at `now` and dispose the dormant ones.
    ///
    /// Dormant voices are collected first and removed afterwards, so removal
    /// never disturbs the scan.
    pub fn tick<S: VoiceSink + ?Sized>(&mut self, now: f64, sink: &mut S) -> TickReport {
        let mut report = TickReport {
            time: now,
            levels: Vec::with_capacity(self.voices.len()),
            reaped: Vec::new(),
        };
        let mut dormant = Vec::new();

        for (&note, &id) in &self.by_note {
            let Some(voice) = self.voices.get_mut(id) else {
                continue;
            };
            let level = voice.update(now);
            if voice.is_dormant_with(now, &self.dormancy) {
                dormant.push((note, id));
            } else {
                report.levels.push(VoiceLevel {
                    id,
                    note,
                    frequency: voice.frequency(),
                    level,
                    state: voice.state(),
                });
            }
        }

        for (note, id) in dormant {
            self.by_note.remove(&note);
            self.voices.remove(id);
            tracing::debug!(note, "voice reaped");
            sink.voice_disposed(id, note);
            report.reaped.push(note);
        }

        report
    }

    /// Dispose every voice immediately
    pub fn panic<S: VoiceSink + ?Sized>(&mut self, sink: &mut S) {
        for (note, id) in core::mem::take(&mut self.by_note) {
            self.voices.remove(id);
            sink.voice_disposed(id, note);
        }
        self.voices.clear();
        self.held.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::{EventLog, SinkEvent};
    use approx::assert_abs_diff_eq;

    fn params() -> AdsrParams {
        AdsrParams::new(0.1, 0.2, 0.6, 0.3, 0.7)
    }

    fn short() -> AdsrParams {
        AdsrParams::new(0.01, 0.01, 0.5, 0.01, 0.7)
    }

    #[test]
    fn test_note_on_creates_voice() {
        let mut registry = VoiceRegistry::new();
        let outcome = registry.note_on(60, 261.6, 0.0, params(), &mut ());
        assert!(matches!(outcome, NoteOn::Created(_)));
        assert_eq!(registry.len(), 1);
        assert!(registry.is_held(60));
        assert_eq!(registry.id_for_note(60), Some(outcome.id()));
    }

    #[test]
    fn test_repeated_note_on_retriggers_same_voice() {
        let mut registry = VoiceRegistry::new();
        let first = registry.note_on(60, 261.6, 0.0, params(), &mut ());
        let second = registry.note_on(60, 262.0, 0.5, params(), &mut ());
        assert_eq!(second, NoteOn::Retriggered(first.id()));
        assert_eq!(registry.len(), 1);

        let voice = registry.get(first.id()).unwrap();
        assert_eq!(voice.frequency(), 262.0);
        assert_eq!(voice.onset(), 0.5);
        // Held at sustain, so the new attack starts near the sustain level
        assert!(voice.start_level() > 0.4);
    }

    #[test]
    fn test_note_off_keeps_voice_registered() {
        let mut registry = VoiceRegistry::new();
        registry.note_on(60, 261.6, 0.0, params(), &mut ());
        assert!(registry.note_off(60, 0.5, &mut ()));
        assert_eq!(registry.len(), 1);
        assert!(!registry.is_held(60));
        assert_eq!(
            registry.voice_for_note(60).unwrap().state(),
            VoiceState::Releasing
        );
    }

    #[test]
    fn test_note_off_without_voice_is_noop() {
        let mut registry = VoiceRegistry::new();
        let mut log = EventLog::new();
        assert!(!registry.note_off(60, 0.5, &mut log));
        assert!(log.is_empty());
    }

    #[test]
    fn test_tick_on_empty_registry() {
        let mut registry = VoiceRegistry::new();
        let report = registry.tick(1.0, &mut ());
        assert!(report.levels.is_empty());
        assert!(report.reaped.is_empty());
    }

    #[test]
    fn test_tick_reaps_only_dormant_voices() {
        let mut registry = VoiceRegistry::new();
        let mut log = EventLog::new();
        for note in [60, 62, 64, 65] {
            registry.note_on(note, 440.0, 0.0, short(), &mut log);
        }
        // Release two adjacent notes so removal cannot skip a successor
        registry.note_off(62, 0.1, &mut log);
        registry.note_off(64, 0.1, &mut log);

        let report = registry.tick(0.5, &mut log);
        assert!(report.reaped.is_empty());
        assert_eq!(report.levels.len(), 4);

        let report = registry.tick(0.7, &mut log);
        assert_eq!(report.reaped, vec![62, 64]);
        assert_eq!(registry.len(), 2);
        assert!(registry.voice_for_note(60).is_some());
        assert!(registry.voice_for_note(65).is_some());

        let disposed: Vec<_> = log
            .events()
            .iter()
            .filter_map(|e| match e {
                SinkEvent::Disposed { note, .. } => Some(*note),
                _ => None,
            })
            .collect();
        assert_eq!(disposed, vec![62, 64]);
    }

    #[test]
    fn test_reaped_id_is_stale() {
        let mut registry = VoiceRegistry::new();
        let id = registry.note_on(60, 440.0, 0.0, short(), &mut ()).id();
        registry.note_off(60, 0.1, &mut ());
        registry.tick(1.0, &mut ());
        assert!(registry.get(id).is_none());

        // A new voice for the same note gets a different id
        let new_id = registry.note_on(60, 440.0, 2.0, short(), &mut ()).id();
        assert_ne!(id, new_id);
        assert!(registry.get(id).is_none());
    }

    #[test]
    fn test_retrigger_while_releasing_restores_held() {
        let mut registry = VoiceRegistry::new();
        registry.note_on(60, 440.0, 0.0, params(), &mut ());
        registry.note_off(60, 0.05, &mut ());
        let level = registry.voice_for_note(60).unwrap().envelope_at(0.06);

        let outcome = registry.note_on(60, 440.0, 0.06, params(), &mut ());
        assert!(matches!(outcome, NoteOn::Retriggered(_)));
        let voice = registry.voice_for_note(60).unwrap();
        assert_abs_diff_eq!(voice.start_level(), level, epsilon = 1e-12);
        assert!(voice.is_held());
        assert!(registry.is_held(60));
    }

    #[test]
    fn test_retune_all_skips_releasing() {
        let mut registry = VoiceRegistry::new();
        registry.note_on(60, 100.0, 0.0, params(), &mut ());
        registry.note_on(64, 100.0, 0.0, params(), &mut ());
        registry.note_off(64, 0.5, &mut ());

        let count = registry.retune_all(0.6, |note| note as f64 * 10.0, &mut ());
        assert_eq!(count, 1);
        assert_eq!(registry.voice_for_note(60).unwrap().frequency(), 600.0);
        assert_eq!(registry.voice_for_note(64).unwrap().frequency(), 100.0);
    }

    #[test]
    fn test_retrigger_held_uses_new_params() {
        let mut registry = VoiceRegistry::new();
        registry.note_on(60, 100.0, 0.0, params(), &mut ());
        registry.note_on(64, 100.0, 0.0, params(), &mut ());
        registry.note_off(64, 0.5, &mut ());

        let slow = params().with_attack(1.0);
        assert_eq!(registry.retrigger_held(1.0, slow, &mut ()), 1);
        assert_eq!(registry.voice_for_note(60).unwrap().params().attack, 1.0);
        assert_eq!(registry.voice_for_note(64).unwrap().params().attack, 0.1);
    }

    #[test]
    fn test_all_notes_off() {
        let mut registry = VoiceRegistry::new();
        registry.note_on(60, 100.0, 0.0, params(), &mut ());
        registry.note_on(64, 100.0, 0.0, params(), &mut ());
        assert_eq!(registry.all_notes_off(0.5, &mut ()), 2);
        assert_eq!(registry.held_count(), 0);
        assert!(registry.iter().all(|(_, v)| v.state() == VoiceState::Releasing));
    }

    #[test]
    fn test_panic_disposes_everything() {
        let mut registry = VoiceRegistry::new();
        let mut log = EventLog::new();
        registry.note_on(60, 100.0, 0.0, params(), &mut log);
        registry.note_on(64, 100.0, 0.0, params(), &mut log);
        log.clear();

        registry.panic(&mut log);
        assert!(registry.is_empty());
        assert_eq!(registry.held_count(), 0);
        assert_eq!(log.len(), 2);
    }

    #[test]
    fn test_sink_sees_lifecycle_in_order() {
        let mut registry = VoiceRegistry::new();
        let mut log = EventLog::new();
        let id = registry.note_on(60, 440.0, 0.0, short(), &mut log).id();
        registry.note_off(60, 0.1, &mut log);
        registry.tick(1.0, &mut log);

        assert_eq!(
            log.events(),
            &[
                SinkEvent::Started {
                    id,
                    note: 60,
                    frequency: 440.0
                },
                SinkEvent::Released { id, note: 60 },
                SinkEvent::Disposed { id, note: 60 },
            ]
        );
    }

    #[test]
    fn test_levels_report_in_note_order() {
        let mut registry = VoiceRegistry::new();
        registry.note_on(67, 100.0, 0.0, params(), &mut ());
        registry.note_on(60, 100.0, 0.0, params(), &mut ());
        let report = registry.tick(0.1, &mut ());
        let notes: Vec<u8> = report.levels.iter().map(|l| l.note).collect();
        assert_eq!(notes, vec![60, 67]);
        assert!(report.levels.iter().all(|l| l.level > 0.63));
    }
}
