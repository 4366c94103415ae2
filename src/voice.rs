//! Voice
//!
//! A single sounding note: its frequency plus the envelope it is currently
//! following. Triggering, releasing and querying are all expressed against
//! explicit timestamps so the voice never depends on a wall clock.

use crate::envelope::{AdsrParams, Envelope, EnvelopePhase};
use serde::{Deserialize, Serialize};

/// Level below which a released voice counts as silent
pub const SILENCE_THRESHOLD: f64 = 1e-4;

/// Minimum time a released voice is kept before it may be reaped
pub const MIN_RELEASE_HOLD: f64 = 0.5;

/// Lifecycle state of a voice
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VoiceState {
    /// Key is down, envelope is in attack, decay or sustain
    Held,
    /// Key is up, envelope is decaying toward silence
    Releasing,
}

/// Rule deciding when a released voice may be disposed
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DormancyRule {
    /// Level that counts as silent
    pub silence_threshold: f64,
    /// Floor on the time since release, in addition to the release duration
    pub min_release_hold: f64,
}

impl Default for DormancyRule {
    fn default() -> Self {
        Self {
            silence_threshold: SILENCE_THRESHOLD,
            min_release_hold: MIN_RELEASE_HOLD,
        }
    }
}

/// A single voice keyed by its note number
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Voice {
    note: u8,
    frequency: f64,
    envelope: Envelope,
    /// Level computed by the most recent `update`
    level: f64,
}

impl Voice {
    /// Create a voice and trigger it from silence at `now`
    pub fn new(note: u8, frequency: f64, now: f64, params: AdsrParams) -> Self {
        Self {
            note,
            frequency,
            envelope: Envelope::new(now, params.sanitized()),
            level: 0.0,
        }
    }

    /// Retrigger the voice at `now` with a fresh parameter snapshot.
    ///
    /// The new attack starts from the level the previous envelope had at
    /// `now`, whatever phase it was in. Returns that starting level.
    pub fn trigger(&mut self, now: f64, params: AdsrParams) -> f64 {
        let start = self.envelope.level_at(now);
        self.envelope = Envelope::from_level(now, params.sanitized(), start);
        self.level = start;
        start
    }

    /// Release the voice at `now`.
    ///
    /// Only a held voice can be released; returns `false` otherwise.
    pub fn release(&mut self, now: f64) -> bool {
        if self.envelope.is_released() {
            return false;
        }
        self.envelope = self.envelope.with_release_at(now);
        true
    }

    /// Change the pitch without touching envelope timing
    pub fn set_frequency(&mut self, frequency: f64) {
        self.frequency = frequency;
    }

    /// Amplitude at `time`
    #[inline]
    pub fn envelope_at(&self, time: f64) -> f64 {
        self.envelope.level_at(time)
    }

    /// Evaluate the envelope at `now` and remember the result
    pub fn update(&mut self, now: f64) -> f64 {
        self.level = self.envelope.level_at(now);
        self.level
    }

    /// Whether the voice can be disposed at `time`, using the default rule
    pub fn is_dormant(&self, time: f64) -> bool {
        self.is_dormant_with(time, &DormancyRule::default())
    }

    /// Whether the voice can be disposed at `time`.
    ///
    /// A voice is dormant once it has been released, its level has fallen
    /// below the silence threshold, and more than
    /// `max(min_release_hold, release)` has elapsed since release.
    pub fn is_dormant_with(&self, time: f64, rule: &DormancyRule) -> bool {
        let Some(release_at) = self.envelope.release_at else {
            return false;
        };
        let hold = rule.min_release_hold.max(self.envelope.params.release);
        time - release_at > hold && self.envelope_at(time) < rule.silence_threshold
    }

    pub fn note(&self) -> u8 {
        self.note
    }

    pub fn frequency(&self) -> f64 {
        self.frequency
    }

    pub fn params(&self) -> &AdsrParams {
        &self.envelope.params
    }

    pub fn envelope(&self) -> &Envelope {
        &self.envelope
    }

    pub fn onset(&self) -> f64 {
        self.envelope.onset
    }

    pub fn release_at(&self) -> Option<f64> {
        self.envelope.release_at
    }

    /// Level at the start of the current attack
    pub fn start_level(&self) -> f64 {
        self.envelope.start
    }

    /// Level computed by the last `update` or `trigger`
    pub fn level(&self) -> f64 {
        self.level
    }

    pub fn state(&self) -> VoiceState {
        if self.envelope.is_released() {
            VoiceState::Releasing
        } else {
            VoiceState::Held
        }
    }

    #[inline]
    pub fn is_held(&self) -> bool {
        self.state() == VoiceState::Held
    }

    pub fn phase_at(&self, time: f64) -> EnvelopePhase {
        self.envelope.phase_at(time)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn params() -> AdsrParams {
        AdsrParams::new(0.1, 0.2, 0.6, 0.3, 0.7)
    }

    #[test]
    fn test_new_voice_is_held() {
        let voice = Voice::new(60, 261.63, 0.0, params());
        assert_eq!(voice.state(), VoiceState::Held);
        assert!(voice.is_held());
        assert_eq!(voice.release_at(), None);
        assert_eq!(voice.envelope_at(0.0), 0.0);
    }

    #[test]
    fn test_release_only_when_held() {
        let mut voice = Voice::new(60, 261.63, 0.0, params());
        assert!(voice.release(0.5));
        assert_eq!(voice.state(), VoiceState::Releasing);
        assert_eq!(voice.release_at(), Some(0.5));

        // Second release keeps the original timestamp
        assert!(!voice.release(0.7));
        assert_eq!(voice.release_at(), Some(0.5));
    }

    #[test]
    fn test_release_never_precedes_onset() {
        let mut voice = Voice::new(60, 261.63, 1.0, params());
        voice.release(0.5);
        assert_eq!(voice.release_at(), Some(1.0));
    }

    #[test]
    fn test_set_frequency_keeps_timing() {
        let mut voice = Voice::new(60, 261.63, 0.0, params());
        let before = voice.envelope_at(0.2);
        voice.set_frequency(300.0);
        assert_eq!(voice.frequency(), 300.0);
        assert_eq!(voice.envelope_at(0.2), before);
        assert_eq!(voice.onset(), 0.0);
    }

    #[test]
    fn test_retrigger_during_release_starts_from_current_level() {
        let mut voice = Voice::new(60, 261.63, 0.0, params());
        voice.release(0.05);
        let releasing_level = voice.envelope_at(0.06);
        assert!(releasing_level > 0.0);

        let start = voice.trigger(0.06, params());
        assert_abs_diff_eq!(start, releasing_level, epsilon = 1e-12);
        assert_abs_diff_eq!(voice.envelope_at(0.06), releasing_level, epsilon = 1e-12);
        assert_eq!(voice.state(), VoiceState::Held);
        assert_eq!(voice.onset(), 0.06);
    }

    #[test]
    fn test_retrigger_snapshots_new_params() {
        let mut voice = Voice::new(60, 261.63, 0.0, params());
        let slow = params().with_attack(2.0);
        voice.trigger(1.0, slow);
        assert_eq!(voice.params().attack, 2.0);
    }

    #[test]
    fn test_held_voice_is_never_dormant() {
        let voice = Voice::new(60, 261.63, 0.0, AdsrParams::new(0.0, 0.0, 0.0, 0.0, 0.7));
        assert!(!voice.is_dormant(100.0));
    }

    #[test]
    fn test_dormancy_waits_for_hold_floor() {
        let mut voice = Voice::new(60, 261.63, 0.0, AdsrParams::new(0.01, 0.01, 0.5, 0.01, 0.7));
        voice.release(1.0);
        // Level is effectively zero long before the floor
        assert!(voice.envelope_at(1.2) < SILENCE_THRESHOLD);
        assert!(!voice.is_dormant(1.2));
        assert!(!voice.is_dormant(1.5));
        assert!(voice.is_dormant(1.51));
    }

    #[test]
    fn test_dormancy_waits_for_long_release() {
        let mut voice = Voice::new(60, 261.63, 0.0, AdsrParams::new(0.01, 0.01, 0.5, 2.0, 0.7));
        voice.release(1.0);
        assert!(!voice.is_dormant(3.0));
        assert!(voice.is_dormant(20.0));
    }

    #[test]
    fn test_dormancy_custom_rule() {
        let mut voice = Voice::new(60, 261.63, 0.0, AdsrParams::new(0.01, 0.01, 0.5, 0.01, 0.7));
        voice.release(1.0);
        let rule = DormancyRule {
            silence_threshold: 1e-4,
            min_release_hold: 0.1,
        };
        assert!(voice.is_dormant_with(1.2, &rule));
    }

    #[test]
    fn test_update_caches_level() {
        let mut voice = Voice::new(60, 261.63, 0.0, params());
        let v = voice.update(0.1);
        assert_eq!(voice.level(), v);
        assert!(v > 0.63);
    }
}
