//! Envelope Model
//!
//! Continuous-time ADSR envelope built from first-order exponential approach
//! curves, the way an RC circuit charges toward a target voltage.
//!
//! The envelope is never stepped per sample. Every query recomputes the level
//! from the stored timestamps, so it can be sampled at any time offset without
//! accumulating error.
//!
//! Each phase approaches its target with a time constant of one third of the
//! phase duration, which closes ~95% of the gap within the nominal duration:
//!
//! ```text
//! level(t) = target + (start - target) * e^(-(t - t_start) / tau)
//! ```

use serde::{Deserialize, Serialize};

/// Smallest allowed time constant, so zero-length phases jump near-instantly
/// instead of dividing by zero.
pub const MIN_TIME_CONSTANT: f64 = 1e-4;

/// Phase time constant as a fraction of phase duration
const TAU_DIVISOR: f64 = 3.0;

/// Exponential approach from `start` toward `target`, beginning at `t_start`.
///
/// Returns `start` for any `t <= t_start`.
#[inline]
pub fn exp_approach(start: f64, target: f64, t: f64, t_start: f64, tau: f64) -> f64 {
    if t <= t_start {
        return start;
    }
    let dt = t - t_start;
    target + (start - target) * libm::exp(-dt / tau.max(MIN_TIME_CONSTANT))
}

/// Time constant for a phase of the given duration
#[inline]
pub fn time_constant(duration: f64) -> f64 {
    (duration / TAU_DIVISOR).max(MIN_TIME_CONSTANT)
}

/// ADSR parameters snapshotted by a voice on every (re)trigger
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AdsrParams {
    /// Attack duration (seconds)
    pub attack: f64,
    /// Decay duration (seconds)
    pub decay: f64,
    /// Sustain level as a ratio of `peak` (0.0 to 1.0)
    pub sustain: f64,
    /// Release duration (seconds)
    pub release: f64,
    /// Peak amplitude reached by the attack (0.0 to 1.0)
    pub peak: f64,
}

impl Default for AdsrParams {
    fn default() -> Self {
        Self {
            attack: 0.01,
            decay: 0.2,
            sustain: 0.6,
            release: 0.3,
            peak: 0.7,
        }
    }
}

impl AdsrParams {
    /// Create a parameter set, clamping every field into its valid range
    pub fn new(attack: f64, decay: f64, sustain: f64, release: f64, peak: f64) -> Self {
        Self {
            attack,
            decay,
            sustain,
            release,
            peak,
        }
        .sanitized()
    }

    /// Clamp durations to be non-negative and levels into `[0, 1]`.
    ///
    /// NaN durations become zero and NaN levels become zero.
    pub fn sanitized(self) -> Self {
        fn duration(d: f64) -> f64 {
            if d.is_nan() {
                0.0
            } else {
                d.max(0.0)
            }
        }
        fn level(l: f64) -> f64 {
            if l.is_nan() {
                0.0
            } else {
                l.clamp(0.0, 1.0)
            }
        }
        Self {
            attack: duration(self.attack),
            decay: duration(self.decay),
            sustain: level(self.sustain),
            release: duration(self.release),
            peak: level(self.peak),
        }
    }

    pub fn with_attack(mut self, attack: f64) -> Self {
        self.attack = attack;
        self.sanitized()
    }

    pub fn with_decay(mut self, decay: f64) -> Self {
        self.decay = decay;
        self.sanitized()
    }

    pub fn with_sustain(mut self, sustain: f64) -> Self {
        self.sustain = sustain;
        self.sanitized()
    }

    pub fn with_release(mut self, release: f64) -> Self {
        self.release = release;
        self.sanitized()
    }

    pub fn with_peak(mut self, peak: f64) -> Self {
        self.peak = peak;
        self.sanitized()
    }

    /// Absolute sustain level (`peak * sustain`)
    #[inline]
    pub fn sustain_level(&self) -> f64 {
        self.peak * self.sustain
    }

    #[inline]
    pub fn attack_tau(&self) -> f64 {
        time_constant(self.attack)
    }

    #[inline]
    pub fn decay_tau(&self) -> f64 {
        time_constant(self.decay)
    }

    #[inline]
    pub fn release_tau(&self) -> f64 {
        time_constant(self.release)
    }
}

/// Envelope phase at a given query time
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnvelopePhase {
    /// Before the onset
    Idle,
    Attack,
    Decay,
    Sustain,
    Release,
}

/// One triggered envelope: onset, optional release, parameters and the level
/// the attack starts from.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    /// Time the attack began
    pub onset: f64,
    /// Time the note was released, if it has been
    pub release_at: Option<f64>,
    /// Parameters snapshotted at onset
    pub params: AdsrParams,
    /// Level at onset; zero for a fresh voice, the previous level on retrigger
    pub start: f64,
}

impl Envelope {
    /// A held envelope starting from silence
    pub fn new(onset: f64, params: AdsrParams) -> Self {
        Self::from_level(onset, params, 0.0)
    }

    /// A held envelope whose attack starts from `start` instead of silence
    pub fn from_level(onset: f64, params: AdsrParams, start: f64) -> Self {
        Self {
            onset,
            release_at: None,
            params,
            start,
        }
    }

    /// Set the release time, clamped so it never precedes the onset
    pub fn with_release_at(mut self, release_at: f64) -> Self {
        self.release_at = Some(release_at.max(self.onset));
        self
    }

    /// End of the attack phase
    #[inline]
    pub fn attack_end(&self) -> f64 {
        self.onset + self.params.attack
    }

    /// End of the decay phase
    #[inline]
    pub fn decay_end(&self) -> f64 {
        self.attack_end() + self.params.decay
    }

    /// Level at the end of the attack, the starting point of the decay
    #[inline]
    fn attack_end_level(&self) -> f64 {
        let p = &self.params;
        exp_approach(
            self.start,
            p.peak,
            self.attack_end(),
            self.onset,
            p.attack_tau(),
        )
    }

    /// Level as if the note were never released
    fn held_level_at(&self, time: f64) -> f64 {
        let p = &self.params;
        if time <= self.attack_end() {
            return exp_approach(self.start, p.peak, time, self.onset, p.attack_tau());
        }
        if time <= self.decay_end() {
            return exp_approach(
                self.attack_end_level(),
                p.sustain_level(),
                time,
                self.attack_end(),
                p.decay_tau(),
            );
        }
        // The decay closes ~95% of the gap, so sustain settles with a small step
        p.sustain_level()
    }

    /// Amplitude at `time`
    pub fn level_at(&self, time: f64) -> f64 {
        match self.release_at {
            Some(release_at) if time > release_at => {
                let from = self.held_level_at(release_at);
                exp_approach(from, 0.0, time, release_at, self.params.release_tau())
            }
            _ => self.held_level_at(time),
        }
    }

    /// Phase the envelope is in at `time`
    pub fn phase_at(&self, time: f64) -> EnvelopePhase {
        if time <= self.onset {
            return EnvelopePhase::Idle;
        }
        if let Some(release_at) = self.release_at {
            if time > release_at {
                return EnvelopePhase::Release;
            }
        }
        if time <= self.attack_end() {
            EnvelopePhase::Attack
        } else if time <= self.decay_end() {
            EnvelopePhase::Decay
        } else {
            EnvelopePhase::Sustain
        }
    }

    /// Whether the note has been released
    #[inline]
    pub fn is_released(&self) -> bool {
        self.release_at.is_some()
    }
}

/// Amplitude of an ADSR envelope at `time`, starting from silence at `onset`.
///
/// `release_at` is the time the note was released, or `None` while held.
/// Returns 0 for any `time <= onset`.
pub fn envelope_at(time: f64, onset: f64, release_at: Option<f64>, params: &AdsrParams) -> f64 {
    let mut env = Envelope::new(onset, *params);
    if let Some(r) = release_at {
        env = env.with_release_at(r);
    }
    env.level_at(time)
}
