//! Configuration
//!
//! Two layers of configuration:
//!
//! - [`EngineConfig`] - fixed at startup: harmonic search limit, concert pitch,
//!   playable range and reaping thresholds. Loadable from JSON.
//! - [`Settings`] - the live parameter snapshot (ADSR, intonation, waveform,
//!   volume) handed to the router on every call that needs it. The engine
//!   never reads parameters from anywhere else.

use crate::envelope::AdsrParams;
use crate::tuning::{Intonation, A4_FREQ, DEFAULT_HARMONIC_LIMIT};
use crate::voice::{DormancyRule, MIN_RELEASE_HOLD, SILENCE_THRESHOLD};
use alloc::string::String;
use core::fmt;
use core::ops::RangeInclusive;
use serde::{Deserialize, Serialize};

/// Lowest note accepted by default (A0)
pub const DEFAULT_LOWEST_NOTE: u8 = 21;

/// Highest note accepted by default (C8)
pub const DEFAULT_HIGHEST_NOTE: u8 = 108;

/// Error type for configuration loading and validation
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigError {
    /// Malformed JSON
    Json(String),
    /// A field holds a value outside its valid range
    Invalid {
        field: &'static str,
        reason: &'static str,
    },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Json(msg) => write!(f, "Invalid configuration JSON: {}", msg),
            ConfigError::Invalid { field, reason } => {
                write!(f, "Invalid configuration field `{}`: {}", field, reason)
            }
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for ConfigError {}

#[cfg(feature = "alloc")]
impl From<serde_json::Error> for ConfigError {
    fn from(err: serde_json::Error) -> Self {
        ConfigError::Json(alloc::string::ToString::to_string(&err))
    }
}

/// Startup configuration for the engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Highest harmonic searched when building the nearest-harmonic table
    pub harmonic_limit: u32,
    /// Frequency of A4 in Hz
    pub reference_pitch: f64,
    /// Lowest playable note number
    pub lowest_note: u8,
    /// Highest playable note number
    pub highest_note: u8,
    /// Level below which a released voice counts as silent
    pub silence_threshold: f64,
    /// Minimum time a released voice is kept before reaping
    pub min_release_hold: f64,
    /// Minimum level a voice needs to appear in the tile pattern
    pub visible_threshold: f64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            harmonic_limit: DEFAULT_HARMONIC_LIMIT,
            reference_pitch: A4_FREQ,
            lowest_note: DEFAULT_LOWEST_NOTE,
            highest_note: DEFAULT_HIGHEST_NOTE,
            silence_threshold: SILENCE_THRESHOLD,
            min_release_hold: MIN_RELEASE_HOLD,
            visible_threshold: 0.001,
        }
    }
}

impl EngineConfig {
    /// Deserialize from JSON and validate. Missing fields take defaults.
    #[cfg(feature = "alloc")]
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Serialize to a JSON string
    #[cfg(feature = "alloc")]
    pub fn to_json(&self) -> Result<String, ConfigError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Check every field is in range
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.harmonic_limit == 0 {
            return Err(ConfigError::Invalid {
                field: "harmonic_limit",
                reason: "must be at least 1",
            });
        }
        if !(self.reference_pitch.is_finite() && self.reference_pitch > 0.0) {
            return Err(ConfigError::Invalid {
                field: "reference_pitch",
                reason: "must be a positive frequency",
            });
        }
        if self.highest_note > 127 {
            return Err(ConfigError::Invalid {
                field: "highest_note",
                reason: "must be a MIDI note number (0-127)",
            });
        }
        if self.lowest_note > self.highest_note {
            return Err(ConfigError::Invalid {
                field: "lowest_note",
                reason: "must not exceed highest_note",
            });
        }
        if !(self.silence_threshold.is_finite() && self.silence_threshold > 0.0) {
            return Err(ConfigError::Invalid {
                field: "silence_threshold",
                reason: "must be positive",
            });
        }
        if !(self.min_release_hold.is_finite() && self.min_release_hold >= 0.0) {
            return Err(ConfigError::Invalid {
                field: "min_release_hold",
                reason: "must be non-negative",
            });
        }
        if !(self.visible_threshold.is_finite() && self.visible_threshold >= 0.0) {
            return Err(ConfigError::Invalid {
                field: "visible_threshold",
                reason: "must be non-negative",
            });
        }
        Ok(())
    }

    /// Playable note range
    pub fn note_range(&self) -> RangeInclusive<u8> {
        self.lowest_note..=self.highest_note
    }

    /// Reaping rule derived from the thresholds
    pub fn dormancy_rule(&self) -> DormancyRule {
        DormancyRule {
            silence_threshold: self.silence_threshold,
            min_release_hold: self.min_release_hold,
        }
    }
}

/// Oscillator shape requested from the sound output
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Waveform {
    #[default]
    Sine,
    Square,
    Sawtooth,
    Triangle,
}

/// Snapshot of the live parameter controls
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Envelope applied to the next (re)triggered voice
    pub envelope: AdsrParams,
    /// Intonation used for new notes and explicit retunes
    pub intonation: Intonation,
    /// Oscillator shape
    pub waveform: Waveform,
    /// Output volume (0.0 to 1.0)
    pub master_volume: f64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            envelope: AdsrParams::default(),
            intonation: Intonation::Equal,
            waveform: Waveform::Sine,
            master_volume: 0.2,
        }
    }
}

impl Settings {
    pub fn with_envelope(mut self, envelope: AdsrParams) -> Self {
        self.envelope = envelope.sanitized();
        self
    }

    pub fn with_intonation(mut self, intonation: Intonation) -> Self {
        self.intonation = intonation;
        self
    }

    pub fn with_waveform(mut self, waveform: Waveform) -> Self {
        self.waveform = waveform;
        self
    }

    pub fn with_master_volume(mut self, volume: f64) -> Self {
        self.master_volume = if volume.is_nan() {
            0.0
        } else {
            volume.clamp(0.0, 1.0)
        };
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = EngineConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.note_range(), 21..=108);
        assert_eq!(config.harmonic_limit, 4096);
    }

    #[test]
    fn test_from_json_partial() {
        let json = r#"{ "harmonic_limit": 64, "reference_pitch": 432.0 }"#;
        let config = EngineConfig::from_json(json).unwrap();
        assert_eq!(config.harmonic_limit, 64);
        assert_eq!(config.reference_pitch, 432.0);
        assert_eq!(config.lowest_note, DEFAULT_LOWEST_NOTE);
    }

    #[test]
    fn test_from_json_rejects_invalid() {
        let err = EngineConfig::from_json(r#"{ "harmonic_limit": 0 }"#).unwrap_err();
        assert_eq!(
            err,
            ConfigError::Invalid {
                field: "harmonic_limit",
                reason: "must be at least 1"
            }
        );

        let err = EngineConfig::from_json(r#"{ "lowest_note": 90, "highest_note": 80 }"#)
            .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { field: "lowest_note", .. }));
    }

    #[test]
    fn test_from_json_malformed() {
        let err = EngineConfig::from_json("{ not json").unwrap_err();
        assert!(matches!(err, ConfigError::Json(_)));
        assert!(err.to_string().starts_with("Invalid configuration JSON"));
    }

    #[test]
    fn test_json_roundtrip() {
        let config = EngineConfig {
            min_release_hold: 0.25,
            ..Default::default()
        };
        let json = config.to_json().unwrap();
        assert_eq!(EngineConfig::from_json(&json).unwrap(), config);
    }

    #[test]
    fn test_dormancy_rule() {
        let rule = EngineConfig::default().dormancy_rule();
        assert_eq!(rule, DormancyRule::default());
    }

    #[test]
    fn test_settings_defaults() {
        let settings = Settings::default();
        assert_eq!(settings.envelope.peak, 0.7);
        assert_eq!(settings.intonation, Intonation::Equal);
        assert_eq!(settings.waveform, Waveform::Sine);
    }

    #[test]
    fn test_settings_from_json() {
        let settings: Settings = serde_json::from_str(
            r#"{ "intonation": "just", "waveform": "sawtooth", "envelope": { "attack": 0.5 } }"#,
        )
        .unwrap();
        assert_eq!(settings.intonation, Intonation::Just);
        assert_eq!(settings.waveform, Waveform::Sawtooth);
        assert_eq!(settings.envelope.attack, 0.5);
        assert_eq!(settings.envelope.peak, 0.7);
    }

    #[test]
    fn test_master_volume_clamped() {
        assert_eq!(Settings::default().with_master_volume(3.0).master_volume, 1.0);
        assert_eq!(Settings::default().with_master_volume(-1.0).master_volume, 0.0);
    }
}
