//! Tuning Resolver
//!
//! Maps a pitch class to a frequency ratio under one of several intonation
//! schemes, and a note number to an absolute frequency.
//!
//! The nearest-harmonic scheme approximates each of the 12 chromatic steps by
//! the natural harmonic whose octave-reduced position lies closest to it on
//! the log2 circle. That table is built once and never recomputed.

use alloc::string::String;
use alloc::vec::Vec;
use core::fmt;
use serde::{Deserialize, Serialize};

/// Default search limit for the nearest-harmonic table
pub const DEFAULT_HARMONIC_LIMIT: u32 = 4096;

/// Concert pitch of A4 in Hz
pub const A4_FREQ: f64 = 440.0;

const A4_NOTE: i32 = 69;

/// Note number of the tonic of octave 0 (C0)
const OCTAVE_ZERO_NOTE: i32 = 12;

const PITCH_CLASSES: usize = 12;

/// 5-limit just intonation
pub const JUST_RATIOS: [f64; 12] = [
    1.0,         // Unison
    16.0 / 15.0, // Minor second
    9.0 / 8.0,   // Major second
    6.0 / 5.0,   // Minor third
    5.0 / 4.0,   // Major third
    4.0 / 3.0,   // Perfect fourth
    45.0 / 32.0, // Tritone
    3.0 / 2.0,   // Perfect fifth
    8.0 / 5.0,   // Minor sixth
    5.0 / 3.0,   // Major sixth
    9.0 / 5.0,   // Minor seventh
    15.0 / 8.0,  // Major seventh
];

/// Pythagorean tuning, stacked 3:2 fifths
pub const PYTHAGOREAN_RATIOS: [f64; 12] = [
    1.0,           // C
    256.0 / 243.0, // C#/Db
    9.0 / 8.0,     // D
    32.0 / 27.0,   // D#/Eb
    81.0 / 64.0,   // E
    4.0 / 3.0,     // F
    729.0 / 512.0, // F#/Gb
    3.0 / 2.0,     // G
    128.0 / 81.0,  // G#/Ab
    27.0 / 16.0,   // A
    16.0 / 9.0,    // A#/Bb
    243.0 / 128.0, // B
];

const NOTE_NAMES: [&str; 12] = [
    "C", "C#", "D", "D#", "E", "F", "F#", "G", "G#", "A", "A#", "B",
];

/// Pitch classes shown in the harmonic summary (the C major scale)
pub const SUMMARY_PROBE: [u8; 7] = [0, 2, 4, 5, 7, 9, 11];

/// Name of a pitch class (`0` = C). Values wrap modulo 12.
pub fn note_name(pitch_class: u8) -> &'static str {
    NOTE_NAMES[pitch_class as usize % PITCH_CLASSES]
}

/// Intonation scheme
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Intonation {
    /// 12-tone equal temperament
    #[default]
    Equal,
    /// 5-limit just intonation
    Just,
    /// Pythagorean tuning
    Pythagorean,
    /// Nearest natural harmonic, octave-reduced
    NearestHarmonic,
}

impl Intonation {
    pub const ALL: [Intonation; 4] = [
        Intonation::Equal,
        Intonation::Just,
        Intonation::Pythagorean,
        Intonation::NearestHarmonic,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Intonation::Equal => "equal",
            Intonation::Just => "just",
            Intonation::Pythagorean => "pythagorean",
            Intonation::NearestHarmonic => "nearest_harmonic",
        }
    }
}

impl fmt::Display for Intonation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Winning harmonic for one pitch class
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HarmonicMatch {
    /// Harmonic number (1 = fundamental)
    pub harmonic: u32,
    /// Octave-reduced ratio, in `[1, 2)`
    pub ratio: f64,
    /// Circular log2 distance to the pitch class target
    pub distance: f64,
}

/// Fractional part of `log2(h)`
#[inline]
fn log2_fract(h: u32) -> f64 {
    let exp = libm::log2(h as f64);
    exp - libm::floor(exp)
}

/// Distance between two positions on the unit log2 circle
#[inline]
fn circular_distance(a: f64, b: f64) -> f64 {
    let d = libm::fabs(a - b);
    d.min(1.0 - d)
}

/// Harmonic `h` reduced into the octave `[1, 2)`
#[inline]
fn octave_reduce(h: u32) -> f64 {
    let octave = 31 - h.leading_zeros();
    h as f64 / (1u64 << octave) as f64
}

/// Nearest-harmonic lookup table, one entry per pitch class
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NearestHarmonicTable {
    limit: u32,
    entries: [HarmonicMatch; 12],
}

impl NearestHarmonicTable {
    /// Search harmonics `1..=limit` for each pitch class.
    ///
    /// Ties go to the smallest harmonic. A `limit` of 0 is treated as 1.
    pub fn build(limit: u32) -> Self {
        let limit = limit.max(1);
        let fracs: Vec<f64> = (1..=limit).map(log2_fract).collect();

        let mut entries = [HarmonicMatch {
            harmonic: 1,
            ratio: 1.0,
            distance: 0.0,
        }; 12];

        for (pc, entry) in entries.iter_mut().enumerate() {
            let target = pc as f64 / PITCH_CLASSES as f64;
            let mut best_h = 1;
            let mut best = f64::INFINITY;
            for (i, &frac) in fracs.iter().enumerate() {
                let d = circular_distance(frac, target);
                // Strict improvement only, so the smallest harmonic wins ties
                if d < best - 1e-12 {
                    best = d;
                    best_h = i as u32 + 1;
                }
            }
            *entry = HarmonicMatch {
                harmonic: best_h,
                ratio: octave_reduce(best_h),
                distance: best,
            };
        }

        tracing::debug!(limit, "built nearest-harmonic table");
        Self { limit, entries }
    }

    /// Search limit used to build this table
    pub fn limit(&self) -> u32 {
        self.limit
    }

    /// Match for a pitch class (wraps modulo 12)
    pub fn get(&self, pitch_class: u8) -> &HarmonicMatch {
        &self.entries[pitch_class as usize % PITCH_CLASSES]
    }

    pub fn ratio(&self, pitch_class: u8) -> f64 {
        self.get(pitch_class).ratio
    }

    pub fn harmonic(&self, pitch_class: u8) -> u32 {
        self.get(pitch_class).harmonic
    }

    pub fn entries(&self) -> &[HarmonicMatch; 12] {
        &self.entries
    }

    /// Render `"C→H1 · D→H9 · ..."` for the given pitch classes
    pub fn summary(&self, pitch_classes: &[u8]) -> String {
        let parts: Vec<String> = pitch_classes
            .iter()
            .map(|&pc| alloc::format!("{}→H{}", note_name(pc), self.harmonic(pc)))
            .collect();
        parts.join(" · ")
    }
}

impl Default for NearestHarmonicTable {
    fn default() -> Self {
        Self::build(DEFAULT_HARMONIC_LIMIT)
    }
}

/// Resolves pitch classes and note numbers to ratios and frequencies
#[derive(Debug, Clone, PartialEq)]
pub struct Tuner {
    nearest: NearestHarmonicTable,
    reference_pitch: f64,
}

impl Tuner {
    /// Create a tuner with A4 = 440 Hz and the given harmonic search limit
    pub fn new(harmonic_limit: u32) -> Self {
        Self::with_reference(harmonic_limit, A4_FREQ)
    }

    /// Create a tuner with a custom A4 reference
    pub fn with_reference(harmonic_limit: u32, reference_pitch: f64) -> Self {
        Self {
            nearest: NearestHarmonicTable::build(harmonic_limit),
            reference_pitch,
        }
    }

    pub fn reference_pitch(&self) -> f64 {
        self.reference_pitch
    }

    pub fn nearest_harmonics(&self) -> &NearestHarmonicTable {
        &self.nearest
    }

    /// Frequency ratio of a pitch class relative to the tonic
    pub fn ratio_for_pitch_class(&self, pitch_class: u8, scheme: Intonation) -> f64 {
        let pc = pitch_class as usize % PITCH_CLASSES;
        match scheme {
            Intonation::Equal => libm::exp2(pc as f64 / PITCH_CLASSES as f64),
            Intonation::Just => JUST_RATIOS[pc],
            Intonation::Pythagorean => PYTHAGOREAN_RATIOS[pc],
            Intonation::NearestHarmonic => self.nearest.ratio(pc as u8),
        }
    }

    /// Equal-tempered frequency of C in the given octave (C0 = note 12)
    pub fn tonic_frequency(&self, octave: i32) -> f64 {
        let c0 = self.reference_pitch * libm::exp2((OCTAVE_ZERO_NOTE - A4_NOTE) as f64 / 12.0);
        c0 * libm::exp2(octave as f64)
    }

    /// Absolute frequency of a note number under the given scheme
    pub fn frequency_for_note(&self, note: u8, scheme: Intonation) -> f64 {
        let (octave, pc) = split_note(note);
        self.tonic_frequency(octave) * self.ratio_for_pitch_class(pc, scheme)
    }
}

impl Default for Tuner {
    fn default() -> Self {
        Self::new(DEFAULT_HARMONIC_LIMIT)
    }
}

/// Split a note number into (octave, pitch class), with note 12 = octave 0
#[inline]
pub fn split_note(note: u8) -> (i32, u8) {
    let n = note as i32;
    (n.div_euclid(12) - 1, (n % 12) as u8)
}
