//! Visual Tools
//!
//! Geometry for the rotating tile pattern. Each sounding voice becomes one
//! layer of parallel lines: its pitch sets the rotation and line spacing, its
//! envelope level sets the stroke opacity. Nothing here draws; a renderer
//! consumes [`TilePlan`] once per tick.
//!
//! Rotation follows pitch on a log2 scale, so one octave turns a layer by a
//! half revolution and the spacing doubles.

use crate::polyphony::{TickReport, VoiceLevel};
use crate::tuning::{split_note, Intonation, Tuner};
use alloc::vec::Vec;
use core::f64::consts::PI;
use serde::{Deserialize, Serialize};

/// Octave whose tonic sits at zero rotation and base spacing
const REFERENCE_OCTAVE: i32 = 2;

/// Base spacing as a fraction of the shorter viewport side
const BASE_SPACING_RATIO: f64 = 0.012;

/// Minimum base spacing in pixels
const MIN_BASE_SPACING: f64 = 8.0;

/// Margin added past the viewport diagonal so rotated lines cover the corners
const EXTENT_MARGIN: f64 = 50.0;

/// Stroke alpha of a silent layer (0-255)
const MIN_ALPHA: f64 = 30.0;

/// Alpha range added on top of `MIN_ALPHA` at full level
const ALPHA_RANGE: f64 = 225.0;

// =============================================================================
// Viewport
// =============================================================================

/// Drawing surface size in pixels
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Viewport {
    pub width: f64,
    pub height: f64,
}

impl Viewport {
    pub fn new(width: f64, height: f64) -> Self {
        Self { width, height }
    }

    /// Rotation center
    pub fn center(&self) -> (f64, f64) {
        (self.width / 2.0, self.height / 2.0)
    }

    /// Spacing of a layer at the reference octave's tonic
    pub fn base_spacing(&self) -> f64 {
        (BASE_SPACING_RATIO * self.width.min(self.height)).max(MIN_BASE_SPACING)
    }

    /// Half-length of each line, long enough to cover the viewport at any angle
    pub fn extent(&self) -> f64 {
        libm::hypot(self.width, self.height) + EXTENT_MARGIN
    }
}

// =============================================================================
// Tile Layers
// =============================================================================

/// One voice's layer of parallel lines
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct TileLayer {
    pub note: u8,
    pub pitch_class: u8,
    pub octave: i32,
    /// Rotation around the viewport center, in `[0, π)`
    pub angle: f64,
    /// Distance between neighbouring lines in pixels
    pub spacing: f64,
    /// Stroke alpha (0-255)
    pub alpha: f64,
}

/// Reduce an angle into `[0, π)`
#[inline]
fn wrap_half_turn(angle: f64) -> f64 {
    let wrapped = libm::fmod(libm::fmod(angle, PI) + PI, PI);
    if wrapped >= PI {
        0.0
    } else {
        wrapped
    }
}

/// Stroke alpha for an envelope level
#[inline]
pub fn stroke_alpha(level: f64) -> f64 {
    (MIN_ALPHA + level * ALPHA_RANGE).min(255.0)
}

impl TileLayer {
    /// Layout for `note` sounding at `level`, given the ratio its pitch class
    /// has under the active intonation.
    pub fn new(note: u8, level: f64, ratio: f64, viewport: &Viewport) -> Self {
        let (octave, pitch_class) = split_note(note);
        let octaves_from_reference = (octave - REFERENCE_OCTAVE) as f64;

        let within = PI * libm::log2(ratio);
        let angle = wrap_half_turn(PI * octaves_from_reference + within);

        let k = octaves_from_reference + pitch_class as f64 / 12.0;
        let spacing = viewport.base_spacing() * libm::exp2(k);

        Self {
            note,
            pitch_class,
            octave,
            angle,
            spacing,
            alpha: stroke_alpha(level),
        }
    }

    /// Offsets of every line perpendicular to the layer direction, before
    /// rotation, from `-extent` to `height + extent`
    pub fn line_offsets(&self, viewport: &Viewport) -> impl Iterator<Item = f64> {
        let extent = viewport.extent();
        let end = viewport.height + extent;
        let spacing = self.spacing;
        (0..)
            .map(move |i| -extent + i as f64 * spacing)
            .take_while(move |&y| y <= end)
    }
}

// =============================================================================
// Tile Plan
// =============================================================================

/// Every layer to draw for one tick
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TilePlan {
    pub layers: Vec<TileLayer>,
}

impl TilePlan {
    /// Build layers for every voice louder than `visible_threshold`
    pub fn from_levels(
        levels: &[VoiceLevel],
        tuner: &Tuner,
        intonation: Intonation,
        viewport: &Viewport,
        visible_threshold: f64,
    ) -> Self {
        let layers = levels
            .iter()
            .filter(|v| v.level > visible_threshold)
            .map(|v| {
                let (_, pc) = split_note(v.note);
                let ratio = tuner.ratio_for_pitch_class(pc, intonation);
                TileLayer::new(v.note, v.level, ratio, viewport)
            })
            .collect();
        Self { layers }
    }

    pub fn from_report(
        report: &TickReport,
        tuner: &Tuner,
        intonation: Intonation,
        viewport: &Viewport,
        visible_threshold: f64,
    ) -> Self {
        Self::from_levels(
            &report.levels,
            tuner,
            intonation,
            viewport,
            visible_threshold,
        )
    }

    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }
}
