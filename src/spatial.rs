//! Qualitative spatial relationships between detections.
//!
//! `RelationshipEngine::compute` is a pure function of its input list. For
//! every unordered pair `(i, j)` with `i < j` whose centers lie within the
//! proximity threshold it emits exactly one relationship, read as
//! "detection i <kind> detection j". Checks run in a fixed order and the
//! first match wins:
//!
//! 1. containment (`contains`, then `inside`)
//! 2. identical centers (`near`)
//! 3. same row, |dy| < tolerance (`left-of` / `right-of`)
//! 4. same column, |dx| < tolerance (`above` / `below`)
//! 5. diagonal quadrant from the delta signs
//!
//! Image coordinates grow rightwards and downwards, so "above" means a
//! smaller y.

use serde::Serialize;
use std::fmt;

use crate::detect::Detection;

pub const DEFAULT_PROXIMITY_THRESHOLD_PX: f64 = 200.0;
pub const DEFAULT_ALIGNMENT_TOLERANCE_PX: f64 = 50.0;

/// Fixed relation vocabulary.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum RelationKind {
    Contains,
    Inside,
    LeftOf,
    RightOf,
    Above,
    Below,
    AboveLeft,
    AboveRight,
    BelowLeft,
    BelowRight,
    Near,
}

impl RelationKind {
    pub const ALL: [RelationKind; 11] = [
        RelationKind::Contains,
        RelationKind::Inside,
        RelationKind::LeftOf,
        RelationKind::RightOf,
        RelationKind::Above,
        RelationKind::Below,
        RelationKind::AboveLeft,
        RelationKind::AboveRight,
        RelationKind::BelowLeft,
        RelationKind::BelowRight,
        RelationKind::Near,
    ];

    /// Machine tag, e.g. `left-of`.
    pub fn as_str(&self) -> &'static str {
        match self {
            RelationKind::Contains => "contains",
            RelationKind::Inside => "inside",
            RelationKind::LeftOf => "left-of",
            RelationKind::RightOf => "right-of",
            RelationKind::Above => "above",
            RelationKind::Below => "below",
            RelationKind::AboveLeft => "above-left",
            RelationKind::AboveRight => "above-right",
            RelationKind::BelowLeft => "below-left",
            RelationKind::BelowRight => "below-right",
            RelationKind::Near => "near",
        }
    }

    /// Verb phrase for sentences of the form "the cup <phrase> the laptop".
    pub fn phrase(&self) -> &'static str {
        match self {
            RelationKind::Contains => "contains",
            RelationKind::Inside => "is inside",
            RelationKind::LeftOf => "is to the left of",
            RelationKind::RightOf => "is to the right of",
            RelationKind::Above => "is above",
            RelationKind::Below => "is below",
            RelationKind::AboveLeft => "is above and to the left of",
            RelationKind::AboveRight => "is above and to the right of",
            RelationKind::BelowLeft => "is below and to the left of",
            RelationKind::BelowRight => "is below and to the right of",
            RelationKind::Near => "is near",
        }
    }
}

impl fmt::Display for RelationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Relationship between two detections of the same tick.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Relationship {
    pub object1: String,
    pub object2: String,
    /// Index of `object1` in the detection list it was computed from.
    pub first: usize,
    /// Index of `object2`; always greater than `first`.
    pub second: usize,
    #[serde(rename = "relationship")]
    pub kind: RelationKind,
    /// Center-to-center distance in pixels. Diagnostic only.
    pub distance: f64,
    pub confidence: f32,
}

/// Pixel thresholds for the engine.
///
/// Both are absolute pixel magnitudes and do not scale with capture
/// resolution.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SpatialSettings {
    pub proximity_threshold_px: f64,
    pub alignment_tolerance_px: f64,
}

impl Default for SpatialSettings {
    fn default() -> Self {
        Self {
            proximity_threshold_px: DEFAULT_PROXIMITY_THRESHOLD_PX,
            alignment_tolerance_px: DEFAULT_ALIGNMENT_TOLERANCE_PX,
        }
    }
}

#[derive(Clone, Copy, Debug, Default)]
pub struct RelationshipEngine {
    settings: SpatialSettings,
}

impl RelationshipEngine {
    pub fn new(settings: SpatialSettings) -> Self {
        Self { settings }
    }

    pub fn settings(&self) -> SpatialSettings {
        self.settings
    }

    /// Relationships for every close pair, in `(i, j)` iteration order.
    pub fn compute(&self, detections: &[Detection]) -> Vec<Relationship> {
        let mut relationships = Vec::new();
        for (i, a) in detections.iter().enumerate() {
            for (j, b) in detections.iter().enumerate().skip(i + 1) {
                if let Some(rel) = self.relate(i, a, j, b) {
                    relationships.push(rel);
                }
            }
        }
        log::debug!(
            "computed {} spatial relationships from {} detections",
            relationships.len(),
            detections.len()
        );
        relationships
    }

    fn relate(&self, i: usize, a: &Detection, j: usize, b: &Detection) -> Option<Relationship> {
        let (ax, ay) = a.center();
        let (bx, by) = b.center();
        let dx = ax - bx;
        let dy = ay - by;
        let distance = dx.hypot(dy);
        if distance > self.settings.proximity_threshold_px {
            return None;
        }
        Some(Relationship {
            object1: a.class().to_string(),
            object2: b.class().to_string(),
            first: i,
            second: j,
            kind: self.classify(a, b, dx, dy),
            distance,
            confidence: a.confidence().min(b.confidence()),
        })
    }

    fn classify(&self, a: &Detection, b: &Detection, dx: f64, dy: f64) -> RelationKind {
        if a.bbox().encloses(b.bbox()) {
            return RelationKind::Contains;
        }
        if b.bbox().encloses(a.bbox()) {
            return RelationKind::Inside;
        }
        if dx == 0.0 && dy == 0.0 {
            return RelationKind::Near;
        }

        let tolerance = self.settings.alignment_tolerance_px;
        if dy.abs() < tolerance {
            return if dx < 0.0 {
                RelationKind::LeftOf
            } else {
                RelationKind::RightOf
            };
        }
        if dx.abs() < tolerance {
            return if dy < 0.0 {
                RelationKind::Above
            } else {
                RelationKind::Below
            };
        }

        match (dy < 0.0, dx < 0.0) {
            (true, true) => RelationKind::AboveLeft,
            (true, false) => RelationKind::AboveRight,
            (false, true) => RelationKind::BelowLeft,
            (false, false) => RelationKind::BelowRight,
        }
    }
}
