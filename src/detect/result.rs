use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};

/// Detector output before validation.
///
/// This is what a `DetectorBackend` hands back. Nothing downstream consumes
/// it directly; the sampler converts every record with `Detection::try_from`
/// and abandons the tick if any record is malformed.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RawDetection {
    pub class: String,
    pub confidence: f32,
    /// `[x1, y1, x2, y2]` in pixel coordinates.
    pub bbox: [i32; 4],
}

impl RawDetection {
    pub fn new(class: impl Into<String>, confidence: f32, bbox: [i32; 4]) -> Self {
        Self {
            class: class.into(),
            confidence,
            bbox,
        }
    }
}

/// Axis-aligned box with `x1 <= x2` and `y1 <= y2`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct BoundingBox {
    x1: i32,
    y1: i32,
    x2: i32,
    y2: i32,
}

impl BoundingBox {
    pub fn new(x1: i32, y1: i32, x2: i32, y2: i32) -> Result<Self> {
        if x1 > x2 || y1 > y2 {
            return Err(anyhow!(
                "malformed bounding box [{}, {}, {}, {}]: expected x1<=x2 and y1<=y2",
                x1,
                y1,
                x2,
                y2
            ));
        }
        Ok(Self { x1, y1, x2, y2 })
    }

    pub fn x1(&self) -> i32 {
        self.x1
    }

    pub fn y1(&self) -> i32 {
        self.y1
    }

    pub fn x2(&self) -> i32 {
        self.x2
    }

    pub fn y2(&self) -> i32 {
        self.y2
    }

    pub fn as_array(&self) -> [i32; 4] {
        [self.x1, self.y1, self.x2, self.y2]
    }

    pub fn center(&self) -> (f64, f64) {
        (
            (self.x1 as f64 + self.x2 as f64) / 2.0,
            (self.y1 as f64 + self.y2 as f64) / 2.0,
        )
    }

    pub fn area(&self) -> i64 {
        (self.x2 as i64 - self.x1 as i64) * (self.y2 as i64 - self.y1 as i64)
    }

    /// True when `other` lies within `self` on all four edges (shared edges count).
    pub fn encloses(&self, other: &BoundingBox) -> bool {
        self.x1 <= other.x1 && self.y1 <= other.y1 && self.x2 >= other.x2 && self.y2 >= other.y2
    }
}

/// One validated object instance from a single frame.
///
/// Fields are private so a detection can only come out of [`Detection::new`]:
///
/// ```compile_fail
/// use scene_vision::detect::Detection;
///
/// let _d = Detection { class: "cup".to_string(), confidence: 0.9 };
/// ```
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Detection {
    class: String,
    confidence: f32,
    bbox: BoundingBox,
    center: (f64, f64),
    area: i64,
}

impl Detection {
    pub fn new(class: impl Into<String>, confidence: f32, bbox: BoundingBox) -> Result<Self> {
        let class = class.into();
        if class.trim().is_empty() {
            return Err(anyhow!("detection class label must not be empty"));
        }
        if !confidence.is_finite() || !(0.0..=1.0).contains(&confidence) {
            return Err(anyhow!(
                "detection '{}' has confidence {} outside 0..=1",
                class,
                confidence
            ));
        }
        Ok(Self {
            center: bbox.center(),
            area: bbox.area(),
            class,
            confidence,
            bbox,
        })
    }

    pub fn class(&self) -> &str {
        &self.class
    }

    pub fn confidence(&self) -> f32 {
        self.confidence
    }

    pub fn bbox(&self) -> &BoundingBox {
        &self.bbox
    }

    pub fn center(&self) -> (f64, f64) {
        self.center
    }

    pub fn area(&self) -> i64 {
        self.area
    }
}

impl TryFrom<RawDetection> for Detection {
    type Error = anyhow::Error;

    fn try_from(raw: RawDetection) -> Result<Self> {
        let [x1, y1, x2, y2] = raw.bbox;
        let bbox = BoundingBox::new(x1, y1, x2, y2)?;
        Detection::new(raw.class, raw.confidence, bbox)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_inverted_boxes() {
        assert!(BoundingBox::new(10, 0, 5, 10).is_err());
        assert!(BoundingBox::new(0, 10, 10, 5).is_err());
        assert!(BoundingBox::new(5, 5, 5, 5).is_ok());
    }

    #[test]
    fn derives_center_and_area() {
        let bbox = BoundingBox::new(100, 50, 300, 150).unwrap();
        let det = Detection::new("tv", 0.9, bbox).unwrap();
        assert_eq!(det.center(), (200.0, 100.0));
        assert_eq!(det.area(), 200 * 100);
    }

    #[test]
    fn odd_extents_keep_fractional_center() {
        let bbox = BoundingBox::new(0, 0, 3, 5).unwrap();
        assert_eq!(bbox.center(), (1.5, 2.5));
    }

    #[test]
    fn rejects_bad_confidence_and_empty_labels() {
        let bbox = BoundingBox::new(0, 0, 1, 1).unwrap();
        assert!(Detection::new("cup", 1.5, bbox).is_err());
        assert!(Detection::new("cup", -0.1, bbox).is_err());
        assert!(Detection::new("cup", f32::NAN, bbox).is_err());
        assert!(Detection::new("  ", 0.5, bbox).is_err());
    }

    #[test]
    fn converts_raw_records() {
        let ok = Detection::try_from(RawDetection::new("remote", 0.7, [120, 60, 180, 100]));
        assert_eq!(ok.unwrap().bbox().as_array(), [120, 60, 180, 100]);

        let bad = Detection::try_from(RawDetection::new("remote", 0.7, [180, 60, 120, 100]));
        assert!(bad.is_err());
    }

    #[test]
    fn enclosure_counts_shared_edges() {
        let outer = BoundingBox::new(0, 0, 100, 100).unwrap();
        let inner = BoundingBox::new(0, 10, 100, 90).unwrap();
        assert!(outer.encloses(&inner));
        assert!(!inner.encloses(&outer));
        assert!(outer.encloses(&outer));
    }
}
