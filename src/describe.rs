//! Plain-language rendering of a scene for the conversation layer.

use serde::Serialize;

use crate::detect::Detection;
use crate::scene::SceneSnapshot;
use crate::spatial::Relationship;

/// Number of detections listed in `ObjectSummary::prominent`.
pub const PROMINENT_LIMIT: usize = 5;

/// Relationships mentioned in one description sentence.
pub const DESCRIBED_RELATIONSHIPS: usize = 3;

const NOTHING_SEEN: &str = "I don't see any objects.";

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ProminentObject {
    pub class: String,
    pub confidence: f32,
    pub position: (f64, f64),
}

/// Per-class counts plus the leading detections.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct ObjectSummary {
    pub total_objects: usize,
    /// Counts in order of first appearance.
    pub class_counts: Vec<(String, usize)>,
    /// First `PROMINENT_LIMIT` detections. Sampler output is sorted by
    /// confidence, so these are the most confident.
    pub prominent: Vec<ProminentObject>,
}

impl ObjectSummary {
    pub fn from_detections(detections: &[Detection]) -> Self {
        let mut class_counts: Vec<(String, usize)> = Vec::new();
        for detection in detections {
            match class_counts
                .iter_mut()
                .find(|(class, _)| class == detection.class())
            {
                Some((_, count)) => *count += 1,
                None => class_counts.push((detection.class().to_string(), 1)),
            }
        }
        let prominent = detections
            .iter()
            .take(PROMINENT_LIMIT)
            .map(|d| ProminentObject {
                class: d.class().to_string(),
                confidence: d.confidence(),
                position: d.center(),
            })
            .collect();
        Self {
            total_objects: detections.len(),
            class_counts,
            prominent,
        }
    }

    pub fn count_of(&self, class: &str) -> usize {
        self.class_counts
            .iter()
            .find(|(c, _)| c == class)
            .map_or(0, |(_, n)| *n)
    }
}

/// One-sentence description, e.g.
/// "I can see a tv, a remote. Regarding spatial relationships: the tv contains the remote."
pub fn describe_detections(detections: &[Detection], relationships: &[Relationship]) -> String {
    if detections.is_empty() {
        return NOTHING_SEEN.to_string();
    }
    let summary = ObjectSummary::from_detections(detections);
    let objects = match summary.class_counts.as_slice() {
        [(class, count)] => count_phrase(class, *count, false),
        counts => counts
            .iter()
            .map(|(class, count)| count_phrase(class, *count, true))
            .collect::<Vec<_>>()
            .join(", "),
    };

    let mut text = format!("I can see {}", objects);
    if !relationships.is_empty() {
        let rels: Vec<String> = relationships
            .iter()
            .take(DESCRIBED_RELATIONSHIPS)
            .map(|r| format!("the {} {} the {}", r.object1, r.kind.phrase(), r.object2))
            .collect();
        text.push_str(". Regarding spatial relationships: ");
        text.push_str(&rels.join(", "));
    }
    text.push('.');
    text
}

pub fn describe_scene(snapshot: &SceneSnapshot) -> String {
    describe_detections(&snapshot.detections, &snapshot.relationships)
}

fn count_phrase(class: &str, count: usize, article: bool) -> String {
    match (count, article) {
        (1, true) => format!("a {}", class),
        (1, false) => format!("1 {}", class),
        (n, _) => format!("{} {}s", n, class),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::BoundingBox;
    use crate::spatial::RelationshipEngine;

    fn det(class: &str, confidence: f32, bbox: [i32; 4]) -> Detection {
        let [x1, y1, x2, y2] = bbox;
        Detection::new(class, confidence, BoundingBox::new(x1, y1, x2, y2).unwrap()).unwrap()
    }

    #[test]
    fn nothing_seen() {
        assert_eq!(describe_detections(&[], &[]), "I don't see any objects.");
        assert_eq!(describe_scene(&SceneSnapshot::empty()), NOTHING_SEEN);
    }

    #[test]
    fn single_class_uses_counts() {
        assert_eq!(
            describe_detections(&[det("cup", 0.9, [0, 0, 10, 10])], &[]),
            "I can see 1 cup."
        );
        let cups = [det("cup", 0.9, [0, 0, 10, 10]), det("cup", 0.8, [500, 0, 510, 10])];
        assert_eq!(describe_detections(&cups, &[]), "I can see 2 cups.");
    }

    #[test]
    fn mixed_classes_with_relationships() {
        let detections = vec![
            det("tv", 0.9, [100, 100, 500, 400]),
            det("remote", 0.8, [200, 200, 250, 230]),
        ];
        let relationships = RelationshipEngine::default().compute(&detections);
        assert_eq!(
            describe_detections(&detections, &relationships),
            "I can see a tv, a remote. Regarding spatial relationships: the tv contains the remote."
        );
    }

    #[test]
    fn at_most_three_relationships_are_mentioned() {
        let detections: Vec<Detection> = (0..4)
            .map(|i| det("cup", 0.9, [i * 40, 0, i * 40 + 10, 10]))
            .collect();
        let relationships = RelationshipEngine::default().compute(&detections);
        assert_eq!(relationships.len(), 6);
        let text = describe_detections(&detections, &relationships);
        assert_eq!(text.matches("the cup is").count(), 3);
    }

    #[test]
    fn summary_counts_in_first_seen_order() {
        let detections: Vec<Detection> = ["book", "cup", "book", "cup", "book", "lamp"]
            .iter()
            .map(|c| det(c, 0.7, [0, 0, 20, 20]))
            .collect();
        let summary = ObjectSummary::from_detections(&detections);
        assert_eq!(summary.total_objects, 6);
        assert_eq!(
            summary.class_counts,
            vec![
                ("book".to_string(), 3),
                ("cup".to_string(), 2),
                ("lamp".to_string(), 1)
            ]
        );
        assert_eq!(summary.prominent.len(), PROMINENT_LIMIT);
        assert_eq!(summary.prominent[0].position, (10.0, 10.0));
        assert_eq!(summary.count_of("cup"), 2);
        assert_eq!(summary.count_of("dog"), 0);
    }
}
