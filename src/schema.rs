//! Schema validation and repair
//!
//! [`check`] is the single entry point used by the extractor. It returns a
//! [`SchemaOutcome`] instead of an error: schema problems are deterministic
//! for a given response, so they are resolved here (repair or fallback) and
//! never retried.

use serde_json::Value;
use tracing::debug;

use crate::error::{describe_issues, SchemaIssue};
use crate::models::{IndoorMetadata, Landmark, LightingQuality, TextDetection};
use crate::raw::{RawEntry, RawField, RawLandmark, RawMetadata, RawTextDetection};

/// Confidence assigned to a detection that arrived without one
pub const DEFAULT_ITEM_CONFIDENCE: f64 = 0.5;
pub const DEFAULT_SCENE_CONFIDENCE: f64 = 0.5;
pub const DEFAULT_FRAME_QUALITY: f64 = 0.5;
/// Scene confidence used when the scene type itself had to be filled in
pub const UNKNOWN_SCENE_CONFIDENCE: f64 = 0.3;

#[derive(Debug, Clone, PartialEq)]
pub enum SchemaOutcome {
    /// The raw result matched the schema as-is
    Valid(IndoorMetadata),
    /// The raw result was invalid but repair produced a valid object
    Repaired {
        metadata: IndoorMetadata,
        issues: Vec<SchemaIssue>,
    },
    /// Nothing usable could be salvaged
    Unrecoverable { issues: Vec<SchemaIssue> },
}

/// Validate a raw result, repairing it if needed
pub fn check(value: &Value) -> SchemaOutcome {
    let raw = match RawMetadata::decode(value) {
        Ok(raw) => raw,
        Err(issue) => return SchemaOutcome::Unrecoverable { issues: vec![issue] },
    };

    let issues = match validate(&raw) {
        Ok(metadata) => return SchemaOutcome::Valid(metadata),
        Err(issues) => issues,
    };

    debug!(issues = %describe_issues(&issues), "Raw result failed validation, attempting repair");

    let Some(repaired) = repair(raw) else {
        return SchemaOutcome::Unrecoverable { issues };
    };

    match validate(&repaired) {
        Ok(mut metadata) => {
            let summary = describe_issues(&issues);
            metadata.processing_notes = Some(match metadata.processing_notes.take() {
                Some(notes) => format!("{}; repaired: {}", notes, summary),
                None => format!("Repaired: {}", summary),
            });
            SchemaOutcome::Repaired { metadata, issues }
        }
        Err(remaining) => {
            let mut all = issues;
            all.extend(remaining);
            SchemaOutcome::Unrecoverable { issues: all }
        }
    }
}

/// Strict validation. Collects every issue rather than stopping at the first.
pub fn validate(raw: &RawMetadata) -> Result<IndoorMetadata, Vec<SchemaIssue>> {
    let mut issues = Vec::new();

    let scene_type = required(&raw.scene_type, "scene_type", &mut issues);
    let scene_confidence = unit_interval(&raw.scene_confidence, "scene_confidence", &mut issues);
    let frame_quality_score =
        unit_interval(&raw.frame_quality_score, "frame_quality_score", &mut issues);
    let lighting_quality =
        defaulted(&raw.lighting_quality, LightingQuality::Good, "lighting_quality", &mut issues);
    let motion_blur_detected =
        defaulted(&raw.motion_blur_detected, false, "motion_blur_detected", &mut issues);
    let processing_notes = optional(&raw.processing_notes, "processing_notes", &mut issues);

    let text_detected = entries(&raw.text_detected, "text_detected", &mut issues, validate_text);
    let landmarks = entries(&raw.landmarks, "landmarks", &mut issues, validate_landmark);
    let relative_position_cues = entries(
        &raw.relative_position_cues,
        "relative_position_cues",
        &mut issues,
        |cue: &String, _: &str, _: &mut Vec<SchemaIssue>| Some(cue.clone()),
    );

    if !issues.is_empty() {
        return Err(issues);
    }

    match (scene_type, scene_confidence, frame_quality_score) {
        (Some(scene_type), Some(scene_confidence), Some(frame_quality_score)) => Ok(IndoorMetadata {
            scene_type,
            scene_confidence,
            text_detected,
            landmarks,
            relative_position_cues,
            lighting_quality,
            motion_blur_detected,
            frame_quality_score,
            processing_notes,
            fallback: false,
        }),
        // Every None above pushed an issue
        _ => Err(vec![SchemaIssue::new("root", "required fields missing")]),
    }
}

/// Best-effort coercion of an almost-valid result.
///
/// Returns `None` when a top-level field is present but unusable, since
/// nothing here can invent a value for it.
pub fn repair(mut raw: RawMetadata) -> Option<RawMetadata> {
    if raw.scene_type.is_missing() {
        raw.scene_type = RawField::Present(crate::models::SceneType::Unknown);
        raw.scene_confidence = RawField::Present(UNKNOWN_SCENE_CONFIDENCE);
    }
    if raw.scene_confidence.is_missing() {
        raw.scene_confidence = RawField::Present(DEFAULT_SCENE_CONFIDENCE);
    }
    if raw.frame_quality_score.is_missing() {
        raw.frame_quality_score = RawField::Present(DEFAULT_FRAME_QUALITY);
    }

    raw.scene_confidence = raw.scene_confidence.map(clamp_unit);
    raw.frame_quality_score = raw.frame_quality_score.map(clamp_unit);

    if raw.processing_notes.is_malformed() {
        raw.processing_notes = RawField::Missing;
    }

    raw.text_detected = raw.text_detected.map(|items| {
        items
            .into_iter()
            .filter_map(|entry| match entry {
                RawEntry::Entry(text) => repair_text(text).map(RawEntry::Entry),
                RawEntry::Invalid(_) => None,
            })
            .collect()
    });

    raw.landmarks = raw.landmarks.map(|items| {
        items
            .into_iter()
            .filter_map(|entry| match entry {
                RawEntry::Entry(landmark) => repair_landmark(landmark).map(RawEntry::Entry),
                RawEntry::Invalid(_) => None,
            })
            .collect()
    });

    raw.relative_position_cues = raw.relative_position_cues.map(|cues| {
        cues.into_iter()
            .filter(|cue| matches!(cue, RawEntry::Entry(_)))
            .collect()
    });

    let unrepairable = raw.scene_type.is_malformed()
        || raw.scene_confidence.is_malformed()
        || raw.frame_quality_score.is_malformed()
        || raw.lighting_quality.is_malformed()
        || raw.motion_blur_detected.is_malformed()
        || raw.text_detected.is_malformed()
        || raw.landmarks.is_malformed()
        || raw.relative_position_cues.is_malformed();

    if unrepairable {
        None
    } else {
        Some(raw)
    }
}

fn repair_text(mut text: RawTextDetection) -> Option<RawTextDetection> {
    let has_text = text.text.present().is_some_and(|t| !t.trim().is_empty());
    if !has_text || text.confidence.is_malformed() {
        return None;
    }

    if text.confidence.is_missing() {
        text.confidence = RawField::Present(DEFAULT_ITEM_CONFIDENCE);
    }
    text.confidence = text.confidence.map(clamp_unit);

    if text.includes_arrow.is_malformed() {
        text.includes_arrow = RawField::Missing;
    }
    Some(text)
}

fn repair_landmark(mut landmark: RawLandmark) -> Option<RawLandmark> {
    // Closed-enum fields are never invented
    let complete = landmark.landmark_type.present().is_some()
        && landmark.direction.present().is_some()
        && landmark.distance.present().is_some();
    if !complete || landmark.confidence.is_malformed() {
        return None;
    }

    if landmark.confidence.is_missing() {
        landmark.confidence = RawField::Present(DEFAULT_ITEM_CONFIDENCE);
    }
    landmark.confidence = landmark.confidence.map(clamp_unit);

    if landmark.additional_info.is_malformed() {
        landmark.additional_info = RawField::Missing;
    }
    Some(landmark)
}

fn clamp_unit(value: f64) -> f64 {
    value.clamp(0.0, 1.0)
}

fn validate_text(
    raw: &RawTextDetection,
    path: &str,
    issues: &mut Vec<SchemaIssue>,
) -> Option<TextDetection> {
    let text = match &raw.text {
        RawField::Present(t) if !t.trim().is_empty() => Some(t.trim().to_string()),
        RawField::Present(_) => {
            issues.push(SchemaIssue::new(format!("{}.text", path), "text cannot be empty"));
            None
        }
        other => {
            report(other, &format!("{}.text", path), issues);
            None
        }
    };
    let confidence = unit_interval(&raw.confidence, &format!("{}.confidence", path), issues);
    let includes_arrow =
        defaulted(&raw.includes_arrow, false, &format!("{}.includes_arrow", path), issues);

    Some(TextDetection {
        text: text?,
        confidence: confidence?,
        includes_arrow,
    })
}

fn validate_landmark(
    raw: &RawLandmark,
    path: &str,
    issues: &mut Vec<SchemaIssue>,
) -> Option<Landmark> {
    let landmark_type = required(&raw.landmark_type, &format!("{}.type", path), issues);
    let direction = required(&raw.direction, &format!("{}.direction", path), issues);
    let distance = required(&raw.distance, &format!("{}.distance", path), issues);
    let confidence = unit_interval(&raw.confidence, &format!("{}.confidence", path), issues);
    let additional_info =
        optional(&raw.additional_info, &format!("{}.additional_info", path), issues);

    Some(Landmark {
        landmark_type: landmark_type?,
        direction: direction?,
        distance: distance?,
        confidence: confidence?,
        additional_info,
    })
}

fn entries<R, T>(
    field: &RawField<Vec<RawEntry<R>>>,
    name: &str,
    issues: &mut Vec<SchemaIssue>,
    validate_item: impl Fn(&R, &str, &mut Vec<SchemaIssue>) -> Option<T>,
) -> Vec<T> {
    match field {
        RawField::Missing => Vec::new(),
        RawField::Malformed(value) => {
            issues.push(SchemaIssue::new(name, format!("expected a list, got {}", value)));
            Vec::new()
        }
        RawField::Present(items) => items
            .iter()
            .enumerate()
            .filter_map(|(i, entry)| {
                let path = format!("{}[{}]", name, i);
                match entry {
                    RawEntry::Entry(item) => validate_item(item, &path, issues),
                    RawEntry::Invalid(value) => {
                        issues.push(SchemaIssue::new(path, format!("unexpected entry {}", value)));
                        None
                    }
                }
            })
            .collect(),
    }
}

fn report<T>(field: &RawField<T>, name: &str, issues: &mut Vec<SchemaIssue>) {
    match field {
        RawField::Missing => issues.push(SchemaIssue::new(name, "field required")),
        RawField::Malformed(value) => {
            issues.push(SchemaIssue::new(name, format!("invalid value {}", value)))
        }
        RawField::Present(_) => {}
    }
}

fn required<T: Copy>(field: &RawField<T>, name: &str, issues: &mut Vec<SchemaIssue>) -> Option<T> {
    report(field, name, issues);
    field.present().copied()
}

fn defaulted<T: Copy>(
    field: &RawField<T>,
    default: T,
    name: &str,
    issues: &mut Vec<SchemaIssue>,
) -> T {
    if field.is_malformed() {
        report(field, name, issues);
    }
    field.present().copied().unwrap_or(default)
}

fn optional(field: &RawField<String>, name: &str, issues: &mut Vec<SchemaIssue>) -> Option<String> {
    if field.is_malformed() {
        report(field, name, issues);
    }
    field.present().cloned()
}

fn unit_interval(field: &RawField<f64>, name: &str, issues: &mut Vec<SchemaIssue>) -> Option<f64> {
    let value = required(field, name, issues)?;
    if (0.0..=1.0).contains(&value) {
        Some(value)
    } else {
        issues.push(SchemaIssue::new(name, format!("{} is outside [0, 1]", value)));
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Direction, Distance, LandmarkType, SceneType};
    use serde_json::json;

    fn valid_raw() -> Value {
        json!({
            "scene_type": "hallway",
            "scene_confidence": 0.94,
            "text_detected": [
                {"text": "Floor 3", "confidence": 0.92, "includes_arrow": false},
                {"text": "→ 300-350", "confidence": 0.88, "includes_arrow": true}
            ],
            "landmarks": [
                {"type": "exit_sign", "direction": "ahead", "distance": "mid", "confidence": 0.91},
                {"type": "door", "direction": "left", "distance": "very_close", "confidence": 0.89,
                 "additional_info": "closed"}
            ],
            "relative_position_cues": ["Exit sign approximately 15 feet ahead"],
            "lighting_quality": "good",
            "motion_blur_detected": false,
            "frame_quality_score": 0.89,
            "processing_notes": null
        })
    }

    #[test]
    fn test_valid_result_round_trips() {
        let value = valid_raw();
        let metadata = match check(&value) {
            SchemaOutcome::Valid(m) => m,
            other => panic!("expected valid, got {:?}", other),
        };

        assert_eq!(metadata.scene_type, SceneType::Hallway);
        assert_eq!(metadata.text_detected.len(), 2);
        assert!(metadata.text_detected[1].includes_arrow);
        assert_eq!(metadata.landmarks[1].additional_info.as_deref(), Some("closed"));
        assert_eq!(metadata.processing_notes, None);

        // Serializing the validated value and checking it again is lossless
        let reserialized = serde_json::to_value(&metadata).unwrap();
        assert_eq!(check(&reserialized), SchemaOutcome::Valid(metadata));
    }

    #[test]
    fn test_repair_is_identity_on_valid_input() {
        let raw = RawMetadata::decode(&valid_raw()).unwrap();
        assert_eq!(repair(raw.clone()), Some(raw));
    }

    #[test]
    fn test_missing_scene_type_becomes_unknown() {
        let value = json!({"scene_confidence": 0.9, "frame_quality_score": 0.7});

        match check(&value) {
            SchemaOutcome::Repaired { metadata, issues } => {
                assert_eq!(metadata.scene_type, SceneType::Unknown);
                assert_eq!(metadata.scene_confidence, UNKNOWN_SCENE_CONFIDENCE);
                assert_eq!(metadata.frame_quality_score, 0.7);
                assert!(issues.iter().any(|i| i.field == "scene_type"));
                assert!(metadata.processing_notes.unwrap().starts_with("Repaired:"));
            }
            other => panic!("expected repaired, got {:?}", other),
        }
    }

    #[test]
    fn test_missing_confidences_get_defaults() {
        let value = json!({"scene_type": "lobby"});

        match check(&value) {
            SchemaOutcome::Repaired { metadata, .. } => {
                assert_eq!(metadata.scene_type, SceneType::Lobby);
                assert_eq!(metadata.scene_confidence, DEFAULT_SCENE_CONFIDENCE);
                assert_eq!(metadata.frame_quality_score, DEFAULT_FRAME_QUALITY);
            }
            other => panic!("expected repaired, got {:?}", other),
        }
    }

    #[test]
    fn test_out_of_range_confidences_are_clamped() {
        let value = json!({
            "scene_type": "room",
            "scene_confidence": 1.7,
            "frame_quality_score": -0.2,
            "text_detected": [{"text": "312", "confidence": 4.0}],
            "landmarks": [{"type": "door", "direction": "right", "distance": "near", "confidence": -1}]
        });

        match check(&value) {
            SchemaOutcome::Repaired { metadata, .. } => {
                assert_eq!(metadata.scene_confidence, 1.0);
                assert_eq!(metadata.frame_quality_score, 0.0);
                assert_eq!(metadata.text_detected[0].confidence, 1.0);
                assert_eq!(metadata.landmarks[0].confidence, 0.0);
            }
            other => panic!("expected repaired, got {:?}", other),
        }
    }

    #[test]
    fn test_incomplete_landmarks_are_dropped() {
        let value = json!({
            "scene_type": "hallway",
            "scene_confidence": 0.8,
            "frame_quality_score": 0.8,
            "landmarks": [
                {"type": "door", "direction": "left"},
                {"direction": "ahead", "distance": "far", "confidence": 0.9},
                {"type": "window", "direction": "ahead", "distance": "far", "confidence": 0.9},
                {"type": "elevator", "direction": "right", "distance": "mid"}
            ]
        });

        match check(&value) {
            SchemaOutcome::Repaired { metadata, .. } => {
                assert_eq!(metadata.landmarks.len(), 1);
                let kept = &metadata.landmarks[0];
                assert_eq!(kept.landmark_type, LandmarkType::Elevator);
                assert_eq!(kept.direction, Direction::Right);
                assert_eq!(kept.distance, Distance::Mid);
                assert_eq!(kept.confidence, DEFAULT_ITEM_CONFIDENCE);
            }
            other => panic!("expected repaired, got {:?}", other),
        }
    }

    #[test]
    fn test_text_entries_without_text_are_dropped() {
        let value = json!({
            "scene_type": "hallway",
            "scene_confidence": 0.8,
            "frame_quality_score": 0.8,
            "text_detected": [
                {"confidence": 0.9},
                {"text": "   ", "confidence": 0.9},
                "EXIT",
                {"text": "  Room 204 "}
            ]
        });

        match check(&value) {
            SchemaOutcome::Repaired { metadata, .. } => {
                assert_eq!(metadata.text_detected.len(), 1);
                assert_eq!(metadata.text_detected[0].text, "Room 204");
                assert_eq!(metadata.text_detected[0].confidence, DEFAULT_ITEM_CONFIDENCE);
            }
            other => panic!("expected repaired, got {:?}", other),
        }
    }

    #[test]
    fn test_unknown_scene_type_is_unrecoverable() {
        let value = json!({"scene_type": "kitchen", "scene_confidence": 0.9, "frame_quality_score": 0.9});

        match check(&value) {
            SchemaOutcome::Unrecoverable { issues } => {
                assert!(issues.iter().any(|i| i.field == "scene_type"));
            }
            other => panic!("expected unrecoverable, got {:?}", other),
        }
    }

    #[test]
    fn test_non_object_is_unrecoverable() {
        assert!(matches!(
            check(&json!("not json metadata")),
            SchemaOutcome::Unrecoverable { .. }
        ));
    }

    #[test]
    fn test_repair_keeps_service_notes() {
        let value = json!({
            "scene_type": "stairwell",
            "processing_notes": "partial view"
        });

        match check(&value) {
            SchemaOutcome::Repaired { metadata, .. } => {
                let notes = metadata.processing_notes.unwrap();
                assert!(notes.starts_with("partial view; repaired:"));
            }
            other => panic!("expected repaired, got {:?}", other),
        }
    }

    #[test]
    fn test_malformed_top_level_list_is_unrecoverable() {
        let raw = RawMetadata::decode(&json!({
            "scene_type": "hallway",
            "text_detected": {"text": "EXIT"}
        }))
        .unwrap();

        assert_eq!(repair(raw), None);
    }

    #[test]
    fn test_non_numeric_item_confidence_drops_entry() {
        let value = json!({
            "scene_type": "hallway",
            "scene_confidence": 0.8,
            "frame_quality_score": 0.8,
            "text_detected": [
                {"text": "EXIT", "confidence": "high"},
                {"text": "Room 204", "confidence": "0.7"}
            ],
            "landmarks": [
                {"type": "door", "direction": "left", "distance": "near", "confidence": "high"},
                {"type": "elevator", "direction": "right", "distance": "mid", "confidence": 0.9}
            ]
        });

        match check(&value) {
            SchemaOutcome::Repaired { metadata, issues } => {
                let texts: Vec<&str> = metadata.text_detected.iter().map(|t| t.text.as_str()).collect();
                assert_eq!(texts, vec!["Room 204"]);
                assert_eq!(metadata.text_detected[0].confidence, 0.7);
                assert_eq!(metadata.landmarks.len(), 1);
                assert_eq!(metadata.landmarks[0].landmark_type, LandmarkType::Elevator);
                assert!(issues.iter().any(|i| i.field == "text_detected[0].confidence"));
                assert!(issues.iter().any(|i| i.field == "landmarks[0].confidence"));
            }
            other => panic!("expected repaired, got {:?}", other),
        }
    }

    #[test]
    fn test_non_string_cues_are_dropped() {
        let value = json!({
            "scene_type": "lobby",
            "scene_confidence": 0.8,
            "frame_quality_score": 0.8,
            "relative_position_cues": ["Elevators to the right", 42, {"cue": "desk"}, null, "Exit behind"]
        });

        match check(&value) {
            SchemaOutcome::Repaired { metadata, issues } => {
                assert_eq!(
                    metadata.relative_position_cues,
                    vec!["Elevators to the right".to_string(), "Exit behind".to_string()]
                );
                assert!(issues.iter().all(|i| i.field.starts_with("relative_position_cues")));
            }
            other => panic!("expected repaired, got {:?}", other),
        }
    }

    #[test]
    fn test_service_failure_notes_stay_valid() {
        let mut value = valid_raw();
        value["processing_notes"] = json!("Extraction failed: lens partially covered");

        match check(&value) {
            SchemaOutcome::Valid(metadata) => assert!(!metadata.is_fallback()),
            other => panic!("expected valid, got {:?}", other),
        }
    }
}
