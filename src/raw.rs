//! Typed view of the vision service's loosely-typed JSON
//!
//! The service returns a JSON object whose fields may be missing, mistyped or
//! out of range. [`RawMetadata::decode`] walks that object once and records,
//! per field, whether the value was missing, usable, or malformed. Validation
//! and repair then work on this representation instead of on key lookups.

use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

use crate::error::SchemaIssue;
use crate::models::{Direction, Distance, LandmarkType, LightingQuality, SceneType};

/// State of one field in the raw response
#[derive(Debug, Clone, PartialEq)]
pub enum RawField<T> {
    /// Absent or `null`
    Missing,
    Present(T),
    /// Present with a value of the wrong type or outside the enumeration
    Malformed(Value),
}

impl<T> RawField<T> {
    pub fn is_missing(&self) -> bool {
        matches!(self, RawField::Missing)
    }

    pub fn is_malformed(&self) -> bool {
        matches!(self, RawField::Malformed(_))
    }

    pub fn present(&self) -> Option<&T> {
        match self {
            RawField::Present(value) => Some(value),
            _ => None,
        }
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> RawField<U> {
        match self {
            RawField::Missing => RawField::Missing,
            RawField::Present(value) => RawField::Present(f(value)),
            RawField::Malformed(value) => RawField::Malformed(value),
        }
    }
}

impl<T> Default for RawField<T> {
    fn default() -> Self {
        RawField::Missing
    }
}

/// One element of a raw array: either the expected shape or something else
#[derive(Debug, Clone, PartialEq)]
pub enum RawEntry<T> {
    Entry(T),
    Invalid(Value),
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawTextDetection {
    pub text: RawField<String>,
    pub confidence: RawField<f64>,
    pub includes_arrow: RawField<bool>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawLandmark {
    pub landmark_type: RawField<LandmarkType>,
    pub direction: RawField<Direction>,
    pub distance: RawField<Distance>,
    pub confidence: RawField<f64>,
    pub additional_info: RawField<String>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawMetadata {
    pub scene_type: RawField<SceneType>,
    pub scene_confidence: RawField<f64>,
    pub text_detected: RawField<Vec<RawEntry<RawTextDetection>>>,
    pub landmarks: RawField<Vec<RawEntry<RawLandmark>>>,
    pub relative_position_cues: RawField<Vec<RawEntry<String>>>,
    pub lighting_quality: RawField<LightingQuality>,
    pub motion_blur_detected: RawField<bool>,
    pub frame_quality_score: RawField<f64>,
    pub processing_notes: RawField<String>,
}

impl RawMetadata {
    /// Decode a raw service result. Fails only when the root is not an object.
    pub fn decode(value: &Value) -> Result<Self, SchemaIssue> {
        let obj = value
            .as_object()
            .ok_or_else(|| SchemaIssue::new("root", format!("expected an object, got {}", kind_of(value))))?;

        Ok(Self {
            scene_type: enum_field(obj.get("scene_type")),
            scene_confidence: number_field(obj.get("scene_confidence")),
            text_detected: list_field(obj.get("text_detected"), |item| {
                item.as_object().map(RawTextDetection::decode)
            }),
            landmarks: list_field(obj.get("landmarks"), |item| {
                item.as_object().map(RawLandmark::decode)
            }),
            relative_position_cues: list_field(obj.get("relative_position_cues"), |item| {
                item.as_str().map(str::to_string)
            }),
            lighting_quality: enum_field(obj.get("lighting_quality")),
            motion_blur_detected: bool_field(obj.get("motion_blur_detected")),
            frame_quality_score: number_field(obj.get("frame_quality_score")),
            processing_notes: string_field(obj.get("processing_notes")),
        })
    }
}

impl RawTextDetection {
    fn decode(obj: &Map<String, Value>) -> Self {
        Self {
            text: string_field(obj.get("text")),
            confidence: number_field(obj.get("confidence")),
            includes_arrow: bool_field(obj.get("includes_arrow")),
        }
    }
}

impl RawLandmark {
    fn decode(obj: &Map<String, Value>) -> Self {
        Self {
            landmark_type: enum_field(obj.get("type")),
            direction: enum_field(obj.get("direction")),
            distance: enum_field(obj.get("distance")),
            confidence: number_field(obj.get("confidence")),
            additional_info: string_field(obj.get("additional_info")),
        }
    }
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Numbers and numeric strings are accepted; NaN and infinities are not.
fn number_field(value: Option<&Value>) -> RawField<f64> {
    let parsed = match value {
        None | Some(Value::Null) => return RawField::Missing,
        Some(Value::Number(n)) => n.as_f64(),
        Some(Value::String(s)) => s.trim().parse::<f64>().ok(),
        Some(_) => None,
    };

    match parsed {
        Some(n) if n.is_finite() => RawField::Present(n),
        _ => RawField::Malformed(value.cloned().unwrap_or(Value::Null)),
    }
}

fn bool_field(value: Option<&Value>) -> RawField<bool> {
    match value {
        None | Some(Value::Null) => RawField::Missing,
        Some(Value::Bool(b)) => RawField::Present(*b),
        Some(Value::String(s)) if s.eq_ignore_ascii_case("true") => RawField::Present(true),
        Some(Value::String(s)) if s.eq_ignore_ascii_case("false") => RawField::Present(false),
        Some(other) => RawField::Malformed(other.clone()),
    }
}

fn string_field(value: Option<&Value>) -> RawField<String> {
    match value {
        None | Some(Value::Null) => RawField::Missing,
        Some(Value::String(s)) => RawField::Present(s.clone()),
        Some(other) => RawField::Malformed(other.clone()),
    }
}

fn enum_field<T: DeserializeOwned>(value: Option<&Value>) -> RawField<T> {
    match value {
        None | Some(Value::Null) => RawField::Missing,
        Some(v @ Value::String(_)) => match serde_json::from_value(v.clone()) {
            Ok(parsed) => RawField::Present(parsed),
            Err(_) => RawField::Malformed(v.clone()),
        },
        Some(other) => RawField::Malformed(other.clone()),
    }
}

fn list_field<T>(
    value: Option<&Value>,
    decode_item: impl Fn(&Value) -> Option<T>,
) -> RawField<Vec<RawEntry<T>>> {
    match value {
        None | Some(Value::Null) => RawField::Missing,
        Some(Value::Array(items)) => RawField::Present(
            items
                .iter()
                .map(|item| match decode_item(item) {
                    Some(entry) => RawEntry::Entry(entry),
                    None => RawEntry::Invalid(item.clone()),
                })
                .collect(),
        ),
        Some(other) => RawField::Malformed(other.clone()),
    }
}
