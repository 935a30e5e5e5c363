//! Strict output schema for observations extracted from a camera frame
//!
//! These are the validated shapes returned to callers. Anything coming back
//! from the vision service goes through [`crate::raw`] and [`crate::schema`]
//! before it becomes one of these types.

use serde::{Deserialize, Serialize};

/// Classified environment type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SceneType {
    Hallway,
    Room,
    Lobby,
    Stairwell,
    ElevatorArea,
    CorridorIntersection,
    Entrance,
    Unknown,
}

/// Navigation-relevant physical object
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LandmarkType {
    Door,
    Staircase,
    StairsUp,
    StairsDown,
    Elevator,
    ExitSign,
    FireExtinguisher,
    RoomNumberPlaque,
    ElevatorButtonPanel,
    EmergencyExitDoor,
    RestroomSign,
    WaterFountain,
    FloorDirectory,
    HallwayIntersection,
    CorridorJunction,
}

/// Direction relative to the camera view
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Left,
    Right,
    Ahead,
    Behind,
}

/// Distance bucket, ordered from closest to farthest:
/// very_close (<5ft), near (5-10ft), mid (10-20ft), far (>20ft)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Distance {
    VeryClose,
    Near,
    Mid,
    Far,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LightingQuality {
    #[default]
    Good,
    Dim,
    Poor,
    Backlit,
}

/// Navigation text read from the frame
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextDetection {
    /// Trimmed, never empty
    pub text: String,
    pub confidence: f64,
    #[serde(default)]
    pub includes_arrow: bool,
}

/// Physical landmark with spatial context
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Landmark {
    #[serde(rename = "type")]
    pub landmark_type: LandmarkType,
    pub direction: Direction,
    pub distance: Distance,
    pub confidence: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub additional_info: Option<String>,
}

/// Complete metadata for a single frame. This is the unit returned to callers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndoorMetadata {
    pub scene_type: SceneType,
    pub scene_confidence: f64,
    #[serde(default)]
    pub text_detected: Vec<TextDetection>,
    #[serde(default)]
    pub landmarks: Vec<Landmark>,
    #[serde(default)]
    pub relative_position_cues: Vec<String>,
    #[serde(default)]
    pub lighting_quality: LightingQuality,
    #[serde(default)]
    pub motion_blur_detected: bool,
    pub frame_quality_score: f64,
    #[serde(default)]
    pub processing_notes: Option<String>,
    /// Set only by [`IndoorMetadata::fallback`]; never read from or written to the wire
    #[serde(skip)]
    pub(crate) fallback: bool,
}

impl IndoorMetadata {
    /// Minimal result used when a response cannot be salvaged or a batch
    /// frame fails. Always schema-valid.
    pub fn fallback(reason: impl AsRef<str>) -> Self {
        Self {
            scene_type: SceneType::Unknown,
            scene_confidence: 0.1,
            text_detected: Vec::new(),
            landmarks: Vec::new(),
            relative_position_cues: Vec::new(),
            lighting_quality: LightingQuality::Poor,
            motion_blur_detected: true,
            frame_quality_score: 0.2,
            processing_notes: Some(format!("Extraction failed: {}", reason.as_ref())),
            fallback: true,
        }
    }

    /// True for results synthesized by [`IndoorMetadata::fallback`] in this
    /// process. Service notes have no bearing on it.
    pub fn is_fallback(&self) -> bool {
        self.fallback
    }
}
