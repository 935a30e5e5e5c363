use tracing::debug;

use crate::metrics;
use crate::models::IndoorMetadata;

pub const DEFAULT_CONFIDENCE_THRESHOLD: f64 = 0.5;

/// Drops detections whose confidence is strictly below the threshold
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ConfidenceFilter {
    threshold: f64,
}

impl ConfidenceFilter {
    pub fn new(threshold: f64) -> Self {
        Self { threshold }
    }

    /// Never rejects the frame itself, only individual detections
    pub fn apply(&self, mut metadata: IndoorMetadata) -> IndoorMetadata {
        let text_before = metadata.text_detected.len();
        let landmarks_before = metadata.landmarks.len();

        metadata.text_detected.retain(|t| t.confidence >= self.threshold);
        metadata.landmarks.retain(|l| l.confidence >= self.threshold);

        let text_removed = text_before - metadata.text_detected.len();
        let landmarks_removed = landmarks_before - metadata.landmarks.len();

        if text_removed > 0 {
            debug!(original = text_before, filtered = metadata.text_detected.len(), "Filtered low confidence texts");
            metrics::DETECTIONS_FILTERED
                .with_label_values(&["text"])
                .inc_by(text_removed as u64);
        }
        if landmarks_removed > 0 {
            debug!(original = landmarks_before, filtered = metadata.landmarks.len(), "Filtered low confidence landmarks");
            metrics::DETECTIONS_FILTERED
                .with_label_values(&["landmark"])
                .inc_by(landmarks_removed as u64);
        }

        metadata
    }
}

impl Default for ConfidenceFilter {
    fn default() -> Self {
        Self::new(DEFAULT_CONFIDENCE_THRESHOLD)
    }
}
