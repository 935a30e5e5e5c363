pub mod client;
pub mod config;
pub mod error;
pub mod extractor;
pub mod filter;
pub mod metrics;
pub mod models;
pub mod raw;
pub mod retry;
pub mod schema;

// Re-export commonly used types for easier testing
pub use crate::client::{HttpVisionClient, VisionClient};
pub use crate::config::{Config, ExtractorConfig, VisionServiceConfig};
pub use crate::error::{ConfigError, ExtractionError, SchemaIssue, VisionError};
pub use crate::extractor::MetadataExtractor;
pub use crate::filter::ConfidenceFilter;
pub use crate::models::{
    Direction, Distance, IndoorMetadata, Landmark, LandmarkType, LightingQuality, SceneType,
    TextDetection,
};
pub use crate::schema::SchemaOutcome;
