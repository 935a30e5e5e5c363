use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::env;
use std::time::Duration;

use crate::error::ConfigError;
use crate::filter::DEFAULT_CONFIDENCE_THRESHOLD;

pub const DEFAULT_API_URL: &str = "https://cluster1.overshoot.ai/api/v0.2";

/// Longest base delay a retry policy will use, in seconds
pub const MAX_RETRY_DELAY_SECS: f64 = 3600.0;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub vision: VisionServiceConfig,
    pub extractor: ExtractorConfig,
    pub batch_max_concurrent: usize,
}

/// Connection settings for the external vision service
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VisionServiceConfig {
    pub api_url: String,
    pub api_key: String,
    pub timeout_secs: u64,
}

impl VisionServiceConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for VisionServiceConfig {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_API_URL.to_string(),
            api_key: String::new(),
            timeout_secs: 30,
        }
    }
}

/// Read-only settings for a `MetadataExtractor`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ExtractorConfig {
    /// Total number of vision service calls allowed per frame
    pub max_retries: u32,
    /// Base delay for linear backoff, in seconds
    pub retry_delay_secs: f64,
    pub confidence_threshold: f64,
}

impl ExtractorConfig {
    /// Base backoff delay. Non-finite or negative values give zero and large
    /// values are capped at [`MAX_RETRY_DELAY_SECS`].
    pub fn retry_delay(&self) -> Duration {
        if !self.retry_delay_secs.is_finite() {
            return Duration::ZERO;
        }
        Duration::try_from_secs_f64(self.retry_delay_secs.min(MAX_RETRY_DELAY_SECS))
            .unwrap_or(Duration::ZERO)
    }

    /// Force every field into its usable range
    pub fn clamped(self) -> Self {
        let retry_delay_secs = if self.retry_delay_secs.is_finite() {
            self.retry_delay_secs.clamp(0.0, MAX_RETRY_DELAY_SECS)
        } else {
            0.0
        };
        let confidence_threshold = if self.confidence_threshold.is_nan() {
            DEFAULT_CONFIDENCE_THRESHOLD
        } else {
            self.confidence_threshold.clamp(0.0, 1.0)
        };

        Self {
            max_retries: self.max_retries.max(1),
            retry_delay_secs,
            confidence_threshold,
        }
    }

    pub fn validate(&self) -> std::result::Result<(), ConfigError> {
        if self.max_retries == 0 {
            return Err(ConfigError::InvalidValue {
                field: "max_retries",
                reason: "must be at least 1".to_string(),
            });
        }
        if !self.retry_delay_secs.is_finite() || self.retry_delay_secs < 0.0 {
            return Err(ConfigError::InvalidValue {
                field: "retry_delay_secs",
                reason: format!("{} is not a non-negative number of seconds", self.retry_delay_secs),
            });
        }
        if !(0.0..=1.0).contains(&self.confidence_threshold) {
            return Err(ConfigError::InvalidValue {
                field: "confidence_threshold",
                reason: format!("{} is outside [0, 1]", self.confidence_threshold),
            });
        }
        Ok(())
    }
}

impl Default for ExtractorConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            retry_delay_secs: 1.0,
            confidence_threshold: DEFAULT_CONFIDENCE_THRESHOLD,
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        let api_url = env::var("VISION_API_URL").unwrap_or_else(|_| DEFAULT_API_URL.to_string());
        let api_key = env::var("VISION_API_KEY").unwrap_or_default();

        let timeout_secs = env::var("VISION_TIMEOUT_SECS")
            .unwrap_or_else(|_| "30".to_string())
            .parse()
            .unwrap_or(30);

        // Processing configuration
        let max_retries = env::var("MAX_RETRIES")
            .unwrap_or_else(|_| "3".to_string())
            .parse()
            .unwrap_or(3);

        let retry_delay_secs = env::var("RETRY_DELAY_SECS")
            .unwrap_or_else(|_| "1.0".to_string())
            .parse()
            .unwrap_or(1.0);

        let confidence_threshold = env::var("CONFIDENCE_THRESHOLD")
            .unwrap_or_else(|_| DEFAULT_CONFIDENCE_THRESHOLD.to_string())
            .parse()
            .unwrap_or(DEFAULT_CONFIDENCE_THRESHOLD);

        let batch_max_concurrent = env::var("BATCH_MAX_CONCURRENT")
            .unwrap_or_else(|_| "5".to_string())
            .parse()
            .unwrap_or(5);

        let extractor = ExtractorConfig {
            max_retries,
            retry_delay_secs,
            confidence_threshold,
        };
        extractor.validate()?;

        Ok(Self {
            vision: VisionServiceConfig {
                api_url,
                api_key,
                timeout_secs,
            },
            extractor,
            batch_max_concurrent,
        })
    }
}
