//! Vision service client
//!
//! [`VisionClient`] is the seam between the extractor and the external vision
//! model. Implementations return the service's JSON as-is; the extractor never
//! trusts it and routes it through [`crate::schema::check`].

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use base64::{engine::general_purpose, Engine as _};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use serde::Serialize;
use serde_json::Value;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tracing::{debug, info};

use crate::config::VisionServiceConfig;
use crate::error::VisionError;
use crate::metrics::{self, Timer};

/// Longest error body kept in a `VisionError::Status`
const MAX_ERROR_BODY: usize = 512;

#[async_trait]
pub trait VisionClient: Send + Sync {
    /// Send one frame and return the raw, unvalidated result
    async fn extract(&self, frame: &[u8]) -> Result<Value, VisionError>;

    /// Release resources. Further `extract` calls may fail.
    async fn close(&self) {}
}

pub const EXTRACTION_PROMPT: &str = r#"You are the perception layer of an indoor navigation system. Describe only what is directly visible in this smartphone camera frame. Do not infer the user's location and do not assume any floor plan. Report only navigation-relevant observations and reply with a single JSON object and nothing else.

Report:
1. scene_type: one of hallway, room, lobby, stairwell, elevator_area, corridor_intersection, entrance, unknown; with scene_confidence between 0.0 and 1.0.
2. text_detected: navigation text only (room and suite numbers, floor indicators, directional signs, wing names, exit signs). Ignore posters, advertisements and notices. Each item has text (exactly as shown), confidence, and includes_arrow (true when the text contains an arrow).
3. landmarks: each with type (door, staircase, stairs_up, stairs_down, elevator, exit_sign, fire_extinguisher, room_number_plaque, elevator_button_panel, emergency_exit_door, restroom_sign, water_fountain, floor_directory, hallway_intersection, corridor_junction), direction (left, right, ahead, behind), distance (very_close under 5 feet, near 5-10 feet, mid 10-20 feet, far over 20 feet), confidence, and optional additional_info such as door state or junction shape.
4. relative_position_cues: short sentences such as "Exit sign approximately 15 feet ahead".
5. lighting_quality (good, dim, poor, backlit), motion_blur_detected (true/false) and frame_quality_score between 0.0 and 1.0.

When the frame is blurred or text is partial, still report what is legible and lower the confidence.

Example:
{"scene_type":"hallway","scene_confidence":0.94,"text_detected":[{"text":"Floor 3","confidence":0.92,"includes_arrow":false}],"landmarks":[{"type":"exit_sign","direction":"ahead","distance":"mid","confidence":0.91,"additional_info":"illuminated"}],"relative_position_cues":["Exit sign approximately 15 feet ahead"],"lighting_quality":"good","motion_blur_detected":false,"frame_quality_score":0.89,"processing_notes":null}"#;

#[derive(Debug, Serialize)]
struct ExtractionRequest<'a> {
    prompt: &'a str,
    frames: Vec<FramePayload>,
    clip_length_seconds: f64,
    delay_seconds: f64,
    fps: u32,
    sampling_ratio: f64,
}

#[derive(Debug, Serialize)]
struct FramePayload {
    data: String,
    timestamp: f64,
}

/// HTTP client for a single configured vision endpoint
pub struct HttpVisionClient {
    client: reqwest::Client,
    endpoint: String,
    timeout: Duration,
    closed: AtomicBool,
}

impl HttpVisionClient {
    pub fn new(config: &VisionServiceConfig) -> Result<Self> {
        let endpoint = config.api_url.trim_end_matches('/').to_string();
        if !endpoint.starts_with("http://") && !endpoint.starts_with("https://") {
            return Err(anyhow!(
                "Invalid vision API URL: {}. Must be a valid HTTP/HTTPS URL.",
                config.api_url
            ));
        }

        let mut headers = HeaderMap::new();
        if !config.api_key.is_empty() {
            let value = HeaderValue::from_str(&format!("Bearer {}", config.api_key))
                .map_err(|e| anyhow!("Invalid vision API key: {}", e))?;
            headers.insert(AUTHORIZATION, value);
        }

        let client = reqwest::Client::builder()
            .timeout(config.timeout())
            .default_headers(headers)
            .build()
            .map_err(|e| anyhow!("Failed to build HTTP client: {}", e))?;

        info!(api_url = %endpoint, has_api_key = !config.api_key.is_empty(), "Vision client initialized");

        Ok(Self {
            client,
            endpoint,
            timeout: config.timeout(),
            closed: AtomicBool::new(false),
        })
    }

    fn classify(&self, err: reqwest::Error) -> VisionError {
        if err.is_timeout() {
            VisionError::Timeout(self.timeout.as_millis() as u64)
        } else {
            VisionError::from(err)
        }
    }
}

#[async_trait]
impl VisionClient for HttpVisionClient {
    async fn extract(&self, frame: &[u8]) -> Result<Value, VisionError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(VisionError::Closed);
        }

        let payload = build_request(frame);
        debug!(endpoint = %self.endpoint, image_size_kb = frame.len() / 1024, "Sending frame to vision service");

        // Failed sends are timed too
        let timer = Timer::new();
        let sent = self.client.post(&self.endpoint).json(&payload).send().await;
        timer.observe_duration_seconds(&metrics::EXTRACT_LATENCY);
        let response = sent.map_err(|e| self.classify(e))?;

        let status = response.status();
        if !status.is_success() {
            let mut body = response.text().await.unwrap_or_default();
            truncate_utf8(&mut body, MAX_ERROR_BODY);
            return Err(VisionError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| VisionError::InvalidResponse(e.to_string()))?;

        unwrap_payload(body)
    }

    async fn close(&self) {
        self.closed.store(true, Ordering::Release);
        debug!("Vision client closed");
    }
}

fn build_request(frame: &[u8]) -> ExtractionRequest<'static> {
    ExtractionRequest {
        prompt: EXTRACTION_PROMPT,
        frames: vec![FramePayload {
            data: general_purpose::STANDARD.encode(frame),
            timestamp: 0.0,
        }],
        clip_length_seconds: 1.0,
        delay_seconds: 1.0,
        fps: 1,
        sampling_ratio: 1.0,
    }
}

/// Pull the metadata out of the service envelope.
///
/// The metadata may sit under `content`, under `response`, or be the body
/// itself, and may arrive as a JSON-encoded string.
pub fn unwrap_payload(body: Value) -> Result<Value, VisionError> {
    let inner = match body {
        Value::Object(mut obj) => {
            if let Some(content) = obj.remove("content") {
                content
            } else if let Some(response) = obj.remove("response") {
                response
            } else {
                Value::Object(obj)
            }
        }
        other => other,
    };

    match inner {
        Value::String(text) => parse_model_text(&text),
        other => Ok(other),
    }
}

/// Parse JSON emitted as model text, tolerating a markdown code fence
fn parse_model_text(text: &str) -> Result<Value, VisionError> {
    let mut trimmed = text.trim();
    if let Some(rest) = trimmed.strip_prefix("```") {
        let rest = rest.trim_start_matches("json");
        trimmed = rest.strip_suffix("```").unwrap_or(rest).trim();
    }

    serde_json::from_str(trimmed)
        .map_err(|e| VisionError::InvalidResponse(format!("vision service returned invalid JSON: {}", e)))
}

fn truncate_utf8(s: &mut String, max: usize) {
    if s.len() <= max {
        return;
    }
    let mut end = max;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    s.truncate(end);
}
