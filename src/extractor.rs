//! Extraction orchestrator
//!
//! Turns raw frame bytes into an [`IndoorMetadata`] value:
//!
//! ```text
//! frame ──▶ VisionClient::extract ──▶ schema::check ──▶ ConfidenceFilter ──▶ caller
//!               │  transport error          │ unrecoverable
//!               ▼                           ▼
//!         linear backoff retry        fallback result
//! ```
//!
//! Transport failures are retried. Schema failures are deterministic for a
//! given response and are resolved locally by repair or fallback.

use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::{error, info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::client::VisionClient;
use crate::config::ExtractorConfig;
use crate::error::{describe_issues, ExtractionError};
use crate::filter::ConfidenceFilter;
use crate::metrics;
use crate::models::IndoorMetadata;
use crate::retry::{RetryExecutor, RetryPolicy};
use crate::schema::{self, SchemaOutcome};

pub const DEFAULT_BATCH_CONCURRENCY: usize = 5;

/// Extracts structured metadata from camera frames.
///
/// Cheap to clone; clones share the underlying vision client.
#[derive(Clone)]
pub struct MetadataExtractor {
    client: Arc<dyn VisionClient>,
    config: ExtractorConfig,
    filter: ConfidenceFilter,
}

impl MetadataExtractor {
    pub fn new(client: Arc<dyn VisionClient>, config: ExtractorConfig) -> Self {
        if let Err(e) = config.validate() {
            warn!("Extractor configured with {}; values will be clamped", e);
        }

        let config = config.clamped();

        Self {
            client,
            filter: ConfidenceFilter::new(config.confidence_threshold),
            config,
        }
    }

    pub fn config(&self) -> &ExtractorConfig {
        &self.config
    }

    /// Process one frame, retrying transport failures
    pub async fn process_frame(&self, frame: &[u8]) -> Result<IndoorMetadata, ExtractionError> {
        self.process_frame_with(frame, true).await
    }

    /// Process one frame. With `retry_on_failure` false the first transport
    /// failure is terminal.
    pub async fn process_frame_with(
        &self,
        frame: &[u8],
        retry_on_failure: bool,
    ) -> Result<IndoorMetadata, ExtractionError> {
        let frame_id = Uuid::new_v4();
        let span = info_span!("process_frame", %frame_id, bytes = frame.len());

        async move {
            let policy = RetryPolicy::linear(self.config.max_retries, self.config.retry_delay())
                .with_retries(retry_on_failure);

            let raw = RetryExecutor::new(policy)
                .execute(|_attempt| {
                    metrics::EXTRACT_ATTEMPTS.inc();
                    self.client.extract(frame)
                })
                .await
                .inspect_err(|_| metrics::record_outcome("failed"))?;

            Ok(self.finish(&raw))
        }
        .instrument(span)
        .await
    }

    /// Validate, repair or replace a raw result, then filter it
    fn finish(&self, raw: &serde_json::Value) -> IndoorMetadata {
        match schema::check(raw) {
            SchemaOutcome::Valid(metadata) => {
                metrics::record_outcome("valid");
                let metadata = self.filter.apply(metadata);
                info!(
                    scene_type = ?metadata.scene_type,
                    landmarks_count = metadata.landmarks.len(),
                    text_count = metadata.text_detected.len(),
                    frame_quality = metadata.frame_quality_score,
                    "Frame processed successfully"
                );
                metadata
            }
            SchemaOutcome::Repaired { metadata, issues } => {
                metrics::record_outcome("repaired");
                warn!(issues = %describe_issues(&issues), "Frame result repaired");
                let metadata = self.filter.apply(metadata);
                info!(
                    scene_type = ?metadata.scene_type,
                    landmarks_count = metadata.landmarks.len(),
                    text_count = metadata.text_detected.len(),
                    "Frame processed after repair"
                );
                metadata
            }
            SchemaOutcome::Unrecoverable { issues } => {
                metrics::record_outcome("fallback");
                let reason = format!("Validation failed: {}", describe_issues(&issues));
                warn!(error = %reason, "Creating fallback metadata");
                IndoorMetadata::fallback(reason)
            }
        }
    }

    /// Process frames concurrently with at most `max_concurrent` in flight.
    ///
    /// Returns one result per frame, in input order. A frame that fails
    /// becomes a fallback result; the batch itself never fails.
    pub async fn process_frame_batch(
        &self,
        frames: Vec<Vec<u8>>,
        max_concurrent: usize,
    ) -> Vec<IndoorMetadata> {
        let batch_size = frames.len();
        let max_concurrent = max_concurrent.max(1);
        tracing::debug!("Processing batch of {} frames with max_concurrent={}", batch_size, max_concurrent);

        let semaphore = Arc::new(Semaphore::new(max_concurrent));
        let mut handles = Vec::with_capacity(batch_size);

        for frame in frames {
            let extractor = self.clone();
            let semaphore = Arc::clone(&semaphore);

            let handle = tokio::spawn(async move {
                // Held for the whole frame, backoff sleeps included
                let _permit = semaphore
                    .acquire()
                    .await
                    .map_err(|e| anyhow::anyhow!("Semaphore acquire failed: {}", e))?;
                let _in_flight = InFlightGuard::new();

                let metadata = extractor.process_frame(&frame).await?;
                Ok::<_, anyhow::Error>(metadata)
            });

            handles.push(handle);
        }

        let mut results = Vec::with_capacity(batch_size);
        for (frame_index, handle) in handles.into_iter().enumerate() {
            let failure = match handle.await {
                Ok(Ok(metadata)) => {
                    results.push(metadata);
                    continue;
                }
                Ok(Err(e)) => e.to_string(),
                Err(e) => format!("Task join error: {}", e),
            };

            error!(frame_index, error = %failure, "Batch frame processing failed");
            results.push(IndoorMetadata::fallback(format!("Batch processing error: {}", failure)));
        }

        tracing::debug!("Batch completed {} frames", batch_size);
        results
    }

    pub async fn close(&self) {
        self.client.close().await;
    }
}

/// Tracks batch frames holding a slot; released on drop
struct InFlightGuard;

impl InFlightGuard {
    fn new() -> Self {
        metrics::BATCH_FRAMES_IN_FLIGHT.inc();
        Self
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        metrics::BATCH_FRAMES_IN_FLIGHT.dec();
    }
}
