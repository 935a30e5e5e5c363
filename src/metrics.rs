use lazy_static::lazy_static;
use prometheus::{
    Histogram, HistogramOpts, IntCounter, IntCounterVec, IntGauge, Opts, Registry,
};
use std::sync::Once;
use std::time::Instant;

lazy_static! {
    pub static ref REGISTRY: Registry = Registry::new();

    // Frame outcomes: valid, repaired, fallback, failed
    pub static ref FRAMES_PROCESSED: IntCounterVec = IntCounterVec::new(
        Opts::new("frames_processed_total", "Total number of frames processed by outcome"),
        &["outcome"]
    ).unwrap();

    // Vision service calls
    pub static ref EXTRACT_ATTEMPTS: IntCounter = IntCounter::new(
        "extract_attempts_total",
        "Total number of calls made to the vision service"
    ).unwrap();

    pub static ref EXTRACT_RETRIES: IntCounter = IntCounter::new(
        "extract_retries_total",
        "Total number of retried vision service calls"
    ).unwrap();

    pub static ref EXTRACT_LATENCY: Histogram = Histogram::with_opts(
        HistogramOpts::new(
            "extract_duration_seconds",
            "Vision service call latency in seconds"
        )
        .buckets(vec![0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0])
    ).unwrap();

    // Post-processing
    pub static ref DETECTIONS_FILTERED: IntCounterVec = IntCounterVec::new(
        Opts::new("detections_filtered_total", "Detections removed by the confidence filter"),
        &["kind"]
    ).unwrap();

    // Batch processing
    pub static ref BATCH_FRAMES_IN_FLIGHT: IntGauge = IntGauge::new(
        "batch_frames_in_flight",
        "Current number of batch frames holding a concurrency slot"
    ).unwrap();
}

static INIT: Once = Once::new();

/// Register all collectors. Safe to call more than once.
pub fn init_metrics() {
    INIT.call_once(|| {
        REGISTRY.register(Box::new(FRAMES_PROCESSED.clone())).unwrap();
        REGISTRY.register(Box::new(EXTRACT_ATTEMPTS.clone())).unwrap();
        REGISTRY.register(Box::new(EXTRACT_RETRIES.clone())).unwrap();
        REGISTRY.register(Box::new(EXTRACT_LATENCY.clone())).unwrap();
        REGISTRY.register(Box::new(DETECTIONS_FILTERED.clone())).unwrap();
        REGISTRY.register(Box::new(BATCH_FRAMES_IN_FLIGHT.clone())).unwrap();

        tracing::info!("Metrics registry initialized with {} collectors", REGISTRY.gather().len());
    });
}

pub fn record_outcome(outcome: &str) {
    FRAMES_PROCESSED.with_label_values(&[outcome]).inc();
}

/// Helper struct for timing operations
pub struct Timer {
    start: Instant,
}

impl Timer {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    pub fn observe_duration_seconds(&self, histogram: &Histogram) {
        histogram.observe(self.start.elapsed().as_secs_f64());
    }
}

impl Default for Timer {
    fn default() -> Self {
        Self::new()
    }
}

/// Export metrics in Prometheus format
pub fn export_metrics() -> String {
    use prometheus::Encoder;
    let encoder = prometheus::TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        tracing::error!("Failed to encode metrics: {}", e);
        return String::new();
    }
    String::from_utf8(buffer).unwrap_or_default()
}
