use anyhow::{anyhow, Result};
use std::sync::Arc;

use indoor_perception::{metrics, Config, HttpVisionClient, MetadataExtractor};

const USAGE: &str = "usage: indoor-perception [--metrics] <image>...";

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let mut print_metrics = false;
    let mut paths = Vec::new();
    for arg in std::env::args().skip(1) {
        match arg.as_str() {
            "--metrics" => print_metrics = true,
            "-h" | "--help" => {
                println!("{}", USAGE);
                return Ok(());
            }
            _ => paths.push(arg),
        }
    }
    if paths.is_empty() {
        return Err(anyhow!(USAGE));
    }

    let config = Config::load()?;
    metrics::init_metrics();

    let client = Arc::new(HttpVisionClient::new(&config.vision)?);
    let extractor = MetadataExtractor::new(client, config.extractor);
    tracing::info!(
        frames = paths.len(),
        max_retries = config.extractor.max_retries,
        confidence_threshold = config.extractor.confidence_threshold,
        "Starting metadata extraction"
    );

    let mut frames = Vec::with_capacity(paths.len());
    for path in &paths {
        let bytes = tokio::fs::read(path)
            .await
            .map_err(|e| anyhow!("Failed to read {}: {}", path, e))?;
        frames.push(bytes);
    }

    let output = if frames.len() == 1 {
        let metadata = extractor.process_frame(&frames[0]).await;
        extractor.close().await;
        serde_json::to_string_pretty(&metadata?)?
    } else {
        let results = extractor
            .process_frame_batch(frames, config.batch_max_concurrent)
            .await;
        extractor.close().await;
        serde_json::to_string_pretty(&results)?
    };

    println!("{}", output);

    if print_metrics {
        eprintln!("{}", metrics::export_metrics());
    }

    Ok(())
}
