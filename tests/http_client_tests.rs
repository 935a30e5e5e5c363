//! Tests for HttpVisionClient against a local one-shot HTTP server

use indoor_perception::{
    metrics, ExtractorConfig, HttpVisionClient, MetadataExtractor, SceneType, VisionClient, VisionError,
    VisionServiceConfig,
};
use serde_json::json;
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;
use tokio::time::Duration;

/// Serve a single response and hand back the raw request text
async fn serve_once(status_line: &'static str, body: String) -> (String, JoinHandle<String>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let handle = tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        let request = read_request(&mut socket).await;

        let response = format!(
            "HTTP/1.1 {}\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{}",
            status_line,
            body.len(),
            body
        );
        socket.write_all(response.as_bytes()).await.unwrap();
        let _ = socket.shutdown().await;
        request
    });

    (format!("http://{}", addr), handle)
}

async fn read_request(socket: &mut TcpStream) -> String {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];

    loop {
        let n = socket.read(&mut chunk).await.unwrap();
        if n == 0 {
            break;
        }
        buf.extend_from_slice(&chunk[..n]);

        if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
            let headers = String::from_utf8_lossy(&buf[..pos]).to_lowercase();
            let content_length = headers
                .lines()
                .find_map(|line| line.strip_prefix("content-length:"))
                .map(|v| v.trim().parse::<usize>().unwrap())
                .unwrap_or(0);
            if buf.len() >= pos + 4 + content_length {
                break;
            }
        }
    }

    String::from_utf8_lossy(&buf).to_string()
}

fn service_config(api_url: String) -> VisionServiceConfig {
    VisionServiceConfig {
        api_url,
        api_key: "test-key".to_string(),
        timeout_secs: 5,
    }
}

#[tokio::test]
async fn test_extract_posts_frame_and_unwraps_content() {
    let metadata = json!({"scene_type": "hallway", "scene_confidence": 0.9, "frame_quality_score": 0.8});
    let body = json!({"content": metadata.to_string()}).to_string();
    let (url, server) = serve_once("200 OK", body).await;

    let client = HttpVisionClient::new(&service_config(format!("{}/analyze", url))).unwrap();
    let result = client.extract(b"abc").await.unwrap();
    let request = server.await.unwrap();

    assert_eq!(result, metadata);

    let lower = request.to_lowercase();
    assert!(lower.starts_with("post /analyze "));
    assert!(lower.contains("authorization: bearer test-key"));
    assert!(request.contains("\"data\":\"YWJj\""));
    assert!(request.contains("\"fps\":1"));
}

#[tokio::test]
async fn test_non_success_status_is_classified() {
    let (url, server) = serve_once("503 Service Unavailable", "{\"error\":\"overloaded\"}".to_string()).await;

    let client = HttpVisionClient::new(&service_config(url)).unwrap();
    let err = client.extract(b"frame").await.unwrap_err();
    server.await.unwrap();

    match err {
        VisionError::Status { status, body } => {
            assert_eq!(status, 503);
            assert!(body.contains("overloaded"));
        }
        other => panic!("unexpected error: {:?}", other),
    }
}

#[tokio::test]
async fn test_undecodable_body_is_invalid_response() {
    let (url, server) = serve_once("200 OK", "<html>gateway</html>".to_string()).await;

    let client = HttpVisionClient::new(&service_config(url)).unwrap();
    let err = client.extract(b"frame").await.unwrap_err();
    server.await.unwrap();

    assert!(matches!(err, VisionError::InvalidResponse(_)));
}

#[tokio::test]
async fn test_slow_service_times_out() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let server = tokio::spawn(async move {
        let (socket, _) = listener.accept().await.unwrap();
        tokio::time::sleep(Duration::from_secs(3)).await;
        drop(socket);
    });

    let client = HttpVisionClient::new(&VisionServiceConfig {
        api_url: format!("http://{}", addr),
        api_key: String::new(),
        timeout_secs: 1,
    })
    .unwrap();

    let observed_before = metrics::EXTRACT_LATENCY.get_sample_count();
    let err = client.extract(b"frame").await.unwrap_err();
    server.abort();

    assert_eq!(err, VisionError::Timeout(1_000));
    // Slow failures still land in the latency histogram
    assert!(metrics::EXTRACT_LATENCY.get_sample_count() > observed_before);
}

#[tokio::test]
async fn test_extractor_over_http() {
    let body = json!({
        "response": {
            "scene_type": "stairwell",
            "scene_confidence": 0.81,
            "text_detected": [{"text": "STAIRS ↑", "confidence": 0.77, "includes_arrow": true}],
            "landmarks": [{"type": "stairs_up", "direction": "ahead", "distance": "near", "confidence": 0.86}],
            "frame_quality_score": 0.74
        }
    })
    .to_string();
    let (url, server) = serve_once("200 OK", body).await;

    let client = Arc::new(HttpVisionClient::new(&service_config(url)).unwrap());
    let extractor = MetadataExtractor::new(client, ExtractorConfig::default());

    let metadata = extractor.process_frame(b"frame").await.unwrap();
    server.await.unwrap();
    extractor.close().await;

    assert_eq!(metadata.scene_type, SceneType::Stairwell);
    assert_eq!(metadata.text_detected[0].text, "STAIRS ↑");
    assert!(metadata.text_detected[0].includes_arrow);
    assert_eq!(metadata.landmarks.len(), 1);
}
