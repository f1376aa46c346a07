//! Tests for the Azure Blob Storage client against a mock server

use std::sync::Arc;
use std::time::Duration;

use blob_uploader::config::{ConfigOptions, StorageConfig, UploadConfig, DEFAULT_API_VERSION};
use blob_uploader::storage::{block_list_xml, AzureBlobClient, StorageClient};
use blob_uploader::upload::{MemorySource, ProgressEvent, UploadCoordinator, UploadObject};
use blob_uploader::UploadError;
use bytes::Bytes;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{
    body_string, header, header_exists, method, path, path_regex, query_param,
};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn client_for(server: &MockServer) -> AzureBlobClient {
    let config = StorageConfig::new(&server.uri(), "uploads", "sv=2021-08-06&sig=secret").unwrap();
    AzureBlobClient::new(config).unwrap()
}

#[tokio::test]
async fn test_put_block_request_shape() {
    let server = MockServer::start().await;
    Mock::given(method("PUT"))
        .and(path("/uploads/1-video.mp4"))
        .and(query_param("comp", "block"))
        .and(query_param("blockid", "YmxvY2swMDAwMDA="))
        .and(query_param("sig", "secret"))
        .and(header("x-ms-blob-type", "BlockBlob"))
        .and(header("Content-Type", "application/octet-stream"))
        .and(header("Cache-Control", "no-cache"))
        .and(header("x-ms-version", DEFAULT_API_VERSION))
        .and(header_exists("x-ms-client-request-id"))
        .and(body_string("block bytes"))
        .respond_with(ResponseTemplate::new(201))
        .expect(1)
        .mount(&server)
        .await;

    let result = client_for(&server)
        .put_block(
            "1-video.mp4",
            "block000000",
            Bytes::from_static(b"block bytes"),
            &CancellationToken::new(),
        )
        .await;

    assert_eq!(result, Ok(()));
}

#[tokio::test]
async fn test_commit_block_list_sends_ordered_xml() {
    let server = MockServer::start().await;
    let ids = vec![
        "block000000".to_string(),
        "block000001".to_string(),
        "block000002".to_string(),
    ];

    Mock::given(method("PUT"))
        .and(path("/uploads/1-video.mp4"))
        .and(query_param("comp", "blocklist"))
        .and(header("Content-Type", "application/xml"))
        .and(header("x-ms-blob-content-type", "video/mp4"))
        .and(body_string(block_list_xml(&ids)))
        .respond_with(ResponseTemplate::new(201))
        .expect(1)
        .mount(&server)
        .await;

    let result = client_for(&server)
        .commit_block_list("1-video.mp4", &ids, "video/mp4", &CancellationToken::new())
        .await;

    assert_eq!(result, Ok(()));
}

#[tokio::test]
async fn test_put_object_requires_created() {
    let server = MockServer::start().await;
    Mock::given(method("PUT"))
        .and(path("/uploads/1-notes.txt"))
        .and(header("x-ms-blob-type", "BlockBlob"))
        .and(header("Content-Type", "text/plain"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let result = client_for(&server)
        .put_object(
            "1-notes.txt",
            Bytes::from_static(b"hello"),
            "text/plain",
            mpsc::unbounded_channel().0,
            &CancellationToken::new(),
        )
        .await;

    assert_eq!(result, Err(UploadError::http_status(200)));
}

#[tokio::test]
async fn test_put_object_created() {
    let server = MockServer::start().await;
    Mock::given(method("PUT"))
        .and(path("/uploads/1-notes.txt"))
        .respond_with(ResponseTemplate::new(201))
        .expect(1)
        .mount(&server)
        .await;

    let result = client_for(&server)
        .put_object(
            "1-notes.txt",
            Bytes::from_static(b"hello"),
            "text/plain",
            mpsc::unbounded_channel().0,
            &CancellationToken::new(),
        )
        .await;

    assert_eq!(result, Ok(()));
}

#[tokio::test]
async fn test_put_object_reports_body_progress() {
    let server = MockServer::start().await;
    let size = 600 * 1024;
    Mock::given(method("PUT"))
        .and(path("/uploads/1-big.bin"))
        .and(header("Content-Length", size.to_string().as_str()))
        .respond_with(ResponseTemplate::new(201))
        .expect(1)
        .mount(&server)
        .await;

    let (tx, mut rx) = mpsc::unbounded_channel();
    let result = client_for(&server)
        .put_object(
            "1-big.bin",
            Bytes::from(vec![1u8; size]),
            "application/octet-stream",
            tx,
            &CancellationToken::new(),
        )
        .await;
    assert_eq!(result, Ok(()));

    let mut reports = Vec::new();
    while let Ok(sent) = rx.try_recv() {
        reports.push(sent);
    }
    assert!(reports.len() > 1);
    assert_eq!(reports.iter().sum::<u64>(), size as u64);
}

#[tokio::test]
async fn test_server_error_maps_to_transport() {
    let server = MockServer::start().await;
    Mock::given(method("PUT"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let err = client_for(&server)
        .put_block(
            "1-a.bin",
            "block000003",
            Bytes::from_static(b"x"),
            &CancellationToken::new(),
        )
        .await
        .unwrap_err();

    assert_eq!(err.to_string(), "HTTP Error: 503");
    assert!(matches!(
        err,
        UploadError::Transport {
            status: Some(503),
            ..
        }
    ));
}

#[tokio::test]
async fn test_connection_failure_is_network_error() {
    // Nothing listens on port 1
    let config = StorageConfig::new("http://127.0.0.1:1", "uploads", "sig=x").unwrap();
    let client = AzureBlobClient::new(config).unwrap();

    let err = client
        .put_block(
            "1-a.bin",
            "block000000",
            Bytes::from_static(b"x"),
            &CancellationToken::new(),
        )
        .await
        .unwrap_err();

    match err {
        UploadError::Transport { message, status } => {
            assert!(message.starts_with("Network error"));
            assert_eq!(status, None);
        }
        other => panic!("expected transport error, got {:?}", other),
    }
}

#[tokio::test]
async fn test_cancellation_aborts_in_flight_request() {
    let server = MockServer::start().await;
    Mock::given(method("PUT"))
        .respond_with(ResponseTemplate::new(201).set_delay(Duration::from_secs(30)))
        .mount(&server)
        .await;

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        trigger.cancel();
    });

    let started = std::time::Instant::now();
    let result = client_for(&server)
        .put_block("1-a.bin", "block000000", Bytes::from_static(b"x"), &cancel)
        .await;

    assert_eq!(result, Err(UploadError::Cancelled));
    assert!(started.elapsed() < Duration::from_secs(5));
}

#[tokio::test]
async fn test_coordinator_chunked_upload_end_to_end() {
    let server = MockServer::start().await;
    Mock::given(method("PUT"))
        .and(path_regex(r"^/uploads/\d+-data\.bin$"))
        .and(query_param("comp", "block"))
        .respond_with(ResponseTemplate::new(201))
        .expect(3)
        .mount(&server)
        .await;
    Mock::given(method("PUT"))
        .and(path_regex(r"^/uploads/\d+-data\.bin$"))
        .and(query_param("comp", "blocklist"))
        .and(header("x-ms-blob-content-type", "application/octet-stream"))
        .and(body_string(block_list_xml(&[
            "block000000".to_string(),
            "block000001".to_string(),
            "block000002".to_string(),
        ])))
        .respond_with(ResponseTemplate::new(201))
        .expect(1)
        .mount(&server)
        .await;

    let config = UploadConfig::new(ConfigOptions {
        block_size: Some(4),
        min_block_size: Some(4),
        max_block_size: Some(8),
        chunking_threshold: Some(8),
        ..ConfigOptions::default()
    })
    .unwrap();
    let coordinator = UploadCoordinator::new(Arc::new(client_for(&server)), config);
    let object = UploadObject::new(
        "data.bin",
        "application/octet-stream",
        MemorySource::new(&b"0123456789"[..]),
    );

    let (tx, mut rx) = mpsc::unbounded_channel();
    let summary = coordinator.start(object, tx).await.unwrap();

    assert_eq!(summary.block_count, 3);
    assert_eq!(summary.object_size, 10);

    let mut events = Vec::new();
    while let Some(event) = rx.recv().await {
        events.push(event);
    }
    assert_eq!(events.last(), Some(&ProgressEvent::completed()));
}
