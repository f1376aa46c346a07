//! Azure Blob Storage client authenticated with a SAS token

use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Result;
use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use bytes::Bytes;
use futures::StreamExt;
use reqwest::{Body, Client, StatusCode, Url};
use tokio::sync::mpsc::UnboundedSender;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use uuid::Uuid;

use super::StorageClient;
use crate::config::StorageConfig;
use crate::error::{UploadError, UploadResult};
use crate::http_logger::{self, HttpResponseLog};

const BLOB_TYPE_BLOCK: &str = "BlockBlob";
const OCTET_STREAM: &str = "application/octet-stream";
/// Piece size of a streamed single-request body
const BODY_PIECE_SIZE: usize = 256 * 1024;

/// Block ids travel base64-encoded; all ids of one blob share the same length
pub fn encode_block_id(block_id: &str) -> String {
    STANDARD.encode(block_id.as_bytes())
}

/// Block list body for a commit, blocks in the given order
pub fn block_list_xml(block_ids: &[String]) -> String {
    let mut xml = String::from(r#"<?xml version="1.0" encoding="utf-8"?><BlockList>"#);
    for id in block_ids {
        xml.push_str("<Latest>");
        xml.push_str(&encode_block_id(id));
        xml.push_str("</Latest>");
    }
    xml.push_str("</BlockList>");
    xml
}

/// Split `data` into consecutive pieces of at most `piece_size` bytes
fn body_pieces(data: &Bytes, piece_size: usize) -> Vec<Bytes> {
    let mut pieces = Vec::with_capacity(data.len().div_ceil(piece_size));
    let mut offset = 0;
    while offset < data.len() {
        let end = (offset + piece_size).min(data.len());
        pieces.push(data.slice(offset..end));
        offset = end;
    }
    pieces
}

/// Streamed body that reports each piece on `progress` as the transport pulls it
fn progress_body(data: &Bytes, progress: UnboundedSender<u64>) -> Body {
    let pieces = futures::stream::iter(body_pieces(data, BODY_PIECE_SIZE)).map(move |piece| {
        let _ = progress.send(piece.len() as u64);
        Ok::<_, std::io::Error>(piece)
    });
    Body::wrap_stream(pieces)
}

/// Success predicate for a response status
type Accept = fn(StatusCode) -> bool;

fn is_success(status: StatusCode) -> bool {
    status.is_success()
}

fn is_created(status: StatusCode) -> bool {
    status == StatusCode::CREATED
}

/// One outgoing PUT, prepared but not yet sent
struct PutRequest {
    url: Url,
    headers: Vec<(&'static str, String)>,
    body: Body,
    /// Body as written to the HTTP log
    log_body: String,
    accept: Accept,
}

pub struct AzureBlobClient {
    config: Arc<StorageConfig>,
    client: Client,
}

impl AzureBlobClient {
    pub fn new(config: Arc<StorageConfig>) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()?;
        Ok(Self { config, client })
    }

    /// Blob URL with the SAS query attached
    pub fn blob_url(&self, blob: &str) -> UploadResult<Url> {
        let mut url = Url::parse(&self.config.container_url).map_err(|e| {
            UploadError::InvalidConfig {
                message: format!("invalid container URL {}: {}", self.config.container_url, e),
            }
        })?;
        url.path_segments_mut()
            .map_err(|_| UploadError::InvalidConfig {
                message: format!("container URL cannot hold a path: {}", self.config.container_url),
            })?
            .push(blob);
        url.set_query(Some(self.config.sas_token.trim_start_matches('?')));
        Ok(url)
    }

    async fn send(&self, request: PutRequest, cancel: &CancellationToken) -> UploadResult<()> {
        if cancel.is_cancelled() {
            return Err(UploadError::Cancelled);
        }

        let request_id = Uuid::new_v4().to_string();
        let mut headers = vec![
            ("x-ms-version", self.config.api_version.clone()),
            ("x-ms-client-request-id", request_id),
        ];
        headers.extend(request.headers);

        let mut builder = self.client.put(request.url.clone());
        for (name, value) in &headers {
            builder = builder.header(*name, value.as_str());
        }
        builder = builder.body(request.body);

        let header_refs: Vec<(&str, &str)> = headers
            .iter()
            .map(|(name, value)| (*name, value.as_str()))
            .collect();
        let request_log = http_logger::build_request_log_if_enabled(
            "PUT",
            request.url.as_str(),
            &header_refs,
            Some(request.log_body),
        );

        let started = Instant::now();
        let result = tokio::select! {
            _ = cancel.cancelled() => {
                debug!("PUT {} aborted by cancellation", request.url.path());
                return Err(UploadError::Cancelled);
            }
            result = builder.send() => result,
        };
        let duration_ms = started.elapsed().as_millis() as u64;

        match result {
            Ok(response) => {
                let status = response.status();
                if let Some(log) = &request_log {
                    let response_log = HttpResponseLog {
                        status: status.as_u16(),
                        headers: http_logger::extract_response_headers(&response),
                        body: None,
                    };
                    http_logger::log_request(log, Some(&response_log), duration_ms, None);
                }

                if (request.accept)(status) {
                    debug!(
                        "PUT {} -> {} in {}ms",
                        request.url.path(),
                        status.as_u16(),
                        duration_ms
                    );
                    Ok(())
                } else {
                    Err(UploadError::http_status(status.as_u16()))
                }
            }
            Err(e) => {
                if let Some(log) = &request_log {
                    http_logger::log_request(log, None, duration_ms, Some(&e.to_string()));
                }
                Err(UploadError::from(e))
            }
        }
    }
}

#[async_trait]
impl StorageClient for AzureBlobClient {
    async fn put_block(
        &self,
        blob: &str,
        block_id: &str,
        data: Bytes,
        cancel: &CancellationToken,
    ) -> UploadResult<()> {
        let mut url = self.blob_url(blob)?;
        url.query_pairs_mut()
            .append_pair("comp", "block")
            .append_pair("blockid", &encode_block_id(block_id));

        let log_body = format!("<{} bytes>", data.len());
        let request = PutRequest {
            url,
            headers: vec![
                ("x-ms-blob-type", BLOB_TYPE_BLOCK.to_string()),
                ("Content-Type", OCTET_STREAM.to_string()),
                ("Cache-Control", "no-cache".to_string()),
            ],
            body: Body::from(data),
            log_body,
            accept: is_success,
        };
        self.send(request, cancel).await
    }

    async fn commit_block_list(
        &self,
        blob: &str,
        block_ids: &[String],
        content_type: &str,
        cancel: &CancellationToken,
    ) -> UploadResult<()> {
        let mut url = self.blob_url(blob)?;
        url.query_pairs_mut().append_pair("comp", "blocklist");

        let xml = block_list_xml(block_ids);
        let request = PutRequest {
            url,
            headers: vec![
                ("Content-Type", "application/xml".to_string()),
                ("x-ms-blob-content-type", content_type.to_string()),
            ],
            body: Body::from(xml.clone()),
            log_body: xml,
            accept: is_success,
        };
        self.send(request, cancel).await
    }

    async fn put_object(
        &self,
        blob: &str,
        data: Bytes,
        content_type: &str,
        progress: UnboundedSender<u64>,
        cancel: &CancellationToken,
    ) -> UploadResult<()> {
        let url = self.blob_url(blob)?;
        let log_body = format!("<{} bytes>", data.len());
        let request = PutRequest {
            url,
            headers: vec![
                ("x-ms-blob-type", BLOB_TYPE_BLOCK.to_string()),
                ("Content-Type", content_type.to_string()),
                // Streamed bodies would otherwise go out chunked, which Put Blob rejects
                ("Content-Length", data.len().to_string()),
            ],
            body: progress_body(&data, progress),
            log_body,
            accept: is_created,
        };
        self.send(request, cancel).await
    }
}
