//! HTTP Request Logger
//!
//! Logs all storage requests to a file when enabled via environment variable.
//! Set `BLOB_UPLOADER_HTTP_LOG=1` or `BLOB_UPLOADER_HTTP_LOG=true` to enable.
//! Block payloads are binary, so request bodies are summarized by size only.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::PathBuf;
use std::sync::{Mutex, OnceLock};

use chrono::Local;
use tracing::warn;

/// Environment variable to control HTTP logging
const ENV_HTTP_LOG: &str = "BLOB_UPLOADER_HTTP_LOG";

/// Directory (relative to the working directory) holding the log file
const LOG_DIR_NAME: &str = ".blob-uploader";

/// Log file name
const LOG_FILE_NAME: &str = "http_requests.log";

/// Maximum textual body size to log (10KB)
const MAX_BODY_SIZE: usize = 10000;

/// Query parameters of a SAS token that grant access and must never be logged.
/// The SAS query is the only credential this client sends.
const SENSITIVE_QUERY_PARAMS: &[&str] = &["sig", "skoid", "sktid"];

/// Global mutex for thread-safe log writing
static LOG_MUTEX: Mutex<()> = Mutex::new(());

/// Check if HTTP logging is enabled
pub fn is_enabled() -> bool {
    static ENABLED: OnceLock<bool> = OnceLock::new();
    *ENABLED.get_or_init(|| {
        std::env::var(ENV_HTTP_LOG)
            .map(|v| {
                let v = v.trim().to_lowercase();
                v == "1" || v == "true" || v == "yes" || v == "on"
            })
            .unwrap_or(false)
    })
}

/// Get log file path, creating the log directory when missing
fn get_log_file_path() -> PathBuf {
    let log_dir = PathBuf::from(LOG_DIR_NAME);
    if !log_dir.exists() {
        if let Err(e) = fs::create_dir_all(&log_dir) {
            warn!("Failed to create {} directory: {}", LOG_DIR_NAME, e);
        }
    }
    log_dir.join(LOG_FILE_NAME)
}

/// HTTP request log entry
pub struct HttpRequestLog {
    pub method: String,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: Option<String>,
}

/// HTTP response log entry
pub struct HttpResponseLog {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Option<String>,
}

/// Log an HTTP request and response
pub fn log_request(
    request: &HttpRequestLog,
    response: Option<&HttpResponseLog>,
    duration_ms: u64,
    error: Option<&str>,
) {
    if !is_enabled() {
        return;
    }

    let log_path = get_log_file_path();
    let log_content = render_entry(request, response, duration_ms, error);

    if let Err(e) = write_log(&log_path, &log_content) {
        warn!("Failed to write HTTP log: {}", e);
    }
}

/// Render one log entry with the SAS signature masked
pub fn render_entry(
    request: &HttpRequestLog,
    response: Option<&HttpResponseLog>,
    duration_ms: u64,
    error: Option<&str>,
) -> String {
    let timestamp = Local::now().format("%Y-%m-%d %H:%M:%S%.3f");
    let separator = "=".repeat(80);

    let mut log_content = String::new();
    log_content.push_str(&format!(
        "\n{}\n[{}] {} {}\n{}\n",
        separator,
        timestamp,
        request.method,
        mask_url(&request.url),
        separator
    ));

    log_content.push_str("\n--- Request Headers ---\n");
    for (name, value) in &request.headers {
        log_content.push_str(&format!("{}: {}\n", name, value));
    }

    if let Some(body) = &request.body {
        log_content.push_str("\n--- Request Body ---\n");
        log_content.push_str(&truncate_utf8_safe(body, MAX_BODY_SIZE));
        log_content.push('\n');
    }

    if let Some(resp) = response {
        log_content.push_str(&format!("\n--- Response ({}ms) ---\n", duration_ms));
        log_content.push_str(&format!("Status: {}\n", resp.status));

        log_content.push_str("\n--- Response Headers ---\n");
        for (name, value) in &resp.headers {
            log_content.push_str(&format!("{}: {}\n", name, value));
        }

        if let Some(body) = &resp.body {
            log_content.push_str("\n--- Response Body ---\n");
            log_content.push_str(&truncate_utf8_safe(body, MAX_BODY_SIZE));
            log_content.push('\n');
        }
    }

    if let Some(err) = error {
        log_content.push_str(&format!("\n--- Error ({}ms) ---\n", duration_ms));
        log_content.push_str(err);
        log_content.push('\n');
    }

    log_content.push_str(&format!("\n{}\n", separator));
    log_content
}

/// Write log content to file (thread-safe)
fn write_log(path: &PathBuf, content: &str) -> std::io::Result<()> {
    // Concurrent block uploads would otherwise interleave entries
    let _guard = LOG_MUTEX.lock().unwrap_or_else(|e| e.into_inner());

    let mut file = OpenOptions::new().create(true).append(true).open(path)?;
    file.write_all(content.as_bytes())?;
    Ok(())
}

/// Replace the values of SAS signature parameters in a URL with `****`
pub fn mask_url(url: &str) -> String {
    let Some((base, query)) = url.split_once('?') else {
        return url.to_string();
    };

    let masked: Vec<String> = query
        .split('&')
        .map(|pair| match pair.split_once('=') {
            Some((key, _)) if SENSITIVE_QUERY_PARAMS.contains(&key.to_lowercase().as_str()) => {
                format!("{}=****", key)
            }
            _ => pair.to_string(),
        })
        .collect();

    format!("{}?{}", base, masked.join("&"))
}

/// Truncate string at UTF-8 character boundary (safe for multi-byte chars)
pub fn truncate_utf8_safe(s: &str, max_len: usize) -> String {
    if s.len() <= max_len {
        return s.to_string();
    }

    let mut end = max_len;
    while end > 0 && !s.is_char_boundary(end) {
        end -= 1;
    }

    format!("{}...\n[truncated, total {} bytes]", &s[..end], s.len())
}

/// Build a request log entry; returns None if logging is disabled (lazy evaluation)
pub fn build_request_log_if_enabled(
    method: &str,
    url: &str,
    headers: &[(&str, &str)],
    body: Option<String>,
) -> Option<HttpRequestLog> {
    if !is_enabled() {
        return None;
    }

    Some(HttpRequestLog {
        method: method.to_string(),
        url: url.to_string(),
        headers: headers
            .iter()
            .map(|(name, value)| (name.to_string(), value.to_string()))
            .collect(),
        body,
    })
}

/// Extract headers from a reqwest Response (only if logging enabled)
pub fn extract_response_headers(response: &reqwest::Response) -> Vec<(String, String)> {
    response
        .headers()
        .iter()
        .map(|(name, value)| {
            (
                name.to_string(),
                value.to_str().unwrap_or("<binary>").to_string(),
            )
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mask_url_hides_signature() {
        let url = "https://acct.blob.core.windows.net/c/blob?sv=2022-11-02&sig=abc%2Fdef&comp=block";
        assert_eq!(
            mask_url(url),
            "https://acct.blob.core.windows.net/c/blob?sv=2022-11-02&sig=****&comp=block"
        );
    }

    #[test]
    fn test_mask_url_without_query() {
        assert_eq!(mask_url("https://example.com/a"), "https://example.com/a");
    }

    #[test]
    fn test_render_entry_masks_signature() {
        let request = HttpRequestLog {
            method: "PUT".to_string(),
            url: "https://example.com/c/b?sig=supersecret".to_string(),
            headers: vec![("x-ms-blob-type".to_string(), "BlockBlob".to_string())],
            body: Some("<8388608 bytes>".to_string()),
        };
        let response = HttpResponseLog {
            status: 201,
            headers: vec![],
            body: None,
        };

        let entry = render_entry(&request, Some(&response), 42, None);
        assert!(!entry.contains("supersecret"));
        assert!(entry.contains("sig=****"));
        assert!(entry.contains("x-ms-blob-type: BlockBlob"));
        assert!(entry.contains("Status: 201"));
        assert!(entry.contains("--- Response (42ms) ---"));
    }

    #[test]
    fn test_render_entry_with_error() {
        let request = HttpRequestLog {
            method: "PUT".to_string(),
            url: "https://example.com/c/b".to_string(),
            headers: vec![],
            body: None,
        };
        let entry = render_entry(&request, None, 7, Some("connection reset"));
        assert!(entry.contains("--- Error (7ms) ---"));
        assert!(entry.contains("connection reset"));
    }
}
