//! Configuration module - storage endpoint and upload engine settings

use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Result};

use crate::error::{UploadError, UploadResult};

pub const MIB: u64 = 1024 * 1024;
pub const GIB: u64 = 1024 * MIB;

/// Default block size (8MB)
pub const DEFAULT_BLOCK_SIZE: u64 = 8 * MIB;
/// Lower bound for adaptive block sizing (2MB)
pub const MIN_BLOCK_SIZE: u64 = 2 * MIB;
/// Upper bound for adaptive block sizing (16MB)
pub const MAX_BLOCK_SIZE: u64 = 16 * MIB;
/// Objects above this size use the chunked path (100MB)
pub const DEFAULT_CHUNKING_THRESHOLD: u64 = 100 * MIB;
/// Maximum accepted object size (5GB)
pub const DEFAULT_MAX_OBJECT_SIZE: u64 = 5 * GIB;
pub const DEFAULT_MAX_CONCURRENT_BLOCKS: usize = 3;
pub const DEFAULT_RETRY_ATTEMPTS: u32 = 3;
pub const DEFAULT_RETRY_INITIAL_DELAY: Duration = Duration::from_secs(1);

/// Storage API version sent with every request
pub const DEFAULT_API_VERSION: &str = "2021-08-06";

/// Optional overrides for UploadConfig::new()
#[derive(Debug, Clone, Default)]
pub struct ConfigOptions {
    pub block_size: Option<u64>,
    pub min_block_size: Option<u64>,
    pub max_block_size: Option<u64>,
    pub chunking_threshold: Option<u64>,
    pub max_concurrent_blocks: Option<usize>,
    pub max_object_size: Option<u64>,
    pub retry_attempts: Option<u32>,
    pub retry_initial_delay: Option<Duration>,
}

/// Upload engine settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadConfig {
    pub block_size: u64,
    pub min_block_size: u64,
    pub max_block_size: u64,
    pub chunking_threshold: u64,
    pub max_concurrent_blocks: usize,
    pub max_object_size: u64,
    pub retry_attempts: u32,
    pub retry_initial_delay: Duration,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            block_size: DEFAULT_BLOCK_SIZE,
            min_block_size: MIN_BLOCK_SIZE,
            max_block_size: MAX_BLOCK_SIZE,
            chunking_threshold: DEFAULT_CHUNKING_THRESHOLD,
            max_concurrent_blocks: DEFAULT_MAX_CONCURRENT_BLOCKS,
            max_object_size: DEFAULT_MAX_OBJECT_SIZE,
            retry_attempts: DEFAULT_RETRY_ATTEMPTS,
            retry_initial_delay: DEFAULT_RETRY_INITIAL_DELAY,
        }
    }
}

impl UploadConfig {
    /// Build a config from defaults plus overrides, rejecting unusable values
    pub fn new(options: ConfigOptions) -> UploadResult<Self> {
        let defaults = Self::default();
        let config = Self {
            block_size: options.block_size.unwrap_or(defaults.block_size),
            min_block_size: options.min_block_size.unwrap_or(defaults.min_block_size),
            max_block_size: options.max_block_size.unwrap_or(defaults.max_block_size),
            chunking_threshold: options
                .chunking_threshold
                .unwrap_or(defaults.chunking_threshold),
            max_concurrent_blocks: options
                .max_concurrent_blocks
                .unwrap_or(defaults.max_concurrent_blocks),
            max_object_size: options.max_object_size.unwrap_or(defaults.max_object_size),
            retry_attempts: options.retry_attempts.unwrap_or(defaults.retry_attempts),
            retry_initial_delay: options
                .retry_initial_delay
                .unwrap_or(defaults.retry_initial_delay),
            ..defaults
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> UploadResult<()> {
        if self.block_size == 0 {
            return Err(invalid("block_size must be greater than zero"));
        }
        if self.min_block_size == 0 || self.min_block_size > self.max_block_size {
            return Err(invalid(
                "adaptive block size bounds must satisfy 0 < min <= max",
            ));
        }
        if self.block_size < self.min_block_size || self.block_size > self.max_block_size {
            return Err(UploadError::InvalidConfig {
                message: format!(
                    "block_size {} is outside the adaptive bounds [{}, {}]",
                    self.block_size, self.min_block_size, self.max_block_size
                ),
            });
        }
        if self.max_concurrent_blocks == 0 {
            return Err(invalid("max_concurrent_blocks must be at least 1"));
        }
        if self.retry_attempts == 0 {
            return Err(invalid("retry_attempts must be at least 1"));
        }
        if self.max_object_size == 0 {
            return Err(invalid("max_object_size must be greater than zero"));
        }
        Ok(())
    }
}

fn invalid(message: &str) -> UploadError {
    UploadError::InvalidConfig {
        message: message.to_string(),
    }
}

/// Storage endpoint settings
#[derive(Debug, Clone)]
pub struct StorageConfig {
    /// Container URL, e.g. https://account.blob.core.windows.net/container
    pub container_url: String,
    /// SAS query string, always starting with '?'
    pub sas_token: String,
    pub api_version: String,
    pub request_timeout_secs: u64,
}

impl StorageConfig {
    /// Create a storage config from an account name (or full endpoint URL), a container
    /// name and a SAS token
    pub fn new(account_or_url: &str, container: &str, sas_token: &str) -> Result<Arc<Self>> {
        let account_or_url = account_or_url.trim();
        if account_or_url.is_empty() {
            return Err(anyhow!("account cannot be empty"));
        }

        let container = container.trim().trim_matches('/');
        if container.is_empty() {
            return Err(anyhow!("container cannot be empty"));
        }

        let sas_token = sas_token.trim();
        if sas_token.is_empty() || sas_token == "?" {
            return Err(anyhow!("sas_token cannot be empty"));
        }

        let base_url = normalize_endpoint(account_or_url);
        let sas_token = if sas_token.starts_with('?') {
            sas_token.to_string()
        } else {
            format!("?{}", sas_token)
        };

        Ok(Arc::new(Self {
            container_url: format!("{}/{}", base_url, container),
            sas_token,
            api_version: DEFAULT_API_VERSION.to_string(),
            request_timeout_secs: 300,
        }))
    }
}

/// Turn an account name or endpoint into a base URL without trailing slash.
/// Bare account names expand to the public blob endpoint; explicit http:// is kept
/// so local emulators keep working.
fn normalize_endpoint(account_or_url: &str) -> String {
    let has_scheme =
        account_or_url.starts_with("https://") || account_or_url.starts_with("http://");
    let base_url = if has_scheme {
        account_or_url.to_string()
    } else if account_or_url.contains('.') || account_or_url.contains(':') {
        format!("https://{}", account_or_url)
    } else {
        format!("https://{}.blob.core.windows.net", account_or_url)
    };
    base_url.trim_end_matches('/').to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_endpoint_account_name() {
        assert_eq!(
            normalize_endpoint("myaccount"),
            "https://myaccount.blob.core.windows.net"
        );
    }

    #[test]
    fn test_normalize_endpoint_host() {
        assert_eq!(
            normalize_endpoint("myaccount.blob.core.windows.net/"),
            "https://myaccount.blob.core.windows.net"
        );
    }

    #[test]
    fn test_normalize_endpoint_keeps_http() {
        assert_eq!(
            normalize_endpoint("http://127.0.0.1:10000/devstoreaccount1//"),
            "http://127.0.0.1:10000/devstoreaccount1"
        );
    }

    #[test]
    fn test_validate_rejects_inverted_bounds() {
        let config = UploadConfig {
            min_block_size: 32 * MIB,
            ..UploadConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_block_size_outside_bounds() {
        for block_size in [MIB, 32 * MIB] {
            let result = UploadConfig::new(ConfigOptions {
                block_size: Some(block_size),
                ..ConfigOptions::default()
            });
            assert!(matches!(result, Err(UploadError::InvalidConfig { .. })));
        }
    }

    #[test]
    fn test_bounds_can_be_overridden() {
        let config = UploadConfig::new(ConfigOptions {
            block_size: Some(1024),
            min_block_size: Some(512),
            max_block_size: Some(4096),
            ..ConfigOptions::default()
        })
        .unwrap();
        assert_eq!((config.min_block_size, config.max_block_size), (512, 4096));
    }
}
