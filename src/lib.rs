//! blob-uploader library - chunked block uploads to Azure Blob Storage

pub mod config;
pub mod error;
pub mod http_logger;
pub mod storage;
pub mod upload;
pub mod utils;

// Re-export commonly used types
pub use config::{ConfigOptions, StorageConfig, UploadConfig};
pub use error::{ErrorType, UploadError, UploadResult};
pub use storage::{AzureBlobClient, StorageClient};
pub use upload::{
    ProgressEvent, SessionState, UploadCoordinator, UploadObject, UploadStatus, UploadSummary,
};
