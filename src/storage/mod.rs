//! Block-oriented object store clients

mod azure;

pub use azure::{block_list_xml, encode_block_id, AzureBlobClient};

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::mpsc::UnboundedSender;
use tokio_util::sync::CancellationToken;

use crate::error::UploadResult;

/// Transport operations the upload engine needs from an object store.
///
/// Every call receives the session's cancellation token and must return
/// `UploadError::Cancelled` promptly once it fires.
#[async_trait]
pub trait StorageClient: Send + Sync {
    /// Stage one block of `blob` under `block_id`
    async fn put_block(
        &self,
        blob: &str,
        block_id: &str,
        data: Bytes,
        cancel: &CancellationToken,
    ) -> UploadResult<()>;

    /// Assemble previously staged blocks, in the given order, into `blob`
    async fn commit_block_list(
        &self,
        blob: &str,
        block_ids: &[String],
        content_type: &str,
        cancel: &CancellationToken,
    ) -> UploadResult<()>;

    /// Upload `blob` in a single request.
    ///
    /// The byte count of each piece of the body handed to the transport is sent on
    /// `progress`; the counts sum to `data.len()` once the body is fully written.
    async fn put_object(
        &self,
        blob: &str,
        data: Bytes,
        content_type: &str,
        progress: UnboundedSender<u64>,
        cancel: &CancellationToken,
    ) -> UploadResult<()>;
}
