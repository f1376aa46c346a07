//! Byte sources for objects being uploaded

use std::fmt;
use std::io::SeekFrom;
use std::ops::Range;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::io::{AsyncReadExt, AsyncSeekExt};

use crate::error::{UploadError, UploadResult};

/// Random-access view over the bytes of an object.
///
/// Blocks are read lazily when they are dispatched, so only the blocks currently in
/// flight are held in memory.
#[async_trait]
pub trait ObjectSource: Send + Sync {
    /// Total object size in bytes
    fn len(&self) -> u64;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Read the half-open byte range `[start, end)`
    async fn read_range(&self, range: Range<u64>) -> UploadResult<Bytes>;
}

/// Object held fully in memory
#[derive(Debug, Clone)]
pub struct MemorySource {
    data: Bytes,
}

impl MemorySource {
    pub fn new(data: impl Into<Bytes>) -> Self {
        Self { data: data.into() }
    }
}

#[async_trait]
impl ObjectSource for MemorySource {
    fn len(&self) -> u64 {
        self.data.len() as u64
    }

    async fn read_range(&self, range: Range<u64>) -> UploadResult<Bytes> {
        check_range(&range, self.len())?;
        Ok(self.data.slice(range.start as usize..range.end as usize))
    }
}

/// Object backed by a file on disk
#[derive(Debug, Clone)]
pub struct FileSource {
    path: PathBuf,
    len: u64,
}

impl FileSource {
    pub async fn open(path: impl AsRef<Path>) -> UploadResult<Self> {
        let path = path.as_ref().to_path_buf();
        let metadata = tokio::fs::metadata(&path).await.map_err(|e| UploadError::Source {
            message: format!("{}: {}", path.display(), e),
        })?;
        if !metadata.is_file() {
            return Err(UploadError::Source {
                message: format!("{} is not a regular file", path.display()),
            });
        }
        Ok(Self {
            path,
            len: metadata.len(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl ObjectSource for FileSource {
    fn len(&self) -> u64 {
        self.len
    }

    async fn read_range(&self, range: Range<u64>) -> UploadResult<Bytes> {
        check_range(&range, self.len)?;
        let mut file = tokio::fs::File::open(&self.path).await?;
        file.seek(SeekFrom::Start(range.start)).await?;
        let mut buf = vec![0u8; (range.end - range.start) as usize];
        file.read_exact(&mut buf).await?;
        Ok(Bytes::from(buf))
    }
}

fn check_range(range: &Range<u64>, len: u64) -> UploadResult<()> {
    if range.start > range.end || range.end > len {
        return Err(UploadError::Source {
            message: format!(
                "range {}..{} out of bounds for object of {} bytes",
                range.start, range.end, len
            ),
        });
    }
    Ok(())
}

/// An object to upload: its name, content type and bytes
#[derive(Clone)]
pub struct UploadObject {
    pub name: String,
    pub content_type: String,
    pub source: Arc<dyn ObjectSource>,
}

impl UploadObject {
    pub fn new(
        name: impl Into<String>,
        content_type: impl Into<String>,
        source: impl ObjectSource + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            content_type: content_type.into(),
            source: Arc::new(source),
        }
    }

    pub fn size(&self) -> u64 {
        self.source.len()
    }
}

impl fmt::Debug for UploadObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UploadObject")
            .field("name", &self.name)
            .field("content_type", &self.content_type)
            .field("size", &self.size())
            .finish()
    }
}
