use async_trait::async_trait;
use tokio::io::AsyncRead;

use super::error::StorageError;

/// Type alias for a boxed async reader.
pub type BoxReader = Box<dyn AsyncRead + Unpin + Send>;

/// A part acknowledged by the backend during a multipart upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletedPart {
    /// 1-based, sequential.
    pub part_number: u32,
    pub etag: String,
}

/// Key-addressed object storage with multipart upload sessions.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Open a multipart upload session at `key` and return its upload id.
    async fn create_multipart(&self, key: &str) -> Result<String, StorageError>;

    /// Upload one part of an open session.
    async fn upload_part(
        &self,
        key: &str,
        upload_id: &str,
        part_number: u32,
        data: Vec<u8>,
    ) -> Result<CompletedPart, StorageError>;

    /// Finalize a session. The object at `key` is replaced by the listed parts, in order.
    async fn complete_multipart(
        &self,
        key: &str,
        upload_id: &str,
        parts: Vec<CompletedPart>,
    ) -> Result<(), StorageError>;

    /// Discard a session and every part uploaded to it.
    async fn abort_multipart(&self, key: &str, upload_id: &str) -> Result<(), StorageError>;

    /// Retrieve an object as a streaming async reader.
    async fn get_stream(&self, key: &str) -> Result<BoxReader, StorageError>;

    /// Remove an object. Returns `false` when the backend reports it absent.
    async fn delete(&self, key: &str) -> Result<bool, StorageError>;
}
