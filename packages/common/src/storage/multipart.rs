use tokio::io::AsyncReadExt;
use tracing::{debug, warn};

use super::error::StorageError;
use super::traits::{BoxReader, CompletedPart, ObjectStore};

/// Default multipart chunk size (5 MiB, the S3 minimum for non-final parts).
pub const DEFAULT_PART_SIZE: usize = 5 * 1024 * 1024;

/// Summary of a completed multipart upload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UploadReport {
    pub parts: u32,
    pub bytes: u64,
}

/// Stream `reader` into `key` as a multipart upload of `part_size` chunks.
///
/// Any read, part or completion failure aborts the session before the
/// original error is returned. Abort failures are only logged.
pub async fn upload_multipart(
    store: &dyn ObjectStore,
    key: &str,
    mut reader: BoxReader,
    part_size: usize,
) -> Result<UploadReport, StorageError> {
    let part_size = part_size.max(1);
    let upload_id = store.create_multipart(key).await?;

    let mut parts: Vec<CompletedPart> = Vec::new();
    let mut bytes: u64 = 0;

    loop {
        let chunk = match read_chunk(&mut reader, part_size).await {
            Ok(chunk) => chunk,
            Err(e) => {
                abort_quietly(store, key, &upload_id).await;
                return Err(e.into());
            }
        };
        if chunk.is_empty() {
            break;
        }

        let part_number = parts.len() as u32 + 1;
        let len = chunk.len() as u64;
        match store.upload_part(key, &upload_id, part_number, chunk).await {
            Ok(part) => {
                debug!(key, part_number, len, "Uploaded part");
                bytes += len;
                parts.push(part);
            }
            Err(e) => {
                abort_quietly(store, key, &upload_id).await;
                return Err(e);
            }
        }
    }

    let report = UploadReport {
        parts: parts.len() as u32,
        bytes,
    };

    if let Err(e) = store.complete_multipart(key, &upload_id, parts).await {
        abort_quietly(store, key, &upload_id).await;
        return Err(e);
    }

    Ok(report)
}

/// Fill a buffer of up to `size` bytes, coalescing short reads.
/// Returns an empty buffer once the reader is exhausted.
async fn read_chunk(reader: &mut BoxReader, size: usize) -> std::io::Result<Vec<u8>> {
    let mut buf = vec![0u8; size];
    let mut filled = 0;
    while filled < size {
        let n = reader.read(&mut buf[filled..]).await?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    buf.truncate(filled);
    Ok(buf)
}

async fn abort_quietly(store: &dyn ObjectStore, key: &str, upload_id: &str) {
    if let Err(e) = store.abort_multipart(key, upload_id).await {
        warn!(key, upload_id, error = %e, "Failed to abort multipart upload");
    }
}
