mod error;
mod multipart;
mod traits;

pub mod filesystem;
#[cfg(feature = "object-storage")]
pub mod s3;

use std::sync::Arc;

pub use error::StorageError;
pub use multipart::{DEFAULT_PART_SIZE, UploadReport, upload_multipart};
pub use traits::{BoxReader, CompletedPart, ObjectStore};

use crate::config::{StorageBackend, StorageConfig};

/// Construct the object store selected by `config.backend`.
pub async fn build_object_store(
    config: &StorageConfig,
) -> Result<Arc<dyn ObjectStore>, StorageError> {
    match config.backend {
        StorageBackend::Filesystem => {
            let store = filesystem::FilesystemObjectStore::new(config.filesystem_root.clone()).await?;
            Ok(Arc::new(store))
        }
        #[cfg(feature = "object-storage")]
        StorageBackend::S3 => {
            let s3_config = config
                .s3
                .as_ref()
                .ok_or_else(|| StorageError::Backend("storage.s3 section is missing".into()))?;
            Ok(Arc::new(s3::S3ObjectStore::new(s3_config)?))
        }
        #[cfg(not(feature = "object-storage"))]
        StorageBackend::S3 => Err(StorageError::Backend(
            "built without the object-storage feature".into(),
        )),
    }
}
