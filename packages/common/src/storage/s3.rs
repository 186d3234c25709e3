use async_trait::async_trait;
use futures::TryStreamExt;
use s3::creds::Credentials;
use s3::error::S3Error;
use s3::serde_types::Part;
use s3::{Bucket, Region};
use tokio_util::io::StreamReader;

use super::error::StorageError;
use super::traits::{BoxReader, CompletedPart, ObjectStore};
use crate::config::S3Config;

const CONTENT_TYPE: &str = "application/zip";

/// S3-compatible object store.
pub struct S3ObjectStore {
    bucket: Box<Bucket>,
}

impl S3ObjectStore {
    pub fn new(config: &S3Config) -> Result<Self, StorageError> {
        let region = Region::Custom {
            region: config.region.clone(),
            endpoint: config.endpoint.clone(),
        };
        let credentials = Credentials::new(
            Some(&config.access_key),
            Some(&config.secret_key),
            None,
            None,
            None,
        )
        .map_err(|e| StorageError::Backend(format!("invalid S3 credentials: {e}")))?;

        let bucket = Bucket::new(&config.bucket, region, credentials).map_err(backend)?;
        let bucket = if config.path_style {
            bucket.with_path_style()
        } else {
            bucket
        };

        Ok(Self { bucket })
    }
}

fn backend(err: S3Error) -> StorageError {
    match err {
        S3Error::HttpFailWithBody(404, body) => StorageError::NotFound(body),
        other => StorageError::Backend(other.to_string()),
    }
}

#[async_trait]
impl ObjectStore for S3ObjectStore {
    async fn create_multipart(&self, key: &str) -> Result<String, StorageError> {
        let response = self
            .bucket
            .initiate_multipart_upload(key, CONTENT_TYPE)
            .await
            .map_err(backend)?;
        Ok(response.upload_id)
    }

    async fn upload_part(
        &self,
        key: &str,
        upload_id: &str,
        part_number: u32,
        data: Vec<u8>,
    ) -> Result<CompletedPart, StorageError> {
        let part = self
            .bucket
            .put_multipart_chunk(data, key, part_number, upload_id, CONTENT_TYPE)
            .await
            .map_err(backend)?;
        Ok(CompletedPart {
            part_number: part.part_number,
            etag: part.etag,
        })
    }

    async fn complete_multipart(
        &self,
        key: &str,
        upload_id: &str,
        parts: Vec<CompletedPart>,
    ) -> Result<(), StorageError> {
        let parts = parts
            .into_iter()
            .map(|p| Part {
                part_number: p.part_number,
                etag: p.etag,
            })
            .collect();
        let response = self
            .bucket
            .complete_multipart_upload(key, upload_id, parts)
            .await
            .map_err(backend)?;

        let status = response.status_code();
        if !(200..300).contains(&status) {
            return Err(StorageError::Backend(format!(
                "complete multipart upload returned status {status}"
            )));
        }
        Ok(())
    }

    async fn abort_multipart(&self, key: &str, upload_id: &str) -> Result<(), StorageError> {
        self.bucket
            .abort_upload(key, upload_id)
            .await
            .map_err(backend)
    }

    async fn get_stream(&self, key: &str) -> Result<BoxReader, StorageError> {
        let response = self.bucket.get_object_stream(key).await.map_err(|e| match e {
            S3Error::HttpFailWithBody(404, _) => StorageError::NotFound(key.to_string()),
            other => backend(other),
        })?;
        let stream = response.bytes.map_err(std::io::Error::other);
        Ok(Box::new(StreamReader::new(stream)))
    }

    /// S3 deletes are idempotent and do not say whether the key existed.
    async fn delete(&self, key: &str) -> Result<bool, StorageError> {
        let response = self.bucket.delete_object(key).await.map_err(backend)?;
        let status = response.status_code();
        if !(200..300).contains(&status) {
            return Err(StorageError::Backend(format!(
                "delete object returned status {status}"
            )));
        }
        Ok(true)
    }
}
