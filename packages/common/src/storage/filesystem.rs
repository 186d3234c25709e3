use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use sha2::{Digest, Sha256};
use tokio::fs;
use tokio::io::{AsyncWriteExt, BufReader};

use super::error::StorageError;
use super::traits::{BoxReader, CompletedPart, ObjectStore};

/// Filesystem-backed object store.
///
/// Objects live at `{base_path}/{key}`. Multipart sessions are staged under
/// `{base_path}/.tmp/{upload_id}/{part_number}` and moved into place with a
/// rename on completion, so readers never observe a half-written object.
pub struct FilesystemObjectStore {
    base_path: PathBuf,
}

impl FilesystemObjectStore {
    /// Create a new filesystem object store.
    pub async fn new(base_path: PathBuf) -> Result<Self, StorageError> {
        fs::create_dir_all(&base_path).await?;
        fs::create_dir_all(base_path.join(".tmp")).await?;
        Ok(Self { base_path })
    }

    /// Map an object key onto a path below the base directory.
    fn object_path(&self, key: &str) -> Result<PathBuf, StorageError> {
        let relative = Path::new(key);
        let safe = !key.is_empty()
            && relative
                .components()
                .all(|c| matches!(c, Component::Normal(s) if !s.to_string_lossy().starts_with('.')));
        if !safe {
            return Err(StorageError::InvalidKey(key.to_string()));
        }
        Ok(self.base_path.join(relative))
    }

    fn session_dir(&self, upload_id: &str) -> Result<PathBuf, StorageError> {
        if uuid::Uuid::parse_str(upload_id).is_err() {
            return Err(StorageError::NotFound(format!("upload {upload_id}")));
        }
        Ok(self.base_path.join(".tmp").join(upload_id))
    }
}

#[async_trait]
impl ObjectStore for FilesystemObjectStore {
    async fn create_multipart(&self, key: &str) -> Result<String, StorageError> {
        self.object_path(key)?;
        let upload_id = uuid::Uuid::new_v4().to_string();
        fs::create_dir_all(self.session_dir(&upload_id)?).await?;
        Ok(upload_id)
    }

    async fn upload_part(
        &self,
        _key: &str,
        upload_id: &str,
        part_number: u32,
        data: Vec<u8>,
    ) -> Result<CompletedPart, StorageError> {
        let dir = self.session_dir(upload_id)?;
        if !fs::try_exists(&dir).await? {
            return Err(StorageError::NotFound(format!("upload {upload_id}")));
        }

        let etag = hex::encode(Sha256::digest(&data));
        fs::write(dir.join(part_number.to_string()), &data).await?;

        Ok(CompletedPart { part_number, etag })
    }

    async fn complete_multipart(
        &self,
        key: &str,
        upload_id: &str,
        parts: Vec<CompletedPart>,
    ) -> Result<(), StorageError> {
        let object_path = self.object_path(key)?;
        let dir = self.session_dir(upload_id)?;
        let assembled = dir.join("assembled");

        let mut out = fs::File::create(&assembled).await?;
        for part in &parts {
            let data = match fs::read(dir.join(part.part_number.to_string())).await {
                Ok(data) => data,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                    return Err(StorageError::NotFound(format!(
                        "part {} of upload {upload_id}",
                        part.part_number
                    )));
                }
                Err(e) => return Err(e.into()),
            };
            if hex::encode(Sha256::digest(&data)) != part.etag {
                return Err(StorageError::Backend(format!(
                    "etag mismatch for part {}",
                    part.part_number
                )));
            }
            out.write_all(&data).await?;
        }
        out.flush().await?;
        drop(out);

        if let Some(parent) = object_path.parent() {
            fs::create_dir_all(parent).await?;
        }
        fs::rename(&assembled, &object_path).await?;
        fs::remove_dir_all(&dir).await?;

        Ok(())
    }

    async fn abort_multipart(&self, _key: &str, upload_id: &str) -> Result<(), StorageError> {
        let dir = self.session_dir(upload_id)?;
        match fs::remove_dir_all(&dir).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn get_stream(&self, key: &str) -> Result<BoxReader, StorageError> {
        let path = self.object_path(key)?;
        match fs::File::open(&path).await {
            Ok(file) => Ok(Box::new(BufReader::new(file))),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(StorageError::NotFound(key.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn delete(&self, key: &str) -> Result<bool, StorageError> {
        let path = self.object_path(key)?;
        match fs::remove_file(&path).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }
}
