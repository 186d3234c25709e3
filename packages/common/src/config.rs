use std::path::PathBuf;

use serde::Deserialize;

use crate::storage::DEFAULT_PART_SIZE;

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    S3,
    Filesystem,
}

/// Connection settings for an S3-compatible endpoint.
#[derive(Debug, Deserialize, Clone)]
pub struct S3Config {
    pub bucket: String,
    #[serde(default = "default_s3_region")]
    pub region: String,
    pub endpoint: String,
    pub access_key: String,
    pub secret_key: String,
    /// Use path-style addressing (required by most self-hosted endpoints).
    #[serde(default = "default_path_style")]
    pub path_style: bool,
}

/// Object storage configuration.
#[derive(Debug, Deserialize, Clone)]
pub struct StorageConfig {
    /// Default: filesystem.
    #[serde(default = "default_backend")]
    pub backend: StorageBackend,
    /// Multipart chunk size in bytes. Default: 5 MiB.
    #[serde(default = "default_part_size")]
    pub part_size: usize,
    /// Root directory of the filesystem backend. Default: "./data/objects".
    #[serde(default = "default_filesystem_root")]
    pub filesystem_root: PathBuf,
    pub s3: Option<S3Config>,
}

fn default_backend() -> StorageBackend {
    StorageBackend::Filesystem
}
fn default_part_size() -> usize {
    DEFAULT_PART_SIZE
}
fn default_filesystem_root() -> PathBuf {
    PathBuf::from("./data/objects")
}
fn default_s3_region() -> String {
    "us-east-1".into()
}
fn default_path_style() -> bool {
    true
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: default_backend(),
            part_size: default_part_size(),
            filesystem_root: default_filesystem_root(),
            s3: None,
        }
    }
}
