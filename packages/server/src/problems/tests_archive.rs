use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use common::storage::{ObjectStore, StorageError};
use tempfile::TempPath;
use tokio::io::AsyncWriteExt;
use uuid::Uuid;
use zip::ZipArchive;

use super::archive::ArchiveError;

/// Object storage key of a problem's test archive. Re-uploads overwrite it.
pub fn tests_archive_key(problem_id: Uuid) -> String {
    format!("problems/{problem_id}/tests.zip")
}

/// Download a problem's test archive into a fresh temp file.
///
/// The file is deleted when the returned path is dropped.
pub async fn download_to_temp(
    store: &dyn ObjectStore,
    problem_id: Uuid,
) -> Result<TempPath, StorageError> {
    let mut reader = store.get_stream(&tests_archive_key(problem_id)).await?;

    let (file, path) = tempfile::Builder::new()
        .prefix(&format!("tests-archive-{problem_id}-"))
        .suffix(".zip")
        .tempfile()?
        .into_parts();

    let mut file = tokio::fs::File::from_std(file);
    tokio::io::copy(&mut reader, &mut file).await?;
    file.flush().await?;

    Ok(path)
}

fn validate_dest_name(dest: &str) -> Result<(), ArchiveError> {
    let ok = !dest.is_empty()
        && !dest.starts_with('.')
        && !dest.contains(['/', '\\', '\0']);
    if ok {
        Ok(())
    } else {
        Err(ArchiveError::UnsafePath(dest.to_string()))
    }
}

/// Extract `zip_path` into `{root}/{dest}` and return that directory.
///
/// Blocking; callers on the async runtime should use `spawn_blocking`.
pub fn unpack(zip_path: &Path, root: &Path, dest: &str) -> Result<PathBuf, ArchiveError> {
    validate_dest_name(dest)?;
    fs::metadata(zip_path)?;

    let mut archive = ZipArchive::new(fs::File::open(zip_path)?)?;

    let target = root.join(dest);
    fs::create_dir_all(&target)?;

    for i in 0..archive.len() {
        let mut entry = archive.by_index(i)?;
        let relative = entry
            .enclosed_name()
            .ok_or_else(|| ArchiveError::UnsafePath(entry.name().to_string()))?;
        let path = target.join(relative);

        if entry.is_dir() {
            fs::create_dir_all(&path)?;
            continue;
        }
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let mut out = fs::File::create(&path)?;
        io::copy(&mut entry, &mut out)?;

        #[cfg(unix)]
        if let Some(mode) = entry.unix_mode() {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&path, fs::Permissions::from_mode(mode & 0o7777))?;
        }
    }

    Ok(target)
}
