use std::io::{Cursor, Read, Seek};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use common::storage::{BoxReader, ObjectStore, upload_multipart};
use sea_orm::{DatabaseConnection, TransactionTrait};
use tempfile::TempPath;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use super::archive::parse_problem_archive;
use super::repository::{apply_update_if_version, delete_problem, find_problem, list_problems};
use super::statement::build_statement;
use super::tests_archive::{download_to_temp, tests_archive_key, unpack};
use crate::config::AppConfig;
use crate::entity::problem;
use crate::error::AppError;
use crate::models::problem::{
    ProblemListQuery, ProblemListResponse, ProblemUpdate, UploadProblemResponse,
};
use crate::pandoc::StatementRenderer;

/// Attempts of the read-render-write cycle before giving up with a conflict.
pub const MAX_UPDATE_ATTEMPTS: u32 = 3;

/// Tunables of the ingestion pipeline.
#[derive(Debug, Clone)]
pub struct IngestSettings {
    /// Statement locale whose `problem-properties.json` is read.
    pub locale: String,
    pub max_archive_size: u64,
    pub part_size: usize,
    /// Test archives are unpacked under `{cache_dir}/tests/`.
    pub cache_dir: PathBuf,
}

impl IngestSettings {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            locale: config.problem.locale.clone(),
            max_archive_size: config.problem.max_archive_size,
            part_size: config.storage.part_size,
            cache_dir: config.problem.cache_dir.clone(),
        }
    }
}

/// Problem ingestion and statement maintenance.
pub struct ProblemService {
    db: DatabaseConnection,
    renderer: Arc<dyn StatementRenderer>,
    store: Arc<dyn ObjectStore>,
    settings: IngestSettings,
}

impl ProblemService {
    pub fn new(
        db: DatabaseConnection,
        renderer: Arc<dyn StatementRenderer>,
        store: Arc<dyn ObjectStore>,
        settings: IngestSettings,
    ) -> Self {
        Self {
            db,
            renderer,
            store,
            settings,
        }
    }

    pub fn settings(&self) -> &IngestSettings {
        &self.settings
    }

    pub async fn get_problem(&self, id: Uuid) -> Result<problem::Model, AppError> {
        find_problem(&self.db, id).await
    }

    pub async fn list_problems(
        &self,
        query: &ProblemListQuery,
    ) -> Result<ProblemListResponse, AppError> {
        list_problems(&self.db, query).await
    }

    /// Delete the problem row, then its stored test archive. A failure to
    /// remove the archive is logged and does not undo the deletion.
    #[instrument(skip(self), fields(problem_id = %id))]
    pub async fn delete_problem(&self, id: Uuid) -> Result<(), AppError> {
        if !delete_problem(&self.db, id).await? {
            return Err(AppError::NotFound("Problem not found".into()));
        }

        let key = tests_archive_key(id);
        match self.store.delete(&key).await {
            Ok(removed) => info!(tests_archive_removed = removed, "Problem deleted"),
            Err(e) => warn!(key = %key, error = %e, "Problem deleted but its tests archive was kept"),
        }
        Ok(())
    }

    /// Apply `update` and re-render the statement against the merged sources.
    ///
    /// Rendering happens outside the transaction. The write only lands if the
    /// row version is unchanged since it was read; otherwise the cycle is
    /// retried with fresh data.
    #[instrument(skip(self, update), fields(problem_id = %id))]
    pub async fn update_problem(&self, id: Uuid, mut update: ProblemUpdate) -> Result<(), AppError> {
        if update.is_empty() {
            return Err(AppError::Validation("No fields to update".into()));
        }

        for attempt in 1..=MAX_UPDATE_ATTEMPTS {
            let current = find_problem(&self.db, id).await?;

            let statement = update.merge_statement(&current);
            let html = build_statement(self.renderer.as_ref(), &statement).await?;
            update.set_rendered(html);

            let txn = self.db.begin().await?;
            if apply_update_if_version(&txn, id, current.version, &update).await? {
                txn.commit().await?;
                info!(version = current.version + 1, "Problem updated");
                return Ok(());
            }
            txn.rollback().await?;
            warn!(attempt, "Problem changed while rendering, retrying");
        }

        Err(AppError::Conflict(
            "Problem was modified concurrently, please retry".into(),
        ))
    }

    /// Validate a problem package, apply its properties and statement, then
    /// store its repackaged test archive.
    #[instrument(skip(self, archive), fields(problem_id = %id))]
    pub async fn upload_problem<R>(
        &self,
        id: Uuid,
        archive: R,
        size: u64,
    ) -> Result<UploadProblemResponse, AppError>
    where
        R: Read + Seek + Send + 'static,
    {
        if size == 0 {
            return Err(AppError::Validation("Archive is empty".into()));
        }
        if size > self.settings.max_archive_size {
            return Err(AppError::Validation(format!(
                "Archive exceeds the {} byte limit",
                self.settings.max_archive_size
            )));
        }

        let locale = self.settings.locale.clone();
        let parsed = tokio::task::spawn_blocking(move || parse_problem_archive(archive, &locale))
            .await
            .map_err(|e| AppError::Internal(format!("Archive task failed: {e}")))??;

        let props = parsed.properties;
        let update = ProblemUpdate {
            title: Some(props.title.trim().to_string()),
            time_limit: Some(props.time_limit_ms()?),
            memory_limit: Some(props.memory_limit_mib()?),
            legend: props.legend,
            input_format: props.input_format,
            output_format: props.output_format,
            notes: props.notes,
            scoring: props.scoring,
            meta: Some(parsed.meta.clone()),
            ..Default::default()
        };
        self.update_problem(id, update).await?;

        let tests_key = self
            .upload_tests_archive(id, Box::new(Cursor::new(parsed.tests_archive)))
            .await?;

        info!(tests = parsed.meta.count, key = %tests_key, "Problem archive ingested");
        Ok(UploadProblemResponse {
            tests_key,
            meta: parsed.meta,
        })
    }

    /// Store a test archive under the problem's deterministic key.
    #[instrument(skip(self, reader), fields(problem_id = %id))]
    pub async fn upload_tests_archive(&self, id: Uuid, reader: BoxReader) -> Result<String, AppError> {
        let key = tests_archive_key(id);
        let report = upload_multipart(self.store.as_ref(), &key, reader, self.settings.part_size)
            .await
            .map_err(|e| AppError::Internal(format!("Failed to upload tests archive: {e}")))?;
        info!(parts = report.parts, bytes = report.bytes, "Tests archive stored");
        Ok(key)
    }

    /// Fetch the stored test archive into a temp file removed on drop.
    pub async fn download_tests_archive(&self, id: Uuid) -> Result<TempPath, AppError> {
        Ok(download_to_temp(self.store.as_ref(), id).await?)
    }

    /// Extract a downloaded archive into `{cache_dir}/tests/{dest}`.
    pub async fn unpack_tests_archive(&self, zip_path: &Path, dest: &str) -> Result<PathBuf, AppError> {
        let root = self.settings.cache_dir.join("tests");
        let zip_path = zip_path.to_path_buf();
        let dest = dest.to_string();
        let dir = tokio::task::spawn_blocking(move || unpack(&zip_path, &root, &dest))
            .await
            .map_err(|e| AppError::Internal(format!("Unpack task failed: {e}")))??;
        Ok(dir)
    }

    /// Download and unpack a problem's tests. The downloaded archive is
    /// deleted once unpacking finishes.
    #[instrument(skip(self), fields(problem_id = %id))]
    pub async fn prepare_tests(&self, id: Uuid, dest: &str) -> Result<PathBuf, AppError> {
        let archive = self.download_tests_archive(id).await?;
        self.unpack_tests_archive(&archive, dest).await
    }
}
