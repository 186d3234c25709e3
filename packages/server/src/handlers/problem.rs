use axum::Json;
use axum::extract::{DefaultBodyLimit, Multipart, Path, Query, State};
use axum::extract::multipart::Field;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use tokio::io::AsyncWriteExt;
use tracing::instrument;
use uuid::Uuid;

use crate::error::{AppError, ErrorBody};
use crate::extractors::json::AppJson;
use crate::models::problem::*;
use crate::state::AppState;

#[utoipa::path(
    get,
    path = "/",
    tag = "Problems",
    operation_id = "listProblems",
    summary = "List problems with pagination and search",
    description = "Returns a paginated list of problems with optional case-insensitive title \
        search. Sorts by `created_at` (default, desc), `updated_at`, or `title`. Statements are \
        omitted from list results.",
    params(ProblemListQuery),
    responses(
        (status = 200, description = "List of problems", body = ProblemListResponse),
        (status = 400, description = "Invalid sort parameters (VALIDATION_ERROR)", body = ErrorBody),
    ),
)]
#[instrument(skip(state, query))]
pub async fn list_problems(
    State(state): State<AppState>,
    Query(query): Query<ProblemListQuery>,
) -> Result<Json<ProblemListResponse>, AppError> {
    Ok(Json(state.problems.list_problems(&query).await?))
}

#[utoipa::path(
    get,
    path = "/{id}",
    tag = "Problems",
    operation_id = "getProblem",
    summary = "Get problem details",
    description = "Returns limits, statement sources, rendered statement HTML and test metadata.",
    params(("id" = Uuid, Path, description = "Problem ID")),
    responses(
        (status = 200, description = "Problem details", body = ProblemResponse),
        (status = 404, description = "Problem not found (NOT_FOUND)", body = ErrorBody),
    ),
)]
#[instrument(skip(state), fields(problem_id = %id))]
pub async fn get_problem(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<ProblemResponse>, AppError> {
    let model = state.problems.get_problem(id).await?;
    Ok(Json(ProblemResponse::from(model)))
}

#[utoipa::path(
    patch,
    path = "/{id}",
    tag = "Problems",
    operation_id = "updateProblem",
    summary = "Update a problem",
    description = "Partially updates a problem. The statement is re-rendered from the merged \
        sources; a LaTeX error in any field rejects the whole update. Concurrent edits are \
        retried and reported as CONFLICT if they keep racing.",
    params(("id" = Uuid, Path, description = "Problem ID")),
    request_body = UpdateProblemRequest,
    responses(
        (status = 200, description = "Problem updated", body = ProblemResponse),
        (status = 400, description = "Validation error (VALIDATION_ERROR)", body = ErrorBody),
        (status = 404, description = "Problem not found (NOT_FOUND)", body = ErrorBody),
        (status = 409, description = "Concurrent modification (CONFLICT)", body = ErrorBody),
    ),
)]
#[instrument(skip(state, payload), fields(problem_id = %id))]
pub async fn update_problem(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    AppJson(payload): AppJson<UpdateProblemRequest>,
) -> Result<Json<ProblemResponse>, AppError> {
    validate_update_problem(&payload)?;

    state.problems.update_problem(id, payload.into()).await?;

    let model = state.problems.get_problem(id).await?;
    Ok(Json(ProblemResponse::from(model)))
}

#[utoipa::path(
    delete,
    path = "/{id}",
    tag = "Problems",
    operation_id = "deleteProblem",
    summary = "Delete a problem by ID",
    description = "Permanently deletes a problem and its stored test archive.",
    params(("id" = Uuid, Path, description = "Problem ID")),
    responses(
        (status = 204, description = "Problem deleted"),
        (status = 404, description = "Problem not found (NOT_FOUND)", body = ErrorBody),
    ),
)]
#[instrument(skip(state), fields(problem_id = %id))]
pub async fn delete_problem(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    state.problems.delete_problem(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    post,
    path = "/{id}/archive",
    tag = "Problems",
    operation_id = "uploadProblemArchive",
    summary = "Upload a problem package",
    description = "Accepts a ZIP package in the `file` multipart field. Reads \
        `statements/<locale>/problem-properties.json`, requires every `tests/<name>` input to \
        have a `tests/<name>.a` answer, applies title, limits and statement, then stores the \
        repackaged tests under `problems/<id>/tests.zip`.",
    params(("id" = Uuid, Path, description = "Problem ID")),
    request_body(content_type = "multipart/form-data", description = "Problem package ZIP"),
    responses(
        (status = 201, description = "Package ingested", body = UploadProblemResponse),
        (status = 400, description = "Validation error (VALIDATION_ERROR)", body = ErrorBody),
        (status = 404, description = "Problem not found (NOT_FOUND)", body = ErrorBody),
        (status = 409, description = "Concurrent modification (CONFLICT)", body = ErrorBody),
    ),
)]
#[instrument(skip(state, multipart), fields(problem_id = %id))]
pub async fn upload_problem_archive(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    mut multipart: Multipart,
) -> Result<impl IntoResponse, AppError> {
    let max_size = state.problems.settings().max_archive_size;

    let mut upload: Option<(std::fs::File, u64)> = None;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::Validation(format!("Multipart error: {e}")))?
    {
        if field.name() == Some("file") {
            upload = Some(spool_field(field, max_size).await?);
            break;
        }
    }

    let (file, size) = upload.ok_or_else(|| AppError::Validation("Missing 'file' field".into()))?;

    let response = state.problems.upload_problem(id, file, size).await?;
    Ok((StatusCode::CREATED, Json(response)))
}

/// Stream a multipart field into an anonymous temp file, rewound for reading.
async fn spool_field(
    mut field: Field<'_>,
    max_size: u64,
) -> Result<(std::fs::File, u64), AppError> {
    let temp = tokio::task::spawn_blocking(tempfile::tempfile)
        .await
        .map_err(|e| AppError::Internal(format!("Temp file task failed: {e}")))?
        .map_err(|e| AppError::Internal(format!("Failed to create temp file: {e}")))?;
    let mut temp_file = tokio::fs::File::from_std(temp);

    let mut total_size: u64 = 0;
    while let Some(chunk) = field
        .chunk()
        .await
        .map_err(|e| AppError::Validation(format!("Upload read error: {e}")))?
    {
        total_size += chunk.len() as u64;
        if total_size > max_size {
            return Err(AppError::Validation(format!(
                "Archive exceeds maximum size of {max_size} bytes"
            )));
        }
        temp_file
            .write_all(&chunk)
            .await
            .map_err(|e| AppError::Internal(format!("Temp file write failed: {e}")))?;
    }

    temp_file
        .flush()
        .await
        .map_err(|e| AppError::Internal(format!("Temp file flush failed: {e}")))?;

    let mut file = temp_file.into_std().await;
    std::io::Seek::rewind(&mut file)
        .map_err(|e| AppError::Internal(format!("Temp file rewind failed: {e}")))?;

    Ok((file, total_size))
}

/// Body limit layer for the archive upload route. Leaves headroom for the
/// multipart envelope around a maximum-size package.
pub fn upload_body_limit(max_archive_size: u64) -> DefaultBodyLimit {
    let limit = usize::try_from(max_archive_size)
        .unwrap_or(usize::MAX)
        .saturating_add(64 * 1024);
    DefaultBodyLimit::max(limit)
}
