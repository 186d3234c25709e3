use chrono::{DateTime, Utc};
use sea_orm::{FromJsonQueryResult, FromQueryResult};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::AppError;

pub use super::shared::{Pagination, escape_like};
use super::shared::validate_title;

/// Summary of a problem's test set.
///
/// `count` always equals `names.len()`.
#[derive(
    Clone,
    Debug,
    Default,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    FromJsonQueryResult,
    utoipa::ToSchema,
)]
pub struct Meta {
    #[schema(example = 2)]
    pub count: usize,
    /// Test input base names, e.g. `["01", "02"]`.
    pub names: Vec<String>,
}

impl Meta {
    pub fn from_names(names: Vec<String>) -> Self {
        Self {
            count: names.len(),
            names,
        }
    }
}

/// Statement source fields (LaTeX).
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ProblemStatement {
    pub legend: String,
    pub input_format: String,
    pub output_format: String,
    pub notes: String,
    pub scoring: String,
}

impl ProblemStatement {
    pub fn trimmed(&self) -> Self {
        Self {
            legend: self.legend.trim().to_string(),
            input_format: self.input_format.trim().to_string(),
            output_format: self.output_format.trim().to_string(),
            notes: self.notes.trim().to_string(),
            scoring: self.scoring.trim().to_string(),
        }
    }

    /// Fields in the fixed order used for batch rendering.
    pub fn into_fields(self) -> [String; 5] {
        [
            self.legend,
            self.input_format,
            self.output_format,
            self.notes,
            self.scoring,
        ]
    }
}

/// Rendered statement fields (sanitized HTML5).
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Html5ProblemStatement {
    pub legend_html: String,
    pub input_format_html: String,
    pub output_format_html: String,
    pub notes_html: String,
    pub scoring_html: String,
}

impl From<[String; 5]> for Html5ProblemStatement {
    fn from(fields: [String; 5]) -> Self {
        let [legend_html, input_format_html, output_format_html, notes_html, scoring_html] =
            fields;
        Self {
            legend_html,
            input_format_html,
            output_format_html,
            notes_html,
            scoring_html,
        }
    }
}

/// Sparse patch of a problem row. `None` leaves the column unchanged.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ProblemUpdate {
    pub title: Option<String>,
    pub time_limit: Option<i32>,
    pub memory_limit: Option<i32>,
    pub is_private: Option<bool>,

    pub legend: Option<String>,
    pub input_format: Option<String>,
    pub output_format: Option<String>,
    pub notes: Option<String>,
    pub scoring: Option<String>,

    pub legend_html: Option<String>,
    pub input_format_html: Option<String>,
    pub output_format_html: Option<String>,
    pub notes_html: Option<String>,
    pub scoring_html: Option<String>,

    pub meta: Option<Meta>,
}

impl ProblemUpdate {
    /// True when no caller-settable field is present. Rendered HTML fields are
    /// derived by the coordinator and do not count.
    pub fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.time_limit.is_none()
            && self.memory_limit.is_none()
            && self.is_private.is_none()
            && self.legend.is_none()
            && self.input_format.is_none()
            && self.output_format.is_none()
            && self.notes.is_none()
            && self.scoring.is_none()
            && self.meta.is_none()
    }

    /// Overlay the statement fields of this update onto `current`.
    pub fn merge_statement(&self, current: &crate::entity::problem::Model) -> ProblemStatement {
        let pick = |update: &Option<String>, existing: &String| {
            update.clone().unwrap_or_else(|| existing.clone())
        };
        ProblemStatement {
            legend: pick(&self.legend, &current.legend),
            input_format: pick(&self.input_format, &current.input_format),
            output_format: pick(&self.output_format, &current.output_format),
            notes: pick(&self.notes, &current.notes),
            scoring: pick(&self.scoring, &current.scoring),
        }
    }

    pub fn set_rendered(&mut self, html: Html5ProblemStatement) {
        self.legend_html = Some(html.legend_html);
        self.input_format_html = Some(html.input_format_html);
        self.output_format_html = Some(html.output_format_html);
        self.notes_html = Some(html.notes_html);
        self.scoring_html = Some(html.scoring_html);
    }
}

#[derive(Deserialize, Default, PartialEq, utoipa::ToSchema)]
pub struct UpdateProblemRequest {
    pub title: Option<String>,
    pub time_limit: Option<i32>,
    pub memory_limit: Option<i32>,
    pub is_private: Option<bool>,
    pub legend: Option<String>,
    pub input_format: Option<String>,
    pub output_format: Option<String>,
    pub notes: Option<String>,
    pub scoring: Option<String>,
}

impl From<UpdateProblemRequest> for ProblemUpdate {
    fn from(req: UpdateProblemRequest) -> Self {
        Self {
            title: req.title.map(|t| t.trim().to_string()),
            time_limit: req.time_limit,
            memory_limit: req.memory_limit,
            is_private: req.is_private,
            legend: req.legend,
            input_format: req.input_format,
            output_format: req.output_format,
            notes: req.notes,
            scoring: req.scoring,
            ..Default::default()
        }
    }
}

#[derive(Serialize, utoipa::ToSchema)]
pub struct ProblemResponse {
    pub id: Uuid,
    pub title: String,
    pub time_limit: i32,
    pub memory_limit: i32,
    pub is_private: bool,
    pub legend: String,
    pub input_format: String,
    pub output_format: String,
    pub notes: String,
    pub scoring: String,
    pub legend_html: String,
    pub input_format_html: String,
    pub output_format_html: String,
    pub notes_html: String,
    pub scoring_html: String,
    pub meta: Meta,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<crate::entity::problem::Model> for ProblemResponse {
    fn from(m: crate::entity::problem::Model) -> Self {
        Self {
            id: m.id,
            title: m.title,
            time_limit: m.time_limit,
            memory_limit: m.memory_limit,
            is_private: m.is_private,
            legend: m.legend,
            input_format: m.input_format,
            output_format: m.output_format,
            notes: m.notes,
            scoring: m.scoring,
            legend_html: m.legend_html,
            input_format_html: m.input_format_html,
            output_format_html: m.output_format_html,
            notes_html: m.notes_html,
            scoring_html: m.scoring_html,
            meta: m.meta,
            created_at: m.created_at,
            updated_at: m.updated_at,
        }
    }
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct UploadProblemResponse {
    /// Object storage key of the stored test archive.
    #[schema(example = "problems/0190f5c3-8a4e-7cc1-9f1e-3b2d9a6c1e00/tests.zip")]
    pub tests_key: String,
    pub meta: Meta,
}

/// Limits and timestamps of a problem; statements are left out of listings.
#[derive(Debug, Serialize, FromQueryResult, utoipa::ToSchema)]
pub struct ProblemListItem {
    pub id: Uuid,
    pub title: String,
    pub time_limit: i32,
    pub memory_limit: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct ProblemListResponse {
    pub data: Vec<ProblemListItem>,
    pub pagination: Pagination,
}

/// Query parameters for problem listing.
#[derive(Debug, Default, Deserialize, utoipa::IntoParams)]
pub struct ProblemListQuery {
    /// Page number (1-indexed).
    #[param(example = 1)]
    pub page: Option<u64>,
    /// Items per page (1-100, default 20).
    #[param(example = 20)]
    pub per_page: Option<u64>,
    /// Case-insensitive substring of the title.
    pub search: Option<String>,
    /// One of `created_at` (default), `updated_at`, `title`.
    pub sort_by: Option<String>,
    /// `asc` or `desc` (default).
    pub sort_order: Option<String>,
}

pub fn validate_update_problem(req: &UpdateProblemRequest) -> Result<(), AppError> {
    if let Some(ref title) = req.title {
        validate_title(title)?;
    }
    if let Some(tl) = req.time_limit
        && !(1..=30000).contains(&tl)
    {
        return Err(AppError::Validation("Time limit must be 1-30000 ms".into()));
    }
    if let Some(ml) = req.memory_limit
        && !(1..=8192).contains(&ml)
    {
        return Err(AppError::Validation(
            "Memory limit must be 1-8192 MiB".into(),
        ));
    }
    Ok(())
}
