use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

use crate::models::problem::Meta;

#[sea_orm::model]
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "problem")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    pub title: String,
    pub time_limit: i32,   // in milliseconds
    pub memory_limit: i32, // in mebibytes
    pub is_private: bool,

    // Statement source (LaTeX)
    #[sea_orm(column_type = "Text")]
    pub legend: String,
    #[sea_orm(column_type = "Text")]
    pub input_format: String,
    #[sea_orm(column_type = "Text")]
    pub output_format: String,
    #[sea_orm(column_type = "Text")]
    pub notes: String,
    #[sea_orm(column_type = "Text")]
    pub scoring: String,

    // Rendered, sanitized statement
    #[sea_orm(column_type = "Text")]
    pub legend_html: String,
    #[sea_orm(column_type = "Text")]
    pub input_format_html: String,
    #[sea_orm(column_type = "Text")]
    pub output_format_html: String,
    #[sea_orm(column_type = "Text")]
    pub notes_html: String,
    #[sea_orm(column_type = "Text")]
    pub scoring_html: String,

    #[sea_orm(column_type = "JsonBinary")]
    pub meta: Meta,

    /// Bumped on every write; guards read-render-write cycles.
    pub version: i32,

    pub created_at: DateTimeUtc,
    pub updated_at: DateTimeUtc,
}

impl ActiveModelBehavior for ActiveModel {}
