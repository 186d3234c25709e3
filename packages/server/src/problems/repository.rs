use chrono::Utc;
use sea_orm::prelude::Expr;
use sea_orm::sea_query::{Func, LikeExpr};
use sea_orm::*;
use uuid::Uuid;

use crate::entity::problem;
use crate::error::AppError;
use crate::models::problem::{
    Pagination, ProblemListItem, ProblemListQuery, ProblemListResponse, ProblemUpdate,
    escape_like,
};

const DEFAULT_PER_PAGE: u64 = 20;
const MAX_PER_PAGE: u64 = 100;

pub async fn find_problem<C: ConnectionTrait>(db: &C, id: Uuid) -> Result<problem::Model, AppError> {
    problem::Entity::find_by_id(id)
        .one(db)
        .await?
        .ok_or_else(|| AppError::NotFound("Problem not found".into()))
}

fn set<V>(
    query: UpdateMany<problem::Entity>,
    column: problem::Column,
    value: &Option<V>,
) -> UpdateMany<problem::Entity>
where
    V: Clone + Into<Value>,
{
    match value {
        Some(v) => query.col_expr(column, Expr::value(v.clone())),
        None => query,
    }
}

/// Write every present field of `update` if the row is still at
/// `expected_version`, bumping the version. Returns `false` when the row
/// changed (or vanished) since it was read.
pub async fn apply_update_if_version<C: ConnectionTrait>(
    db: &C,
    id: Uuid,
    expected_version: i32,
    update: &ProblemUpdate,
) -> Result<bool, DbErr> {
    use problem::Column as Col;

    let mut query = problem::Entity::update_many()
        .col_expr(Col::Version, Expr::value(expected_version.wrapping_add(1)))
        .col_expr(Col::UpdatedAt, Expr::value(Utc::now()))
        .filter(Col::Id.eq(id))
        .filter(Col::Version.eq(expected_version));

    query = set(query, Col::Title, &update.title);
    query = set(query, Col::TimeLimit, &update.time_limit);
    query = set(query, Col::MemoryLimit, &update.memory_limit);
    query = set(query, Col::IsPrivate, &update.is_private);
    query = set(query, Col::Legend, &update.legend);
    query = set(query, Col::InputFormat, &update.input_format);
    query = set(query, Col::OutputFormat, &update.output_format);
    query = set(query, Col::Notes, &update.notes);
    query = set(query, Col::Scoring, &update.scoring);
    query = set(query, Col::LegendHtml, &update.legend_html);
    query = set(query, Col::InputFormatHtml, &update.input_format_html);
    query = set(query, Col::OutputFormatHtml, &update.output_format_html);
    query = set(query, Col::NotesHtml, &update.notes_html);
    query = set(query, Col::ScoringHtml, &update.scoring_html);
    query = set(query, Col::Meta, &update.meta);

    let result = query.exec(db).await?;
    Ok(result.rows_affected > 0)
}

fn sort_column(sort_by: Option<&str>) -> Result<problem::Column, AppError> {
    match sort_by.unwrap_or("created_at") {
        "created_at" => Ok(problem::Column::CreatedAt),
        "updated_at" => Ok(problem::Column::UpdatedAt),
        "title" => Ok(problem::Column::Title),
        _ => Err(AppError::Validation(
            "sort_by must be one of: created_at, updated_at, title".into(),
        )),
    }
}

/// One page of problems matching `query`, newest first unless told otherwise.
pub async fn list_problems<C: ConnectionTrait>(
    db: &C,
    query: &ProblemListQuery,
) -> Result<ProblemListResponse, AppError> {
    let page = Ord::max(query.page.unwrap_or(1), 1);
    let per_page = query.per_page.unwrap_or(DEFAULT_PER_PAGE).clamp(1, MAX_PER_PAGE);
    let sort_column = sort_column(query.sort_by.as_deref())?;
    let sort_order = match query.sort_order.as_deref() {
        None | Some("desc") => Order::Desc,
        Some("asc") => Order::Asc,
        Some(_) => {
            return Err(AppError::Validation(
                "sort_order must be one of: asc, desc".into(),
            ));
        }
    };

    let mut select = problem::Entity::find();
    if let Some(ref search) = query.search {
        let term = escape_like(search.trim());
        if !term.is_empty() {
            select = select.filter(
                Expr::expr(Func::lower(Expr::col(problem::Column::Title)))
                    .like(LikeExpr::new(format!("%{}%", term.to_lowercase())).escape('\\')),
            );
        }
    }

    let total = select.clone().paginate(db, per_page).num_items().await?;
    let total_pages = total.div_ceil(per_page);

    let data = select
        .order_by(sort_column, sort_order)
        .order_by_asc(problem::Column::Id)
        .select_only()
        .column(problem::Column::Id)
        .column(problem::Column::Title)
        .column(problem::Column::TimeLimit)
        .column(problem::Column::MemoryLimit)
        .column(problem::Column::CreatedAt)
        .column(problem::Column::UpdatedAt)
        .offset(Some((page - 1) * per_page))
        .limit(Some(per_page))
        .into_model::<ProblemListItem>()
        .all(db)
        .await?;

    Ok(ProblemListResponse {
        data,
        pagination: Pagination {
            page,
            per_page,
            total,
            total_pages,
        },
    })
}

/// Remove the problem row. Returns `false` when no such row exists.
pub async fn delete_problem<C: ConnectionTrait>(db: &C, id: Uuid) -> Result<bool, DbErr> {
    let result = problem::Entity::delete_by_id(id).exec(db).await?;
    Ok(result.rows_affected > 0)
}
