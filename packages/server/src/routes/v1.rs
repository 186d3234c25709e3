use utoipa_axum::router::OpenApiRouter;
use utoipa_axum::routes;

use crate::config::AppConfig;
use crate::handlers;
use crate::state::AppState;

pub fn routes(config: &AppConfig) -> OpenApiRouter<AppState> {
    OpenApiRouter::new().nest("/problems", problem_routes(config))
}

fn problem_routes(config: &AppConfig) -> OpenApiRouter<AppState> {
    let crud = OpenApiRouter::new()
        .routes(routes!(handlers::problem::list_problems))
        .routes(routes!(
            handlers::problem::get_problem,
            handlers::problem::update_problem,
            handlers::problem::delete_problem
        ));

    let upload = OpenApiRouter::new()
        .routes(routes!(handlers::problem::upload_problem_archive))
        .layer(handlers::problem::upload_body_limit(
            config.problem.max_archive_size,
        ));

    crud.merge(upload)
}
