use std::sync::Arc;

use crate::config::AppConfig;
use crate::problems::ProblemService;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub problems: Arc<ProblemService>,
}
