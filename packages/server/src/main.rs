use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use common::storage::build_object_store;
use tracing::{Level, info};

use server::config::AppConfig;
use server::database::init_db;
use server::pandoc::PandocClient;
use server::problems::{IngestSettings, ProblemService};
use server::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt().with_max_level(Level::INFO).init();

    let config = AppConfig::load().context("Failed to load configuration")?;

    let db = init_db(&config.database.url)
        .await
        .context("Failed to connect to database")?;

    let store = build_object_store(&config.storage)
        .await
        .context("Failed to initialize object storage")?;
    info!(backend = ?config.storage.backend, "Object storage ready");

    let http = reqwest::Client::builder()
        .timeout(Duration::from_secs(config.pandoc.timeout_secs))
        .build()
        .context("Failed to build HTTP client")?;
    let renderer = Arc::new(PandocClient::new(http, &config.pandoc.url));

    tokio::fs::create_dir_all(&config.problem.cache_dir)
        .await
        .with_context(|| {
            format!("Failed to create cache dir {}", config.problem.cache_dir.display())
        })?;

    let problems = Arc::new(ProblemService::new(
        db,
        renderer,
        store,
        IngestSettings::from_config(&config),
    ));

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port)
        .parse()
        .context("Invalid server address")?;

    let state = AppState {
        config: Arc::new(config),
        problems,
    };
    let app = server::build_router(state);

    info!("Server running at http://{}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
