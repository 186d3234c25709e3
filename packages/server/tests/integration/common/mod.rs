use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use axum::Json;
use axum::extract::State;
use axum::routing::post;
use reqwest::Client;
use sea_orm::DatabaseConnection;
use serde_json::{Value, json};
use tempfile::TempDir;
use uuid::Uuid;

use ::common::config::StorageConfig;
use ::common::storage::filesystem::FilesystemObjectStore;
use server::config::{
    AppConfig, CorsConfig, DatabaseConfig, PandocConfig, ProblemConfig, ServerConfig,
};
use server::entity::problem;
use server::models::problem::Meta;
use server::pandoc::PandocClient;
use server::problems::{IngestSettings, ProblemService};
use server::state::AppState;

pub mod routes {
    use uuid::Uuid;

    pub const PROBLEMS: &str = "/api/v1/problems";

    pub fn problem(id: Uuid) -> String {
        format!("/api/v1/problems/{id}")
    }

    pub fn problem_archive(id: Uuid) -> String {
        format!("/api/v1/problems/{id}/archive")
    }
}

/// Requests received by the fake rendering service, as raw JSON.
pub type RenderLog = Arc<Mutex<Vec<Value>>>;

/// Strip the `\begin{document}` envelope and wrap what is left in `<p>`.
/// Sources containing `\undefined` fail like an unknown LaTeX macro would.
fn fake_render(item: &Value) -> Value {
    let text = item["text"].as_str().unwrap_or_default();
    if text.contains("\\undefined") {
        return json!({ "error": "Undefined control sequence \\undefined" });
    }
    if text.is_empty() {
        return json!({ "output": "" });
    }
    let body = text
        .trim_start_matches("\\begin{document}")
        .trim_end()
        .trim_end_matches("\\end{document}")
        .trim();
    json!({
        "output": format!("<p onclick=\"steal()\">{body}</p><script>alert(1)</script>"),
        "base64": false,
        "messages": [],
    })
}

async fn fake_convert(State(log): State<RenderLog>, Json(item): Json<Value>) -> Json<Value> {
    log.lock().unwrap().push(item.clone());
    Json(fake_render(&item))
}

async fn fake_batch(State(log): State<RenderLog>, Json(items): Json<Vec<Value>>) -> Json<Value> {
    log.lock().unwrap().extend(items.iter().cloned());
    Json(Value::Array(items.iter().map(fake_render).collect()))
}

/// Start an in-process stand-in for the pandoc service.
pub async fn spawn_fake_pandoc() -> (String, RenderLog) {
    let log: RenderLog = Arc::default();
    let app = axum::Router::new()
        .route("/", post(fake_convert))
        .route("/batch", post(fake_batch))
        .with_state(log.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind fake pandoc");
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    (format!("http://{addr}"), log)
}

/// Build a ZIP archive in memory with given file entries.
pub fn build_zip(files: &[(&str, &str)]) -> Vec<u8> {
    use std::io::Write;
    let cursor = std::io::Cursor::new(Vec::new());
    let mut writer = zip::ZipWriter::new(cursor);
    let options =
        zip::write::SimpleFileOptions::default().compression_method(zip::CompressionMethod::Deflated);
    for (name, content) in files {
        writer.start_file(*name, options).expect("zip start_file");
        writer.write_all(content.as_bytes()).expect("zip write_all");
    }
    writer.finish().expect("zip finish").into_inner()
}

/// A stored problem row as the database would return it.
pub fn problem_row(id: Uuid, version: i32) -> problem::Model {
    let now = chrono::Utc::now();
    problem::Model {
        id,
        title: "Untitled".into(),
        time_limit: 1000,
        memory_limit: 256,
        is_private: true,
        legend: String::new(),
        input_format: String::new(),
        output_format: String::new(),
        notes: String::new(),
        scoring: String::new(),
        legend_html: String::new(),
        input_format_html: String::new(),
        output_format_html: String::new(),
        notes_html: String::new(),
        scoring_html: String::new(),
        meta: Meta::default(),
        version,
        created_at: now,
        updated_at: now,
    }
}

/// Parsed HTTP response for test assertions.
pub struct TestResponse {
    pub status: u16,
    /// Raw response body as text.
    pub text: String,
    /// Parsed JSON body, or `Null` if the response is not valid JSON.
    pub body: Value,
}

impl TestResponse {
    async fn from_response(res: reqwest::Response) -> Self {
        let status = res.status().as_u16();
        let text = res.text().await.expect("Failed to read response body");
        let body = serde_json::from_str(&text).unwrap_or(Value::Null);
        Self { status, text, body }
    }
}

pub struct TestApp {
    pub addr: SocketAddr,
    pub client: Client,
    /// Shares the mock's transaction log with the server.
    pub db: DatabaseConnection,
    pub problems: Arc<ProblemService>,
    pub render_log: RenderLog,
    /// Holds the object store and cache directories.
    pub dir: TempDir,
}

pub const MAX_ARCHIVE_SIZE: u64 = 64 * 1024;

impl TestApp {
    /// Serve the API over `db`, a filesystem object store and a fake
    /// rendering service.
    pub async fn spawn(db: DatabaseConnection) -> Self {
        let dir = tempfile::tempdir().expect("Failed to create temp dir");
        let (pandoc_url, render_log) = spawn_fake_pandoc().await;

        let app_config = AppConfig {
            server: ServerConfig {
                host: "127.0.0.1".to_string(),
                port: 0,
                cors: CorsConfig::default(),
            },
            database: DatabaseConfig {
                url: "postgres://unused".to_string(),
            },
            pandoc: PandocConfig {
                url: pandoc_url.clone(),
                timeout_secs: 5,
            },
            storage: StorageConfig {
                part_size: 512,
                filesystem_root: dir.path().join("objects"),
                ..Default::default()
            },
            problem: ProblemConfig {
                max_archive_size: MAX_ARCHIVE_SIZE,
                cache_dir: dir.path().join("cache"),
                ..Default::default()
            },
        };

        let store = FilesystemObjectStore::new(app_config.storage.filesystem_root.clone())
            .await
            .expect("Failed to create object store");
        let problems = Arc::new(ProblemService::new(
            db.clone(),
            Arc::new(PandocClient::new(Client::new(), &pandoc_url)),
            Arc::new(store),
            IngestSettings::from_config(&app_config),
        ));

        let state = AppState {
            config: Arc::new(app_config),
            problems: problems.clone(),
        };
        let app = server::build_router(state);

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind to random port");
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            addr,
            client: Client::new(),
            db,
            problems,
            render_log,
            dir,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    /// SQL statements executed so far, rendered with their bound values.
    pub fn executed_sql(&self) -> String {
        format!("{:?}", self.db.clone().into_transaction_log())
    }

    pub async fn get(&self, path: &str) -> TestResponse {
        let res = self
            .client
            .get(self.url(path))
            .send()
            .await
            .expect("Failed to send GET request");

        TestResponse::from_response(res).await
    }

    pub async fn delete(&self, path: &str) -> TestResponse {
        let res = self
            .client
            .delete(self.url(path))
            .send()
            .await
            .expect("Failed to send DELETE request");

        TestResponse::from_response(res).await
    }

    pub async fn patch(&self, path: &str, body: &Value) -> TestResponse {
        let res = self
            .client
            .patch(self.url(path))
            .json(body)
            .send()
            .await
            .expect("Failed to send PATCH request");

        TestResponse::from_response(res).await
    }

    pub async fn upload(&self, path: &str, file_bytes: Vec<u8>) -> TestResponse {
        let part = reqwest::multipart::Part::bytes(file_bytes)
            .file_name("problem.zip")
            .mime_str("application/zip")
            .expect("Failed to set MIME type");
        let form = reqwest::multipart::Form::new().part("file", part);

        let res = self
            .client
            .post(self.url(path))
            .multipart(form)
            .send()
            .await
            .expect("Failed to send multipart upload request");

        TestResponse::from_response(res).await
    }
}
