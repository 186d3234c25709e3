use std::path::PathBuf;

use common::config::StorageConfig;
use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;

#[derive(Debug, Deserialize, Clone)]
pub struct CorsConfig {
    pub allow_origins: Vec<String>,
    pub max_age: u64,
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            allow_origins: Vec::new(),
            max_age: 3600,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    #[serde(default)]
    pub cors: CorsConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    pub url: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct PandocConfig {
    /// Base URL of the rendering service, e.g. `http://pandoc:3030`.
    pub url: String,
    #[serde(default = "default_pandoc_timeout")]
    pub timeout_secs: u64,
}

fn default_pandoc_timeout() -> u64 {
    30
}

#[derive(Debug, Deserialize, Clone)]
pub struct ProblemConfig {
    #[serde(default = "default_locale")]
    pub locale: String,
    /// Maximum accepted problem package size in bytes.
    #[serde(default = "default_max_archive_size")]
    pub max_archive_size: u64,
    #[serde(default = "default_cache_dir")]
    pub cache_dir: PathBuf,
}

fn default_locale() -> String {
    "russian".into()
}

fn default_max_archive_size() -> u64 {
    128 * 1024 * 1024
}

fn default_cache_dir() -> PathBuf {
    PathBuf::from("/tmp/gate")
}

impl Default for ProblemConfig {
    fn default() -> Self {
        Self {
            locale: default_locale(),
            max_archive_size: default_max_archive_size(),
            cache_dir: default_cache_dir(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub pandoc: PandocConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub problem: ProblemConfig,
}

impl AppConfig {
    pub fn load() -> Result<Self, ConfigError> {
        let s = Config::builder()
            .set_default("server.host", "127.0.0.1")?
            .set_default("server.port", 3000)?
            .set_default("pandoc.url", "http://127.0.0.1:3030")?
            // Load from config/config.toml
            .add_source(File::with_name("config/config").required(false))
            // Override from environment (e.g., GATE__DATABASE__URL)
            .add_source(Environment::with_prefix("GATE").separator("__"))
            .build()?;

        s.try_deserialize()
    }
}
