//! Client for the pandoc rendering service.
//!
//! The service accepts `{text, from, to, html-math-method}` at `/` and an
//! array of the same at `/batch`, answering with `{error, output, base64,
//! messages}` per item.
//!
//! Statement rendering always goes through [`StatementRenderer::batch_convert`].
//! Single conversion is exposed for embedders that render one document.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("rendering service request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("rendering service returned status {0}")]
    Status(u16),
    #[error("failed to decode rendering service response: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("rendering service returned {actual} results for {expected} inputs")]
    FieldCount { expected: usize, actual: usize },
    #[error("statement conversion failed: {}", .0.join("; "))]
    Conversion(Vec<String>),
}

#[derive(Debug, Serialize)]
struct Conversion<'a> {
    text: &'a str,
    from: &'a str,
    to: &'a str,
    #[serde(rename = "html-math-method")]
    math: &'a str,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct RenderMessage {
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub verbosity: String,
}

/// One item of a rendering response. A non-empty `error` fails the item.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ConversionOutput {
    #[serde(default)]
    pub error: String,
    #[serde(default)]
    pub output: String,
    #[serde(default)]
    pub base64: bool,
    #[serde(default)]
    pub messages: Vec<RenderMessage>,
}

impl ConversionOutput {
    pub fn ok(output: impl Into<String>) -> Self {
        Self {
            output: output.into(),
            ..Default::default()
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            ..Default::default()
        }
    }
}

/// Converts LaTeX statement sources into HTML5.
#[async_trait]
pub trait StatementRenderer: Send + Sync {
    /// Convert a single document. A non-empty `error` from the service is a
    /// [`RenderError::Conversion`].
    async fn convert(&self, text: &str) -> Result<String, RenderError>;

    /// Convert several documents in one round trip. The result has the same
    /// length and order as `texts`; per-item errors are reported in-band.
    async fn batch_convert(&self, texts: &[String]) -> Result<Vec<ConversionOutput>, RenderError>;
}

pub struct PandocClient {
    client: Client,
    base_url: String,
}

impl PandocClient {
    const FROM: &'static str = "latex";
    const TO: &'static str = "html5";
    const MATH: &'static str = "katex";

    pub fn new(client: Client, base_url: &str) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    fn conversion(text: &str) -> Conversion<'_> {
        Conversion {
            text,
            from: Self::FROM,
            to: Self::TO,
            math: Self::MATH,
        }
    }

    async fn post<T: Serialize + ?Sized>(&self, path: &str, body: &T) -> Result<Vec<u8>, RenderError> {
        let res = self
            .client
            .post(format!("{}{path}", self.base_url))
            .json(body)
            .send()
            .await?;

        let status = res.status();
        if !status.is_success() {
            return Err(RenderError::Status(status.as_u16()));
        }
        Ok(res.bytes().await?.to_vec())
    }
}

#[async_trait]
impl StatementRenderer for PandocClient {
    async fn convert(&self, text: &str) -> Result<String, RenderError> {
        let body = self.post("/", &Self::conversion(text)).await?;
        let result: ConversionOutput = serde_json::from_slice(&body)?;
        if !result.error.is_empty() {
            return Err(RenderError::Conversion(vec![result.error]));
        }
        Ok(result.output)
    }

    async fn batch_convert(&self, texts: &[String]) -> Result<Vec<ConversionOutput>, RenderError> {
        let list: Vec<Conversion<'_>> = texts.iter().map(|t| Self::conversion(t)).collect();
        let body = self.post("/batch", &list).await?;
        let result: Vec<ConversionOutput> = serde_json::from_slice(&body)?;

        if result.len() != texts.len() {
            return Err(RenderError::FieldCount {
                expected: texts.len(),
                actual: result.len(),
            });
        }
        Ok(result)
    }
}
