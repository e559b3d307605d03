//! HTTP fetch + output document utilities for brickscout.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};
use reqwest::StatusCode;
use serde::Serialize;
use thiserror::Error;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info_span, Instrument};
use uuid::Uuid;

pub use reqwest::header;
pub use reqwest::Url;

pub const CRATE_NAME: &str = "brickscout-storage";

pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/91.0.4472.124 Safari/537.36";

#[derive(Debug, Clone)]
pub struct HttpClientConfig {
    /// `None` leaves the transport defaults in place.
    pub timeout: Option<Duration>,
    pub user_agent: Option<String>,
}

impl Default for HttpClientConfig {
    fn default() -> Self {
        Self {
            timeout: None,
            user_agent: Some(DEFAULT_USER_AGENT.to_string()),
        }
    }
}

#[derive(Debug, Clone)]
pub struct FetchedResponse {
    pub status: StatusCode,
    pub final_url: String,
    pub body: String,
}

/// Non-success status or transport failure. Never carries partial data.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("http status {status} for {url}")]
    HttpStatus { status: u16, url: String },
}

/// Single GET per call: no retries, no shared mutable state.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    pub fn new(config: HttpClientConfig) -> anyhow::Result<Self> {
        let mut builder = reqwest::Client::builder().gzip(true).brotli(true);

        if let Some(timeout) = config.timeout {
            builder = builder.timeout(timeout);
        }
        if let Some(user_agent) = &config.user_agent {
            let mut defaults = HeaderMap::new();
            defaults.insert(
                USER_AGENT,
                HeaderValue::from_str(user_agent).context("invalid user agent header")?,
            );
            builder = builder.default_headers(defaults);
        }

        let client = builder.build().context("building reqwest client")?;
        Ok(Self { client })
    }

    pub async fn fetch_text(
        &self,
        source_id: &str,
        url: &str,
        headers: HeaderMap,
    ) -> Result<FetchedResponse, FetchError> {
        let span = info_span!("http_fetch", source_id, url);
        async move {
            let resp = self.client.get(url).headers(headers).send().await?;
            let status = resp.status();
            let final_url = resp.url().to_string();

            if !status.is_success() {
                return Err(FetchError::HttpStatus {
                    status: status.as_u16(),
                    url: final_url,
                });
            }

            let body = resp.text().await?;
            debug!(status = status.as_u16(), bytes = body.len(), "fetched");
            Ok(FetchedResponse {
                status,
                final_url,
                body,
            })
        }
        .instrument(span)
        .await
    }
}

#[derive(Debug, Clone)]
pub struct WrittenDocument {
    pub path: PathBuf,
    pub byte_size: usize,
}

/// Serialize `value` as 2-space pretty JSON and atomically replace `path` with it.
pub async fn write_json_document<T: Serialize + ?Sized>(
    path: impl AsRef<Path>,
    value: &T,
) -> anyhow::Result<WrittenDocument> {
    let path = path.as_ref();
    let bytes = serde_json::to_vec_pretty(value)
        .with_context(|| format!("serializing {}", path.display()))?;

    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    };
    fs::create_dir_all(&parent)
        .await
        .with_context(|| format!("creating output directory {}", parent.display()))?;

    let temp_path = parent.join(format!(".{}.{}.tmp", Uuid::new_v4(), bytes.len()));
    if let Err(err) = stage_and_rename(&temp_path, path, &bytes).await {
        let _ = fs::remove_file(&temp_path).await;
        return Err(err);
    }

    Ok(WrittenDocument {
        path: path.to_path_buf(),
        byte_size: bytes.len(),
    })
}

/// Write `bytes` to `temp_path` and move it over `path`. The caller removes `temp_path` on error.
async fn stage_and_rename(temp_path: &Path, path: &Path, bytes: &[u8]) -> anyhow::Result<()> {
    let mut file = fs::OpenOptions::new()
        .create_new(true)
        .write(true)
        .open(temp_path)
        .await
        .with_context(|| format!("opening temp document {}", temp_path.display()))?;
    file.write_all(bytes)
        .await
        .with_context(|| format!("writing temp document {}", temp_path.display()))?;
    file.flush()
        .await
        .with_context(|| format!("flushing temp document {}", temp_path.display()))?;
    drop(file);

    fs::rename(temp_path, path).await.with_context(|| {
        format!(
            "atomically renaming temp document {} -> {}",
            temp_path.display(),
            path.display()
        )
    })
}
