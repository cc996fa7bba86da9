//! Remote submission: the concrete unit of work for one file.
//!
//! Each file is POSTed to the configured endpoint as `multipart/form-data`
//! with two parts, `file` (the raw bytes) and `query` (the fixed payload read
//! once at startup). The JSON response is validated, optionally re-indented,
//! and written to `<output_dir>/<stem>.<ext>`.
//!
//! Every failure here is per-item: it becomes an [`ItemError`] for that file
//! and never touches sibling executions.
//!
//! ## Atomic artifact writes
//!
//! The artifact is written to a temp file inside the output directory and
//! then renamed over the target. A crash mid-write never leaves a truncated
//! artifact behind, and two inputs sharing a stem never interleave bytes.

use crate::config::BatchConfig;
use crate::error::{BatchError, ItemError};
use crate::output::ItemStats;
use crate::pipeline::dispatch::WorkItemProcessor;
use crate::pipeline::pages;
use reqwest::multipart::{Form, Part};
use std::future::Future;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Submits files to the remote service and persists the responses.
///
/// Cheap to share: one instance serves every concurrent execution.
#[derive(Debug)]
pub struct RemoteProcessor {
    client: reqwest::Client,
    endpoint: reqwest::Url,
    query: Arc<str>,
    config: BatchConfig,
}

impl RemoteProcessor {
    /// Build the processor and its shared HTTP client.
    pub fn new(config: &BatchConfig, query: Arc<str>) -> Result<Self, BatchError> {
        let endpoint = reqwest::Url::parse(&config.endpoint)
            .map_err(|e| BatchError::InvalidConfig(format!("endpoint: {e}")))?;

        let mut builder = reqwest::Client::builder();
        if config.request_timeout_secs > 0 {
            builder = builder.timeout(Duration::from_secs(config.request_timeout_secs));
        }
        let client = builder
            .build()
            .map_err(|e| BatchError::HttpClient(e.to_string()))?;

        Ok(Self {
            client,
            endpoint,
            query,
            config: config.clone(),
        })
    }

    /// POST one file and return the raw response body.
    async fn submit(&self, path: &Path) -> Result<Vec<u8>, ItemError> {
        let content = tokio::fs::read(path)
            .await
            .map_err(|e| ItemError::ReadInput {
                path: path.to_path_buf(),
                detail: e.to_string(),
            })?;
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let form = build_form(file_name, content, &self.query);

        let response = self
            .client
            .post(self.endpoint.clone())
            .multipart(form)
            .send()
            .await
            .map_err(|e| self.request_error(e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ItemError::BadStatus {
                status: status.as_u16(),
                reason: status.canonical_reason().unwrap_or_default().to_string(),
            });
        }

        let body = response.bytes().await.map_err(|e| self.request_error(e))?;
        debug!("{}: {} response bytes", path.display(), body.len());
        Ok(body.to_vec())
    }

    fn request_error(&self, e: reqwest::Error) -> ItemError {
        if e.is_timeout() {
            ItemError::Timeout {
                secs: self.config.request_timeout_secs,
            }
        } else {
            ItemError::Request {
                detail: e.to_string(),
            }
        }
    }
}

impl WorkItemProcessor for RemoteProcessor {
    fn process(&self, path: PathBuf) -> impl Future<Output = Result<ItemStats, ItemError>> + Send {
        async move {
            let body = self.submit(&path).await?;
            let artifact = format_body(&body, self.config.pretty_print)?;
            let target = self.config.output_path_for(&path);
            write_artifact(&target, artifact).await?;

            let pages = if self.config.count_pages {
                pages::count_pages(&path).await
            } else {
                None
            };
            Ok(ItemStats {
                pages,
                output: Some(target),
            })
        }
    }
}

/// Two-part form: `file` with the input's base name, `query` as a text field.
pub fn build_form(file_name: String, content: Vec<u8>, query: &str) -> Form {
    Form::new()
        .part("file", Part::bytes(content).file_name(file_name))
        .part("query", Part::text(query.to_string()))
}

/// Validate the response as JSON and, when `pretty` is set, re-indent it with
/// two spaces and a trailing newline. Otherwise the body is kept verbatim.
pub fn format_body(body: &[u8], pretty: bool) -> Result<Vec<u8>, ItemError> {
    let value: serde_json::Value =
        serde_json::from_slice(body).map_err(|e| ItemError::MalformedResponse {
            detail: e.to_string(),
        })?;
    if !pretty {
        return Ok(body.to_vec());
    }
    let mut out = serde_json::to_vec_pretty(&value).map_err(|e| ItemError::MalformedResponse {
        detail: e.to_string(),
    })?;
    out.push(b'\n');
    Ok(out)
}

/// Write `bytes` to `target` via a temp file in the same directory, replacing
/// any existing file.
pub async fn write_artifact(target: &Path, bytes: Vec<u8>) -> Result<(), ItemError> {
    let dest = target.to_path_buf();
    let result = tokio::task::spawn_blocking(move || -> std::io::Result<()> {
        let dir = dest
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or(Path::new("."));
        let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
        tmp.write_all(&bytes)?;
        tmp.persist(&dest).map_err(|e| e.error)?;
        Ok(())
    })
    .await;

    let detail = match result {
        Ok(Ok(())) => return Ok(()),
        Ok(Err(e)) => e.to_string(),
        Err(e) => format!("write task panicked: {e}"),
    };
    Err(ItemError::OutputWriteFailed {
        path: target.to_path_buf(),
        detail,
    })
}
