//! Configuration types for a batch run.
//!
//! Every knob lives in [`BatchConfig`], built via its [`BatchConfigBuilder`].
//! The config is constructed once, validated, and then shared by reference
//! with every component; nothing mutates it after the pipeline starts.

use crate::error::BatchError;
use crate::pipeline::dispatch::MAX_CONCURRENCY;
use crate::progress::ProgressCallback;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Default remote endpoint.
pub const DEFAULT_ENDPOINT: &str = "http://cloud.science-miner.com/nerd/service/disambiguate";

/// Configuration for a batch run.
///
/// # Example
/// ```rust
/// use batchfish::BatchConfig;
///
/// let config = BatchConfig::builder()
///     .input_root("in/")
///     .output_dir("out/")
///     .max_concurrent(4)
///     .pretty_print(true)
///     .build()
///     .unwrap();
/// ```
#[derive(Clone)]
pub struct BatchConfig {
    /// Remote endpoint receiving one multipart POST per file.
    pub endpoint: String,

    /// Root of the tree to walk. Default: `in/`.
    pub input_root: PathBuf,

    /// Directory receiving one artifact per successful file. Default: `out/`.
    pub output_dir: PathBuf,

    /// File holding the fixed query payload. Default: `query.json`.
    pub query_path: PathBuf,

    /// Inline query payload. Takes precedence over `query_path`.
    pub query: Option<String>,

    /// Files whose direct parent equals this directory are skipped.
    /// A relative path is resolved against `input_root`.
    pub skip_dir: Option<PathBuf>,

    /// Maximum number of simultaneous remote calls. Default: 10.
    ///
    /// The remote service is the bottleneck; raising this past what it can
    /// absorb only moves the queue from here to there.
    pub max_concurrent: usize,

    /// Re-indent the response JSON before writing. Default: false.
    pub pretty_print: bool,

    /// Extension replacing the input's extension in artifact names. Default: `json`.
    pub output_extension: String,

    /// Per-request timeout in seconds; 0 disables it. Default: 120.
    pub request_timeout_secs: u64,

    /// Count PDF pages of successful inputs for throughput stats. Default: true.
    pub count_pages: bool,

    /// Optional per-item event sink.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            input_root: PathBuf::from("in/"),
            output_dir: PathBuf::from("out/"),
            query_path: PathBuf::from("query.json"),
            query: None,
            skip_dir: None,
            max_concurrent: 10,
            pretty_print: false,
            output_extension: "json".to_string(),
            request_timeout_secs: 120,
            count_pages: true,
            progress_callback: None,
        }
    }
}

impl fmt::Debug for BatchConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BatchConfig")
            .field("endpoint", &self.endpoint)
            .field("input_root", &self.input_root)
            .field("output_dir", &self.output_dir)
            .field("query_path", &self.query_path)
            .field("query", &self.query.as_ref().map(|q| format!("<{} bytes>", q.len())))
            .field("skip_dir", &self.skip_dir)
            .field("max_concurrent", &self.max_concurrent)
            .field("pretty_print", &self.pretty_print)
            .field("output_extension", &self.output_extension)
            .field("request_timeout_secs", &self.request_timeout_secs)
            .field("count_pages", &self.count_pages)
            .field(
                "progress_callback",
                &self.progress_callback.as_ref().map(|_| "<dyn BatchProgressCallback>"),
            )
            .finish()
    }
}

impl BatchConfig {
    /// Create a new builder for `BatchConfig`.
    pub fn builder() -> BatchConfigBuilder {
        BatchConfigBuilder {
            config: Self::default(),
        }
    }

    /// Read the query payload once. The inline payload wins over the file.
    pub async fn load_query(&self) -> Result<Arc<str>, BatchError> {
        if let Some(ref q) = self.query {
            return Ok(Arc::from(q.as_str()));
        }
        let text = tokio::fs::read_to_string(&self.query_path)
            .await
            .map_err(|e| BatchError::QueryUnreadable {
                path: self.query_path.clone(),
                source: e,
            })?;
        Ok(Arc::from(text))
    }

    /// Artifact path for `input`: base name with its extension replaced.
    pub fn output_path_for(&self, input: &Path) -> PathBuf {
        let mut name = input
            .file_stem()
            .map(|s| s.to_os_string())
            .unwrap_or_default();
        name.push(".");
        name.push(&self.output_extension);
        self.output_dir.join(name)
    }
}

/// Builder for [`BatchConfig`].
#[derive(Debug)]
pub struct BatchConfigBuilder {
    config: BatchConfig,
}

impl BatchConfigBuilder {
    pub fn endpoint(mut self, url: impl Into<String>) -> Self {
        self.config.endpoint = url.into();
        self
    }

    pub fn input_root(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.input_root = path.into();
        self
    }

    pub fn output_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.output_dir = path.into();
        self
    }

    pub fn query_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.query_path = path.into();
        self
    }

    pub fn query(mut self, payload: impl Into<String>) -> Self {
        self.config.query = Some(payload.into());
        self
    }

    pub fn skip_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.skip_dir = Some(path.into());
        self
    }

    pub fn max_concurrent(mut self, n: usize) -> Self {
        self.config.max_concurrent = n.max(1);
        self
    }

    pub fn pretty_print(mut self, v: bool) -> Self {
        self.config.pretty_print = v;
        self
    }

    pub fn output_extension(mut self, ext: impl Into<String>) -> Self {
        self.config.output_extension = ext.into();
        self
    }

    pub fn request_timeout_secs(mut self, secs: u64) -> Self {
        self.config.request_timeout_secs = secs;
        self
    }

    pub fn count_pages(mut self, v: bool) -> Self {
        self.config.count_pages = v;
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<BatchConfig, BatchError> {
        let c = &self.config;
        if c.max_concurrent == 0 {
            return Err(BatchError::InvalidConfig(
                "max_concurrent must be ≥ 1".into(),
            ));
        }
        if c.max_concurrent > MAX_CONCURRENCY {
            return Err(BatchError::InvalidConfig(format!(
                "max_concurrent must be ≤ {}, got {}",
                MAX_CONCURRENCY, c.max_concurrent
            )));
        }
        let url = reqwest::Url::parse(&c.endpoint).map_err(|e| {
            BatchError::InvalidConfig(format!("endpoint '{}' is not a valid URL: {}", c.endpoint, e))
        })?;
        if url.scheme() != "http" && url.scheme() != "https" {
            return Err(BatchError::InvalidConfig(format!(
                "endpoint scheme must be http or https, got '{}'",
                url.scheme()
            )));
        }
        let ext = c.output_extension.trim_start_matches('.').to_string();
        if ext.is_empty() || ext.contains(['/', '\\']) {
            return Err(BatchError::InvalidConfig(format!(
                "output extension '{}' is not a plain file extension",
                c.output_extension
            )));
        }
        let mut config = self.config;
        config.output_extension = ext;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_cli_defaults() {
        let c = BatchConfig::default();
        assert_eq!(c.endpoint, DEFAULT_ENDPOINT);
        assert_eq!(c.max_concurrent, 10);
        assert_eq!(c.output_extension, "json");
        assert!(!c.pretty_print);
        assert!(c.count_pages);
    }

    #[test]
    fn concurrency_is_clamped() {
        let c = BatchConfig::builder().max_concurrent(0).build().unwrap();
        assert_eq!(c.max_concurrent, 1);
    }

    #[test]
    fn rejects_concurrency_beyond_permit_pool() {
        let err = BatchConfig::builder()
            .max_concurrent(usize::MAX)
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("max_concurrent"), "got: {err}");
        assert!(BatchConfig::builder()
            .max_concurrent(MAX_CONCURRENCY)
            .build()
            .is_ok());
    }

    #[test]
    fn rejects_non_http_endpoint() {
        let err = BatchConfig::builder()
            .endpoint("ftp://example.com/upload")
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("http or https"), "got: {err}");

        assert!(BatchConfig::builder().endpoint("not a url").build().is_err());
    }

    #[test]
    fn rejects_bad_extension() {
        assert!(BatchConfig::builder().output_extension("").build().is_err());
        assert!(BatchConfig::builder().output_extension("a/b").build().is_err());
        let c = BatchConfig::builder().output_extension(".txt").build().unwrap();
        assert_eq!(c.output_extension, "txt");
    }

    #[test]
    fn output_path_replaces_extension() {
        let c = BatchConfig::builder().output_dir("/tmp/out").build().unwrap();
        assert_eq!(
            c.output_path_for(Path::new("in/papers/attention.pdf")),
            PathBuf::from("/tmp/out/attention.json")
        );
        assert_eq!(
            c.output_path_for(Path::new("in/archive.tar.gz")),
            PathBuf::from("/tmp/out/archive.tar.json")
        );
        assert_eq!(
            c.output_path_for(Path::new("in/README")),
            PathBuf::from("/tmp/out/README.json")
        );
    }

    #[tokio::test]
    async fn inline_query_wins_over_file() {
        let c = BatchConfig::builder()
            .query_path("/definitely/not/here.json")
            .query("{\"language\":{\"lang\":\"en\"}}")
            .build()
            .unwrap();
        let q = c.load_query().await.unwrap();
        assert!(q.contains("lang"));
    }

    #[tokio::test]
    async fn missing_query_file_is_fatal() {
        let c = BatchConfig::builder()
            .query_path("/definitely/not/here.json")
            .build()
            .unwrap();
        let err = c.load_query().await.unwrap_err();
        assert!(matches!(err, BatchError::QueryUnreadable { .. }));
        assert_eq!(err.phase(), None);
    }

    #[test]
    fn debug_hides_callback() {
        let s = format!("{:?}", BatchConfig::default());
        assert!(s.contains("BatchConfig"));
        assert!(s.contains("max_concurrent"));
    }
}
