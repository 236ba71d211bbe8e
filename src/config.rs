//! Centralized configuration management for ansdata

use anyhow::{Context, Result};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

pub const DEFAULT_BASE_URL: &str = "https://dadosabertos.ans.gov.br/FTP/PDA/";
pub const DEFAULT_CHUNK_ROWS: usize = 100_000;

/// Application configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Root of the ANS open-data file server
    pub base_url: String,
    /// Directory for downloaded archives and extracted CSVs
    pub download_dir: PathBuf,
    /// HTTP client configuration
    pub http: HttpConfig,
    /// Beneficiary dataset location
    pub beneficiaries: DatasetSource,
    /// Financial statement dataset location
    pub financial: DatasetSource,
    /// Column holding the operator registration number in financial statements
    pub identifier_column: String,
    /// Rows per batch when merging CSV files
    pub chunk_rows: usize,
    /// What to do when a single archive fails during a build
    pub failure_policy: FailurePolicy,
}

/// HTTP client configuration
#[derive(Debug, Clone)]
pub struct HttpConfig {
    /// Request timeout in seconds
    pub timeout_seconds: u64,
    /// User agent string
    pub user_agent: String,
}

/// Endpoint and archive naming for one dataset family
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatasetSource {
    /// Path below the base URL, with trailing slash
    pub endpoint: String,
    /// Archive filename with `{region}`, `{year}`, `{month}` or `{quarter}` placeholders
    pub archive_template: String,
}

impl DatasetSource {
    pub fn beneficiaries() -> Self {
        Self {
            endpoint: "informacoes_consolidadas_de_beneficiarios-024/".to_string(),
            archive_template: "pda-024-icb-{region}-{year}_{month}.zip".to_string(),
        }
    }

    pub fn financial_statements() -> Self {
        Self {
            endpoint: "demonstracoes_contabeis/".to_string(),
            archive_template: "{quarter}T{year}.zip".to_string(),
        }
    }

    /// Full URL of the dataset directory under `base_url`
    pub fn url(&self, base_url: &str) -> String {
        join_url(base_url, &self.endpoint)
    }
}

/// Failure handling for the per-archive fan-out of a dataset build
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FailurePolicy {
    /// Fail fast for a single target period, skip failures for ranges
    #[default]
    Auto,
    /// Abort the build on the first failed archive
    FailFast,
    /// Log failed archives and keep going
    SkipFailed,
}

impl FailurePolicy {
    pub fn skips_failures(&self, ranged: bool) -> bool {
        match self {
            FailurePolicy::Auto => ranged,
            FailurePolicy::FailFast => false,
            FailurePolicy::SkipFailed => true,
        }
    }
}

impl FromStr for FailurePolicy {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "auto" => Ok(FailurePolicy::Auto),
            "fail-fast" | "fail_fast" | "failfast" => Ok(FailurePolicy::FailFast),
            "skip" | "skip-failed" | "skip_failed" | "continue" => Ok(FailurePolicy::SkipFailed),
            other => Err(anyhow::anyhow!(
                "Unsupported failure policy: {}. Supported policies: auto, fail-fast, skip",
                other
            )),
        }
    }
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout_seconds: 300,
            user_agent: "ansdata/0.1.0".to_string(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            download_dir: PathBuf::from("ans_downloads"),
            http: HttpConfig::default(),
            beneficiaries: DatasetSource::beneficiaries(),
            financial: DatasetSource::financial_statements(),
            identifier_column: "REG_ANS".to_string(),
            chunk_rows: DEFAULT_CHUNK_ROWS,
            failure_policy: FailurePolicy::Auto,
        }
    }
}

impl Config {
    /// Load configuration from environment variables and defaults
    pub fn from_env() -> Result<Self> {
        let defaults = Config::default();

        let base_url = std::env::var("ANSDATA_BASE_URL").unwrap_or(defaults.base_url);

        let download_dir = std::env::var("ANSDATA_DOWNLOAD_DIR")
            .map(PathBuf::from)
            .unwrap_or(defaults.download_dir);

        let http = HttpConfig {
            timeout_seconds: parse_env_var("ANSDATA_HTTP_TIMEOUT_SECONDS")?
                .unwrap_or(defaults.http.timeout_seconds),
            user_agent: std::env::var("ANSDATA_USER_AGENT").unwrap_or(defaults.http.user_agent),
        };

        let chunk_rows = parse_env_var("ANSDATA_CHUNK_ROWS")?.unwrap_or(defaults.chunk_rows);

        let failure_policy = match std::env::var("ANSDATA_FAILURE_POLICY") {
            Ok(val) => val
                .parse()
                .with_context(|| format!("Invalid ANSDATA_FAILURE_POLICY = '{}'", val))?,
            Err(_) => defaults.failure_policy,
        };

        Ok(Config {
            base_url,
            download_dir,
            http,
            chunk_rows,
            failure_policy,
            ..defaults
        })
    }

    /// Config rooted at another server, used to point the client at a mirror
    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            ..Config::default()
        }
    }

    /// Get HTTP timeout as Duration
    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http.timeout_seconds)
    }

    pub fn beneficiaries_url(&self) -> String {
        self.beneficiaries.url(&self.base_url)
    }

    pub fn financial_url(&self) -> String {
        self.financial.url(&self.base_url)
    }

    /// Build the shared HTTP client
    pub fn http_client(&self) -> reqwest::Result<reqwest::Client> {
        reqwest::Client::builder()
            .user_agent(&self.http.user_agent)
            .timeout(self.http_timeout())
            .build()
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.chunk_rows == 0 {
            return Err(anyhow::anyhow!("Chunk size must be greater than zero"));
        }

        if !self.base_url.starts_with("http://") && !self.base_url.starts_with("https://") {
            return Err(anyhow::anyhow!(
                "Base URL must be an http(s) URL: {}",
                self.base_url
            ));
        }

        // Check if download directory can be created
        std::fs::create_dir_all(&self.download_dir).with_context(|| {
            format!(
                "Cannot create download directory: {}",
                self.download_dir.display()
            )
        })?;

        Ok(())
    }
}

/// Join a base URL and a relative path with exactly one slash between them
pub fn join_url(base: &str, path: &str) -> String {
    format!(
        "{}/{}",
        base.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}

/// Helper function to parse environment variable as a specific type
fn parse_env_var<T>(var_name: &str) -> Result<Option<T>>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display + Send + Sync + std::error::Error + 'static,
{
    match std::env::var(var_name) {
        Ok(val) => val.parse().map(Some).with_context(|| {
            format!("Failed to parse environment variable {} = '{}'", var_name, val)
        }),
        Err(_) => Ok(None),
    }
}
