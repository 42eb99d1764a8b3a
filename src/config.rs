//! Configuration types for a Redmine → GitLab migration.
//!
//! Every knob lives in [`MigrationConfig`], built through
//! [`MigrationConfigBuilder`] or read from a `config.json` file with
//! [`MigrationConfig::from_file`]:
//!
//! ```json
//! {
//!   "redmine": { "host": "https://redmine.example.org", "path": "projects/tool", "key": "…" },
//!   "gitlab":  { "host": "https://gitlab.example.org",  "path": "team/tool",     "key": "…" }
//! }
//! ```
//!
//! The project URLs are `host + "/" + path` on both sides.

use crate::error::MigrateError;
use crate::progress::ProgressCallback;
use serde::Deserialize;
use std::fmt;
use std::path::{Path, PathBuf};

/// Default location of the local Redmine cache.
pub const DEFAULT_CACHE_DIR: &str = "./redmine";

/// Default name of the JSON config file, looked up in the working directory.
pub const DEFAULT_CONFIG_FILE: &str = "config.json";

/// Configuration for a migration run.
///
/// # Example
/// ```rust
/// use redmine2gitlab::MigrationConfig;
///
/// let config = MigrationConfig::builder()
///     .redmine("https://redmine.example.org", "projects/tool", "rm-key")
///     .gitlab("https://gitlab.example.org", "team/tool", "gl-key")
///     .max_rounds(5)
///     .build()
///     .unwrap();
/// assert_eq!(config.redmine_project_url(), "https://redmine.example.org/projects/tool");
/// ```
#[derive(Clone)]
pub struct MigrationConfig {
    /// Redmine base URL, e.g. `https://redmine.example.org`.
    pub redmine_host: String,
    /// Project path below the host, e.g. `projects/tool`.
    pub redmine_path: String,
    /// Redmine REST API key (`X-Redmine-API-Key`).
    pub redmine_key: String,

    /// GitLab base URL.
    pub gitlab_host: String,
    /// `<namespace>/<project>` below the host.
    pub gitlab_path: String,
    /// GitLab private token (`PRIVATE-TOKEN`).
    pub gitlab_key: String,

    /// Directory of the local JSON cache. Default: `./redmine`.
    pub cache_dir: PathBuf,

    /// Rounds over the not-yet-created items of a command. Default: 3.
    ///
    /// Round 1 attempts everything; later rounds only retry what failed.
    pub max_rounds: u32,

    /// Delay before round 2, doubling each round after. Default: 500.
    pub retry_backoff_ms: u64,

    /// Concurrent Redmine detail fetches. Default: 8.
    pub concurrency: usize,

    /// Per-request HTTP timeout in seconds. Default: 60.
    pub http_timeout_secs: u64,

    /// Convert issue descriptions and notes from textile to Markdown. Default: false.
    pub convert_issue_markup: bool,

    /// Prefix GitLab issue titles with `-RM-<id>-MR-`. Default: false.
    pub title_with_redmine_id: bool,

    /// Log what would be done without writing anything. Default: false.
    pub check_only: bool,

    /// Optional per-item progress events.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for MigrationConfig {
    fn default() -> Self {
        Self {
            redmine_host: String::new(),
            redmine_path: String::new(),
            redmine_key: String::new(),
            gitlab_host: String::new(),
            gitlab_path: String::new(),
            gitlab_key: String::new(),
            cache_dir: PathBuf::from(DEFAULT_CACHE_DIR),
            max_rounds: 3,
            retry_backoff_ms: 500,
            concurrency: 8,
            http_timeout_secs: 60,
            convert_issue_markup: false,
            title_with_redmine_id: false,
            check_only: false,
            progress_callback: None,
        }
    }
}

impl fmt::Debug for MigrationConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MigrationConfig")
            .field("redmine_host", &self.redmine_host)
            .field("redmine_path", &self.redmine_path)
            .field("redmine_key", &redact(&self.redmine_key))
            .field("gitlab_host", &self.gitlab_host)
            .field("gitlab_path", &self.gitlab_path)
            .field("gitlab_key", &redact(&self.gitlab_key))
            .field("cache_dir", &self.cache_dir)
            .field("max_rounds", &self.max_rounds)
            .field("retry_backoff_ms", &self.retry_backoff_ms)
            .field("concurrency", &self.concurrency)
            .field("http_timeout_secs", &self.http_timeout_secs)
            .field("convert_issue_markup", &self.convert_issue_markup)
            .field("title_with_redmine_id", &self.title_with_redmine_id)
            .field("check_only", &self.check_only)
            .field(
                "progress_callback",
                &self.progress_callback.as_ref().map(|_| "<dyn MigrationProgressCallback>"),
            )
            .finish()
    }
}

fn redact(key: &str) -> &'static str {
    if key.is_empty() {
        "<unset>"
    } else {
        "<redacted>"
    }
}

impl MigrationConfig {
    /// Create a new builder for `MigrationConfig`.
    pub fn builder() -> MigrationConfigBuilder {
        MigrationConfigBuilder {
            config: Self::default(),
        }
    }

    /// Read `path` and return a builder pre-filled from it.
    ///
    /// The caller may still override fields (API keys from the environment,
    /// `--check`) before calling [`MigrationConfigBuilder::build`].
    pub fn from_file(path: impl AsRef<Path>) -> Result<MigrationConfigBuilder, MigrateError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => MigrateError::ConfigNotFound {
                path: path.to_path_buf(),
            },
            _ => MigrateError::Io {
                path: path.to_path_buf(),
                source: e,
            },
        })?;
        let file: ConfigFile =
            serde_json::from_str(&raw).map_err(|source| MigrateError::ConfigParse {
                path: path.to_path_buf(),
                source,
            })?;
        tracing::debug!(path = %path.display(), "Loaded config file");
        Ok(file.into_builder())
    }

    /// `host/path` of the Redmine project.
    pub fn redmine_project_url(&self) -> String {
        join_url(&self.redmine_host, &self.redmine_path)
    }

    /// `host/path` of the GitLab project.
    pub fn gitlab_project_url(&self) -> String {
        join_url(&self.gitlab_host, &self.gitlab_path)
    }
}

fn join_url(host: &str, path: &str) -> String {
    format!("{}/{}", host.trim_end_matches('/'), path.trim_start_matches('/'))
}

/// Builder for [`MigrationConfig`].
#[derive(Debug)]
pub struct MigrationConfigBuilder {
    config: MigrationConfig,
}

impl MigrationConfigBuilder {
    pub fn redmine(
        mut self,
        host: impl Into<String>,
        path: impl Into<String>,
        key: impl Into<String>,
    ) -> Self {
        self.config.redmine_host = host.into();
        self.config.redmine_path = path.into();
        self.config.redmine_key = key.into();
        self
    }

    pub fn gitlab(
        mut self,
        host: impl Into<String>,
        path: impl Into<String>,
        key: impl Into<String>,
    ) -> Self {
        self.config.gitlab_host = host.into();
        self.config.gitlab_path = path.into();
        self.config.gitlab_key = key.into();
        self
    }

    pub fn redmine_key(mut self, key: impl Into<String>) -> Self {
        self.config.redmine_key = key.into();
        self
    }

    pub fn gitlab_key(mut self, key: impl Into<String>) -> Self {
        self.config.gitlab_key = key.into();
        self
    }

    pub fn cache_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.cache_dir = dir.into();
        self
    }

    pub fn max_rounds(mut self, n: u32) -> Self {
        self.config.max_rounds = n.max(1);
        self
    }

    pub fn retry_backoff_ms(mut self, ms: u64) -> Self {
        self.config.retry_backoff_ms = ms;
        self
    }

    pub fn concurrency(mut self, n: usize) -> Self {
        self.config.concurrency = n.max(1);
        self
    }

    pub fn http_timeout_secs(mut self, secs: u64) -> Self {
        self.config.http_timeout_secs = secs;
        self
    }

    pub fn convert_issue_markup(mut self, v: bool) -> Self {
        self.config.convert_issue_markup = v;
        self
    }

    pub fn title_with_redmine_id(mut self, v: bool) -> Self {
        self.config.title_with_redmine_id = v;
        self
    }

    pub fn check_only(mut self, v: bool) -> Self {
        self.config.check_only = v;
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<MigrationConfig, MigrateError> {
        let c = &self.config;
        for (name, host) in [("redmine", &c.redmine_host), ("gitlab", &c.gitlab_host)] {
            if !(host.starts_with("http://") || host.starts_with("https://")) {
                return Err(MigrateError::InvalidConfig(format!(
                    "{name} host must start with http:// or https://, got '{host}'"
                )));
            }
        }
        if c.redmine_path.trim_matches('/').is_empty() || c.gitlab_path.trim_matches('/').is_empty()
        {
            return Err(MigrateError::InvalidConfig(
                "redmine and gitlab project paths must not be empty".into(),
            ));
        }
        if c.http_timeout_secs == 0 {
            return Err(MigrateError::InvalidConfig(
                "HTTP timeout must be ≥ 1 second".into(),
            ));
        }
        Ok(self.config)
    }
}

// ── File format ──────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct ConfigFile {
    redmine: TrackerSection,
    gitlab: TrackerSection,
    #[serde(default)]
    cache_dir: Option<PathBuf>,
    #[serde(default)]
    max_rounds: Option<u32>,
    #[serde(default)]
    convert_issue_markup: Option<bool>,
}

#[derive(Debug, Deserialize)]
struct TrackerSection {
    host: String,
    path: String,
    #[serde(default)]
    key: String,
}

impl ConfigFile {
    fn into_builder(self) -> MigrationConfigBuilder {
        let mut builder = MigrationConfig::builder()
            .redmine(self.redmine.host, self.redmine.path, self.redmine.key)
            .gitlab(self.gitlab.host, self.gitlab.path, self.gitlab.key);
        if let Some(dir) = self.cache_dir {
            builder = builder.cache_dir(dir);
        }
        if let Some(n) = self.max_rounds {
            builder = builder.max_rounds(n);
        }
        if let Some(v) = self.convert_issue_markup {
            builder = builder.convert_issue_markup(v);
        }
        builder
    }
}
