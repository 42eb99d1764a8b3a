//! Error types for the redmine2gitlab library.
//!
//! Two distinct error types reflect two distinct failure modes:
//!
//! * [`MigrateError`]: **fatal**, the command cannot proceed at all
//!   (missing config, unreachable tracker, malformed API response, a
//!   precondition such as "GitLab project has no issue" not met). Returned as
//!   `Err(MigrateError)` from the [`crate::migrate`] commands.
//!
//! * [`ItemError`]: **non-fatal**, a single entity could not be migrated
//!   after every retry round, while the others went through. Collected in
//!   [`crate::migrate::MigrationReport::failed`] so callers see partial
//!   success instead of losing the whole run to one bad issue.
//!
//! The textile conversion itself never fails; the only conversion errors are
//! at the file boundary ([`MigrateError::FileNotFound`],
//! [`MigrateError::InvalidEncoding`]).

use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the redmine2gitlab library.
#[derive(Debug, Error)]
pub enum MigrateError {
    // ── Configuration ─────────────────────────────────────────────────────
    /// The JSON config file does not exist.
    #[error("Config file not found: '{path}'\nCreate it with redmine and gitlab host/path/key entries.")]
    ConfigNotFound { path: PathBuf },

    /// The config file exists but is not valid JSON for the expected shape.
    #[error("Config file '{path}' is invalid: {source}")]
    ConfigParse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Files ─────────────────────────────────────────────────────────────
    /// An input file was not found at the given path.
    #[error("File not found: '{path}'")]
    FileNotFound { path: PathBuf },

    /// An input file is not valid UTF-8 text.
    #[error("File '{path}' is not valid UTF-8 text")]
    InvalidEncoding { path: PathBuf },

    /// Any other filesystem failure.
    #[error("I/O error on '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Trackers ──────────────────────────────────────────────────────────
    /// A project URL did not match the expected tracker layout.
    #[error("Invalid {tracker} project URL '{url}'\nExpected: {expected}")]
    InvalidProjectUrl {
        tracker: &'static str,
        url: String,
        expected: &'static str,
    },

    /// The HTTP request could not be sent or its body could not be read.
    #[error("HTTP request to '{url}' failed: {source}")]
    Http {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    /// The tracker answered with a non-success status.
    #[error("HTTP {status} from '{url}': {body}")]
    HttpStatus { url: String, status: u16, body: String },

    /// The tracker answered, but not with the JSON shape we rely on.
    #[error("Unexpected response from '{url}': {detail}")]
    UnexpectedShape { url: String, detail: String },

    // ── Cache ─────────────────────────────────────────────────────────────
    /// A cache entry or directory the command needs is absent.
    #[error("Cache entry missing: '{path}'\nRun `redmine2gitlab init` first.")]
    CacheMissing { path: PathBuf },

    /// A cache entry exists but cannot be decoded.
    #[error("Cache entry '{path}' is corrupt: {source}")]
    CacheCorrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    // ── Mapping ───────────────────────────────────────────────────────────
    /// A Redmine user has no GitLab counterpart.
    #[error("Unknown user '{user}': no matching account on the destination")]
    UnknownUser { user: String },

    /// An issue targets a version that was never migrated as a milestone.
    #[error("Issue \"{issue}\" points to unknown milestone \"{milestone}\".\nMigrate the roadmap first.")]
    UnknownMilestone { issue: String, milestone: String },

    /// A pre-flight check of a command did not hold.
    #[error("Check failed: {0}")]
    PreconditionFailed(String),

    /// Every entity failed after all rounds; nothing was migrated.
    #[error("All {total} {resource} failed after {rounds} rounds.\nFirst error: {first_error}")]
    AllItemsFailed {
        resource: &'static str,
        total: usize,
        rounds: u32,
        first_error: String,
    },

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl MigrateError {
    /// Map an I/O error on `path`, keeping "not found" distinct.
    pub fn from_io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        let path = path.into();
        if source.kind() == std::io::ErrorKind::NotFound {
            MigrateError::FileNotFound { path }
        } else {
            MigrateError::Io { path, source }
        }
    }
}

/// A non-fatal error for a single entity.
///
/// Stored in the migration report when an entity is still failing after the
/// last retry round, or could not be attempted at all. The command continues
/// with the remaining entities.
#[derive(Debug, Clone, Error, serde::Serialize, serde::Deserialize)]
pub enum ItemError {
    /// The entity failed in every round.
    #[error("{resource} {redmine_id}: failed after {rounds} round(s): {detail}")]
    Failed {
        resource: String,
        redmine_id: u64,
        rounds: u32,
        detail: String,
    },

    /// The entity was not attempted.
    #[error("{resource} {redmine_id}: skipped: {reason}")]
    Skipped {
        resource: String,
        redmine_id: u64,
        reason: String,
    },
}

impl ItemError {
    /// Id of the entity this error is about.
    pub fn redmine_id(&self) -> u64 {
        match self {
            ItemError::Failed { redmine_id, .. } | ItemError::Skipped { redmine_id, .. } => {
                *redmine_id
            }
        }
    }
}
