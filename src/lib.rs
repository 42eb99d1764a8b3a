//! # redmine2gitlab
//!
//! Migrate a Redmine project to GitLab: roadmap versions become milestones,
//! issues keep their history as notes, attachments are re-uploaded, and wiki
//! pages are converted from textile to Markdown.
//!
//! ## Workflow
//!
//! ```text
//! Redmine ──init──▶ local cache (./redmine/*.json)
//!                        │
//!                        ├─ roadmap       versions    → milestones
//!                        ├─ attachments   files       → uploads
//!                        ├─ issues        issues      → issues + notes
//!                        ├─ link-roadmap  "Moved to"  → Redmine versions
//!                        └─ link-issues   "Moved to"  → Redmine issues
//! Redmine ──wiki──▶ textile → Markdown → GitLab wiki
//! ```
//!
//! The cache makes every step restartable: `init` resumes interrupted
//! downloads, and creation steps record the GitLab ids they obtained.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use redmine2gitlab::{migrate, MigrationConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = MigrationConfig::from_file("config.json")?.build()?;
//!     migrate::init(&config).await?;
//!     let report = migrate::roadmap(&config).await?;
//!     eprintln!("{}/{} milestones created", report.created, report.total);
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `redmine2gitlab` binary (clap + anyhow + tracing-subscriber + indicatif) |
//!
//! ```toml
//! redmine2gitlab = { version = "0.1", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod cache;
pub mod config;
pub mod convert;
pub mod converters;
pub mod error;
pub mod gitlab;
pub mod migrate;
pub mod model;
pub mod progress;
pub mod redmine;

mod http;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{MigrationConfig, MigrationConfigBuilder};
pub use convert::{convert_file, convert_text, convert_to_file, ConvertedDocument, LinkRef};
pub use error::{ItemError, MigrateError};
pub use migrate::{InitSummary, MigrationReport};
pub use progress::{MigrationProgressCallback, NoopProgressCallback, ProgressCallback};
pub use textile_markdown::{convert_document, convert_line};
