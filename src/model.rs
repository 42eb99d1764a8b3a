//! Typed records exchanged with both trackers.
//!
//! Redmine records keep every field they were fetched with: anything not
//! modelled here lands in `extra` and is written back to the cache untouched.
//! The GitLab side is split into request payloads (what we send) and the few
//! response fields we read back.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::path::PathBuf;

/// Leading `YYYY-MM-DD` of a Redmine timestamp.
pub fn date_part(timestamp: &str) -> &str {
    timestamp.get(..10).unwrap_or(timestamp)
}

fn is_zero(n: &usize) -> bool {
    *n == 0
}

fn is_false(b: &bool) -> bool {
    !*b
}

// ── Redmine ──────────────────────────────────────────────────────────────

/// `{ "id": …, "name": … }` reference used all over the Redmine API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NamedRef {
    pub id: u64,
    #[serde(default)]
    pub name: String,
}

/// Top-level project record (`<project>.json`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectInfo {
    pub id: u64,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub identifier: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedmineIssue {
    pub id: u64,
    pub subject: String,
    #[serde(default)]
    pub description: Option<String>,
    pub tracker: NamedRef,
    pub priority: NamedRef,
    pub author: NamedRef,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assigned_to: Option<NamedRef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fixed_version: Option<NamedRef>,
    pub created_on: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub closed_on: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_date: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub due_date: Option<String>,
    #[serde(default)]
    pub journals: Vec<Journal>,
    #[serde(default)]
    pub relations: Vec<Relation>,
    #[serde(default)]
    pub attachments: Vec<RedmineAttachment>,
    #[serde(default)]
    pub watchers: Vec<NamedRef>,
    /// iid of the migrated GitLab issue, once created.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gitlab_id: Option<u64>,
    /// Notes already posted to the GitLab issue.
    #[serde(default, skip_serializing_if = "is_zero")]
    pub gitlab_notes: usize,
    #[serde(default, skip_serializing_if = "is_false")]
    pub gitlab_closed: bool,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// One history entry of an issue. Bare status changes have no notes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Journal {
    pub id: u64,
    pub user: NamedRef,
    #[serde(default)]
    pub notes: Option<String>,
    pub created_on: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Relation {
    pub issue_id: u64,
    pub issue_to_id: u64,
    pub relation_type: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Relation {
    pub fn new(issue_id: u64, issue_to_id: u64, relation_type: impl Into<String>) -> Self {
        Self {
            issue_id,
            issue_to_id,
            relation_type: relation_type.into(),
            extra: Map::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedmineVersion {
    pub id: u64,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub status: String,
    pub created_on: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub due_date: Option<String>,
    /// Id of the migrated GitLab milestone, once created.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gitlab_id: Option<u64>,
    #[serde(default, skip_serializing_if = "is_false")]
    pub gitlab_closed: bool,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedmineUser {
    pub id: u64,
    #[serde(default)]
    pub login: String,
    #[serde(default)]
    pub firstname: String,
    #[serde(default)]
    pub lastname: String,
    #[serde(default)]
    pub mail: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedmineAttachment {
    pub id: u64,
    pub filename: String,
    #[serde(default)]
    pub filesize: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
    pub content_url: String,
    /// Local copy of the file in the cache.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<PathBuf>,
    /// Upload result, once the file is on GitLab.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gitlab: Option<UploadedFile>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Entry of `wiki/index.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WikiPageRef {
    pub title: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WikiPage {
    pub title: String,
    #[serde(default)]
    pub text: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

// ── GitLab responses ─────────────────────────────────────────────────────

/// Result of `POST /projects/:id/uploads`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UploadedFile {
    pub alt: String,
    pub url: String,
    pub markdown: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GitlabIssue {
    pub id: u64,
    pub iid: u64,
    pub title: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GitlabMilestone {
    pub id: u64,
    pub iid: u64,
    pub title: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// A user or project member; both carry `id` and `username`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GitlabUser {
    pub id: u64,
    pub username: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

// ── GitLab payloads ──────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IssuePayload {
    pub title: String,
    pub description: String,
    /// Comma-separated label list.
    pub labels: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub due_date: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub milestone_id: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assignee_id: Option<u64>,
}

/// Everything about an issue that is not part of the create request.
#[derive(Debug, Clone)]
pub struct IssueMeta {
    pub redmine_id: u64,
    /// Login of the Redmine author; `None` for anonymous issues.
    pub sudo_user: Option<String>,
    pub notes: Vec<NoteDraft>,
    pub must_close: bool,
    pub attachments: Vec<RedmineAttachment>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NotePayload {
    pub body: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NoteDraft {
    pub payload: NotePayload,
    pub sudo_user: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MilestonePayload {
    pub title: String,
    pub description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub due_date: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MilestoneMeta {
    pub redmine_id: u64,
    pub must_close: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WikiPayload {
    pub title: String,
    pub content: String,
    pub format: String,
}

impl WikiPayload {
    pub fn markdown(title: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            content: content.into(),
            format: "markdown".into(),
        }
    }
}
