//! Migration commands.
//!
//! `init` copies the Redmine project into the local cache; every other
//! command reads the cache and writes to GitLab (or back to Redmine for the
//! `link-*` commands). Run them in order:
//!
//! ```text
//! init → roadmap → attachments → issues → link-roadmap → link-issues
//! ```
//!
//! `wiki` reads Redmine directly and is independent of the cache.
//!
//! ## Rounds
//!
//! Creation calls fail for transient reasons (timeouts, 5xx under load).
//! Each command works in rounds: round 1 tries every item, later rounds retry
//! only the items that failed, after a doubling delay
//! (`retry_backoff_ms`, then `2 ×`, `4 ×`…). After `max_rounds` the remaining
//! failures are reported as [`ItemError`]s. When nothing succeeded at all the
//! command fails with [`MigrateError::AllItemsFailed`].
//!
//! With `check_only` set, no command writes anything: each logs what it would
//! do and returns a report with `created == 0`.

use crate::cache::{CacheRecord, CacheStore, CachedProject};
use crate::config::MigrationConfig;
use crate::convert::convert_text;
use crate::converters::{convert_attachments, convert_issue, convert_version, IssueContext};
use crate::error::{ItemError, MigrateError};
use crate::gitlab::{GitlabClient, GitlabProject};
use crate::model::{
    GitlabIssue, IssueMeta, IssuePayload, RedmineAttachment, RedmineIssue, RedmineVersion,
    WikiPayload,
};
use crate::progress::{NoopProgressCallback, ProgressCallback};
use crate::redmine::{RedmineClient, RedmineProject};
use serde::Serialize;
use serde_json::json;
use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::sync::Arc;
use tokio::time::{sleep, Duration};
use tracing::{error, info, warn};

/// Outcome of one migration command.
#[derive(Debug, Clone, Serialize)]
pub struct MigrationReport {
    /// Plural resource name, e.g. `"issues"`.
    pub resource: &'static str,
    /// Items the command was asked to migrate, skipped ones included.
    pub total: usize,
    pub created: usize,
    /// Items left alone because they were already migrated.
    pub skipped: usize,
    pub failed: Vec<ItemError>,
    pub rounds: u32,
}

impl MigrationReport {
    fn checked(resource: &'static str, total: usize, skipped: usize) -> Self {
        Self {
            resource,
            total,
            created: 0,
            skipped,
            failed: Vec::new(),
            rounds: 0,
        }
    }

    /// Every item was migrated or skipped.
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Record counts after `init`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct InitSummary {
    pub versions: usize,
    pub issues: usize,
    pub users: usize,
    pub attachments: usize,
}

// ── Connections ──────────────────────────────────────────────────────────

async fn connect_redmine(config: &MigrationConfig) -> Result<RedmineProject, MigrateError> {
    let client = RedmineClient::new(config.redmine_key.clone(), config.http_timeout_secs)?;
    RedmineProject::connect(&config.redmine_project_url(), client, config.concurrency).await
}

async fn connect_gitlab(config: &MigrationConfig) -> Result<GitlabProject, MigrateError> {
    let client = GitlabClient::new(config.gitlab_key.clone(), config.http_timeout_secs)?;
    GitlabProject::connect(&config.gitlab_project_url(), client).await
}

async fn open_cache(config: &MigrationConfig) -> Result<CachedProject, MigrateError> {
    CachedProject::open(CacheStore::new(&config.cache_dir)).await
}

fn progress_of(config: &MigrationConfig) -> ProgressCallback {
    config
        .progress_callback
        .clone()
        .unwrap_or_else(|| Arc::new(NoopProgressCallback))
}

fn check(message: &str, ok: bool) -> Result<(), MigrateError> {
    if ok {
        info!("{message}... OK");
        Ok(())
    } else {
        error!("{message}... FAILED");
        Err(MigrateError::PreconditionFailed(message.to_string()))
    }
}

// ── Rounds ───────────────────────────────────────────────────────────────

/// Delay before `round` (1-based); round 1 starts immediately.
fn backoff_delay(base_ms: u64, round: u32) -> u64 {
    if round <= 1 {
        return 0;
    }
    base_ms.saturating_mul(2u64.saturating_pow(round - 2))
}

/// Apply `action` to every item, retrying failures in later rounds.
///
/// `action` returns the destination id of the migrated item (0 when the
/// destination has none).
async fn run_rounds<T, I, F, Fut>(
    config: &MigrationConfig,
    resource: &'static str,
    items: Vec<T>,
    id_of: I,
    mut action: F,
) -> Result<MigrationReport, MigrateError>
where
    T: Clone,
    I: Fn(&T) -> u64,
    F: FnMut(T) -> Fut,
    Fut: Future<Output = Result<u64, MigrateError>>,
{
    let progress = progress_of(config);
    let total = items.len();
    progress.on_start(resource, total);

    let mut pending = items;
    let mut last_error: HashMap<u64, String> = HashMap::new();
    let mut created = 0;
    let mut rounds = 0;

    while !pending.is_empty() && rounds < config.max_rounds {
        rounds += 1;
        if rounds > 1 {
            let delay = backoff_delay(config.retry_backoff_ms, rounds);
            warn!(
                "{} {} not migrated; round {}/{} in {}ms",
                pending.len(),
                resource,
                rounds,
                config.max_rounds,
                delay
            );
            sleep(Duration::from_millis(delay)).await;
        }
        progress.on_round_start(resource, rounds, pending.len());

        let mut still_failing = Vec::new();
        for item in pending {
            let id = id_of(&item);
            match action(item.clone()).await {
                Ok(destination_id) => {
                    created += 1;
                    last_error.remove(&id);
                    progress.on_item_complete(resource, id, destination_id);
                }
                Err(e) => {
                    let detail = e.to_string();
                    error!("Could not migrate {resource} {id}: {detail}");
                    progress.on_item_error(resource, id, &detail);
                    last_error.insert(id, detail);
                    still_failing.push(item);
                }
            }
        }
        pending = still_failing;
    }

    let failed: Vec<ItemError> = pending
        .iter()
        .map(|item| {
            let id = id_of(item);
            ItemError::Failed {
                resource: resource.to_string(),
                redmine_id: id,
                rounds,
                detail: last_error.get(&id).cloned().unwrap_or_default(),
            }
        })
        .collect();

    progress.on_complete(resource, total, created);
    info!("{created}/{total} {resource} migrated in {rounds} round(s)");

    if created == 0 {
        if let Some(first) = failed.first() {
            return Err(MigrateError::AllItemsFailed {
                resource,
                total,
                rounds,
                first_error: first.to_string(),
            });
        }
    }
    Ok(MigrationReport {
        resource,
        total,
        created,
        skipped: 0,
        failed,
        rounds,
    })
}

// ── init ─────────────────────────────────────────────────────────────────

/// Fill the cache from Redmine. A resource already cached completely is
/// loaded as is; a partial one is fetched again.
pub async fn init(config: &MigrationConfig) -> Result<InitSummary, MigrateError> {
    let redmine = connect_redmine(config).await?;
    // Fail early on a bad destination rather than after a long download.
    connect_gitlab(config).await?;

    let store = CacheStore::new(&config.cache_dir);
    if config.check_only {
        info!(
            "Would cache redmine project {} into {}",
            redmine.info().id,
            store.root().display()
        );
        return Ok(InitSummary::default());
    }
    info!("Redmine cache dir: {}", store.root().display());
    store.save_project(redmine.info()).await?;

    let versions = cached_or_fetch(&store, || redmine.versions()).await?;
    info!("{} version(s) loaded", versions.len());

    let issues = cached_or_fetch(&store, || redmine.issues()).await?;
    info!("{} issue(s) loaded", issues.len());

    let users = cached_or_fetch(&store, || redmine.participants(&issues)).await?;
    info!("{} user(s) loaded", users.len());

    let attachments = cache_attachments(&store, &redmine, &issues).await?;
    info!("{} attachment(s) loaded", attachments);

    Ok(InitSummary {
        versions: versions.len(),
        issues: issues.len(),
        users: users.len(),
        attachments,
    })
}

async fn cached_or_fetch<T, F, Fut>(store: &CacheStore, fetch: F) -> Result<Vec<T>, MigrateError>
where
    T: CacheRecord,
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<Vec<T>, MigrateError>>,
{
    if store.has_resource::<T>().await {
        info!("Load {} from cache", T::RESOURCE);
        return store.enumerate().await;
    }
    info!("Fetching {}", T::RESOURCE);
    let records = fetch().await?;
    store.reset_resource::<T>().await?;
    for record in &records {
        store.save(record).await?;
    }
    store.complete_resource::<T>().await?;
    Ok(records)
}

/// Download every attachment not cached yet; a re-run resumes where an
/// interrupted one stopped.
async fn cache_attachments(
    store: &CacheStore,
    redmine: &RedmineProject,
    issues: &[RedmineIssue],
) -> Result<usize, MigrateError> {
    store.create_resource::<RedmineAttachment>().await?;
    let mut count = 0;
    for attachment in issues.iter().flat_map(|i| &i.attachments) {
        count += 1;
        if store.has::<RedmineAttachment>(attachment.id).await {
            continue;
        }
        let bytes = redmine.download_attachment(attachment).await?;
        let mut attachment = attachment.clone();
        attachment.file = Some(store.save_blob(attachment.id, &bytes).await?);
        store.save(&attachment).await?;
        info!(
            "Attachment {} ({}, {} bytes) cached",
            attachment.id,
            attachment.filename,
            bytes.len()
        );
    }
    store.complete_resource::<RedmineAttachment>().await?;
    Ok(count)
}

// ── roadmap ──────────────────────────────────────────────────────────────

/// Create a GitLab milestone for every Redmine version.
///
/// Each step is recorded in the cache as soon as GitLab accepted it, so a
/// retry or a re-run picks up a half-migrated version where it stopped.
pub async fn roadmap(config: &MigrationConfig) -> Result<MigrationReport, MigrateError> {
    const RESOURCE: &str = "milestones";
    let cached = open_cache(config).await?;
    let gitlab = connect_gitlab(config).await?;

    let versions = cached.versions().await?;
    let recorded: HashSet<u64> = versions.iter().filter_map(|v| v.gitlab_id).collect();
    let existing = gitlab.milestones().await?;
    check(
        "GitLab project has no pre-existing milestone",
        existing.iter().all(|m| recorded.contains(&m.id)),
    )?;
    check("Redmine project contains versions", !versions.is_empty())?;
    info!("Got {} version(s) from redmine.", versions.len());

    let total = versions.len();
    let (done, todo): (Vec<RedmineVersion>, Vec<RedmineVersion>) = versions
        .into_iter()
        .partition(|v| version_is_migrated(v));
    for v in &done {
        info!("Skip migrated version {}", v.name);
    }

    if config.check_only {
        for v in &todo {
            let (payload, meta) = convert_version(v);
            info!("Would create milestone {payload:?} (close: {})", meta.must_close);
        }
        return Ok(MigrationReport::checked(RESOURCE, total, done.len()));
    }

    let (gitlab, store) = (&gitlab, cached.store());
    let mut report = run_rounds(config, RESOURCE, todo, |v| v.id, move |version| async move {
        // An earlier round may have got further than this copy.
        let mut version: RedmineVersion = store.load(version.id).await?;
        let (payload, meta) = convert_version(&version);
        let id = match version.gitlab_id {
            Some(id) => id,
            None => {
                let milestone = gitlab.create_milestone(&payload).await?;
                info!("Version {} → milestone {}", version.name, milestone.title);
                version.gitlab_id = Some(milestone.id);
                store.save(&version).await?;
                milestone.id
            }
        };
        if meta.must_close && !version.gitlab_closed {
            gitlab.close_milestone(id).await?;
            version.gitlab_closed = true;
            store.save(&version).await?;
        }
        Ok::<_, MigrateError>(id)
    })
    .await?;
    report.total = total;
    report.skipped = done.len();
    Ok(report)
}

fn version_is_migrated(version: &RedmineVersion) -> bool {
    version.gitlab_id.is_some() && (version.gitlab_closed || !convert_version(version).1.must_close)
}

// ── attachments ──────────────────────────────────────────────────────────

/// Upload every cached attachment that is not on GitLab yet.
pub async fn attachments(config: &MigrationConfig) -> Result<MigrationReport, MigrateError> {
    const RESOURCE: &str = "attachments";
    let cached = open_cache(config).await?;
    let gitlab = connect_gitlab(config).await?;

    let issues = cached.issues().await?;
    info!("Got {} issue(s) from redmine.", issues.len());
    let index = cached.attachments_index().await?;
    info!("Got {} attachment(s) from redmine.", index.len());

    let mut seen = HashSet::new();
    let all: Vec<RedmineAttachment> = issues
        .iter()
        .flat_map(|issue| convert_attachments(issue, &index))
        .filter(|a| seen.insert(a.id))
        .collect();
    let total = all.len();
    let (uploaded, todo): (Vec<_>, Vec<_>) = all.into_iter().partition(|a| a.gitlab.is_some());

    if config.check_only {
        for a in &todo {
            info!("Would upload attachment \"{}\" ({} bytes)", a.filename, a.filesize);
        }
        return Ok(MigrationReport::checked(RESOURCE, total, uploaded.len()));
    }

    let (gitlab, store) = (&gitlab, cached.store());
    let mut report = run_rounds(config, RESOURCE, todo, |a| a.id, move |mut attachment| async move {
        let file = gitlab.create_upload(&attachment).await?;
        info!("Created attachment (was: {}) {}", attachment.id, file.markdown);
        attachment.gitlab = Some(file);
        store.save(&attachment).await?;
        Ok::<_, MigrateError>(0)
    })
    .await?;
    report.total = total;
    report.skipped = uploaded.len();
    Ok(report)
}

// ── issues ───────────────────────────────────────────────────────────────

/// Create every cached issue on GitLab, with notes, files and state.
///
/// Titles carry the Redmine id when `title_with_redmine_id` is set.
pub async fn issues(config: &MigrationConfig) -> Result<MigrationReport, MigrateError> {
    const RESOURCE: &str = "issues";
    let cached = open_cache(config).await?;
    let gitlab = connect_gitlab(config).await?;

    let gitlab_users = gitlab.users_index().await?;
    info!("Got {} user(s) from gitlab.", gitlab_users.len());
    let redmine_users = cached.users_index().await?;
    info!("Got {} user(s) from redmine.", redmine_users.len());

    let mut missing: Vec<&str> = redmine_users
        .values()
        .map(|u| u.login.as_str())
        .filter(|login| !login.is_empty() && !gitlab_users.contains_key(*login))
        .collect();
    missing.sort_unstable();
    if !missing.is_empty() {
        warn!("Users missing on GitLab: {}", missing.join(", "));
    }
    check("Required users presence", missing.is_empty())?;

    let redmine_issues = cached.issues().await?;
    let recorded: HashSet<u64> = redmine_issues.iter().filter_map(|i| i.gitlab_id).collect();
    check(
        "Project has no pre-existing issue",
        gitlab.issues().await?.iter().all(|i| recorded.contains(&i.iid)),
    )?;
    info!("Got {} issue(s) from redmine.", redmine_issues.len());
    let attachments = cached.attachments_index().await?;
    let milestones = gitlab.milestones_index().await?;
    info!("Got {} milestone(s) from gitlab.", milestones.len());

    let ctx = IssueContext {
        redmine_users: &redmine_users,
        gitlab_users: &gitlab_users,
        milestones: &milestones,
        attachments: &attachments,
        with_id: config.title_with_redmine_id,
        convert_markup: config.convert_issue_markup,
    };
    let items: Vec<(RedmineIssue, IssuePayload, IssueMeta)> = redmine_issues
        .into_iter()
        .map(|issue| convert_issue(&issue, &ctx).map(|(payload, meta)| (issue, payload, meta)))
        .collect::<Result<_, _>>()?;
    let total = items.len();
    let (done, items): (Vec<_>, Vec<_>) = items
        .into_iter()
        .partition(|(issue, _, meta)| issue_is_migrated(issue, meta));
    for (issue, _, _) in &done {
        info!("Skip migrated issue {} ({})", issue.id, issue.subject);
    }

    if config.check_only {
        for (_, payload, meta) in &items {
            if let Some(milestone_id) = payload.milestone_id {
                if gitlab.milestone_by_id(milestone_id).await?.is_none() {
                    return Err(MigrateError::UnknownMilestone {
                        issue: payload.title.clone(),
                        milestone: milestone_id.to_string(),
                    });
                }
            }
            info!(
                "Would create issue \"{}\" with {} notes and {} attachments.",
                payload.title,
                meta.notes.len(),
                meta.attachments.len()
            );
        }
        return Ok(MigrationReport::checked(RESOURCE, total, done.len()));
    }

    let (gitlab, store) = (&gitlab, cached.store());
    let mut report = run_rounds(
        config,
        RESOURCE,
        items,
        |(issue, _, _)| issue.id,
        move |(issue, payload, meta)| async move {
            let issue: RedmineIssue = store.load(issue.id).await?;
            resume_issue(gitlab, store, issue, &payload, &meta).await
        },
    )
    .await?;
    report.total = total;
    report.skipped = done.len();
    Ok(report)
}

fn issue_is_migrated(issue: &RedmineIssue, meta: &IssueMeta) -> bool {
    issue.gitlab_id.is_some()
        && issue.gitlab_notes >= meta.notes.len()
        && (issue.gitlab_closed || !meta.must_close)
}

/// Carry `issue` through the steps it has not completed yet, saving it after
/// each one. Returns the GitLab iid.
async fn resume_issue(
    gitlab: &GitlabProject,
    store: &CacheStore,
    mut issue: RedmineIssue,
    payload: &IssuePayload,
    meta: &IssueMeta,
) -> Result<u64, MigrateError> {
    let iid = match issue.gitlab_id {
        Some(iid) => iid,
        None => {
            let created = gitlab.create_issue(payload, meta).await?;
            info!("Created issue (was: {}) {}", issue.id, created.title);
            issue.gitlab_id = Some(created.iid);
            store.save(&issue).await?;
            created.iid
        }
    };
    for note in meta.notes.iter().skip(issue.gitlab_notes) {
        gitlab.create_note(iid, note).await?;
        issue.gitlab_notes += 1;
        store.save(&issue).await?;
    }
    if meta.must_close && !issue.gitlab_closed {
        gitlab.close_issue(iid).await?;
        issue.gitlab_closed = true;
        store.save(&issue).await?;
    }
    Ok(iid)
}

// ── delete-issues ────────────────────────────────────────────────────────

/// Delete every issue of the GitLab project.
pub async fn delete_issues(config: &MigrationConfig) -> Result<MigrationReport, MigrateError> {
    const RESOURCE: &str = "issue deletions";
    let gitlab = connect_gitlab(config).await?;
    let issues = gitlab.issues().await?;
    info!("Got {} issue(s) from gitlab.", issues.len());

    if config.check_only {
        for issue in &issues {
            info!("Would delete issue {} ({})", issue.iid, issue.title);
        }
        return Ok(MigrationReport::checked(RESOURCE, issues.len(), 0));
    }

    let gitlab = &gitlab;
    run_rounds(config, RESOURCE, issues, |i| i.iid, move |issue: GitlabIssue| async move {
        info!("Delete issue {}", issue.iid);
        gitlab.delete_issue(issue.iid).await?;
        Ok::<_, MigrateError>(issue.iid)
    })
    .await
}

// ── link-roadmap / link-issues ───────────────────────────────────────────

/// Append `Moved to <milestone>` to every Redmine version description.
///
/// Versions whose description already links a milestone are left as is.
pub async fn link_roadmap(config: &MigrationConfig) -> Result<MigrationReport, MigrateError> {
    const RESOURCE: &str = "version links";
    let cached = open_cache(config).await?;
    let gitlab = connect_gitlab(config).await?;
    let redmine = connect_redmine(config).await?;

    let versions = cached.versions().await?;
    info!("Got {} version(s) from redmine.", versions.len());
    let milestones = gitlab.milestones_index().await?;
    info!("Got {} milestone(s) from gitlab.", milestones.len());
    let project_url = gitlab.project_url();

    let total = versions.len();
    let mut skipped = 0;
    let mut unmatched = Vec::new();
    let mut todo = Vec::new();
    for mut version in versions {
        let Some(milestone) = milestones.get(&version.name) else {
            warn!("No GitLab milestone titled \"{}\"", version.name);
            unmatched.push(ItemError::Skipped {
                resource: RESOURCE.to_string(),
                redmine_id: version.id,
                reason: format!("no milestone titled \"{}\"", version.name),
            });
            continue;
        };
        if version.description.contains("/milestones/") {
            skipped += 1;
            continue;
        }
        let link = format!("Moved to {}/milestones/{}", project_url, milestone.iid);
        version.description = append_sentence(&version.description, &link);
        todo.push((version, milestone.iid));
    }

    if config.check_only {
        for (version, iid) in &todo {
            info!(
                "Would link redmine version {} ({}) to gitlab milestone {}",
                version.id, version.name, iid
            );
        }
        let mut report = MigrationReport::checked(RESOURCE, total, skipped);
        report.failed = unmatched;
        return Ok(report);
    }

    let (redmine, store) = (&redmine, cached.store());
    let mut report = run_rounds(
        config,
        RESOURCE,
        todo,
        |(version, _)| version.id,
        move |(version, iid)| async move {
            let body = json!({
                "version": {"name": version.name, "description": version.description}
            });
            redmine.update_version(version.id, &body).await?;
            info!("Link redmine version {} ({}) to gitlab milestone {}", version.id, version.name, iid);
            store.save(&version).await?;
            Ok::<_, MigrateError>(iid)
        },
    )
    .await?;
    report.total = total;
    report.skipped = skipped;
    report.failed.extend(unmatched);
    Ok(report)
}

fn append_sentence(text: &str, sentence: &str) -> String {
    let trimmed = text.trim_end();
    if trimmed.is_empty() {
        sentence.to_string()
    } else {
        format!("{trimmed} {sentence}")
    }
}

/// Add a `Moved to <issue>` note to every migrated Redmine issue.
///
/// The GitLab issue is the one recorded by `issues`; failing that, the one
/// whose title matches the subject.
pub async fn link_issues(config: &MigrationConfig) -> Result<MigrationReport, MigrateError> {
    const RESOURCE: &str = "issue links";
    let cached = open_cache(config).await?;
    let gitlab = connect_gitlab(config).await?;
    let redmine = connect_redmine(config).await?;

    let redmine_issues = cached.issues().await?;
    info!("Got {} issue(s) from redmine.", redmine_issues.len());
    let gitlab_issues = gitlab.issues().await?;
    info!("Got {} issue(s) from gitlab.", gitlab_issues.len());
    let by_title: HashMap<&str, u64> = gitlab_issues
        .iter()
        .map(|i| (i.title.as_str(), i.iid))
        .collect();
    let project_url = gitlab.project_url();

    let total = redmine_issues.len();
    let mut unmatched = Vec::new();
    let mut todo = Vec::new();
    for issue in redmine_issues {
        let subject = issue.subject.trim();
        let with_id = format!("-RM-{}-MR-{}", issue.id, issue.subject);
        let iid = issue.gitlab_id.or_else(|| {
            by_title
                .get(subject)
                .or_else(|| by_title.get(with_id.as_str()))
                .copied()
        });
        match iid {
            Some(iid) => {
                let note = format!("Moved to {project_url}/issues/{iid}");
                todo.push((issue.id, issue.subject.clone(), iid, note));
            }
            None => {
                warn!("No GitLab issue for redmine issue {} ({})", issue.id, subject);
                unmatched.push(ItemError::Skipped {
                    resource: RESOURCE.to_string(),
                    redmine_id: issue.id,
                    reason: format!("no GitLab issue titled \"{subject}\""),
                });
            }
        }
    }

    if config.check_only {
        for (id, subject, iid, _) in &todo {
            info!("Would link redmine issue {id} ({subject}) to {iid}");
        }
        let mut report = MigrationReport::checked(RESOURCE, total, 0);
        report.failed = unmatched;
        return Ok(report);
    }

    let redmine = &redmine;
    let mut report = run_rounds(
        config,
        RESOURCE,
        todo,
        |(id, _, _, _)| *id,
        move |(id, subject, iid, note)| async move {
            redmine.update_issue(id, &json!({"issue": {"notes": note}})).await?;
            info!("Link redmine issue {id} ({subject}) to {iid}");
            Ok::<_, MigrateError>(iid)
        },
    )
    .await?;
    report.total = total;
    report.failed.extend(unmatched);
    Ok(report)
}

// ── wiki ─────────────────────────────────────────────────────────────────

/// Convert every Redmine wiki page to Markdown and create it on GitLab.
///
/// Links to Redmine files are listed in the log and left pointing to
/// Redmine.
pub async fn wiki(config: &MigrationConfig) -> Result<MigrationReport, MigrateError> {
    const RESOURCE: &str = "wiki pages";
    let redmine = connect_redmine(config).await?;
    let gitlab = connect_gitlab(config).await?;

    let index = redmine.wiki_index().await?;
    info!("Got {} wiki page(s) from redmine.", index.len());
    // Wiki pages have no numeric id; their 1-based index position stands in.
    let items: Vec<(u64, String)> = (1..)
        .zip(index)
        .map(|(position, page)| (position, page.title))
        .collect();

    if config.check_only {
        for (_, title) in &items {
            let page = redmine.wiki_page(title).await?;
            let converted = convert_text(&page.text);
            info!(
                "Would create wiki page \"{}\" ({} bytes, {} link(s))",
                page.title,
                converted.markdown.len(),
                converted.links.len()
            );
        }
        return Ok(MigrationReport::checked(RESOURCE, items.len(), 0));
    }

    let (redmine, gitlab) = (&redmine, &gitlab);
    run_rounds(
        config,
        RESOURCE,
        items,
        |(position, _)| *position,
        move |(_, title)| async move {
            let page = redmine.wiki_page(&title).await?;
            let converted = convert_text(&page.text);
            for link in &converted.links {
                info!(page = %page.title, label = %link.label, url = %link.url, "Wiki link kept");
            }
            gitlab
                .create_wiki_page(&WikiPayload::markdown(page.title, converted.markdown))
                .await?;
            Ok::<_, MigrateError>(0)
        },
    )
    .await
}
