//! GitLab REST (v4) client and project view.

use crate::converters::{attachments_section, GitlabUserIndex, MilestoneIndex};
use crate::error::MigrateError;
use crate::http::{build_client, decode, decode_all, json_body, send};
use crate::model::{
    GitlabIssue, GitlabMilestone, GitlabUser, IssueMeta, IssuePayload, MilestonePayload,
    NoteDraft, RedmineAttachment, UploadedFile, WikiPayload,
};
use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::multipart::{Form, Part};
use serde::Serialize;
use serde_json::Value;
use tokio::sync::OnceCell;
use tracing::{debug, info};

static RE_PROJECT_URL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?P<base_url>https?://.*/)(?P<namespace>[^/]+)/(?P<project_name>[\w_-]+)/?$")
        .unwrap()
});

// ── Client ───────────────────────────────────────────────────────────────

/// Authenticated GitLab API client.
#[derive(Clone)]
pub struct GitlabClient {
    http: reqwest::Client,
    token: String,
}

impl std::fmt::Debug for GitlabClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GitlabClient").finish_non_exhaustive()
    }
}

impl GitlabClient {
    /// Page size requested on every GET.
    pub const MAX_PER_PAGE: u32 = 100;

    pub fn new(token: impl Into<String>, timeout_secs: u64) -> Result<Self, MigrateError> {
        Ok(Self {
            http: build_client(timeout_secs)?,
            token: token.into(),
        })
    }

    fn request(&self, method: reqwest::Method, url: &str) -> reqwest::RequestBuilder {
        self.http
            .request(method, url)
            .header("PRIVATE-TOKEN", &self.token)
    }

    async fn get_page(&self, url: &str, page: Option<u32>) -> Result<Value, MigrateError> {
        let mut query = vec![("per_page", Self::MAX_PER_PAGE)];
        if let Some(page) = page {
            query.push(("page", page));
        }
        debug!(url, ?page, "GET");
        let request = self.request(reqwest::Method::GET, url).query(&query);
        json_body(send(request, url).await?, url).await
    }

    pub async fn get(&self, url: &str) -> Result<Value, MigrateError> {
        self.get_page(url, None).await
    }

    /// Every item of a list endpoint, walking `page=1..` until an empty page.
    pub async fn get_all_pages(&self, url: &str) -> Result<Vec<Value>, MigrateError> {
        let mut items = Vec::new();
        for page in 1.. {
            match self.get_page(url, Some(page)).await? {
                Value::Array(found) if found.is_empty() => break,
                Value::Array(found) => items.extend(found),
                _ => {
                    return Err(MigrateError::UnexpectedShape {
                        url: url.to_string(),
                        detail: "expected a JSON list".into(),
                    })
                }
            }
        }
        Ok(items)
    }

    pub async fn post_json<T: Serialize + ?Sized>(&self, url: &str, body: &T) -> Result<Value, MigrateError> {
        self.post_json_as(url, body, None).await
    }

    /// POST as another user (`SUDO` header); needs an admin token.
    pub async fn post_json_as<T: Serialize + ?Sized>(
        &self,
        url: &str,
        body: &T,
        sudo: Option<&str>,
    ) -> Result<Value, MigrateError> {
        debug!(url, ?sudo, "POST json");
        let mut request = self.request(reqwest::Method::POST, url).json(body);
        if let Some(user) = sudo {
            request = request.header("SUDO", user);
        }
        json_body(send(request, url).await?, url).await
    }

    pub async fn post_multipart(&self, url: &str, form: Form) -> Result<Value, MigrateError> {
        debug!(url, "POST multipart");
        let request = self.request(reqwest::Method::POST, url).multipart(form);
        json_body(send(request, url).await?, url).await
    }

    pub async fn put_form(&self, url: &str, fields: &[(&str, String)]) -> Result<Value, MigrateError> {
        debug!(url, "PUT form");
        let request = self.request(reqwest::Method::PUT, url).form(fields);
        json_body(send(request, url).await?, url).await
    }

    pub async fn delete(&self, url: &str) -> Result<(), MigrateError> {
        debug!(url, "DELETE");
        send(self.request(reqwest::Method::DELETE, url), url).await?;
        Ok(())
    }
}

// ── Project URL ──────────────────────────────────────────────────────────

/// Parsed `<base>/<namespace>/<project>` URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GitlabProjectUrl {
    /// Instance root, with trailing slash.
    pub base_url: String,
    pub namespace: String,
    pub project_name: String,
}

impl GitlabProjectUrl {
    pub fn parse(url: &str) -> Result<Self, MigrateError> {
        let caps = RE_PROJECT_URL
            .captures(url)
            .ok_or_else(|| MigrateError::InvalidProjectUrl {
                tracker: "GitLab",
                url: url.to_string(),
                expected: "https://<host>/<namespace>/<project>",
            })?;
        Ok(Self {
            base_url: caps["base_url"].to_string(),
            namespace: caps["namespace"].to_string(),
            project_name: caps["project_name"].to_string(),
        })
    }

    /// Browser URL of the project.
    pub fn project_url(&self) -> String {
        format!("{}{}/{}", self.base_url, self.namespace, self.project_name)
    }

    /// API URL addressing the project by its path.
    pub fn api_lookup_url(&self) -> String {
        format!(
            "{}api/v4/projects/{}%2F{}",
            self.base_url, self.namespace, self.project_name
        )
    }
}

// ── Project ──────────────────────────────────────────────────────────────

/// A live GitLab project.
#[derive(Debug)]
pub struct GitlabProject {
    client: GitlabClient,
    url: GitlabProjectUrl,
    id: u64,
    api_url: String,
    /// Filled on first use; later changes to milestones are not seen.
    milestones: OnceCell<Vec<GitlabMilestone>>,
}

impl GitlabProject {
    /// Parse `url` and resolve the numeric project id.
    pub async fn connect(url: &str, client: GitlabClient) -> Result<Self, MigrateError> {
        let url = GitlabProjectUrl::parse(url)?;
        let lookup = url.api_lookup_url();
        let project = client.get(&lookup).await?;
        let id = project
            .get("id")
            .and_then(Value::as_u64)
            .ok_or_else(|| MigrateError::UnexpectedShape {
                url: lookup.clone(),
                detail: "project without numeric id".into(),
            })?;
        info!("Got gitlab project {id}");
        Ok(Self {
            api_url: format!("{}api/v4/projects/{}", url.base_url, id),
            client,
            url,
            id,
            milestones: OnceCell::new(),
        })
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    /// Browser URL, used to build `Moved to …` back-links.
    pub fn project_url(&self) -> String {
        self.url.project_url()
    }

    fn resource_url(&self, resource: &str) -> String {
        format!("{}/{}", self.api_url, resource)
    }

    // ── Generic resources ────────────────────────────────────────────────

    /// POST `fields` to `/projects/:id/<resource>`.
    pub async fn create<T: Serialize + ?Sized>(&self, resource: &str, fields: &T) -> Result<Value, MigrateError> {
        self.client.post_json(&self.resource_url(resource), fields).await
    }

    /// PUT `fields` to `/projects/:id/<resource>/<id>`.
    pub async fn update(
        &self,
        resource: &str,
        id: u64,
        fields: &[(&str, String)],
    ) -> Result<Value, MigrateError> {
        let url = format!("{}/{}", self.resource_url(resource), id);
        self.client.put_form(&url, fields).await
    }

    pub async fn delete(&self, resource: &str, id: u64) -> Result<(), MigrateError> {
        let url = format!("{}/{}", self.resource_url(resource), id);
        self.client.delete(&url).await
    }

    pub async fn list(&self, resource: &str) -> Result<Vec<Value>, MigrateError> {
        self.client.get_all_pages(&self.resource_url(resource)).await
    }

    // ── Typed operations ─────────────────────────────────────────────────

    /// Heuristic: a project without default branch has no commit.
    pub async fn is_repository_empty(&self) -> Result<bool, MigrateError> {
        let project = self.client.get(&self.api_url).await?;
        Ok(project.get("default_branch").is_none_or(Value::is_null))
    }

    /// Upload the cached copy of `attachment`.
    pub async fn create_upload(&self, attachment: &RedmineAttachment) -> Result<UploadedFile, MigrateError> {
        let path = attachment.file.as_ref().ok_or_else(|| MigrateError::CacheMissing {
            path: format!("attachments/{}.data", attachment.id).into(),
        })?;
        let bytes = tokio::fs::read(path).await.map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => MigrateError::CacheMissing { path: path.clone() },
            _ => MigrateError::from_io(path.clone(), e),
        })?;
        let content_type = attachment
            .content_type
            .as_deref()
            .unwrap_or("application/octet-stream");
        let part = Part::bytes(bytes)
            .file_name(attachment.filename.clone())
            .mime_str(content_type)
            .map_err(|e| MigrateError::Internal(format!("Invalid content type '{content_type}': {e}")))?;
        let url = self.resource_url("uploads");
        let uploaded = self.client.post_multipart(&url, Form::new().part("file", part)).await?;
        decode(uploaded, &url)
    }

    /// Create an issue, with its `### Files` section, as its Redmine author.
    ///
    /// Notes and the closing state are separate steps so that a caller can
    /// record the iid before anything else may fail.
    pub async fn create_issue(&self, payload: &IssuePayload, meta: &IssueMeta) -> Result<GitlabIssue, MigrateError> {
        let mut payload = payload.clone();
        payload.description.push_str(&attachments_section(&meta.attachments));

        let url = self.resource_url("issues");
        let created = self
            .client
            .post_json_as(&url, &payload, meta.sudo_user.as_deref())
            .await?;
        decode(created, &url)
    }

    pub async fn create_note(&self, iid: u64, note: &NoteDraft) -> Result<(), MigrateError> {
        let url = format!("{}/{}/notes", self.resource_url("issues"), iid);
        self.client
            .post_json_as(&url, &note.payload, note.sudo_user.as_deref())
            .await?;
        Ok(())
    }

    pub async fn close_issue(&self, iid: u64) -> Result<(), MigrateError> {
        self.update("issues", iid, &[("state_event", "close".to_string())])
            .await?;
        Ok(())
    }

    pub async fn create_milestone(&self, payload: &MilestonePayload) -> Result<GitlabMilestone, MigrateError> {
        let url = self.resource_url("milestones");
        decode(self.create("milestones", payload).await?, &url)
    }

    pub async fn close_milestone(&self, id: u64) -> Result<(), MigrateError> {
        self.update("milestones", id, &[("state_event", "close".to_string())])
            .await?;
        Ok(())
    }

    pub async fn delete_issue(&self, iid: u64) -> Result<(), MigrateError> {
        self.delete("issues", iid).await
    }

    pub async fn issues(&self) -> Result<Vec<GitlabIssue>, MigrateError> {
        decode_all(self.list("issues").await?, &self.resource_url("issues"))
    }

    pub async fn members(&self) -> Result<Vec<GitlabUser>, MigrateError> {
        decode_all(self.list("members").await?, &self.resource_url("members"))
    }

    /// Whether every name in `usernames` is a project member.
    pub async fn has_members<S: AsRef<str>>(&self, usernames: &[S]) -> Result<bool, MigrateError> {
        let members = self.members().await?;
        Ok(usernames
            .iter()
            .all(|name| members.iter().any(|m| m.username == name.as_ref())))
    }

    /// All milestones, fetched once per project value.
    pub async fn milestones(&self) -> Result<&[GitlabMilestone], MigrateError> {
        let milestones = self
            .milestones
            .get_or_try_init(|| async {
                let url = self.resource_url("milestones");
                decode_all(self.list("milestones").await?, &url)
            })
            .await?;
        Ok(milestones.as_slice())
    }

    pub async fn milestones_index(&self) -> Result<MilestoneIndex, MigrateError> {
        Ok(self
            .milestones()
            .await?
            .iter()
            .map(|m| (m.title.clone(), m.clone()))
            .collect())
    }

    pub async fn milestone_by_id(&self, id: u64) -> Result<Option<&GitlabMilestone>, MigrateError> {
        Ok(self.milestones().await?.iter().find(|m| m.id == id))
    }

    /// Users visible from the project.
    pub async fn users(&self) -> Result<Vec<GitlabUser>, MigrateError> {
        decode_all(self.list("users").await?, &self.resource_url("users"))
    }

    pub async fn users_index(&self) -> Result<GitlabUserIndex, MigrateError> {
        Ok(self
            .users()
            .await?
            .into_iter()
            .map(|u| (u.username.clone(), u))
            .collect())
    }

    pub async fn create_wiki_page(&self, payload: &WikiPayload) -> Result<Value, MigrateError> {
        self.create("wikis", payload).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::NotePayload;
    use mockito::{Matcher, Server, ServerGuard};
    use serde_json::json;

    #[test]
    fn parse_project_url() {
        let url = GitlabProjectUrl::parse("http://localhost:3000/diaspora/diaspora-project-site").unwrap();
        assert_eq!(url.base_url, "http://localhost:3000/");
        assert_eq!(url.namespace, "diaspora");
        assert_eq!(url.project_name, "diaspora-project-site");
        assert_eq!(
            url.api_lookup_url(),
            "http://localhost:3000/api/v4/projects/diaspora%2Fdiaspora-project-site"
        );
        assert_eq!(url.project_url(), "http://localhost:3000/diaspora/diaspora-project-site");
    }

    #[test]
    fn reject_bad_project_url() {
        assert!(matches!(
            GitlabProjectUrl::parse("http://localhost:3000/"),
            Err(MigrateError::InvalidProjectUrl { .. })
        ));
    }

    async fn project(server: &mut ServerGuard) -> GitlabProject {
        server
            .mock("GET", Matcher::Regex(r"^/api/v4/projects/team(%2F|/)tool$".into()))
            .match_query(Matcher::Any)
            .match_header("PRIVATE-TOKEN", "tok")
            .with_body(json!({"id": 42, "default_branch": null}).to_string())
            .create_async()
            .await;
        let client = GitlabClient::new("tok", 5).unwrap();
        GitlabProject::connect(&format!("{}/team/tool", server.url()), client)
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn connect_resolves_numeric_id() {
        let mut server = Server::new_async().await;
        let project = project(&mut server).await;
        assert_eq!(project.id(), 42);
        assert_eq!(project.project_url(), format!("{}/team/tool", server.url()));
    }

    #[tokio::test]
    async fn issues_walk_pages_until_empty() {
        let mut server = Server::new_async().await;
        let project = project(&mut server).await;
        for (page, body) in [
            ("1", json!([{"id": 1, "iid": 1, "title": "a"}, {"id": 2, "iid": 2, "title": "b"}])),
            ("2", json!([{"id": 3, "iid": 3, "title": "c"}])),
            ("3", json!([])),
        ] {
            server
                .mock("GET", "/api/v4/projects/42/issues")
                .match_query(Matcher::AllOf(vec![
                    Matcher::UrlEncoded("page".into(), page.into()),
                    Matcher::UrlEncoded("per_page".into(), "100".into()),
                ]))
                .with_body(body.to_string())
                .create_async()
                .await;
        }
        let issues = project.issues().await.unwrap();
        assert_eq!(issues.len(), 3);
        assert_eq!(issues[2].title, "c");
    }

    #[tokio::test]
    async fn create_issue_then_notes_then_close() {
        let mut server = Server::new_async().await;
        let project = project(&mut server).await;

        let create = server
            .mock("POST", "/api/v4/projects/42/issues")
            .match_body(Matcher::PartialJson(json!({
                "title": "Update doc",
                "description": "old\n\n### Files\n  * [log.txt](http://rm/a/7/log.txt)"
            })))
            .with_status(201)
            .with_body(json!({"id": 900, "iid": 12, "title": "Update doc"}).to_string())
            .create_async()
            .await;
        let note = server
            .mock("POST", "/api/v4/projects/42/issues/12/notes")
            .match_header("SUDO", "jack_smith")
            .match_body(Matcher::PartialJson(json!({"body": "done"})))
            .with_status(201)
            .with_body("{}")
            .create_async()
            .await;
        let close = server
            .mock("PUT", "/api/v4/projects/42/issues/12")
            .match_body(Matcher::UrlEncoded("state_event".into(), "close".into()))
            .with_body("{}")
            .create_async()
            .await;

        let attachment: RedmineAttachment = serde_json::from_value(json!({
            "id": 7, "filename": "log.txt", "content_url": "http://rm/a/7/log.txt"
        }))
        .unwrap();
        let payload = IssuePayload {
            title: "Update doc".into(),
            description: "old".into(),
            labels: "From Redmine, Bug, Normal".into(),
            created_at: None,
            due_date: None,
            milestone_id: None,
            assignee_id: None,
        };
        let meta = IssueMeta {
            redmine_id: 1732,
            sudo_user: None,
            notes: vec![NoteDraft {
                payload: NotePayload { body: "done".into() },
                sudo_user: Some("jack_smith".into()),
            }],
            must_close: true,
            attachments: vec![attachment],
        };
        let issue = project.create_issue(&payload, &meta).await.unwrap();
        assert_eq!(issue.iid, 12);
        for draft in &meta.notes {
            project.create_note(issue.iid, draft).await.unwrap();
        }
        project.close_issue(issue.iid).await.unwrap();
        create.assert_async().await;
        note.assert_async().await;
        close.assert_async().await;
    }

    #[tokio::test]
    async fn milestones_are_fetched_once() {
        let mut server = Server::new_async().await;
        let project = project(&mut server).await;
        let first = server
            .mock("GET", "/api/v4/projects/42/milestones")
            .match_query(Matcher::UrlEncoded("page".into(), "1".into()))
            .with_body(json!([{"id": 3, "iid": 1, "title": "v0.11"}]).to_string())
            .expect(1)
            .create_async()
            .await;
        server
            .mock("GET", "/api/v4/projects/42/milestones")
            .match_query(Matcher::UrlEncoded("page".into(), "2".into()))
            .with_body("[]")
            .create_async()
            .await;

        let index = project.milestones_index().await.unwrap();
        assert_eq!(index["v0.11"].id, 3);
        assert!(project.milestone_by_id(3).await.unwrap().is_some());
        assert!(project.milestone_by_id(4).await.unwrap().is_none());
        first.assert_async().await;
    }

    #[tokio::test]
    async fn has_members_checks_every_name() {
        let mut server = Server::new_async().await;
        let project = project(&mut server).await;
        server
            .mock("GET", "/api/v4/projects/42/members")
            .match_query(Matcher::UrlEncoded("page".into(), "1".into()))
            .with_body(
                json!([{"id": 5, "username": "john_smith"}, {"id": 6, "username": "jack_smith"}]).to_string(),
            )
            .create_async()
            .await;
        server
            .mock("GET", "/api/v4/projects/42/members")
            .match_query(Matcher::UrlEncoded("page".into(), "2".into()))
            .with_body("[]")
            .create_async()
            .await;

        assert!(project.has_members(&["john_smith", "jack_smith"]).await.unwrap());
        assert!(!project
            .has_members(&["john_smith", "jack_smith", "macha_smith"])
            .await
            .unwrap());
        assert!(project.has_members::<&str>(&[]).await.unwrap());
    }

    #[tokio::test]
    async fn empty_repository_heuristic() {
        let mut server = Server::new_async().await;
        let project = project(&mut server).await;
        server
            .mock("GET", "/api/v4/projects/42")
            .match_query(Matcher::Any)
            .with_body(json!({"id": 42, "default_branch": null}).to_string())
            .create_async()
            .await;
        assert!(project.is_repository_empty().await.unwrap());
    }
}
