//! Redmine REST client and project view.
//!
//! [`RedmineClient`] knows the two Redmine response quirks:
//!
//! * detail views wrap the record in a single key (`{"issue": {…}}`), which
//!   [`RedmineClient::get`] unwraps;
//! * list views are paginated with `offset`/`limit`/`total_count` and the
//!   list itself sits under the one remaining key, which
//!   [`RedmineClient::get_all_pages`] discovers.
//!
//! [`RedmineProject`] turns a project URL into typed fetches.

use crate::error::MigrateError;
use crate::http::{build_client, decode, decode_all, json_body, send};
use crate::model::{
    ProjectInfo, RedmineAttachment, RedmineIssue, RedmineUser, RedmineVersion, WikiPage,
    WikiPageRef,
};
use futures::stream::{self, StreamExt, TryStreamExt};
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;
use std::collections::BTreeSet;
use tracing::{debug, info};

/// Id of Redmine's built-in anonymous user.
pub const ANONYMOUS_USER_ID: u64 = 2;

/// Keys of a paginated response that are not the list itself.
const PAGINATION_KEYS: [&str; 3] = ["total_count", "offset", "limit"];

const ISSUE_INCLUDES: &str = "journals,watchers,relations,children,attachments";

static RE_PROJECT_URL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?P<base_url>https?://.*)/projects/(?P<project_name>[\w_-]+)/?$").unwrap()
});

static RE_CATEGORY_PROJECT_URL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"^(?P<base_url>https?://.*)/project/(?P<category_name>[\w_-]+)/(?P<project_name>[\w_-]+)/?$",
    )
    .unwrap()
});

// ── Client ───────────────────────────────────────────────────────────────

/// Authenticated Redmine API client.
#[derive(Clone)]
pub struct RedmineClient {
    http: reqwest::Client,
    api_key: String,
}

impl std::fmt::Debug for RedmineClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedmineClient").finish_non_exhaustive()
    }
}

impl RedmineClient {
    /// Page size requested from list endpoints.
    pub const PAGE_MAX_SIZE: u64 = 100;

    pub fn new(api_key: impl Into<String>, timeout_secs: u64) -> Result<Self, MigrateError> {
        Ok(Self {
            http: build_client(timeout_secs)?,
            api_key: api_key.into(),
        })
    }

    async fn get_raw(&self, url: &str, query: &[(&str, String)]) -> Result<Value, MigrateError> {
        debug!(url, ?query, "GET");
        let request = self
            .http
            .get(url)
            .header("X-Redmine-API-Key", &self.api_key)
            .query(query);
        json_body(send(request, url).await?, url).await
    }

    /// GET `url` as JSON; a single-key object is unwrapped to its value.
    pub async fn get(&self, url: &str) -> Result<Value, MigrateError> {
        Ok(unwrap_single_key(self.get_raw(url, &[]).await?))
    }

    /// Every item of a paginated list endpoint, in server order.
    ///
    /// `filters` are extra query parameters (`status_id=*`…); `limit` and
    /// `offset` are managed here.
    pub async fn get_all_pages(
        &self,
        url: &str,
        filters: &[(&str, &str)],
    ) -> Result<Vec<Value>, MigrateError> {
        let mut offset: u64 = 0;
        let mut items = Vec::new();
        loop {
            let mut query: Vec<(&str, String)> =
                filters.iter().map(|(k, v)| (*k, v.to_string())).collect();
            query.push(("limit", Self::PAGE_MAX_SIZE.to_string()));
            if offset > 0 {
                query.push(("offset", offset.to_string()));
            }
            let page = Page::parse(self.get_raw(url, &query).await?, url)?;
            let more = page.has_more();
            items.extend(page.items);
            if !more {
                break;
            }
            offset += Self::PAGE_MAX_SIZE;
        }
        debug!(url, count = items.len(), "Fetched all pages");
        Ok(items)
    }

    /// Raw bytes of `url` (attachment downloads).
    pub async fn download(&self, url: &str) -> Result<Vec<u8>, MigrateError> {
        debug!(url, "Download");
        let request = self.http.get(url).header("X-Redmine-API-Key", &self.api_key);
        let response = send(request, url).await?;
        let bytes = response.bytes().await.map_err(|source| MigrateError::Http {
            url: url.to_string(),
            source,
        })?;
        Ok(bytes.to_vec())
    }

    /// PUT a JSON body; Redmine answers updates with an empty body.
    pub async fn put_json(&self, url: &str, body: &Value) -> Result<(), MigrateError> {
        debug!(url, "PUT");
        let request = self
            .http
            .put(url)
            .header("X-Redmine-API-Key", &self.api_key)
            .json(body);
        send(request, url).await?;
        Ok(())
    }
}

fn unwrap_single_key(value: Value) -> Value {
    match value {
        Value::Object(map) if map.len() == 1 => {
            map.into_iter().next().map(|(_, v)| v).unwrap_or(Value::Null)
        }
        other => other,
    }
}

/// One page of a Redmine list response.
#[derive(Debug)]
struct Page {
    items: Vec<Value>,
    total_count: i64,
    offset: i64,
    limit: i64,
}

impl Page {
    fn parse(value: Value, url: &str) -> Result<Self, MigrateError> {
        let shape = |detail: String| MigrateError::UnexpectedShape {
            url: url.to_string(),
            detail,
        };
        let Value::Object(mut map) = value else {
            return Err(shape("paginated response is not an object".into()));
        };

        let candidates: Vec<String> = map
            .keys()
            .filter(|k| !PAGINATION_KEYS.contains(&k.as_str()))
            .cloned()
            .collect();
        let [list_key] = candidates.as_slice() else {
            return Err(shape(format!(
                "expected exactly one list key, found {candidates:?}"
            )));
        };
        if !map.contains_key("offset") {
            return Err(shape("response is not paginated (no 'offset')".into()));
        }

        let number = |key: &str| map.get(key).and_then(Value::as_i64).unwrap_or(0);
        let (total_count, offset, limit) = (number("total_count"), number("offset"), number("limit"));
        let items = match map.remove(list_key) {
            Some(Value::Array(items)) => items,
            _ => return Err(shape(format!("'{list_key}' is not a list"))),
        };
        Ok(Self {
            items,
            total_count,
            offset,
            limit,
        })
    }

    fn has_more(&self) -> bool {
        self.total_count - self.offset - self.limit > 0
    }
}

// ── Project URL ──────────────────────────────────────────────────────────

/// Parsed Redmine project URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RedmineProjectUrl {
    /// Instance root, e.g. `https://redmine.example.org`.
    pub instance_url: String,
    /// `<instance>/projects/<name>`.
    pub public_url: String,
    pub project_name: String,
}

impl RedmineProjectUrl {
    /// Parse `<base>/projects/<name>`, or the category form
    /// `<base>/project/<category>/<name>/`, normalised to the former.
    pub fn parse(url: &str) -> Result<Self, MigrateError> {
        let caps = RE_CATEGORY_PROJECT_URL
            .captures(url)
            .or_else(|| RE_PROJECT_URL.captures(url))
            .ok_or_else(|| MigrateError::InvalidProjectUrl {
                tracker: "Redmine",
                url: url.to_string(),
                expected: "https://<host>/projects/<name>",
            })?;
        let instance_url = caps["base_url"].to_string();
        let project_name = caps["project_name"].to_string();
        Ok(Self {
            public_url: format!("{instance_url}/projects/{project_name}"),
            instance_url,
            project_name,
        })
    }
}

// ── Project ──────────────────────────────────────────────────────────────

/// A live Redmine project.
#[derive(Debug, Clone)]
pub struct RedmineProject {
    client: RedmineClient,
    url: RedmineProjectUrl,
    info: ProjectInfo,
    concurrency: usize,
}

impl RedmineProject {
    /// Parse `url` and fetch the project record.
    pub async fn connect(
        url: &str,
        client: RedmineClient,
        concurrency: usize,
    ) -> Result<Self, MigrateError> {
        let url = RedmineProjectUrl::parse(url)?;
        let api_url = format!("{}.json", url.public_url);
        let info: ProjectInfo = decode(client.get(&api_url).await?, &api_url)?;
        info!("Got redmine project: {}", info.id);
        Ok(Self {
            client,
            url,
            info,
            concurrency: concurrency.max(1),
        })
    }

    pub fn info(&self) -> &ProjectInfo {
        &self.info
    }

    pub fn public_url(&self) -> &str {
        &self.url.public_url
    }

    pub fn instance_url(&self) -> &str {
        &self.url.instance_url
    }

    /// All issues, any status, with journals, watchers, relations, children
    /// and attachments. Sorted by id.
    pub async fn issues(&self) -> Result<Vec<RedmineIssue>, MigrateError> {
        let list_url = format!("{}/issues.json", self.url.public_url);
        let summaries = self.client.get_all_pages(&list_url, &[("status_id", "*")]).await?;
        let ids: Vec<u64> = summaries
            .iter()
            .map(|s| {
                s.get("id").and_then(Value::as_u64).ok_or_else(|| MigrateError::UnexpectedShape {
                    url: list_url.clone(),
                    detail: "issue without id".into(),
                })
            })
            .collect::<Result<_, _>>()?;
        info!("Fetching {} issue detail(s)", ids.len());

        // The list view has no history; each issue is fetched again in detail.
        let mut issues: Vec<RedmineIssue> = stream::iter(ids)
            .map(|id| async move { self.issue(id).await })
            .buffer_unordered(self.concurrency)
            .try_collect()
            .await?;
        issues.sort_by_key(|i| i.id);
        Ok(issues)
    }

    /// One issue in detail.
    pub async fn issue(&self, id: u64) -> Result<RedmineIssue, MigrateError> {
        let url = format!(
            "{}/issues/{}.json?include={}",
            self.url.instance_url, id, ISSUE_INCLUDES
        );
        decode(self.client.get(&url).await?, &url)
    }

    /// Watchers, authors and assignees of `issues`, without the anonymous
    /// user. Sorted by id.
    pub async fn participants(
        &self,
        issues: &[RedmineIssue],
    ) -> Result<Vec<RedmineUser>, MigrateError> {
        let ids: BTreeSet<u64> = issues
            .iter()
            .flat_map(|issue| {
                issue
                    .watchers
                    .iter()
                    .chain(std::iter::once(&issue.author))
                    .chain(issue.assigned_to.as_ref())
                    .map(|user| user.id)
            })
            .filter(|id| *id != ANONYMOUS_USER_ID)
            .collect();

        stream::iter(ids)
            .map(|id| async move {
                let url = format!("{}/users/{}.json", self.url.instance_url, id);
                decode::<RedmineUser>(self.client.get(&url).await?, &url)
            })
            .buffered(self.concurrency)
            .try_collect()
            .await
    }

    pub async fn versions(&self) -> Result<Vec<RedmineVersion>, MigrateError> {
        let url = format!("{}/versions.json", self.url.public_url);
        let list = list_under(self.client.get(&url).await?, "versions", &url)?;
        let mut versions: Vec<RedmineVersion> = decode_all(list, &url)?;
        versions.sort_by_key(|v| v.id);
        Ok(versions)
    }

    pub async fn download_attachment(
        &self,
        attachment: &RedmineAttachment,
    ) -> Result<Vec<u8>, MigrateError> {
        self.client.download(&attachment.content_url).await
    }

    pub async fn wiki_index(&self) -> Result<Vec<WikiPageRef>, MigrateError> {
        let url = format!("{}/wiki/index.json", self.url.public_url);
        let list = list_under(self.client.get(&url).await?, "wiki_pages", &url)?;
        decode_all(list, &url)
    }

    /// Fetch one page; `title` may hold any character, it is sent as a
    /// single percent-encoded path segment.
    pub async fn wiki_page(&self, title: &str) -> Result<WikiPage, MigrateError> {
        let invalid = || MigrateError::InvalidProjectUrl {
            tracker: "Redmine",
            url: self.url.public_url.clone(),
            expected: "https://<host>/projects/<name>",
        };
        let file = format!("{title}.json");
        let mut url = reqwest::Url::parse(&self.url.public_url).map_err(|_| invalid())?;
        url.path_segments_mut()
            .map_err(|_| invalid())?
            .pop_if_empty()
            .extend(["wiki", file.as_str()]);
        let url = url.to_string();
        decode(self.client.get(&url).await?, &url)
    }

    /// PUT `{"version": …}` to the version.
    pub async fn update_version(&self, id: u64, body: &Value) -> Result<(), MigrateError> {
        let url = format!("{}/versions/{}.json", self.url.instance_url, id);
        self.client.put_json(&url, body).await
    }

    /// PUT `{"issue": …}` to the issue.
    pub async fn update_issue(&self, id: u64, body: &Value) -> Result<(), MigrateError> {
        let url = format!("{}/issues/{}.json", self.url.instance_url, id);
        self.client.put_json(&url, body).await
    }
}

/// `value` is either the bare list (single-key response already unwrapped)
/// or an object holding it under `key`.
fn list_under(value: Value, key: &str, url: &str) -> Result<Vec<Value>, MigrateError> {
    match value {
        Value::Array(items) => Ok(items),
        Value::Object(mut map) => match map.remove(key) {
            Some(Value::Array(items)) => Ok(items),
            _ => Err(MigrateError::UnexpectedShape {
                url: url.to_string(),
                detail: format!("no '{key}' list"),
            }),
        },
        _ => Err(MigrateError::UnexpectedShape {
            url: url.to_string(),
            detail: format!("expected '{key}' list"),
        }),
    }
}
