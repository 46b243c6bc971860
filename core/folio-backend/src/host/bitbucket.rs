//! Bitbucket Cloud host.
//!
//! Commits go through the multipart `/src` endpoint: every written file is
//! a form field named after its path and deleted paths are listed in
//! `files`. The endpoint has no per-file precondition; the commit is
//! parented on the head read just before it.
//!
//! Bitbucket pull requests have no labels; the workflow status lives in
//! pull request comments of the form `{prefix}{status}`, newest first.

use super::http::{HttpClient, TokenSource, encode_path, trim_root};
use super::{
    ChangeRequest, CommitOutcome, HostApi, HostCapabilities, RemoteFile, change_request,
    change_request_title, content_hash, status_label, within_depth,
};
use crate::config::BackendConfig;
use crate::error::{BackendError, BackendResult};
use async_trait::async_trait;
use folio_model::{CommitRequest, FileChange, PersistedFile, WorkflowStatus};
use reqwest::multipart::{Form, Part};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::json;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Public Bitbucket API root.
pub const DEFAULT_API_ROOT: &str = "https://api.bitbucket.org/2.0";

#[derive(Debug, Deserialize)]
struct Page<T> {
    #[serde(default = "Vec::new")]
    values: Vec<T>,
    #[serde(default)]
    next: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SrcItem {
    path: String,
    #[serde(rename = "type")]
    kind: String,
}

#[derive(Debug, Deserialize)]
struct BranchResponse {
    target: CommitHash,
}

#[derive(Debug, Deserialize)]
struct CommitHash {
    hash: String,
}

#[derive(Debug, Deserialize)]
struct PullRequest {
    id: u64,
    source: PullSource,
}

#[derive(Debug, Deserialize)]
struct PullSource {
    branch: BranchName,
    #[serde(default)]
    commit: Option<CommitHash>,
}

#[derive(Debug, Deserialize)]
struct BranchName {
    name: String,
}

#[derive(Debug, Deserialize)]
struct Comment {
    content: CommentContent,
}

#[derive(Debug, Deserialize)]
struct CommentContent {
    raw: String,
}

/// Bitbucket Cloud repository.
pub struct BitbucketHost {
    http: HttpClient,
    repo_url: String,
    branch: String,
    label_prefix: String,
}

impl BitbucketHost {
    /// Creates a host for `config.repo` (`workspace/name`).
    pub fn new(config: &BackendConfig, tokens: Arc<dyn TokenSource>) -> BackendResult<Self> {
        if config.repo.split('/').count() != 2 {
            return Err(BackendError::Validation(format!(
                "Bitbucket repo must be `workspace/name`, got `{}`",
                config.repo
            )));
        }
        let api_root = trim_root(config.api_root.as_deref().unwrap_or(DEFAULT_API_ROOT));
        let repo_url = format!("{api_root}/repositories/{}", config.repo);
        Self::with_repo_url(repo_url, config, tokens)
    }

    /// Creates a host whose repository endpoints live directly under `repo_url`.
    pub fn with_repo_url(
        repo_url: String,
        config: &BackendConfig,
        tokens: Arc<dyn TokenSource>,
    ) -> BackendResult<Self> {
        Ok(Self {
            http: HttpClient::new(tokens, Duration::from_secs(config.timeout_secs))?,
            repo_url: trim_root(&repo_url),
            branch: config.branch.clone(),
            label_prefix: config.cms_label_prefix.clone(),
        })
    }

    fn url(&self, suffix: &str) -> String {
        format!("{}/{}", self.repo_url, suffix)
    }

    /// Follows `next` links until the listing is exhausted.
    async fn paginate<T: DeserializeOwned>(
        &self,
        context: &str,
        first: String,
    ) -> BackendResult<Vec<T>> {
        let mut items = Vec::new();
        let mut url = Some(first);
        while let Some(current) = url.take() {
            let page: Page<T> = self.http.json(context, |c| c.get(current.as_str())).await?;
            items.extend(page.values);
            url = page.next;
        }
        Ok(items)
    }

    async fn raw(&self, branch: &str, path: &str) -> BackendResult<Option<Vec<u8>>> {
        let url = self.url(&format!(
            "src/{}/{}",
            urlencoding::encode(branch),
            encode_path(path)
        ));
        let response = match self.http.send(path, |c| c.get(url.as_str())).await {
            Ok(response) => response,
            Err(BackendError::NotFound(_)) => return Ok(None),
            Err(e) => return Err(e),
        };
        let bytes = response
            .bytes()
            .await
            .map_err(|e| BackendError::Network(format!("{path}: {e}")))?;
        Ok(Some(bytes.to_vec()))
    }

    async fn latest_status(&self, id: u64) -> BackendResult<Option<WorkflowStatus>> {
        let first = format!(
            "{}?sort=-created_on&pagelen=50",
            self.url(&format!("pullrequests/{id}/comments"))
        );
        let comments: Vec<Comment> = self.paginate("list comments", first).await?;
        Ok(comments.iter().find_map(|c| {
            c.content
                .raw
                .trim()
                .strip_prefix(&self.label_prefix)
                .and_then(|s| s.parse().ok())
        }))
    }

    async fn comment_status(&self, id: &str, status: WorkflowStatus) -> BackendResult<()> {
        let url = self.url(&format!("pullrequests/{id}/comments"));
        let body = json!({ "content": { "raw": status_label(&self.label_prefix, status) } });
        self.http
            .send("comment status", |c| c.post(url.as_str()).json(&body))
            .await?;
        Ok(())
    }
}

#[async_trait]
impl HostApi for BitbucketHost {
    fn provider_name(&self) -> &'static str {
        "Bitbucket"
    }

    fn capabilities(&self) -> HostCapabilities {
        HostCapabilities {
            atomic_commits: true,
            branches: true,
        }
    }

    fn default_branch(&self) -> &str {
        &self.branch
    }

    async fn list_files(
        &self,
        branch: &str,
        dir: &str,
        depth: usize,
    ) -> BackendResult<Vec<RemoteFile>> {
        let dir = dir.trim_matches('/');
        let first = format!(
            "{}/?max_depth={}&pagelen=100",
            self.url(&format!(
                "src/{}/{}",
                urlencoding::encode(branch),
                encode_path(dir)
            ))
            .trim_end_matches('/'),
            depth.max(1)
        );
        let items: Vec<SrcItem> = match self.paginate("list files", first).await {
            Ok(items) => items,
            Err(BackendError::NotFound(_)) => Vec::new(),
            Err(e) => return Err(e),
        };
        let files = items
            .into_iter()
            .filter(|item| item.kind == "commit_file" && within_depth(dir, &item.path, depth))
            .map(|item| RemoteFile {
                path: item.path,
                hash: None,
            })
            .collect::<Vec<_>>();
        debug!("Listed {} file(s) under {} on {}", files.len(), dir, branch);
        Ok(files)
    }

    async fn read_file(&self, branch: &str, path: &str) -> BackendResult<PersistedFile> {
        let content = self
            .raw(branch, path)
            .await?
            .ok_or_else(|| BackendError::NotFound(path.to_string()))?;
        let hash = content_hash(&content);
        Ok(PersistedFile::new(path, content).with_hash(hash))
    }

    async fn file_hash(&self, branch: &str, path: &str) -> BackendResult<Option<String>> {
        Ok(self.raw(branch, path).await?.map(|c| content_hash(&c)))
    }

    async fn commit(&self, request: &CommitRequest) -> BackendResult<CommitOutcome> {
        let parent = match &request.parent {
            Some(parent) => Some(parent.clone()),
            None => self.branch_head(&request.branch).await?,
        };

        let mut form = Form::new()
            .text("message", request.message.clone())
            .text("branch", request.branch.clone());
        if let Some(parent) = &parent {
            form = form.text("parents", parent.clone());
        }
        let mut hashes = BTreeMap::new();
        for change in &request.changes {
            match change {
                FileChange::Write { path, content, .. } => {
                    hashes.insert(path.clone(), content_hash(content));
                    let part = Part::bytes(content.clone()).file_name(path.clone());
                    form = form.part(path.clone(), part);
                }
                FileChange::Delete { path, .. } => {
                    form = form.text("files", path.clone());
                }
            }
        }

        // A multipart form is consumed by sending, so this request bypasses
        // the token refresh retry.
        let url = self.url("src");
        self.http
            .send_once("commit", self.http.raw().post(url.as_str()).multipart(form))
            .await?;

        // The commit landed; a failed head lookup only loses the revision id.
        let revision = match self.branch_head(&request.branch).await {
            Ok(head) => head.unwrap_or_default(),
            Err(e) => {
                warn!("Cannot read head of {} after commit: {}", request.branch, e);
                String::new()
            }
        };
        info!(
            "Committed {} change(s) to {} as {}",
            request.changes.len(),
            request.branch,
            revision
        );
        Ok(CommitOutcome { revision, hashes })
    }

    async fn branch_head(&self, branch: &str) -> BackendResult<Option<String>> {
        let url = self.url(&format!(
            "refs/branches/{}",
            urlencoding::encode(branch)
        ));
        let found: Option<BranchResponse> = self
            .http
            .optional("read branch", |c| c.get(url.as_str()))
            .await?;
        Ok(found.map(|b| b.target.hash))
    }

    async fn create_branch(&self, branch: &str, from_revision: &str) -> BackendResult<()> {
        let url = self.url("refs/branches");
        let body = json!({ "name": branch, "target": { "hash": from_revision } });
        self.http
            .send("create branch", |c| c.post(url.as_str()).json(&body))
            .await?;
        debug!("Created branch {} at {}", branch, from_revision);
        Ok(())
    }

    async fn delete_branch(&self, branch: &str) -> BackendResult<()> {
        let url = self.url(&format!(
            "refs/branches/{}",
            urlencoding::encode(branch)
        ));
        self.http
            .send("delete branch", |c| c.delete(url.as_str()))
            .await?;
        Ok(())
    }

    async fn is_fast_forward(&self, target: &str, branch: &str) -> BackendResult<bool> {
        // Commits reachable from `target` but not from `branch`.
        let url = self.url(&format!("commits/{}", urlencoding::encode(target)));
        let page: Page<CommitHash> = self
            .http
            .json("compare", |c| {
                c.get(url.as_str())
                    .query(&[("exclude", branch), ("pagelen", "1")])
            })
            .await?;
        Ok(page.values.is_empty())
    }

    async fn list_change_requests(&self) -> BackendResult<Vec<ChangeRequest>> {
        let first = format!(
            "{}?state=OPEN&pagelen=50&q={}",
            self.url("pullrequests"),
            urlencoding::encode(&format!("destination.branch.name=\"{}\"", self.branch))
        );
        let pulls: Vec<PullRequest> = self.paginate("list pull requests", first).await?;
        let mut requests = Vec::new();
        for pull in pulls {
            if super::parse_cms_branch(&pull.source.branch.name).is_none() {
                continue;
            }
            let status = self.latest_status(pull.id).await?;
            if let Some(request) = change_request(
                pull.id,
                &pull.source.branch.name,
                status,
                pull.source.commit.map(|c| c.hash),
            ) {
                requests.push(request);
            }
        }
        Ok(requests)
    }

    async fn open_change_request(
        &self,
        branch: &str,
        status: WorkflowStatus,
    ) -> BackendResult<ChangeRequest> {
        let url = self.url("pullrequests");
        let body = json!({
            "title": change_request_title(branch),
            "description": "Automatically generated by Folio",
            "source": { "branch": { "name": branch } },
            "destination": { "branch": { "name": self.branch } },
            "close_source_branch": true,
        });
        let pull: PullRequest = self
            .http
            .json("open pull request", |c| c.post(url.as_str()).json(&body))
            .await?;
        let id = pull.id.to_string();
        self.comment_status(&id, status).await?;
        info!("Opened pull request #{} for {}", id, branch);
        change_request(
            pull.id,
            &pull.source.branch.name,
            Some(status),
            pull.source.commit.map(|c| c.hash),
        )
        .ok_or_else(|| BackendError::Validation(format!("`{branch}` is not an entry branch")))
    }

    async fn set_change_request_status(
        &self,
        request: &ChangeRequest,
        status: WorkflowStatus,
    ) -> BackendResult<()> {
        self.comment_status(&request.id, status).await
    }

    async fn merge_change_request(&self, request: &ChangeRequest) -> BackendResult<()> {
        let url = self.url(&format!("pullrequests/{}/merge", request.id));
        let body = json!({
            "merge_strategy": "fast_forward",
            "close_source_branch": true,
            "message": format!("Publish {}", request.entry_path),
        });
        self.http
            .send("merge", |c| c.post(url.as_str()).json(&body))
            .await?;
        info!("Merged #{} into {}", request.id, self.branch);
        Ok(())
    }

    async fn close_change_request(&self, request: &ChangeRequest) -> BackendResult<()> {
        let url = self.url(&format!("pullrequests/{}/decline", request.id));
        self.http
            .send("decline pull request", |c| c.post(url.as_str()))
            .await?;
        Ok(())
    }
}
