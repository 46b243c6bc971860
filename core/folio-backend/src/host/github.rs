//! GitHub host.
//!
//! Uses the git data API so a multi-file change becomes exactly one commit:
//! blobs for every written file (created concurrently), one tree on top of
//! the parent's tree, one commit, then a non-forced ref update. The parent is
//! the head the save resolved against, or the current head when the request
//! names none. A ref that moved since fails the update with 422, reported as
//! a conflict.

use super::http::{HttpClient, TokenSource, encode_path, trim_root};
use super::{
    ChangeRequest, CommitOutcome, HostApi, HostCapabilities, RemoteFile, change_request,
    change_request_title, status_from_labels, status_label, within_depth,
};
use crate::config::BackendConfig;
use crate::error::{BackendError, BackendResult};
use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use folio_model::{CommitRequest, FileChange, PersistedFile, WorkflowStatus};
use futures::future::join_all;
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// Public GitHub API root.
pub const DEFAULT_API_ROOT: &str = "https://api.github.com";

const PAGE_SIZE: usize = 100;

#[derive(Debug, Deserialize)]
struct GitRef {
    object: GitObject,
}

#[derive(Debug, Deserialize)]
struct GitObject {
    sha: String,
}

#[derive(Debug, Deserialize)]
struct GitCommit {
    tree: GitObject,
}

#[derive(Debug, Deserialize)]
struct TreeResponse {
    tree: Vec<TreeItem>,
}

#[derive(Debug, Deserialize)]
struct TreeItem {
    path: String,
    #[serde(rename = "type")]
    kind: String,
    sha: String,
}

#[derive(Debug, Deserialize)]
struct ContentsResponse {
    sha: String,
    #[serde(default)]
    content: String,
    #[serde(default)]
    size: u64,
}

#[derive(Debug, Deserialize)]
struct BlobResponse {
    content: String,
}

#[derive(Debug, Deserialize)]
struct CompareResponse {
    behind_by: u64,
}

#[derive(Debug, Deserialize)]
struct PullRequest {
    number: u64,
    head: PullHead,
    #[serde(default)]
    labels: Vec<Label>,
}

#[derive(Debug, Deserialize)]
struct PullHead {
    #[serde(rename = "ref")]
    branch: String,
    sha: String,
}

#[derive(Debug, Deserialize)]
struct Label {
    name: String,
}

/// GitHub (or GitHub Enterprise) repository.
pub struct GitHubHost {
    http: HttpClient,
    repo_url: String,
    branch: String,
    label_prefix: String,
}

impl GitHubHost {
    /// Creates a host for `config.repo` (`owner/name`).
    pub fn new(config: &BackendConfig, tokens: Arc<dyn TokenSource>) -> BackendResult<Self> {
        if config.repo.split('/').count() != 2 {
            return Err(BackendError::Validation(format!(
                "GitHub repo must be `owner/name`, got `{}`",
                config.repo
            )));
        }
        let api_root = trim_root(config.api_root.as_deref().unwrap_or(DEFAULT_API_ROOT));
        let repo_url = format!("{api_root}/repos/{}", config.repo);
        Self::with_repo_url(repo_url, config, tokens)
    }

    /// Creates a host whose repository endpoints live directly under
    /// `repo_url` (a gateway that implies the repository).
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

    async fn contents(&self, branch: &str, path: &str) -> BackendResult<Option<ContentsResponse>> {
        let url = self.url(&format!("contents/{}", encode_path(path)));
        self.http
            .optional(path, |c| c.get(url.as_str()).query(&[("ref", branch)]))
            .await
    }

    async fn create_blob(&self, path: &str, content: &[u8]) -> BackendResult<(String, String)> {
        let url = self.url("git/blobs");
        let body = json!({ "content": STANDARD.encode(content), "encoding": "base64" });
        let blob: GitObject = self
            .http
            .json(path, |c| c.post(url.as_str()).json(&body))
            .await?;
        Ok((path.to_string(), blob.sha))
    }

    async fn update_ref(&self, branch: &str, sha: &str, expected: Option<&str>) -> BackendResult<()> {
        let url = self.url(&format!("git/refs/heads/{}", encode_path(branch)));
        let body = json!({ "sha": sha, "force": false });
        match self
            .http
            .send("update ref", |c| c.patch(url.as_str()).json(&body))
            .await
        {
            Ok(_) => Ok(()),
            Err(BackendError::Conflict { .. }) => Err(BackendError::Conflict {
                path: format!("refs/heads/{branch}"),
                expected: expected.map(str::to_string),
                actual: None,
            }),
            Err(e) => Err(e),
        }
    }

    fn to_change_request(&self, pull: PullRequest) -> Option<ChangeRequest> {
        let status = status_from_labels(
            &self.label_prefix,
            pull.labels.iter().map(|l| l.name.as_str()),
        );
        change_request(pull.number, &pull.head.branch, status, Some(pull.head.sha))
    }

    async fn add_label(&self, number: &str, label: &str) -> BackendResult<()> {
        let url = self.url(&format!("issues/{number}/labels"));
        let body = json!({ "labels": [label] });
        self.http
            .send("add label", |c| c.post(url.as_str()).json(&body))
            .await?;
        Ok(())
    }
}

fn decode_content(content: &str) -> BackendResult<Vec<u8>> {
    let compact: String = content.chars().filter(|c| !c.is_whitespace()).collect();
    STANDARD
        .decode(compact)
        .map_err(|e| BackendError::Network(format!("invalid base64 content: {e}")))
}

#[async_trait]
impl HostApi for GitHubHost {
    fn provider_name(&self) -> &'static str {
        "GitHub"
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
        let url = self.url(&format!(
            "git/trees/{}:{}",
            urlencoding::encode(branch),
            encode_path(dir)
        ));
        let recursive = if depth > 1 { "1" } else { "0" };
        let tree: Option<TreeResponse> = self
            .http
            .optional("list files", |c| {
                c.get(url.as_str()).query(&[("recursive", recursive)])
            })
            .await?;

        let files = tree
            .map(|t| t.tree)
            .unwrap_or_default()
            .into_iter()
            .filter(|item| item.kind == "blob")
            .map(|item| RemoteFile {
                path: if dir.is_empty() {
                    item.path
                } else {
                    format!("{dir}/{}", item.path)
                },
                hash: Some(item.sha),
            })
            .filter(|file| within_depth(dir, &file.path, depth))
            .collect::<Vec<_>>();
        debug!("Listed {} file(s) under {} on {}", files.len(), dir, branch);
        Ok(files)
    }

    async fn read_file(&self, branch: &str, path: &str) -> BackendResult<PersistedFile> {
        let contents = self
            .contents(branch, path)
            .await?
            .ok_or_else(|| BackendError::NotFound(path.to_string()))?;

        let content = if contents.content.is_empty() && contents.size > 0 {
            // Files over 1 MB come without inline content.
            let url = self.url(&format!("git/blobs/{}", contents.sha));
            let blob: BlobResponse = self.http.json(path, |c| c.get(url.as_str())).await?;
            decode_content(&blob.content)?
        } else {
            decode_content(&contents.content)?
        };

        Ok(PersistedFile::new(path, content).with_hash(contents.sha))
    }

    async fn file_hash(&self, branch: &str, path: &str) -> BackendResult<Option<String>> {
        Ok(self.contents(branch, path).await?.map(|c| c.sha))
    }

    async fn commit(&self, request: &CommitRequest) -> BackendResult<CommitOutcome> {
        let head = match &request.parent {
            Some(parent) => parent.clone(),
            None => self
                .branch_head(&request.branch)
                .await?
                .ok_or_else(|| BackendError::NotFound(format!("branch {}", request.branch)))?,
        };
        if request.changes.is_empty() {
            return Ok(CommitOutcome {
                revision: head,
                hashes: Default::default(),
            });
        }

        let url = self.url(&format!("git/commits/{head}"));
        let parent: GitCommit = self.http.json("read commit", |c| c.get(url.as_str())).await?;

        // Blobs are independent of each other; create them all before the tree.
        let blobs = join_all(request.changes.iter().filter_map(|change| match change {
            FileChange::Write { path, content, .. } => Some(self.create_blob(path, content)),
            FileChange::Delete { .. } => None,
        }))
        .await
        .into_iter()
        .collect::<BackendResult<Vec<_>>>()?;

        let mut tree = Vec::with_capacity(request.changes.len());
        for (path, sha) in &blobs {
            tree.push(json!({ "path": path, "mode": "100644", "type": "blob", "sha": sha }));
        }
        for change in &request.changes {
            if let FileChange::Delete { path, .. } = change {
                tree.push(json!({ "path": path, "mode": "100644", "type": "blob", "sha": null }));
            }
        }

        let url = self.url("git/trees");
        let body = json!({ "base_tree": parent.tree.sha, "tree": tree });
        let new_tree: GitObject = self
            .http
            .json("create tree", |c| c.post(url.as_str()).json(&body))
            .await?;

        let url = self.url("git/commits");
        let body = json!({
            "message": request.message,
            "tree": new_tree.sha,
            "parents": [head],
        });
        let commit: GitObject = self
            .http
            .json("create commit", |c| c.post(url.as_str()).json(&body))
            .await?;

        self.update_ref(&request.branch, &commit.sha, Some(&head))
            .await?;
        info!(
            "Committed {} change(s) to {} as {}",
            request.changes.len(),
            request.branch,
            commit.sha
        );

        Ok(CommitOutcome {
            revision: commit.sha,
            hashes: blobs.into_iter().collect(),
        })
    }

    async fn branch_head(&self, branch: &str) -> BackendResult<Option<String>> {
        let url = self.url(&format!("git/ref/heads/{}", encode_path(branch)));
        let reference: Option<GitRef> = self
            .http
            .optional("read ref", |c| c.get(url.as_str()))
            .await?;
        Ok(reference.map(|r| r.object.sha))
    }

    async fn create_branch(&self, branch: &str, from_revision: &str) -> BackendResult<()> {
        let url = self.url("git/refs");
        let body = json!({ "ref": format!("refs/heads/{branch}"), "sha": from_revision });
        self.http
            .send("create branch", |c| c.post(url.as_str()).json(&body))
            .await?;
        debug!("Created branch {} at {}", branch, from_revision);
        Ok(())
    }

    async fn delete_branch(&self, branch: &str) -> BackendResult<()> {
        let url = self.url(&format!("git/refs/heads/{}", encode_path(branch)));
        self.http
            .send("delete branch", |c| c.delete(url.as_str()))
            .await?;
        Ok(())
    }

    async fn is_fast_forward(&self, target: &str, branch: &str) -> BackendResult<bool> {
        let url = self.url(&format!(
            "compare/{}...{}",
            urlencoding::encode(target),
            urlencoding::encode(branch)
        ));
        let compare: CompareResponse = self.http.json("compare", |c| c.get(url.as_str())).await?;
        Ok(compare.behind_by == 0)
    }

    async fn list_change_requests(&self) -> BackendResult<Vec<ChangeRequest>> {
        let url = self.url("pulls");
        let mut requests = Vec::new();
        let mut page = 1usize;
        loop {
            let page_str = page.to_string();
            let per_page = PAGE_SIZE.to_string();
            let pulls: Vec<PullRequest> = self
                .http
                .json("list pull requests", |c| {
                    c.get(url.as_str()).query(&[
                        ("state", "open"),
                        ("base", self.branch.as_str()),
                        ("per_page", per_page.as_str()),
                        ("page", page_str.as_str()),
                    ])
                })
                .await?;
            let count = pulls.len();
            requests.extend(pulls.into_iter().filter_map(|p| self.to_change_request(p)));
            if count < PAGE_SIZE {
                break;
            }
            page += 1;
        }
        Ok(requests)
    }

    async fn open_change_request(
        &self,
        branch: &str,
        status: WorkflowStatus,
    ) -> BackendResult<ChangeRequest> {
        let url = self.url("pulls");
        let body = json!({
            "title": change_request_title(branch),
            "body": "Automatically generated by Folio",
            "head": branch,
            "base": self.branch,
        });
        let pull: PullRequest = self
            .http
            .json("open pull request", |c| c.post(url.as_str()).json(&body))
            .await?;
        let number = pull.number.to_string();
        self.add_label(&number, &status_label(&self.label_prefix, status))
            .await?;
        info!("Opened pull request #{} for {}", number, branch);

        change_request(pull.number, &pull.head.branch, Some(status), Some(pull.head.sha))
            .ok_or_else(|| BackendError::Validation(format!("`{branch}` is not an entry branch")))
    }

    async fn set_change_request_status(
        &self,
        request: &ChangeRequest,
        status: WorkflowStatus,
    ) -> BackendResult<()> {
        let old = status_label(&self.label_prefix, request.status);
        let url = self.url(&format!(
            "issues/{}/labels/{}",
            request.id,
            urlencoding::encode(&old)
        ));
        match self.http.send("remove label", |c| c.delete(url.as_str())).await {
            Ok(_) | Err(BackendError::NotFound(_)) => {}
            Err(e) => return Err(e),
        }
        self.add_label(&request.id, &status_label(&self.label_prefix, status))
            .await
    }

    async fn merge_change_request(&self, request: &ChangeRequest) -> BackendResult<()> {
        let head = self
            .branch_head(&request.branch)
            .await?
            .ok_or_else(|| BackendError::NotFound(format!("branch {}", request.branch)))?;
        let base = self.branch_head(&self.branch).await?;
        self.update_ref(&self.branch, &head, base.as_deref()).await?;
        info!("Fast-forwarded {} to {} (#{})", self.branch, head, request.id);
        Ok(())
    }

    async fn close_change_request(&self, request: &ChangeRequest) -> BackendResult<()> {
        let url = self.url(&format!("pulls/{}", request.id));
        let body = json!({ "state": "closed" });
        self.http
            .send("close pull request", |c| c.patch(url.as_str()).json(&body))
            .await?;
        Ok(())
    }
}
