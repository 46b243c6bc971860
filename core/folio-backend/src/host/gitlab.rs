//! GitLab host.
//!
//! A multi-file change is one `repository/commits` call with an action per
//! file. GitLab rejects a `create` for an existing path and an `update` or
//! `delete` for a missing one, which turns a stale view into a conflict.

use super::http::{HttpClient, TokenSource, trim_root};
use super::{
    ChangeRequest, CommitOutcome, HostApi, HostCapabilities, RemoteFile, change_request,
    change_request_title, committed_hashes, status_from_labels, status_label, within_depth,
};
use crate::config::BackendConfig;
use crate::error::{BackendError, BackendResult};
use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use folio_model::{CommitRequest, FileChange, PersistedFile, WorkflowStatus};
use serde::Deserialize;
use serde_json::{Value, json};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// Public GitLab API root.
pub const DEFAULT_API_ROOT: &str = "https://gitlab.com/api/v4";

const PAGE_SIZE: &str = "100";

#[derive(Debug, Deserialize)]
struct TreeItem {
    path: String,
    #[serde(rename = "type")]
    kind: String,
    id: String,
}

#[derive(Debug, Deserialize)]
struct FileResponse {
    content: String,
    blob_id: String,
}

#[derive(Debug, Deserialize)]
struct CommitResponse {
    id: String,
}

#[derive(Debug, Deserialize)]
struct BranchResponse {
    commit: CommitResponse,
}

#[derive(Debug, Deserialize)]
struct CompareResponse {
    #[serde(default)]
    commits: Vec<Value>,
}

#[derive(Debug, Deserialize)]
struct MergeRequest {
    iid: u64,
    source_branch: String,
    #[serde(default)]
    sha: Option<String>,
    #[serde(default)]
    labels: Vec<String>,
}

/// GitLab.com or self-managed GitLab project.
pub struct GitLabHost {
    http: HttpClient,
    project_url: String,
    branch: String,
    label_prefix: String,
}

impl GitLabHost {
    /// Creates a host for the project `config.repo` (`namespace/name`).
    pub fn new(config: &BackendConfig, tokens: Arc<dyn TokenSource>) -> BackendResult<Self> {
        if !config.repo.contains('/') {
            return Err(BackendError::Validation(format!(
                "GitLab repo must be `namespace/name`, got `{}`",
                config.repo
            )));
        }
        let api_root = trim_root(config.api_root.as_deref().unwrap_or(DEFAULT_API_ROOT));
        let project_url = format!(
            "{api_root}/projects/{}",
            urlencoding::encode(&config.repo)
        );
        Self::with_project_url(project_url, config, tokens)
    }

    /// Creates a host whose project endpoints live directly under `project_url`.
    pub fn with_project_url(
        project_url: String,
        config: &BackendConfig,
        tokens: Arc<dyn TokenSource>,
    ) -> BackendResult<Self> {
        Ok(Self {
            http: HttpClient::new(tokens, Duration::from_secs(config.timeout_secs))?,
            project_url: trim_root(&project_url),
            branch: config.branch.clone(),
            label_prefix: config.cms_label_prefix.clone(),
        })
    }

    fn url(&self, suffix: &str) -> String {
        format!("{}/{}", self.project_url, suffix)
    }

    fn file_url(&self, path: &str) -> String {
        self.url(&format!(
            "repository/files/{}",
            urlencoding::encode(path.trim_start_matches('/'))
        ))
    }

    fn to_change_request(&self, request: MergeRequest) -> Option<ChangeRequest> {
        let status =
            status_from_labels(&self.label_prefix, request.labels.iter().map(String::as_str));
        change_request(request.iid, &request.source_branch, status, request.sha)
    }
}

fn commit_error(error: BackendError, request: &CommitRequest) -> BackendError {
    // 400 is GitLab's answer to a stale create/update/delete action.
    match error {
        BackendError::Validation(message)
            if message.contains("already exists") || message.contains("doesn't exist") =>
        {
            BackendError::Conflict {
                path: request
                    .paths()
                    .find(|p| message.contains(p))
                    .unwrap_or(&request.branch)
                    .to_string(),
                expected: None,
                actual: None,
            }
        }
        other => other,
    }
}

#[async_trait]
impl HostApi for GitLabHost {
    fn provider_name(&self) -> &'static str {
        "GitLab"
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
        let url = self.url("repository/tree");
        let recursive = if depth > 1 { "true" } else { "false" };
        let mut files = Vec::new();
        let mut page = "1".to_string();

        loop {
            let response = match self
                .http
                .send("list files", |c| {
                    c.get(url.as_str()).query(&[
                        ("path", dir),
                        ("ref", branch),
                        ("recursive", recursive),
                        ("per_page", PAGE_SIZE),
                        ("page", page.as_str()),
                    ])
                })
                .await
            {
                Ok(response) => response,
                Err(BackendError::NotFound(_)) => break,
                Err(e) => return Err(e),
            };

            let next = response
                .headers()
                .get("x-next-page")
                .and_then(|v| v.to_str().ok())
                .map(str::trim)
                .filter(|v| !v.is_empty())
                .map(str::to_string);
            let items: Vec<TreeItem> = response.json().await.map_err(|e| {
                BackendError::Network(format!("failed to parse tree response: {e}"))
            })?;

            files.extend(
                items
                    .into_iter()
                    .filter(|item| item.kind == "blob" && within_depth(dir, &item.path, depth))
                    .map(|item| RemoteFile {
                        path: item.path,
                        hash: Some(item.id),
                    }),
            );

            match next {
                Some(next) => page = next,
                None => break,
            }
        }

        debug!("Listed {} file(s) under {} on {}", files.len(), dir, branch);
        Ok(files)
    }

    async fn read_file(&self, branch: &str, path: &str) -> BackendResult<PersistedFile> {
        let url = self.file_url(path);
        let file: FileResponse = self
            .http
            .json(path, |c| c.get(url.as_str()).query(&[("ref", branch)]))
            .await?;
        let content = STANDARD
            .decode(file.content.replace(['\n', '\r'], ""))
            .map_err(|e| BackendError::Network(format!("invalid base64 content: {e}")))?;
        Ok(PersistedFile::new(path, content).with_hash(file.blob_id))
    }

    async fn file_hash(&self, branch: &str, path: &str) -> BackendResult<Option<String>> {
        let url = self.file_url(path);
        let response = match self
            .http
            .send(path, |c| c.head(url.as_str()).query(&[("ref", branch)]))
            .await
        {
            Ok(response) => response,
            Err(BackendError::NotFound(_)) => return Ok(None),
            Err(e) => return Err(e),
        };
        Ok(response
            .headers()
            .get("x-gitlab-blob-id")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string))
    }

    async fn commit(&self, request: &CommitRequest) -> BackendResult<CommitOutcome> {
        let actions = request
            .changes
            .iter()
            .map(|change| match change {
                FileChange::Write {
                    path,
                    content,
                    previous_hash,
                } => json!({
                    "action": if previous_hash.is_some() { "update" } else { "create" },
                    "file_path": path,
                    "content": STANDARD.encode(content),
                    "encoding": "base64",
                }),
                FileChange::Delete { path, .. } => json!({
                    "action": "delete",
                    "file_path": path,
                }),
            })
            .collect::<Vec<_>>();

        let url = self.url("repository/commits");
        let body = json!({
            "branch": request.branch,
            "commit_message": request.message,
            "actions": actions,
        });
        let commit: CommitResponse = self
            .http
            .json("commit", |c| c.post(url.as_str()).json(&body))
            .await
            .map_err(|e| commit_error(e, request))?;
        info!(
            "Committed {} change(s) to {} as {}",
            request.changes.len(),
            request.branch,
            commit.id
        );

        // The commit response does not carry blob ids.
        let hashes =
            committed_hashes(request, |path| self.file_hash(&request.branch, path)).await;

        Ok(CommitOutcome {
            revision: commit.id,
            hashes,
        })
    }

    async fn branch_head(&self, branch: &str) -> BackendResult<Option<String>> {
        let url = self.url(&format!(
            "repository/branches/{}",
            urlencoding::encode(branch)
        ));
        let found: Option<BranchResponse> = self
            .http
            .optional("read branch", |c| c.get(url.as_str()))
            .await?;
        Ok(found.map(|b| b.commit.id))
    }

    async fn create_branch(&self, branch: &str, from_revision: &str) -> BackendResult<()> {
        let url = self.url("repository/branches");
        self.http
            .send("create branch", |c| {
                c.post(url.as_str())
                    .query(&[("branch", branch), ("ref", from_revision)])
            })
            .await?;
        debug!("Created branch {} at {}", branch, from_revision);
        Ok(())
    }

    async fn delete_branch(&self, branch: &str) -> BackendResult<()> {
        let url = self.url(&format!(
            "repository/branches/{}",
            urlencoding::encode(branch)
        ));
        self.http
            .send("delete branch", |c| c.delete(url.as_str()))
            .await?;
        Ok(())
    }

    async fn is_fast_forward(&self, target: &str, branch: &str) -> BackendResult<bool> {
        // Commits on `target` that `branch` lacks.
        let url = self.url("repository/compare");
        let compare: CompareResponse = self
            .http
            .json("compare", |c| {
                c.get(url.as_str())
                    .query(&[("from", branch), ("to", target), ("straight", "true")])
            })
            .await?;
        Ok(compare.commits.is_empty())
    }

    async fn list_change_requests(&self) -> BackendResult<Vec<ChangeRequest>> {
        let url = self.url("merge_requests");
        let mut requests = Vec::new();
        let mut page = "1".to_string();
        loop {
            let response = self
                .http
                .send("list merge requests", |c| {
                    c.get(url.as_str()).query(&[
                        ("state", "opened"),
                        ("target_branch", self.branch.as_str()),
                        ("per_page", PAGE_SIZE),
                        ("page", page.as_str()),
                    ])
                })
                .await?;
            let next = response
                .headers()
                .get("x-next-page")
                .and_then(|v| v.to_str().ok())
                .map(str::trim)
                .filter(|v| !v.is_empty())
                .map(str::to_string);
            let merge_requests: Vec<MergeRequest> = response.json().await.map_err(|e| {
                BackendError::Network(format!("failed to parse merge requests: {e}"))
            })?;
            requests.extend(
                merge_requests
                    .into_iter()
                    .filter_map(|mr| self.to_change_request(mr)),
            );
            match next {
                Some(next) => page = next,
                None => break,
            }
        }
        Ok(requests)
    }

    async fn open_change_request(
        &self,
        branch: &str,
        status: WorkflowStatus,
    ) -> BackendResult<ChangeRequest> {
        let url = self.url("merge_requests");
        let body = json!({
            "source_branch": branch,
            "target_branch": self.branch,
            "title": change_request_title(branch),
            "description": "Automatically generated by Folio",
            "labels": status_label(&self.label_prefix, status),
            "remove_source_branch": true,
        });
        let created: MergeRequest = self
            .http
            .json("open merge request", |c| c.post(url.as_str()).json(&body))
            .await?;
        info!("Opened merge request !{} for {}", created.iid, branch);
        change_request(created.iid, &created.source_branch, Some(status), created.sha)
            .ok_or_else(|| BackendError::Validation(format!("`{branch}` is not an entry branch")))
    }

    async fn set_change_request_status(
        &self,
        request: &ChangeRequest,
        status: WorkflowStatus,
    ) -> BackendResult<()> {
        let url = self.url(&format!("merge_requests/{}", request.id));
        let body = json!({
            "remove_labels": status_label(&self.label_prefix, request.status),
            "add_labels": status_label(&self.label_prefix, status),
        });
        self.http
            .send("update merge request", |c| c.put(url.as_str()).json(&body))
            .await?;
        Ok(())
    }

    async fn merge_change_request(&self, request: &ChangeRequest) -> BackendResult<()> {
        let url = self.url(&format!("merge_requests/{}/merge", request.id));
        let mut body = json!({
            "merge_commit_message": format!("Publish {}", request.entry_path),
            "should_remove_source_branch": true,
        });
        if let Some(head) = &request.head {
            body["sha"] = json!(head);
        }
        match self
            .http
            .send("merge", |c| c.put(url.as_str()).json(&body))
            .await
        {
            Ok(_) => {
                info!("Merged !{} into {}", request.id, self.branch);
                Ok(())
            }
            // 405: not mergeable, 406: conflicts, 409: sha mismatch.
            Err(BackendError::Validation(msg))
                if msg.contains("405") || msg.contains("406") =>
            {
                Err(BackendError::Conflict {
                    path: request.branch.clone(),
                    expected: request.head.clone(),
                    actual: None,
                })
            }
            Err(e) => Err(e),
        }
    }

    async fn close_change_request(&self, request: &ChangeRequest) -> BackendResult<()> {
        let url = self.url(&format!("merge_requests/{}", request.id));
        let body = json!({ "state_event": "close" });
        self.http
            .send("close merge request", |c| c.put(url.as_str()).json(&body))
            .await?;
        Ok(())
    }
}
