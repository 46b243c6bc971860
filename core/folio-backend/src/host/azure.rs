//! Azure DevOps Repos host.
//!
//! A multi-file change is one push with a single commit; the ref update
//! carries the head we based the change on (`oldObjectId`), and Azure
//! refuses the push with 409 when the branch has moved.

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
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// Azure DevOps Services root.
pub const DEFAULT_API_ROOT: &str = "https://dev.azure.com";

const API_VERSION: &str = "6.0";
const ZERO_ID: &str = "0000000000000000000000000000000000000000";

#[derive(Debug, Deserialize)]
struct ListResponse<T> {
    value: Vec<T>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Item {
    path: String,
    object_id: String,
    #[serde(default)]
    git_object_type: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GitRef {
    object_id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PushResponse {
    commits: Vec<PushCommit>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PushCommit {
    commit_id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CommitDiffs {
    behind_count: u64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PullRequest {
    pull_request_id: u64,
    source_ref_name: String,
    #[serde(default)]
    last_merge_source_commit: Option<PushCommit>,
    #[serde(default)]
    labels: Vec<Label>,
}

#[derive(Debug, Deserialize)]
struct Label {
    name: String,
}

/// Repository in Azure DevOps.
pub struct AzureHost {
    http: HttpClient,
    repo_url: String,
    branch: String,
    label_prefix: String,
}

impl AzureHost {
    /// Creates a host for `config.repo` (`organization/project/name`).
    pub fn new(config: &BackendConfig, tokens: Arc<dyn TokenSource>) -> BackendResult<Self> {
        let parts = config.repo.split('/').collect::<Vec<_>>();
        let [org, project, repo] = parts.as_slice() else {
            return Err(BackendError::Validation(format!(
                "Azure repo must be `organization/project/name`, got `{}`",
                config.repo
            )));
        };
        let api_root = trim_root(config.api_root.as_deref().unwrap_or(DEFAULT_API_ROOT));
        Ok(Self {
            http: HttpClient::new(tokens, Duration::from_secs(config.timeout_secs))?,
            repo_url: format!(
                "{api_root}/{}/{}/_apis/git/repositories/{}",
                urlencoding::encode(org),
                urlencoding::encode(project),
                urlencoding::encode(repo)
            ),
            branch: config.branch.clone(),
            label_prefix: config.cms_label_prefix.clone(),
        })
    }

    fn url(&self, suffix: &str) -> String {
        format!("{}/{}", self.repo_url, suffix)
    }

    fn to_change_request(&self, pull: PullRequest) -> Option<ChangeRequest> {
        let status = status_from_labels(
            &self.label_prefix,
            pull.labels.iter().map(|l| l.name.as_str()),
        );
        change_request(
            pull.pull_request_id,
            &pull.source_ref_name,
            status,
            pull.last_merge_source_commit.map(|c| c.commit_id),
        )
    }

    async fn add_label(&self, id: &str, label: &str) -> BackendResult<()> {
        let url = self.url(&format!("pullrequests/{id}/labels"));
        let body = json!({ "name": label });
        self.http
            .send("add label", |c| {
                c.post(url.as_str())
                    .query(&[("api-version", "6.0-preview.1")])
                    .json(&body)
            })
            .await?;
        Ok(())
    }

    async fn update_ref(&self, branch: &str, old: &str, new: &str) -> BackendResult<()> {
        let url = self.url("refs");
        let body = json!([{
            "name": format!("refs/heads/{branch}"),
            "oldObjectId": old,
            "newObjectId": new,
        }]);
        self.http
            .send("update ref", |c| {
                c.post(url.as_str())
                    .query(&[("api-version", API_VERSION)])
                    .json(&body)
            })
            .await?;
        Ok(())
    }
}

#[async_trait]
impl HostApi for AzureHost {
    fn provider_name(&self) -> &'static str {
        "Azure DevOps"
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
        let url = self.url("items");
        let scope = format!("/{dir}");
        let recursion = if depth > 1 { "full" } else { "oneLevel" };
        let listing: Option<ListResponse<Item>> = self
            .http
            .optional("list files", |c| {
                c.get(url.as_str()).query(&[
                    ("scopePath", scope.as_str()),
                    ("recursionLevel", recursion),
                    ("versionDescriptor.version", branch),
                    ("versionDescriptor.versionType", "branch"),
                    ("api-version", API_VERSION),
                ])
            })
            .await?;

        let files = listing
            .map(|l| l.value)
            .unwrap_or_default()
            .into_iter()
            .filter(|item| item.git_object_type == "blob")
            .map(|item| RemoteFile {
                path: item.path.trim_start_matches('/').to_string(),
                hash: Some(item.object_id),
            })
            .filter(|file| within_depth(dir, &file.path, depth))
            .collect::<Vec<_>>();
        debug!("Listed {} file(s) under {} on {}", files.len(), dir, branch);
        Ok(files)
    }

    async fn read_file(&self, branch: &str, path: &str) -> BackendResult<PersistedFile> {
        let hash = self
            .file_hash(branch, path)
            .await?
            .ok_or_else(|| BackendError::NotFound(path.to_string()))?;
        let url = self.url("items");
        let response = self
            .http
            .send(path, |c| {
                c.get(url.as_str()).query(&[
                    ("path", path),
                    ("versionDescriptor.version", branch),
                    ("versionDescriptor.versionType", "branch"),
                    ("$format", "octetStream"),
                    ("api-version", API_VERSION),
                ])
            })
            .await?;
        let content = response
            .bytes()
            .await
            .map_err(|e| BackendError::Network(format!("{path}: {e}")))?;
        Ok(PersistedFile::new(path, content.to_vec()).with_hash(hash))
    }

    async fn file_hash(&self, branch: &str, path: &str) -> BackendResult<Option<String>> {
        let url = self.url("items");
        let item: Option<Item> = self
            .http
            .optional(path, |c| {
                c.get(url.as_str()).query(&[
                    ("path", path),
                    ("versionDescriptor.version", branch),
                    ("versionDescriptor.versionType", "branch"),
                    ("$format", "json"),
                    ("api-version", API_VERSION),
                ])
            })
            .await?;
        Ok(item.map(|i| i.object_id))
    }

    async fn commit(&self, request: &CommitRequest) -> BackendResult<CommitOutcome> {
        let head = match &request.parent {
            Some(parent) => parent.clone(),
            None => self
                .branch_head(&request.branch)
                .await?
                .ok_or_else(|| BackendError::NotFound(format!("branch {}", request.branch)))?,
        };

        let changes = request
            .changes
            .iter()
            .map(|change| match change {
                FileChange::Write {
                    path,
                    content,
                    previous_hash,
                } => json!({
                    "changeType": if previous_hash.is_some() { "edit" } else { "add" },
                    "item": { "path": format!("/{path}") },
                    "newContent": {
                        "content": STANDARD.encode(content),
                        "contentType": "base64encoded",
                    },
                }),
                FileChange::Delete { path, .. } => json!({
                    "changeType": "delete",
                    "item": { "path": format!("/{path}") },
                }),
            })
            .collect::<Vec<_>>();

        let url = self.url("pushes");
        let body = json!({
            "refUpdates": [{ "name": format!("refs/heads/{}", request.branch), "oldObjectId": head }],
            "commits": [{ "comment": request.message, "changes": changes }],
        });
        let push: PushResponse = match self
            .http
            .json("push", |c| {
                c.post(url.as_str())
                    .query(&[("api-version", API_VERSION)])
                    .json(&body)
            })
            .await
        {
            Ok(push) => push,
            Err(BackendError::Conflict { .. }) => {
                return Err(BackendError::Conflict {
                    path: format!("refs/heads/{}", request.branch),
                    expected: Some(head),
                    actual: None,
                });
            }
            Err(e) => return Err(e),
        };
        let revision = push
            .commits
            .into_iter()
            .next()
            .map(|c| c.commit_id)
            .unwrap_or_default();
        info!(
            "Pushed {} change(s) to {} as {}",
            request.changes.len(),
            request.branch,
            revision
        );

        let hashes =
            committed_hashes(request, |path| self.file_hash(&request.branch, path)).await;

        Ok(CommitOutcome { revision, hashes })
    }

    async fn branch_head(&self, branch: &str) -> BackendResult<Option<String>> {
        let url = self.url("refs");
        let filter = format!("heads/{branch}");
        let refs: ListResponse<GitRef> = self
            .http
            .json("read ref", |c| {
                c.get(url.as_str())
                    .query(&[("filter", filter.as_str()), ("api-version", API_VERSION)])
            })
            .await?;
        Ok(refs.value.into_iter().next().map(|r| r.object_id))
    }

    async fn create_branch(&self, branch: &str, from_revision: &str) -> BackendResult<()> {
        self.update_ref(branch, ZERO_ID, from_revision).await?;
        debug!("Created branch {} at {}", branch, from_revision);
        Ok(())
    }

    async fn delete_branch(&self, branch: &str) -> BackendResult<()> {
        let Some(head) = self.branch_head(branch).await? else {
            return Ok(());
        };
        self.update_ref(branch, &head, ZERO_ID).await
    }

    async fn is_fast_forward(&self, target: &str, branch: &str) -> BackendResult<bool> {
        let url = self.url("diffs/commits");
        let diffs: CommitDiffs = self
            .http
            .json("compare", |c| {
                c.get(url.as_str()).query(&[
                    ("baseVersion", target),
                    ("baseVersionType", "branch"),
                    ("targetVersion", branch),
                    ("targetVersionType", "branch"),
                    ("$top", "1"),
                    ("api-version", API_VERSION),
                ])
            })
            .await?;
        Ok(diffs.behind_count == 0)
    }

    async fn list_change_requests(&self) -> BackendResult<Vec<ChangeRequest>> {
        let url = self.url("pullrequests");
        let target = format!("refs/heads/{}", self.branch);
        let pulls: ListResponse<PullRequest> = self
            .http
            .json("list pull requests", |c| {
                c.get(url.as_str()).query(&[
                    ("searchCriteria.status", "active"),
                    ("searchCriteria.targetRefName", target.as_str()),
                    ("api-version", API_VERSION),
                ])
            })
            .await?;
        Ok(pulls
            .value
            .into_iter()
            .filter_map(|p| self.to_change_request(p))
            .collect())
    }

    async fn open_change_request(
        &self,
        branch: &str,
        status: WorkflowStatus,
    ) -> BackendResult<ChangeRequest> {
        let url = self.url("pullrequests");
        let body = json!({
            "sourceRefName": format!("refs/heads/{branch}"),
            "targetRefName": format!("refs/heads/{}", self.branch),
            "title": change_request_title(branch),
            "description": "Automatically generated by Folio",
            "labels": [{ "name": status_label(&self.label_prefix, status) }],
        });
        let pull: PullRequest = self
            .http
            .json("open pull request", |c| {
                c.post(url.as_str())
                    .query(&[("api-version", API_VERSION)])
                    .json(&body)
            })
            .await?;
        info!("Opened pull request {} for {}", pull.pull_request_id, branch);
        change_request(
            pull.pull_request_id,
            &pull.source_ref_name,
            Some(status),
            pull.last_merge_source_commit.map(|c| c.commit_id),
        )
        .ok_or_else(|| BackendError::Validation(format!("`{branch}` is not an entry branch")))
    }

    async fn set_change_request_status(
        &self,
        request: &ChangeRequest,
        status: WorkflowStatus,
    ) -> BackendResult<()> {
        let old = status_label(&self.label_prefix, request.status);
        let url = self.url(&format!(
            "pullrequests/{}/labels/{}",
            request.id,
            urlencoding::encode(&old)
        ));
        match self
            .http
            .send("remove label", |c| {
                c.delete(url.as_str())
                    .query(&[("api-version", "6.0-preview.1")])
            })
            .await
        {
            Ok(_) | Err(BackendError::NotFound(_)) => {}
            Err(e) => return Err(e),
        }
        self.add_label(&request.id, &status_label(&self.label_prefix, status))
            .await
    }

    async fn merge_change_request(&self, request: &ChangeRequest) -> BackendResult<()> {
        let head = match &request.head {
            Some(head) => head.clone(),
            None => self
                .branch_head(&request.branch)
                .await?
                .ok_or_else(|| BackendError::NotFound(format!("branch {}", request.branch)))?,
        };
        let url = self.url(&format!("pullrequests/{}", request.id));
        let body = json!({
            "status": "completed",
            "lastMergeSourceCommit": { "commitId": head },
            "completionOptions": { "mergeStrategy": "rebase", "deleteSourceBranch": true },
        });
        self.http
            .send("complete pull request", |c| {
                c.patch(url.as_str())
                    .query(&[("api-version", API_VERSION)])
                    .json(&body)
            })
            .await?;
        info!("Completed pull request {} into {}", request.id, self.branch);
        Ok(())
    }

    async fn close_change_request(&self, request: &ChangeRequest) -> BackendResult<()> {
        let url = self.url(&format!("pullrequests/{}", request.id));
        let body = json!({ "status": "abandoned" });
        self.http
            .send("abandon pull request", |c| {
                c.patch(url.as_str())
                    .query(&[("api-version", API_VERSION)])
                    .json(&body)
            })
            .await?;
        Ok(())
    }
}
