//! Working tree on the local file system.
//!
//! Serves a site checkout directly, without history or branches. Files are
//! written one at a time, so a failure part-way reports `PartialWrite`.

use super::{CommitOutcome, HostApi, HostCapabilities, RemoteFile, content_hash, within_depth};
use crate::error::{BackendError, BackendResult};
use async_trait::async_trait;
use folio_model::{CommitRequest, FileChange, PersistedFile};
use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};
use tokio::fs;
use tracing::{debug, info};

/// A directory treated as the published branch.
pub struct LocalHost {
    root: PathBuf,
    branch: String,
}

impl LocalHost {
    pub fn new(root: impl Into<PathBuf>, branch: &str) -> Self {
        Self {
            root: root.into(),
            branch: branch.to_string(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolves a repository path below the root.
    fn resolve(&self, path: &str) -> BackendResult<PathBuf> {
        let relative = Path::new(path.trim_start_matches('/'));
        let escapes = relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir));
        if path.is_empty() || escapes {
            return Err(BackendError::Validation(format!(
                "`{path}` is not a repository path"
            )));
        }
        Ok(self.root.join(relative))
    }

    fn check_branch(&self, branch: &str) -> BackendResult<()> {
        if branch != self.branch {
            return Err(BackendError::NotFound(format!("branch {branch}")));
        }
        Ok(())
    }

    async fn read(&self, path: &str) -> BackendResult<Option<Vec<u8>>> {
        match fs::read(self.resolve(path)?).await {
            Ok(content) => Ok(Some(content)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(BackendError::Storage(format!("failed to read {path}: {e}"))),
        }
    }

    async fn apply(&self, change: &FileChange) -> BackendResult<()> {
        let current = self.read(change.path()).await?.map(|c| content_hash(&c));
        let stale = match change {
            FileChange::Write { previous_hash, .. } => previous_hash != &current,
            FileChange::Delete { previous_hash, .. } => {
                current.is_none() || (previous_hash.is_some() && previous_hash != &current)
            }
        };
        if stale {
            return Err(BackendError::Conflict {
                path: change.path().to_string(),
                expected: change.previous_hash().map(str::to_string),
                actual: current,
            });
        }

        let target = self.resolve(change.path())?;
        match change {
            FileChange::Write { path, content, .. } => {
                if let Some(parent) = target.parent() {
                    fs::create_dir_all(parent).await.map_err(|e| {
                        BackendError::Storage(format!("failed to create folder for {path}: {e}"))
                    })?;
                }
                fs::write(&target, content)
                    .await
                    .map_err(|e| BackendError::Storage(format!("failed to write {path}: {e}")))?;
            }
            FileChange::Delete { path, .. } => {
                fs::remove_file(&target)
                    .await
                    .map_err(|e| BackendError::Storage(format!("failed to delete {path}: {e}")))?;
            }
        }
        Ok(())
    }

    async fn walk(&self, dir: &str, depth: usize) -> BackendResult<Vec<String>> {
        let mut found = Vec::new();
        let start = if dir.is_empty() {
            self.root.clone()
        } else {
            self.resolve(dir)?
        };
        let mut pending = vec![(start, dir.to_string(), 1usize)];

        while let Some((folder, prefix, level)) = pending.pop() {
            let mut read_dir = match fs::read_dir(&folder).await {
                Ok(read_dir) => read_dir,
                Err(e) if e.kind() == ErrorKind::NotFound => continue,
                Err(e) => {
                    return Err(BackendError::Storage(format!(
                        "failed to read folder {prefix}: {e}"
                    )));
                }
            };
            while let Some(entry) = read_dir
                .next_entry()
                .await
                .map_err(|e| BackendError::Storage(format!("failed to read folder entry: {e}")))?
            {
                let name = entry.file_name().to_string_lossy().to_string();
                if name.starts_with('.') {
                    continue;
                }
                let path = if prefix.is_empty() {
                    name
                } else {
                    format!("{prefix}/{name}")
                };
                let file_type = entry
                    .file_type()
                    .await
                    .map_err(|e| BackendError::Storage(format!("failed to stat {path}: {e}")))?;
                if file_type.is_dir() {
                    if level < depth {
                        pending.push((entry.path(), path, level + 1));
                    }
                } else {
                    found.push(path);
                }
            }
        }
        found.sort();
        Ok(found)
    }
}

#[async_trait]
impl HostApi for LocalHost {
    fn provider_name(&self) -> &'static str {
        "local"
    }

    fn capabilities(&self) -> HostCapabilities {
        HostCapabilities {
            atomic_commits: false,
            branches: false,
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
        self.check_branch(branch)?;
        let dir = dir.trim_matches('/');
        let mut files = Vec::new();
        for path in self.walk(dir, depth.max(1)).await? {
            if !within_depth(dir, &path, depth) {
                continue;
            }
            let hash = self.read(&path).await?.map(|c| content_hash(&c));
            files.push(RemoteFile { path, hash });
        }
        debug!("Listed {} file(s) under {}", files.len(), dir);
        Ok(files)
    }

    async fn read_file(&self, branch: &str, path: &str) -> BackendResult<PersistedFile> {
        self.check_branch(branch)?;
        let content = self
            .read(path)
            .await?
            .ok_or_else(|| BackendError::NotFound(path.to_string()))?;
        let hash = content_hash(&content);
        Ok(PersistedFile::new(path, content).with_hash(hash))
    }

    async fn file_hash(&self, branch: &str, path: &str) -> BackendResult<Option<String>> {
        self.check_branch(branch)?;
        Ok(self.read(path).await?.map(|c| content_hash(&c)))
    }

    async fn commit(&self, request: &CommitRequest) -> BackendResult<CommitOutcome> {
        self.check_branch(&request.branch)?;
        let mut outcome = CommitOutcome::default();
        let mut applied = Vec::new();

        for (index, change) in request.changes.iter().enumerate() {
            if let Err(e) = self.apply(change).await {
                if applied.is_empty() {
                    return Err(e);
                }
                return Err(BackendError::PartialWrite {
                    applied,
                    failed: request.changes[index..]
                        .iter()
                        .map(|c| c.path().to_string())
                        .collect(),
                    rolled_back: false,
                    reason: e.to_string(),
                });
            }
            if let FileChange::Write { path, content, .. } = change {
                outcome.hashes.insert(path.clone(), content_hash(content));
            }
            applied.push(change.path().to_string());
        }

        outcome.revision = uuid::Uuid::new_v4().to_string();
        info!(
            "Wrote {} change(s) under {}",
            request.changes.len(),
            self.root.display()
        );
        Ok(outcome)
    }
}
