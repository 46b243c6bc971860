//! Save orchestration.
//!
//! Every save follows the same state machine, whatever the host:
//!
//! ```text
//! Idle → ResolvingBaseState → Writing → Committed
//!                │                  └→ Failed
//!                ├→ Conflicted
//!                └→ Failed (cancelled, host error)
//! ```
//!
//! Resolving reads the branch head, then the current version marker of every
//! touched path, and compares the markers with the base the caller observed.
//! The commit is pinned to that head, so anything landing on the branch
//! after resolution turns into a conflict. Hosts without atomic commits also
//! get a snapshot of the prior content, so a partial write can be
//! compensated.
//!
//! A commit is only resent when the host refused it outright; after an
//! ambiguous failure it may already have landed.

use crate::error::{BackendError, BackendResult};
use crate::host::{HostApi, content_hash};
use crate::retry::{RetryConfig, with_retry, with_retry_when};
use folio_model::{BaseHash, CommitRequest, PersistedFile};
use futures::future::join_all;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, info, info_span, warn};
use uuid::Uuid;

/// Position of one save in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveState {
    Idle,
    ResolvingBaseState,
    Writing,
    Committed,
    Conflicted,
    Failed,
}

impl SaveState {
    pub fn can_transition_to(self, next: SaveState) -> bool {
        use SaveState::*;
        matches!(
            (self, next),
            (Idle, ResolvingBaseState)
                | (ResolvingBaseState, Writing)
                | (ResolvingBaseState, Conflicted)
                | (ResolvingBaseState, Failed)
                | (Writing, Committed)
                | (Writing, Failed)
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Committed | Self::Conflicted | Self::Failed)
    }
}

impl fmt::Display for SaveState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::ResolvingBaseState => "resolving_base_state",
            Self::Writing => "writing",
            Self::Committed => "committed",
            Self::Conflicted => "conflicted",
            Self::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Everything one save writes and deletes on one branch.
#[derive(Debug, Clone, Default)]
pub struct SavePlan {
    pub branch: String,
    pub message: String,
    pub writes: Vec<PersistedFile>,
    pub deletes: Vec<String>,
    /// Version markers the caller last observed.
    pub base_hash: BaseHash,
    /// Every touched path must be absent remotely.
    pub is_new_entry: bool,
}

impl SavePlan {
    pub fn new(branch: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            branch: branch.into(),
            message: message.into(),
            ..Default::default()
        }
    }

    pub fn with_writes(mut self, writes: Vec<PersistedFile>) -> Self {
        self.writes = writes;
        self
    }

    pub fn with_deletes(mut self, deletes: Vec<String>) -> Self {
        self.deletes = deletes;
        self
    }

    pub fn with_base_hash(mut self, base_hash: BaseHash) -> Self {
        self.base_hash = base_hash;
        self
    }

    pub fn new_entry(mut self, is_new_entry: bool) -> Self {
        self.is_new_entry = is_new_entry;
        self
    }

    fn paths(&self) -> Vec<&str> {
        self.writes
            .iter()
            .map(|f| f.path.as_str())
            .chain(self.deletes.iter().map(String::as_str))
            .collect()
    }

    fn expected(&self, path: &str) -> Option<&str> {
        if self.is_new_entry {
            None
        } else {
            self.base_hash.get(path)
        }
    }
}

/// Tracks the state of one save and logs its transitions.
struct SaveRun {
    state: SaveState,
}

impl SaveRun {
    fn advance(&mut self, next: SaveState) {
        debug_assert!(
            self.state.can_transition_to(next),
            "invalid save transition {} -> {}",
            self.state,
            next
        );
        debug!("Save {} -> {}", self.state, next);
        self.state = next;
    }

    fn fail<T>(&mut self, err: BackendError) -> BackendResult<T> {
        let next = if matches!(err, BackendError::Conflict { .. })
            && self.state == SaveState::ResolvingBaseState
        {
            SaveState::Conflicted
        } else {
            SaveState::Failed
        };
        self.advance(next);
        Err(err)
    }
}

/// Prior remote state of the touched paths.
#[derive(Debug, Default)]
struct Resolved {
    /// Branch head read before the hashes.
    head: Option<String>,
    hashes: BTreeMap<String, Option<String>>,
    /// Prior content by path; `None` when the path did not exist.
    snapshot: BTreeMap<String, Option<Vec<u8>>>,
}

impl Resolved {
    fn hash(&self, path: &str) -> Option<String> {
        self.hashes.get(path).cloned().flatten()
    }
}

/// Runs saves against one host.
#[derive(Clone)]
pub struct SaveOrchestrator {
    host: Arc<dyn HostApi>,
    retry: RetryConfig,
}

impl SaveOrchestrator {
    pub fn new(host: Arc<dyn HostApi>, retry: RetryConfig) -> Self {
        Self { host, retry }
    }

    pub fn host(&self) -> &Arc<dyn HostApi> {
        &self.host
    }

    pub fn retry(&self) -> &RetryConfig {
        &self.retry
    }

    /// Runs one save and returns the version markers to base the next save on.
    ///
    /// `cancel` is honoured until writing starts; a cancelled save leaves
    /// the remote untouched. Writing always runs to completion, including
    /// compensation of a partial write.
    pub async fn save(
        &self,
        plan: SavePlan,
        cancel: &CancellationToken,
    ) -> BackendResult<BaseHash> {
        let op = Uuid::new_v4();
        let span = info_span!("save", op = %op, branch = %plan.branch);
        self.run(plan, cancel).instrument(span).await
    }

    async fn run(&self, plan: SavePlan, cancel: &CancellationToken) -> BackendResult<BaseHash> {
        let mut run = SaveRun {
            state: SaveState::Idle,
        };
        run.advance(SaveState::ResolvingBaseState);
        if cancel.is_cancelled() {
            return run.fail(BackendError::Cancelled);
        }

        let resolved = tokio::select! {
            _ = cancel.cancelled() => return run.fail(BackendError::Cancelled),
            resolved = self.resolve(&plan, cancel) => resolved,
        };
        let resolved = match resolved {
            Ok(resolved) => resolved,
            Err(e) => return run.fail(e),
        };

        if let Err(e) = check_base(&plan, &resolved) {
            warn!("Save rejected: {}", e);
            return run.fail(e);
        }
        if cancel.is_cancelled() {
            return run.fail(BackendError::Cancelled);
        }

        run.advance(SaveState::Writing);
        let request = commit_request(&plan, &resolved);
        if request.changes.is_empty() {
            run.advance(SaveState::Committed);
            return Ok(plan.base_hash);
        }

        let committed = with_retry_when(
            &self.retry,
            None,
            "commit",
            BackendError::is_refused,
            || self.host.commit(&request),
        )
        .await;

        match committed {
            Ok(outcome) => {
                let mut base_hash = plan.base_hash.clone();
                for path in &plan.deletes {
                    base_hash.remove(path);
                }
                for file in &plan.writes {
                    let hash = match outcome.hashes.get(&file.path) {
                        Some(hash) => hash.clone(),
                        None => self.committed_hash(&plan.branch, file).await,
                    };
                    base_hash.insert(file.path.clone(), hash);
                }
                run.advance(SaveState::Committed);
                info!(
                    "Saved {} file(s), deleted {} on {} ({})",
                    plan.writes.len(),
                    plan.deletes.len(),
                    plan.branch,
                    outcome.revision
                );
                Ok(base_hash)
            }
            Err(BackendError::PartialWrite {
                applied,
                failed,
                reason,
                ..
            }) => {
                warn!(
                    "Partial write on {}: {} applied, {} failed; compensating",
                    plan.branch,
                    applied.len(),
                    failed.len()
                );
                let rolled_back = self.compensate(&plan.branch, &applied, &resolved).await;
                run.fail(BackendError::PartialWrite {
                    applied,
                    failed,
                    rolled_back,
                    reason,
                })
            }
            Err(e) => run.fail(e),
        }
    }

    async fn resolve(&self, plan: &SavePlan, cancel: &CancellationToken) -> BackendResult<Resolved> {
        let mut resolved = Resolved::default();
        if self.host.capabilities().branches {
            resolved.head = with_retry(&self.retry, Some(cancel), "resolve head", || {
                self.host.branch_head(&plan.branch)
            })
            .await?;
        }

        let paths = plan.paths();
        let hashes = join_all(paths.iter().map(|path| {
            with_retry(&self.retry, Some(cancel), "resolve hash", move || {
                self.host.file_hash(&plan.branch, path)
            })
        }))
        .await;

        for (path, hash) in paths.iter().zip(hashes) {
            resolved.hashes.insert(path.to_string(), hash?);
        }
        debug!("Resolved {} path(s) on {}", resolved.hashes.len(), plan.branch);

        if !self.host.capabilities().atomic_commits {
            let existing = resolved
                .hashes
                .iter()
                .filter(|(_, hash)| hash.is_some())
                .map(|(path, _)| path.as_str())
                .collect::<Vec<_>>();
            let contents = join_all(existing.iter().map(|path| {
                with_retry(&self.retry, Some(cancel), "snapshot", move || {
                    self.host.read_file(&plan.branch, path)
                })
            }))
            .await;
            for path in resolved.hashes.keys() {
                resolved.snapshot.insert(path.clone(), None);
            }
            for (path, file) in existing.iter().zip(contents) {
                resolved.snapshot.insert(path.to_string(), Some(file?.content));
            }
        }
        Ok(resolved)
    }

    /// Version marker of a file the host committed without reporting one.
    async fn committed_hash(&self, branch: &str, file: &PersistedFile) -> String {
        let found = with_retry(&self.retry, None, "committed hash", || {
            self.host.file_hash(branch, &file.path)
        })
        .await;
        match found {
            Ok(Some(hash)) => hash,
            Ok(None) | Err(_) => {
                warn!("No version marker for committed {}; using its content hash", file.path);
                content_hash(&file.content)
            }
        }
    }

    /// Undoes the applied part of a partial write. Returns whether every
    /// applied path is back to its prior state.
    async fn compensate(&self, branch: &str, applied: &[String], resolved: &Resolved) -> bool {
        let mut request = CommitRequest::new(branch, "Revert partial save");
        for path in applied {
            let current = match self.host.file_hash(branch, path).await {
                Ok(current) => current,
                Err(e) => {
                    warn!("Cannot compensate {}: {}", path, e);
                    return false;
                }
            };
            match resolved.snapshot.get(path) {
                Some(Some(content)) => {
                    request = request.write(path.clone(), content.clone(), current);
                }
                Some(None) if current.is_some() => {
                    request = request.delete(path.clone(), current);
                }
                Some(None) => {}
                None => {
                    warn!("No snapshot for {}", path);
                    return false;
                }
            }
        }
        if request.changes.is_empty() {
            return true;
        }

        match self.host.commit(&request).await {
            Ok(_) => {
                info!("Rolled back {} path(s) on {}", applied.len(), branch);
                true
            }
            Err(e) => {
                warn!("Rollback on {} failed: {}", branch, e);
                false
            }
        }
    }
}

/// Compares the observed base with the resolved remote state.
fn check_base(plan: &SavePlan, resolved: &Resolved) -> BackendResult<()> {
    for path in plan.paths() {
        let expected = plan.expected(path);
        let actual = resolved.hash(path);
        // A delete of a file that is already gone needs no base.
        if expected.is_none() && actual.is_none() {
            continue;
        }
        if expected != actual.as_deref() {
            return Err(BackendError::Conflict {
                path: path.to_string(),
                expected: expected.map(str::to_string),
                actual,
            });
        }
    }
    Ok(())
}

fn commit_request(plan: &SavePlan, resolved: &Resolved) -> CommitRequest {
    let mut request = CommitRequest::new(&plan.branch, &plan.message);
    if let Some(head) = &resolved.head {
        request = request.with_parent(head.clone());
    }
    for file in &plan.writes {
        request = request.write(
            file.path.clone(),
            file.content.clone(),
            resolved.hash(&file.path),
        );
    }
    for path in &plan.deletes {
        if let Some(hash) = resolved.hash(path) {
            request = request.delete(path.clone(), Some(hash));
        }
    }
    request
}
