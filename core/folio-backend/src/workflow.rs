//! Editorial workflow.
//!
//! An unpublished entry lives on its own branch, `cms/{collection}/{path}`,
//! with an open change request that carries its [`WorkflowStatus`]. The
//! status only ever moves to its immediate successor; reaching `Published`
//! fast-forwards the published branch onto the entry's branch.

use crate::error::{BackendError, BackendResult};
use crate::host::{ChangeRequest, HostApi, cms_branch};
use crate::orchestrator::{SaveOrchestrator, SavePlan};
use crate::retry::with_retry;
use folio_model::{BaseHash, WorkflowStatus};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Drives unpublished entries through draft, review and publish.
#[derive(Clone)]
pub struct WorkflowManager {
    orchestrator: SaveOrchestrator,
}

impl WorkflowManager {
    pub fn new(orchestrator: SaveOrchestrator) -> Self {
        Self { orchestrator }
    }

    fn host(&self) -> &Arc<dyn HostApi> {
        self.orchestrator.host()
    }

    /// Open change requests, optionally limited to one collection.
    pub async fn change_requests(
        &self,
        collection: Option<&str>,
    ) -> BackendResult<Vec<ChangeRequest>> {
        let retry = self.orchestrator.retry();
        let requests = with_retry(retry, None, "list change requests", || {
            self.host().list_change_requests()
        })
        .await?;
        Ok(requests
            .into_iter()
            .filter(|r| collection.is_none_or(|c| r.collection == c))
            .collect())
    }

    /// The open change request of the entry at `entry_path`.
    pub async fn find(&self, entry_path: &str) -> BackendResult<Option<ChangeRequest>> {
        Ok(self
            .change_requests(None)
            .await?
            .into_iter()
            .find(|r| r.entry_path == entry_path))
    }

    async fn require(&self, entry_path: &str) -> BackendResult<ChangeRequest> {
        self.find(entry_path)
            .await?
            .ok_or_else(|| BackendError::NotFound(format!("unpublished entry {entry_path}")))
    }

    /// Saves an entry onto its change-set, opening one (as a draft) when the
    /// entry has none yet.
    pub async fn save(
        &self,
        collection: &str,
        entry_path: &str,
        mut plan: SavePlan,
        cancel: &CancellationToken,
    ) -> BackendResult<BaseHash> {
        if let Some(request) = self.find(entry_path).await? {
            plan.branch = request.branch;
            return self.orchestrator.save(plan, cancel).await;
        }

        if cancel.is_cancelled() {
            return Err(BackendError::Cancelled);
        }

        let branch = cms_branch(collection, entry_path);
        let published = self.host().default_branch().to_string();
        let head = self
            .host()
            .branch_head(&published)
            .await?
            .ok_or_else(|| BackendError::NotFound(format!("branch {published}")))?;

        // A branch left behind by an earlier, unfinished save is reused.
        let created = match self.host().branch_head(&branch).await? {
            Some(_) => false,
            None => {
                self.host().create_branch(&branch, &head).await?;
                true
            }
        };

        plan.branch = branch.clone();
        let base_hash = match self.orchestrator.save(plan, cancel).await {
            Ok(base_hash) => base_hash,
            Err(e) => {
                if created {
                    if let Err(cleanup) = self.host().delete_branch(&branch).await {
                        warn!("Failed to remove branch {}: {}", branch, cleanup);
                    }
                }
                return Err(e);
            }
        };

        self.host()
            .open_change_request(&branch, WorkflowStatus::Draft)
            .await?;
        info!("Started draft of {} on {}", entry_path, branch);
        Ok(base_hash)
    }

    /// Moves an entry to `status`, which must be the current status'
    /// immediate successor. Moving to `Published` publishes.
    pub async fn update_status(
        &self,
        entry_path: &str,
        status: WorkflowStatus,
    ) -> BackendResult<()> {
        let request = self.require(entry_path).await?;
        if !request.status.can_transition_to(status) {
            return Err(BackendError::InvalidTransition {
                from: request.status,
                to: status,
            });
        }
        if status == WorkflowStatus::Published {
            return self.publish_request(request).await;
        }
        self.host()
            .set_change_request_status(&request, status)
            .await?;
        info!("Moved {} from {} to {}", entry_path, request.status, status);
        Ok(())
    }

    /// Publishes an entry that is pending publish.
    pub async fn publish(&self, entry_path: &str) -> BackendResult<()> {
        let request = self.require(entry_path).await?;
        if !request.status.can_transition_to(WorkflowStatus::Published) {
            return Err(BackendError::InvalidTransition {
                from: request.status,
                to: WorkflowStatus::Published,
            });
        }
        self.publish_request(request).await
    }

    async fn publish_request(&self, request: ChangeRequest) -> BackendResult<()> {
        let published = self.host().default_branch().to_string();
        if !self
            .host()
            .is_fast_forward(&published, &request.branch)
            .await?
        {
            let expected = self.host().branch_head(&published).await?;
            let actual = self.host().branch_head(&request.branch).await?;
            warn!(
                "Cannot publish {}: {} has diverged",
                request.entry_path, published
            );
            return Err(BackendError::Conflict {
                path: request.entry_path.clone(),
                expected,
                actual,
            });
        }

        self.host().merge_change_request(&request).await?;
        self.remove_branch(&request.branch).await?;
        info!("Published {} onto {}", request.entry_path, published);
        Ok(())
    }

    /// Drops an entry's change-set without publishing it.
    pub async fn discard(&self, entry_path: &str) -> BackendResult<()> {
        let request = self.require(entry_path).await?;
        self.host().close_change_request(&request).await?;
        self.remove_branch(&request.branch).await?;
        info!("Discarded unpublished changes of {}", entry_path);
        Ok(())
    }

    /// Some hosts delete the source branch themselves on merge or close.
    async fn remove_branch(&self, branch: &str) -> BackendResult<()> {
        match self.host().delete_branch(branch).await {
            Ok(()) => Ok(()),
            Err(BackendError::NotFound(_)) => {
                debug!("Branch {} already removed", branch);
                Ok(())
            }
            Err(e) => Err(e),
        }
    }
}
