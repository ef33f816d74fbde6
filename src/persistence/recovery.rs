use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use super::{ExecutionSnapshot, PersistenceProvider, RecoveryPolicy};
use crate::error::{Result, WorkflowError};
use crate::foundry::Foundry;
use crate::smith::Smith;
use crate::workflow::Workflow;

/// Source of pending (incomplete) executions to resume, typically backed by the same
/// store as a [`PersistenceProvider`].
#[async_trait]
pub trait RecoveryCatalog: Send + Sync {
    async fn list_pending(&self) -> Result<Vec<ExecutionSnapshot>>;
}

/// Resumes workflow executions from durable snapshots. Retries a failed resume attempt
/// per [`RecoveryPolicy`]; does not reconstruct a compensation stack for operations
/// already committed before the snapshot was taken — those are assumed idempotent and
/// are not replayed.
pub struct RecoveryCoordinator<P: PersistenceProvider> {
    provider: std::sync::Arc<P>,
    policy: RecoveryPolicy,
}

impl<P: PersistenceProvider> RecoveryCoordinator<P> {
    pub fn new(provider: std::sync::Arc<P>, policy: RecoveryPolicy) -> Self {
        Self { provider, policy }
    }

    /// Resumes a single execution identified by `(foundry_key, workflow_key)`.
    pub async fn resume<FF, WF>(
        &self,
        smith: &Smith,
        foundry_factory: FF,
        workflow_factory: WF,
        foundry_key: Uuid,
        workflow_key: Uuid,
        cancel: CancellationToken,
    ) -> Result<()>
    where
        FF: Fn() -> Foundry,
        WF: Fn() -> Workflow,
    {
        let mut attempt = 1u32;
        loop {
            if cancel.is_cancelled() {
                return Err(WorkflowError::OperationCancelled {
                    operation_name: "recovery".to_string(),
                });
            }

            let snapshot = self
                .provider
                .try_load(foundry_key, workflow_key)
                .await?
                .ok_or_else(|| {
                    WorkflowError::PersistenceFailed {
                        message: format!(
                            "no snapshot found for foundry {foundry_key} / workflow {workflow_key}"
                        ),
                        source: None,
                    }
                })?;

            match self
                .resume_snapshot(smith, &foundry_factory, &workflow_factory, snapshot, cancel.clone())
                .await
            {
                Ok(()) => return Ok(()),
                Err(err) if attempt >= self.policy.max_attempts => return Err(err),
                Err(_) => {
                    tokio::time::sleep(self.policy.delay_for_attempt(attempt)).await;
                    attempt += 1;
                }
            }
        }
    }

    async fn resume_snapshot<FF, WF>(
        &self,
        smith: &Smith,
        foundry_factory: &FF,
        workflow_factory: &WF,
        snapshot: ExecutionSnapshot,
        cancel: CancellationToken,
    ) -> Result<()>
    where
        FF: Fn() -> Foundry,
        WF: Fn() -> Workflow,
    {
        let foundry = foundry_factory();
        foundry.properties.seed(snapshot.properties.clone()).await;
        foundry
            .set_execution_id(crate::foundry::ExecutionId::from_uuid(snapshot.foundry_execution_id))
            .await;

        let workflow = workflow_factory();
        let start_index = snapshot.next_operation_index.max(0) as usize;

        smith.forge_from(&workflow, foundry, start_index, cancel).await?;
        Ok(())
    }

    /// Resumes every pending execution reported by `catalog`. Individual failures are
    /// logged and counted, not propagated; returns the count of successful resumptions.
    pub async fn resume_all<FF, WF>(
        &self,
        smith: &Smith,
        foundry_factory: FF,
        workflow_factory: WF,
        catalog: &dyn RecoveryCatalog,
        cancel: CancellationToken,
    ) -> Result<usize>
    where
        FF: Fn() -> Foundry,
        WF: Fn() -> Workflow,
    {
        let pending = catalog.list_pending().await?;
        let mut success_count = 0;

        for snapshot in pending {
            let result = self
                .resume(
                    smith,
                    &foundry_factory,
                    &workflow_factory,
                    snapshot.foundry_execution_id,
                    snapshot.workflow_id,
                    cancel.clone(),
                )
                .await;

            match result {
                Ok(()) => success_count += 1,
                Err(err) => {
                    tracing::warn!(
                        workflow_id = %snapshot.workflow_id,
                        error = %err,
                        "recovery attempt failed"
                    );
                }
            }
        }

        Ok(success_count)
    }
}
