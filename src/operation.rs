//! The operation contract: the unit of work a [`crate::workflow::Workflow`] sequences.

use async_trait::async_trait;
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::error::Result;
use crate::foundry::Foundry;

/// Stable identity for an operation, independent of its position in a workflow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct OperationId(pub Uuid);

impl OperationId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for OperationId {
    fn default() -> Self {
        Self::new()
    }
}

/// A single forward step, with an optional compensating action.
///
/// Implementations are expected to be idempotent: `forge` may be invoked again for the
/// same logical step after a crash-and-resume, and `restore` may run against state that a
/// prior, partially-completed `restore` attempt already touched.
#[async_trait]
pub trait Operation: Send + Sync {
    fn id(&self) -> OperationId;

    fn name(&self) -> &str;

    /// Whether this operation implements [`Operation::restore`]. Operations that return
    /// `false` are still pushed onto the compensation stack as skip markers so stack depth
    /// stays meaningful, but `restore` is never called on them.
    fn supports_restore(&self) -> bool {
        false
    }

    async fn forge(
        &self,
        input: Option<Value>,
        foundry: &Foundry,
        cancel: CancellationToken,
    ) -> Result<Option<Value>>;

    /// Best-effort undo of a previously successful [`Operation::forge`]. Only called when
    /// [`Operation::supports_restore`] returns `true`.
    async fn restore(
        &self,
        _last_output: Option<Value>,
        _foundry: &Foundry,
        _cancel: CancellationToken,
    ) -> Result<()> {
        Ok(())
    }
}
