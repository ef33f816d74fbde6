//! Durable checkpointing and recovery: snapshotting in-flight execution state so it can
//! resume across process restarts.

mod in_memory;
mod recovery;

pub use in_memory::InMemoryPersistenceProvider;
pub use recovery::{RecoveryCatalog, RecoveryCoordinator};

use std::collections::HashMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::error::Result;

/// A durable record of how far a workflow execution has progressed.
///
/// `next_operation_index = -1` means the workflow has not started; `N` means the
/// operation at index `N` is the next one to run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionSnapshot {
    pub foundry_execution_id: Uuid,
    pub workflow_id: Uuid,
    pub workflow_name: String,
    pub next_operation_index: i64,
    pub properties: HashMap<String, Value>,
}

impl ExecutionSnapshot {
    pub fn not_started(foundry_execution_id: Uuid, workflow_id: Uuid, workflow_name: impl Into<String>) -> Self {
        Self {
            foundry_execution_id,
            workflow_id,
            workflow_name: workflow_name.into(),
            next_operation_index: -1,
            properties: HashMap::new(),
        }
    }
}

/// Collaborator responsible for durably storing, loading, and deleting
/// [`ExecutionSnapshot`]s. The core makes no assumption about the backing store; only the
/// in-memory reference implementation lives in this crate.
#[async_trait]
pub trait PersistenceProvider: Send + Sync {
    async fn save(&self, snapshot: ExecutionSnapshot) -> Result<()>;

    async fn try_load(&self, foundry_execution_id: Uuid, workflow_id: Uuid) -> Result<Option<ExecutionSnapshot>>;

    async fn delete(&self, foundry_execution_id: Uuid, workflow_id: Uuid) -> Result<()>;
}

/// Retry policy governing [`RecoveryCoordinator::resume`] attempts.
#[derive(Debug, Clone)]
pub struct RecoveryPolicy {
    pub max_attempts: u32,
    pub base_delay: std::time::Duration,
    pub use_exponential_backoff: bool,
}

impl Default for RecoveryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: std::time::Duration::from_millis(500),
            use_exponential_backoff: true,
        }
    }
}

impl RecoveryPolicy {
    pub fn delay_for_attempt(&self, attempt: u32) -> std::time::Duration {
        if !self.use_exponential_backoff {
            return self.base_delay;
        }
        let exponent = attempt.saturating_sub(1).min(20);
        let millis = self.base_delay.as_millis().saturating_mul(1u128 << exponent);
        std::time::Duration::from_millis(millis.min(u64::MAX as u128) as u64)
    }
}

/// Derives stable 128-bit keys from `PersistenceOptions::instance_id`/`workflow_key` via
/// name-based UUIDv5, so a snapshot saved before a process restart can be found again by a
/// freshly constructed foundry/workflow pair that would otherwise carry random ids.
pub fn derive_persistence_keys(instance_id: &str, workflow_key: &str) -> (Uuid, Uuid) {
    let foundry_key = Uuid::new_v5(&Uuid::NAMESPACE_OID, instance_id.as_bytes());
    let workflow_key = Uuid::new_v5(&Uuid::NAMESPACE_OID, workflow_key.as_bytes());
    (foundry_key, workflow_key)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exponential_delay_doubles_per_attempt() {
        let policy = RecoveryPolicy {
            max_attempts: 5,
            base_delay: std::time::Duration::from_millis(100),
            use_exponential_backoff: true,
        };
        assert_eq!(policy.delay_for_attempt(1), std::time::Duration::from_millis(100));
        assert_eq!(policy.delay_for_attempt(2), std::time::Duration::from_millis(200));
        assert_eq!(policy.delay_for_attempt(3), std::time::Duration::from_millis(400));
    }

    #[test]
    fn fixed_delay_ignores_attempt_number() {
        let policy = RecoveryPolicy {
            max_attempts: 5,
            base_delay: std::time::Duration::from_millis(100),
            use_exponential_backoff: false,
        };
        assert_eq!(policy.delay_for_attempt(1), policy.delay_for_attempt(4));
    }

    #[test]
    fn derived_keys_are_stable_across_calls() {
        let (foundry_a, workflow_a) = derive_persistence_keys("node-1", "billing-flow");
        let (foundry_b, workflow_b) = derive_persistence_keys("node-1", "billing-flow");
        assert_eq!(foundry_a, foundry_b);
        assert_eq!(workflow_a, workflow_b);
    }

    #[test]
    fn derived_keys_differ_per_input() {
        let (foundry_a, _) = derive_persistence_keys("node-1", "billing-flow");
        let (foundry_b, _) = derive_persistence_keys("node-2", "billing-flow");
        assert_ne!(foundry_a, foundry_b);
    }
}
