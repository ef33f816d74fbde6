//! [`Workflow`]: an immutable ordered sequence of operations plus identity and metadata.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::operation::Operation;

/// Stable identity for a workflow definition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WorkflowId(pub Uuid);

impl WorkflowId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for WorkflowId {
    fn default() -> Self {
        Self::new()
    }
}

/// An immutable, ordered sequence of operations. Constructed once via [`WorkflowBuilder`]
/// and never mutated afterward; operation order is execution order and operation indices
/// are stable for the lifetime of the workflow.
pub struct Workflow {
    id: WorkflowId,
    name: String,
    description: Option<String>,
    version: String,
    operations: Vec<Arc<dyn Operation>>,
    metadata: HashMap<String, String>,
    created_at: DateTime<Utc>,
}

impl Workflow {
    pub fn id(&self) -> WorkflowId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn operations(&self) -> &[Arc<dyn Operation>] {
        &self.operations
    }

    pub fn metadata(&self) -> &HashMap<String, String> {
        &self.metadata
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// True only when every operation in the workflow declares restore support. A
    /// workflow that mixes restorable and non-restorable operations can still run and
    /// still compensates (non-restorable steps are skipped, not silently dropped) — this
    /// flag is advisory, useful for callers deciding whether to even attempt a risky
    /// forward-only operation sequence.
    pub fn supports_restore(&self) -> bool {
        !self.operations.is_empty() && self.operations.iter().all(|op| op.supports_restore())
    }
}

/// Fluent builder for [`Workflow`].
pub struct WorkflowBuilder {
    name: String,
    description: Option<String>,
    version: String,
    operations: Vec<Arc<dyn Operation>>,
    metadata: HashMap<String, String>,
}

impl WorkflowBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: None,
            version: "1.0.0".to_string(),
            operations: Vec::new(),
            metadata: HashMap::new(),
        }
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn version(mut self, version: impl Into<String>) -> Self {
        self.version = version.into();
        self
    }

    pub fn operation(mut self, operation: Arc<dyn Operation>) -> Self {
        self.operations.push(operation);
        self
    }

    pub fn metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    pub fn build(self) -> Workflow {
        Workflow {
            id: WorkflowId::new(),
            name: self.name,
            description: self.description,
            version: self.version,
            operations: self.operations,
            metadata: self.metadata,
            created_at: Utc::now(),
        }
    }
}
