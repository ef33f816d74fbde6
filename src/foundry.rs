//! [`Foundry`]: per-execution mutable context shared between the smith, the middleware
//! pipeline, and operations.

use std::any::Any;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde_json::Value;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::config::WorkflowForgeOptions;
use crate::error::{Result, WorkflowError};
use crate::logging::{Logger, NullLogger};
use crate::middleware::{Middleware, Pipeline};
use crate::operation::Operation;
use crate::workflow::WorkflowId;

/// Optional named-lookup collaborator a foundry can carry so operations can reach services
/// without the engine depending on any particular dependency-injection container.
pub trait ServiceProvider: Send + Sync {
    fn get(&self, name: &str) -> Option<Arc<dyn Any + Send + Sync>>;
}

/// A trivial `HashMap`-backed [`ServiceProvider`] for tests and simple embeddings.
#[derive(Default)]
pub struct MapServiceProvider {
    services: Mutex<HashMap<String, Arc<dyn Any + Send + Sync>>>,
}

impl MapServiceProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, name: impl Into<String>, service: Arc<dyn Any + Send + Sync>) {
        self.services.lock().unwrap().insert(name.into(), service);
    }

    pub fn with_service(self, name: impl Into<String>, service: Arc<dyn Any + Send + Sync>) -> Self {
        self.register(name, service);
        self
    }
}

impl ServiceProvider for MapServiceProvider {
    fn get(&self, name: &str) -> Option<Arc<dyn Any + Send + Sync>> {
        self.services.lock().unwrap().get(name).cloned()
    }
}

/// Stable identity for one execution of a workflow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ExecutionId(pub Uuid);

impl ExecutionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn from_uuid(id: Uuid) -> Self {
        Self(id)
    }
}

impl Default for ExecutionId {
    fn default() -> Self {
        Self::new()
    }
}

/// Lifecycle events the foundry emits during a run. Handlers are invoked synchronously on
/// the emitting task and must not block; callers needing slow work should offload it.
#[derive(Debug, Clone)]
pub enum FoundryEvent {
    WorkflowStarted {
        execution_id: ExecutionId,
        workflow_name: String,
        timestamp: DateTime<Utc>,
    },
    WorkflowCompleted {
        execution_id: ExecutionId,
        duration: ChronoDuration,
        timestamp: DateTime<Utc>,
    },
    WorkflowFailed {
        execution_id: ExecutionId,
        message: String,
        timestamp: DateTime<Utc>,
    },
    WorkflowCancelled {
        execution_id: ExecutionId,
        timestamp: DateTime<Utc>,
    },
    OperationStarted {
        execution_id: ExecutionId,
        operation_index: usize,
        operation_name: String,
        timestamp: DateTime<Utc>,
    },
    OperationCompleted {
        execution_id: ExecutionId,
        operation_index: usize,
        operation_name: String,
        duration: ChronoDuration,
        timestamp: DateTime<Utc>,
    },
    OperationFailed {
        execution_id: ExecutionId,
        operation_index: usize,
        operation_name: String,
        message: String,
        duration: ChronoDuration,
        timestamp: DateTime<Utc>,
    },
    OperationSkipped {
        execution_id: ExecutionId,
        operation_index: usize,
        operation_name: String,
        timestamp: DateTime<Utc>,
    },
    OperationRestoreStarted {
        execution_id: ExecutionId,
        operation_index: usize,
        operation_name: String,
        timestamp: DateTime<Utc>,
    },
    OperationRestoreCompleted {
        execution_id: ExecutionId,
        operation_index: usize,
        operation_name: String,
        duration: ChronoDuration,
        timestamp: DateTime<Utc>,
    },
    OperationRestoreFailed {
        execution_id: ExecutionId,
        operation_index: usize,
        operation_name: String,
        message: String,
        duration: ChronoDuration,
        timestamp: DateTime<Utc>,
    },
    CompensationTriggered {
        execution_id: ExecutionId,
        reason: String,
        failed_operation_name: String,
        timestamp: DateTime<Utc>,
    },
    CompensationCompleted {
        execution_id: ExecutionId,
        success_count: usize,
        failure_count: usize,
        duration: ChronoDuration,
        timestamp: DateTime<Utc>,
    },
}

type EventHandler = Arc<dyn Fn(&FoundryEvent) + Send + Sync>;

/// Thread-safe key/value store shared across operations and middleware for the lifetime
/// of one execution. Writes are last-writer-wins per key; there is no cross-key
/// transactional guarantee.
#[derive(Default)]
pub struct Properties {
    inner: RwLock<HashMap<String, Value>>,
}

impl Properties {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get(&self, key: &str) -> Option<Value> {
        self.inner.read().await.get(key).cloned()
    }

    pub async fn set(&self, key: impl Into<String>, value: impl Into<Value>) {
        self.inner.write().await.insert(key.into(), value.into());
    }

    pub async fn remove(&self, key: &str) -> Option<Value> {
        self.inner.write().await.remove(key)
    }

    pub async fn snapshot(&self) -> HashMap<String, Value> {
        self.inner.read().await.clone()
    }

    pub async fn seed(&self, values: HashMap<String, Value>) {
        let mut guard = self.inner.write().await;
        for (key, value) in values {
            guard.insert(key, value);
        }
    }

    pub async fn clear(&self) {
        self.inner.write().await.clear();
    }
}

/// Per-execution context. Frozen on dispose; attempts to register operations or
/// middleware against a frozen foundry fail.
pub struct Foundry {
    execution_id: RwLock<ExecutionId>,
    pub properties: Properties,
    logger: Arc<dyn Logger>,
    options: Arc<WorkflowForgeOptions>,
    service_provider: Option<Arc<dyn ServiceProvider>>,
    middleware: Mutex<Vec<Arc<dyn Middleware>>>,
    operations: Mutex<Vec<Arc<dyn Operation>>>,
    event_handlers: Mutex<Vec<EventHandler>>,
    current_workflow: RwLock<Option<WorkflowId>>,
    frozen: AtomicBool,
}

impl Foundry {
    pub fn new(options: Arc<WorkflowForgeOptions>) -> Self {
        Self {
            execution_id: RwLock::new(ExecutionId::new()),
            properties: Properties::new(),
            logger: Arc::new(NullLogger),
            options,
            service_provider: None,
            middleware: Mutex::new(Vec::new()),
            operations: Mutex::new(Vec::new()),
            event_handlers: Mutex::new(Vec::new()),
            current_workflow: RwLock::new(None),
            frozen: AtomicBool::new(false),
        }
    }

    pub fn with_logger(mut self, logger: Arc<dyn Logger>) -> Self {
        self.logger = logger;
        self
    }

    pub fn with_service_provider(mut self, services: Arc<dyn ServiceProvider>) -> Self {
        self.service_provider = Some(services);
        self
    }

    pub fn service_provider(&self) -> Option<&Arc<dyn ServiceProvider>> {
        self.service_provider.as_ref()
    }

    /// Looks up a named service and downcasts it to `T`, returning `None` if no provider is
    /// attached, the name is unregistered, or the registered value is a different type.
    pub fn service<T: Any + Send + Sync>(&self, name: &str) -> Option<Arc<T>> {
        self.service_provider
            .as_ref()?
            .get(name)?
            .downcast::<T>()
            .ok()
    }

    pub async fn set_execution_id(&self, id: ExecutionId) {
        *self.execution_id.write().await = id;
    }

    pub async fn execution_id(&self) -> ExecutionId {
        *self.execution_id.read().await
    }

    pub fn logger(&self) -> &Arc<dyn Logger> {
        &self.logger
    }

    pub fn options(&self) -> &Arc<WorkflowForgeOptions> {
        &self.options
    }

    pub(crate) async fn set_current_workflow(&self, id: Option<WorkflowId>) {
        *self.current_workflow.write().await = id;
    }

    pub async fn current_workflow(&self) -> Option<WorkflowId> {
        *self.current_workflow.read().await
    }

    pub fn is_frozen(&self) -> bool {
        self.frozen.load(Ordering::SeqCst)
    }

    pub(crate) fn freeze(&self) {
        self.frozen.store(true, Ordering::SeqCst);
    }

    pub fn add_middleware(&self, middleware: Arc<dyn Middleware>) -> Result<()> {
        if self.is_frozen() {
            return Err(WorkflowError::Internal(
                "cannot add middleware to a disposed foundry".to_string(),
            ));
        }
        self.middleware.lock().unwrap().push(middleware);
        Ok(())
    }

    pub fn middleware(&self) -> Vec<Arc<dyn Middleware>> {
        self.middleware.lock().unwrap().clone()
    }

    /// Clears the registered middleware list. Callers relying on default middleware must
    /// re-register after calling reset; it is not restored automatically.
    pub fn reset_middleware(&self) {
        self.middleware.lock().unwrap().clear();
    }

    pub fn on_event(&self, handler: EventHandler) {
        self.event_handlers.lock().unwrap().push(handler);
    }

    pub fn emit(&self, event: FoundryEvent) {
        for handler in self.event_handlers.lock().unwrap().iter() {
            handler(&event);
        }
    }

    /// Registers an operation to be run by [`Foundry::forge_async`]. Distinct from the
    /// workflow's own operation list — this one lives on the foundry itself, for tests that
    /// want to drive a pipeline without building a [`crate::workflow::Workflow`].
    pub fn add_operation(&self, operation: Arc<dyn Operation>) -> Result<()> {
        if self.is_frozen() {
            return Err(WorkflowError::Internal(
                "cannot add an operation to a disposed foundry".to_string(),
            ));
        }
        self.operations.lock().unwrap().push(operation);
        Ok(())
    }

    pub fn operations(&self) -> Vec<Arc<dyn Operation>> {
        self.operations.lock().unwrap().clone()
    }

    /// Runs the registered middleware pipeline over the foundry's own local operation list,
    /// chaining each operation's output into the next operation's input. No compensation, no
    /// concurrency cap, no persistence — a lightweight convenience for tests exercising the
    /// pipeline against a single foundry.
    pub async fn forge_async(
        &self,
        initial_input: Option<Value>,
        cancel: CancellationToken,
    ) -> Result<Option<Value>> {
        let operations = self.operations();
        let middleware = self.middleware();
        let mut current = initial_input;
        for operation in &operations {
            let pipeline = Pipeline::new(&middleware);
            current = pipeline
                .invoke(operation.as_ref(), self, current, cancel.clone())
                .await?;
        }
        Ok(current)
    }
}
