//! In-process test doubles: an operation stub for exercising the smith and middleware
//! pipeline without real side effects, grounded directly on the
//! `Mutex<Vec<_>>`-over-an-async-trait shape used for mock collaborators elsewhere in this
//! crate.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::config::WorkflowForgeOptions;
use crate::error::{Result, WorkflowError};
use crate::foundry::{Foundry, ServiceProvider};
use crate::middleware::Middleware;
use crate::operation::{Operation, OperationId};

type Transform = Box<dyn Fn(Option<Value>) -> Option<Value> + Send + Sync>;

/// A configurable no-op [`Operation`] for unit tests: optionally transforms its input,
/// optionally fails, optionally records restore calls, and always counts how many times
/// `forge` ran.
pub struct NoopOperation {
    id: OperationId,
    name: String,
    transform: Option<Transform>,
    fixed_output: Option<Value>,
    fail_with: Option<String>,
    supports_restore: bool,
    restore_log: Option<Arc<Mutex<Vec<String>>>>,
    calls: AtomicUsize,
}

impl NoopOperation {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: OperationId::new(),
            name: name.into(),
            transform: None,
            fixed_output: None,
            fail_with: None,
            supports_restore: false,
            restore_log: None,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn with_output(mut self, value: Value) -> Self {
        self.fixed_output = Some(value);
        self
    }

    pub fn transform(mut self, f: impl Fn(Option<Value>) -> Option<Value> + Send + Sync + 'static) -> Self {
        self.transform = Some(Box::new(f));
        self
    }

    pub fn failing(mut self, message: impl Into<String>) -> Self {
        self.fail_with = Some(message.into());
        self
    }

    pub fn with_restore(mut self, supports: bool) -> Self {
        self.supports_restore = supports;
        self
    }

    pub fn on_restore(mut self, log: Arc<Mutex<Vec<String>>>) -> Self {
        self.restore_log = Some(log);
        self
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Operation for NoopOperation {
    fn id(&self) -> OperationId {
        self.id
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn supports_restore(&self) -> bool {
        self.supports_restore
    }

    async fn forge(
        &self,
        input: Option<Value>,
        _foundry: &Foundry,
        _cancel: CancellationToken,
    ) -> Result<Option<Value>> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        if let Some(message) = &self.fail_with {
            return Err(WorkflowError::operation_failed(&self.name, message.clone()));
        }

        if let Some(transform) = &self.transform {
            return Ok(transform(input));
        }

        Ok(self.fixed_output.clone())
    }

    async fn restore(
        &self,
        _last_output: Option<Value>,
        _foundry: &Foundry,
        _cancel: CancellationToken,
    ) -> Result<()> {
        if let Some(log) = &self.restore_log {
            log.lock().unwrap().push(self.name.clone());
        }
        Ok(())
    }
}

/// A lightweight foundry double for tests that want to inspect properties and events
/// without constructing a full [`crate::smith::Smith`] run. Wraps a real [`Foundry`] and
/// drives it with [`Foundry::forge_async`], recording every emitted event alongside it —
/// grounded on the `Mutex<Vec<_>>`-over-async-trait shape used for mock collaborators
/// elsewhere in this crate.
pub struct TestFoundry {
    foundry: Foundry,
    events: Arc<Mutex<Vec<String>>>,
}

impl TestFoundry {
    pub fn new() -> Self {
        let foundry = Foundry::new(Arc::new(WorkflowForgeOptions::default()));
        let events = Arc::new(Mutex::new(Vec::new()));
        let recorded = events.clone();
        foundry.on_event(Arc::new(move |event| {
            recorded.lock().unwrap().push(format!("{event:?}"));
        }));
        Self { foundry, events }
    }

    pub fn with_service_provider(self, services: Arc<dyn ServiceProvider>) -> Self {
        Self {
            foundry: self.foundry.with_service_provider(services),
            events: self.events,
        }
    }

    pub fn add_operation(&self, operation: Arc<dyn Operation>) -> Result<()> {
        self.foundry.add_operation(operation)
    }

    pub fn add_middleware(&self, middleware: Arc<dyn Middleware>) -> Result<()> {
        self.foundry.add_middleware(middleware)
    }

    pub async fn set_property(&self, key: impl Into<String>, value: impl Into<Value>) {
        self.foundry.properties.set(key, value).await;
    }

    pub async fn property(&self, key: &str) -> Option<Value> {
        self.foundry.properties.get(key).await
    }

    pub async fn properties(&self) -> HashMap<String, Value> {
        self.foundry.properties.snapshot().await
    }

    /// Runs the registered operations through the registered middleware. See
    /// [`Foundry::forge_async`].
    pub async fn forge_async(&self, initial_input: Option<Value>) -> Result<Option<Value>> {
        self.foundry.forge_async(initial_input, CancellationToken::new()).await
    }

    pub fn events(&self) -> Vec<String> {
        self.events.lock().unwrap().clone()
    }

    pub fn foundry(&self) -> &Foundry {
        &self.foundry
    }
}

impl Default for TestFoundry {
    fn default() -> Self {
        Self::new()
    }
}
