//! End-to-end scenarios exercising the smith, concurrency bound, persistence/recovery,
//! and validation middleware together.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use workflow_forge::config::{ValidationOptions, WorkflowForgeOptions};
use workflow_forge::error::{Result, ValidationError, WorkflowError};
use workflow_forge::foundry::Foundry;
use workflow_forge::logging::NullLogger;
use workflow_forge::middleware::{Middleware, ValidationMiddleware, Validator};
use workflow_forge::operation::{Operation, OperationId};
use workflow_forge::persistence::{ExecutionSnapshot, InMemoryPersistenceProvider, PersistenceProvider};
use workflow_forge::smith::Smith;
use workflow_forge::testing::NoopOperation;
use workflow_forge::workflow::WorkflowBuilder;

struct SleepyOperation {
    id: OperationId,
    name: String,
    delay: Duration,
    active: Arc<AtomicUsize>,
    peak: Arc<AtomicUsize>,
}

impl SleepyOperation {
    fn new(name: &str, delay: Duration, active: Arc<AtomicUsize>, peak: Arc<AtomicUsize>) -> Self {
        Self {
            id: OperationId::new(),
            name: name.to_string(),
            delay,
            active,
            peak,
        }
    }
}

#[async_trait]
impl Operation for SleepyOperation {
    fn id(&self) -> OperationId {
        self.id
    }

    fn name(&self) -> &str {
        &self.name
    }

    async fn forge(
        &self,
        _input: Option<Value>,
        _foundry: &Foundry,
        _cancel: CancellationToken,
    ) -> Result<Option<Value>> {
        let current = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(current, Ordering::SeqCst);
        tokio::time::sleep(self.delay).await;
        self.active.fetch_sub(1, Ordering::SeqCst);
        Ok(None)
    }
}

#[tokio::test]
async fn concurrency_cap_bounds_simultaneous_workflows() {
    let mut options = WorkflowForgeOptions::default();
    options.max_concurrent_workflows = 5;
    let smith = Arc::new(Smith::new(options, Arc::new(NullLogger)).unwrap());

    let active = Arc::new(AtomicUsize::new(0));
    let peak = Arc::new(AtomicUsize::new(0));

    let mut handles = Vec::new();
    for i in 0..20 {
        let smith = smith.clone();
        let active = active.clone();
        let peak = peak.clone();
        handles.push(tokio::spawn(async move {
            let operation = Arc::new(SleepyOperation::new(
                &format!("sleep-{i}"),
                Duration::from_millis(100),
                active,
                peak,
            ));
            let workflow = WorkflowBuilder::new("sleeper").operation(operation).build();
            let foundry = Foundry::new(smith.options().clone());
            smith.forge(&workflow, Some(foundry), CancellationToken::new()).await.unwrap();
        }));
    }

    for handle in handles {
        handle.await.unwrap();
    }

    assert!(peak.load(Ordering::SeqCst) <= 5);
}

#[tokio::test]
async fn resume_from_snapshot_only_runs_remaining_operations() {
    let calls = Arc::new(std::sync::Mutex::new(Vec::new()));

    let make_operation = |name: &'static str, calls: Arc<std::sync::Mutex<Vec<&'static str>>>| {
        Arc::new(NoopOperation::new(name).transform(move |input| {
            calls.lock().unwrap().push(name);
            input
        }))
    };

    let a = make_operation("A", calls.clone());
    let b = make_operation("B", calls.clone());
    let c = make_operation("C", calls.clone());
    let d = make_operation("D", calls.clone());

    let workflow = WorkflowBuilder::new("resume-demo")
        .operation(a)
        .operation(b)
        .operation(c)
        .operation(d)
        .build();

    let snapshot = ExecutionSnapshot {
        foundry_execution_id: uuid::Uuid::new_v4(),
        workflow_id: workflow.id().0,
        workflow_name: workflow.name().to_string(),
        next_operation_index: 2,
        properties: std::collections::HashMap::new(),
    };

    let smith = Smith::new(WorkflowForgeOptions::default(), Arc::new(NullLogger)).unwrap();
    let foundry = Foundry::new(smith.options().clone());
    foundry.set_execution_id(workflow_forge::foundry::ExecutionId::from_uuid(snapshot.foundry_execution_id)).await;

    let start_index = snapshot.next_operation_index.max(0) as usize;
    smith
        .forge_from(&workflow, foundry, start_index, CancellationToken::new())
        .await
        .unwrap();

    let observed = calls.lock().unwrap().clone();
    assert_eq!(observed, vec!["C", "D"]);
}

#[tokio::test]
async fn persistence_round_trips_through_provider() {
    let provider = InMemoryPersistenceProvider::unbounded();
    let foundry_id = uuid::Uuid::new_v4();
    let workflow_id = uuid::Uuid::new_v4();

    let snapshot = ExecutionSnapshot {
        foundry_execution_id: foundry_id,
        workflow_id,
        workflow_name: "demo".to_string(),
        next_operation_index: 1,
        properties: std::collections::HashMap::new(),
    };

    provider.save(snapshot).await.unwrap();
    let loaded = provider.try_load(foundry_id, workflow_id).await.unwrap();
    assert_eq!(loaded.unwrap().next_operation_index, 1);

    provider.delete(foundry_id, workflow_id).await.unwrap();
    assert!(provider.try_load(foundry_id, workflow_id).await.unwrap().is_none());
}

struct PositiveAmountValidator;

impl Validator<i64> for PositiveAmountValidator {
    fn validate(&self, subject: &i64) -> Vec<ValidationError> {
        if *subject <= 0 {
            vec![ValidationError {
                property_name: "amount".to_string(),
                error_message: "amount must be positive".to_string(),
            }]
        } else {
            Vec::new()
        }
    }
}

#[tokio::test]
async fn validation_short_circuit_prevents_operation_and_compensation() {
    let options = ValidationOptions {
        enabled: true,
        ignore_validation_failures: false,
        throw_on_validation_error: true,
        log_validation_errors: true,
        store_validation_results: true,
    };

    let validation_middleware: Arc<dyn Middleware> = Arc::new(ValidationMiddleware::new(
        |input: &Option<Value>| input.as_ref().and_then(|v| v.as_i64()),
        PositiveAmountValidator,
        options,
    ));

    let charge = Arc::new(NoopOperation::new("Charge").with_output(serde_json::json!("should not run")));
    let workflow = WorkflowBuilder::new("charge-flow").operation(charge.clone()).build();

    let smith = Smith::new(WorkflowForgeOptions::default(), Arc::new(NullLogger)).unwrap();
    let foundry = Foundry::new(smith.options().clone());
    foundry.add_middleware(validation_middleware).unwrap();

    let result = smith
        .forge_with_input(&workflow, Some(foundry), Some(serde_json::json!(-5)), CancellationToken::new())
        .await;

    assert!(matches!(result, Err(WorkflowError::ValidationFailed { .. })));
    assert_eq!(charge.call_count(), 0);
}

#[tokio::test]
async fn invalid_configuration_reports_every_bad_field() {
    let mut options = WorkflowForgeOptions::default();
    options.max_concurrent_workflows = -3;
    options.validation.enabled = true;
    options.validation.ignore_validation_failures = true;
    options.validation.throw_on_validation_error = true;

    let result = Smith::new(options, Arc::new(NullLogger));
    let err = result.unwrap_err();
    let message = err.to_string();
    assert!(message.contains("Invalid WorkflowForge options"));
    assert!(message.contains("MaxConcurrentWorkflows"));
    assert!(message.contains("IgnoreValidationFailures"));
}
