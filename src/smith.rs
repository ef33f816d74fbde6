//! [`Smith`]: the process-wide runtime coordinator that drives a [`Workflow`] on a
//! [`Foundry`], bounding concurrency across simultaneous runs and orchestrating
//! compensation on failure.

use std::sync::Arc;

use serde_json::Value;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::config::WorkflowForgeOptions;
use crate::error::{Result, WorkflowError};
use crate::foundry::{ExecutionId, Foundry, FoundryEvent};
use crate::logging::Logger;
use crate::middleware::Pipeline;
use crate::operation::Operation;
use crate::persistence::{derive_persistence_keys, ExecutionSnapshot, PersistenceProvider};
use crate::workflow::Workflow;

/// One entry on the compensation stack. `last_output` is what `restore` is handed.
struct CompensationEntry {
    index: usize,
    operation: Arc<dyn Operation>,
    last_output: Option<Value>,
}

/// Summary returned once a run reaches a terminal state.
#[derive(Debug, Clone)]
pub struct ForgeOutcome {
    pub execution_id: ExecutionId,
    pub last_completed_index: Option<usize>,
    pub compensation: Option<CompensationSummary>,
}

#[derive(Debug, Clone)]
pub struct CompensationSummary {
    pub success_count: usize,
    pub failure_count: usize,
}

/// The coordinator. One `Smith` can drive many concurrent runs, all sharing the same
/// `MaxConcurrentWorkflows` bound.
pub struct Smith {
    options: Arc<WorkflowForgeOptions>,
    logger: Arc<dyn Logger>,
    semaphore: Option<Arc<Semaphore>>,
    persistence: Option<Arc<dyn PersistenceProvider>>,
}

impl Smith {
    /// Constructs a coordinator, aggregating every invalid option field into one
    /// `ConfigurationInvalid` error rather than failing on the first violation found.
    pub fn new(options: WorkflowForgeOptions, logger: Arc<dyn Logger>) -> Result<Self> {
        let errors = options.validate();
        if !errors.is_empty() {
            return Err(WorkflowError::configuration_invalid(&errors));
        }

        let semaphore = if options.max_concurrent_workflows > 0 {
            Some(Arc::new(Semaphore::new(options.max_concurrent_workflows as usize)))
        } else {
            None
        };

        Ok(Self {
            options: Arc::new(options),
            logger,
            semaphore,
            persistence: None,
        })
    }

    pub fn with_persistence(mut self, provider: Arc<dyn PersistenceProvider>) -> Self {
        self.persistence = Some(provider);
        self
    }

    pub fn options(&self) -> &Arc<WorkflowForgeOptions> {
        &self.options
    }

    /// Resolves the keys a persistence provider is addressed by for this run. When both
    /// `InstanceId` and `WorkflowKey` are configured, these are deterministic UUIDv5 values
    /// that stay stable across a process restart; otherwise the transient execution/workflow
    /// ids are used, which only make sense within the lifetime of this run.
    async fn persistence_keys(&self, foundry: &Foundry, workflow: &Workflow) -> (Uuid, Uuid) {
        let opts = &self.options.persistence;
        match (opts.instance_id.as_deref(), opts.workflow_key.as_deref()) {
            (Some(instance_id), Some(workflow_key)) if !instance_id.is_empty() && !workflow_key.is_empty() => {
                derive_persistence_keys(instance_id, workflow_key)
            }
            _ => (foundry.execution_id().await.0, workflow.id().0),
        }
    }

    /// Runs `workflow` to completion, failure, or cancellation. Constructs a fresh
    /// [`Foundry`] if `foundry` is `None`. `initial_input` seeds the first operation's
    /// input; later operations receive the prior operation's output when
    /// `EnableOutputChaining` is set.
    pub async fn forge(
        &self,
        workflow: &Workflow,
        foundry: Option<Foundry>,
        cancel: CancellationToken,
    ) -> Result<ForgeOutcome> {
        self.forge_with_input(workflow, foundry, None, cancel).await
    }

    /// Like [`Smith::forge`] but lets the caller seed the value the first operation
    /// receives as its input.
    pub async fn forge_with_input(
        &self,
        workflow: &Workflow,
        foundry: Option<Foundry>,
        initial_input: Option<Value>,
        cancel: CancellationToken,
    ) -> Result<ForgeOutcome> {
        let foundry = foundry.unwrap_or_else(|| Foundry::new(self.options.clone()).with_logger(self.logger.clone()));

        let mut start_index = 0usize;
        if let Some(provider) = &self.persistence {
            if self.options.persistence.enabled {
                let (foundry_key, workflow_key) = self.persistence_keys(&foundry, workflow).await;
                if let Ok(Some(snapshot)) = provider.try_load(foundry_key, workflow_key).await {
                    foundry.properties.seed(snapshot.properties.clone()).await;
                    foundry.set_execution_id(ExecutionId::from_uuid(foundry_key)).await;
                    start_index = snapshot.next_operation_index.max(0) as usize;
                }
            }
        }

        self.forge_from_with_input(workflow, foundry, start_index, initial_input, cancel).await
    }

    /// Runs `workflow` starting at `start_index`, used both for a fresh run (`0`) and for
    /// resuming from a snapshot via [`crate::persistence::RecoveryCoordinator`].
    pub async fn forge_from(
        &self,
        workflow: &Workflow,
        foundry: Foundry,
        start_index: usize,
        cancel: CancellationToken,
    ) -> Result<ForgeOutcome> {
        self.forge_from_with_input(workflow, foundry, start_index, None, cancel).await
    }

    async fn forge_from_with_input(
        &self,
        workflow: &Workflow,
        foundry: Foundry,
        start_index: usize,
        initial_input: Option<Value>,
        cancel: CancellationToken,
    ) -> Result<ForgeOutcome> {
        let _permit = match &self.semaphore {
            Some(semaphore) => Some(
                semaphore
                    .clone()
                    .acquire_owned()
                    .await
                    .map_err(|_| WorkflowError::Internal("concurrency semaphore closed".to_string()))?,
            ),
            None => None,
        };

        foundry.set_current_workflow(Some(workflow.id())).await;
        let execution_id = foundry.execution_id().await;

        self.logger.info(
            "Workflow execution started",
            &[("ExecutionId", &execution_id.0.to_string()), ("ExecutionName", workflow.name())],
        );
        foundry.emit(FoundryEvent::WorkflowStarted {
            execution_id,
            workflow_name: workflow.name().to_string(),
            timestamp: chrono::Utc::now(),
        });

        let workflow_start = chrono::Utc::now();
        let outcome = self
            .run_operations(workflow, &foundry, start_index, initial_input, cancel.clone())
            .await;

        let result = match outcome {
            RunResult::Completed { last_completed_index } => {
                self.logger.info(
                    "Workflow execution completed successfully",
                    &[("ExecutionId", &execution_id.0.to_string())],
                );
                foundry.emit(FoundryEvent::WorkflowCompleted {
                    execution_id,
                    duration: chrono::Utc::now() - workflow_start,
                    timestamp: chrono::Utc::now(),
                });

                if let Some(provider) = &self.persistence {
                    if self.options.persistence.persist_on_workflow_complete {
                        let (foundry_key, workflow_key) = self.persistence_keys(&foundry, workflow).await;
                        let _ = provider.delete(foundry_key, workflow_key).await;
                    }
                }

                Ok(ForgeOutcome {
                    execution_id,
                    last_completed_index,
                    compensation: None,
                })
            }
            RunResult::Cancelled => {
                foundry.emit(FoundryEvent::WorkflowCancelled {
                    execution_id,
                    timestamp: chrono::Utc::now(),
                });
                Err(WorkflowError::OperationCancelled {
                    operation_name: workflow.name().to_string(),
                })
            }
            RunResult::Failed {
                failed_index,
                stack,
                error,
            } => {
                foundry.properties.set("Error.Message", error.to_string()).await;
                self.logger.error(
                    "Operation execution failed",
                    &[("ExecutionId", &execution_id.0.to_string()), ("OperationStepIndex", &failed_index.to_string())],
                );
                foundry.emit(FoundryEvent::WorkflowFailed {
                    execution_id,
                    message: error.to_string(),
                    timestamp: chrono::Utc::now(),
                });

                if self.options.continue_on_error {
                    Ok(ForgeOutcome {
                        execution_id,
                        last_completed_index: failed_index.checked_sub(1),
                        compensation: None,
                    })
                } else {
                    let summary = self.compensate(workflow, &foundry, execution_id, stack, error.to_string()).await;
                    if self.options.throw_on_compensation_error && summary.failure_count > 0 {
                        Err(WorkflowError::CompensationFailed {
                            success_count: summary.success_count,
                            failure_count: summary.failure_count,
                            messages: vec![error.to_string()],
                        })
                    } else {
                        Err(error)
                    }
                }
            }
        };

        foundry.freeze();
        result
    }

    async fn run_operations(
        &self,
        workflow: &Workflow,
        foundry: &Foundry,
        start_index: usize,
        initial_input: Option<Value>,
        cancel: CancellationToken,
    ) -> RunResult {
        let middleware = foundry.middleware();
        let mut stack: Vec<CompensationEntry> = Vec::new();
        let mut previous_output: Option<Value> = initial_input;
        let mut last_completed_index: Option<usize> = None;

        let operations = workflow.operations();
        if operations.is_empty() {
            return RunResult::Completed { last_completed_index: None };
        }

        for index in start_index..operations.len() {
            if cancel.is_cancelled() {
                return RunResult::Cancelled;
            }

            let operation = operations[index].clone();
            foundry.properties.set("__wf_current_op_index__", index as i64).await;
            foundry.properties.set("Workflow.Name", workflow.name().to_string()).await;

            foundry.emit(FoundryEvent::OperationStarted {
                execution_id: foundry.execution_id().await,
                operation_index: index,
                operation_name: operation.name().to_string(),
                timestamp: chrono::Utc::now(),
            });

            let op_start = chrono::Utc::now();
            let pipeline = Pipeline::new(&middleware);
            let input = if self.options.enable_output_chaining {
                previous_output.clone()
            } else {
                None
            };

            let result = pipeline.invoke(operation.as_ref(), foundry, input, cancel.clone()).await;
            let duration = chrono::Utc::now() - op_start;

            match result {
                Ok(output) => {
                    foundry
                        .properties
                        .set(
                            format!("Operation.{}:{}.Output", index, operation.name()),
                            output.clone().unwrap_or(Value::Null),
                        )
                        .await;
                    foundry.properties.set("Operation.LastCompletedIndex", index as i64).await;
                    foundry
                        .properties
                        .set("Operation.LastCompletedName", operation.name().to_string())
                        .await;
                    foundry
                        .properties
                        .set("Operation.LastCompletedId", operation.id().0.to_string())
                        .await;

                    foundry.emit(FoundryEvent::OperationCompleted {
                        execution_id: foundry.execution_id().await,
                        operation_index: index,
                        operation_name: operation.name().to_string(),
                        duration,
                        timestamp: chrono::Utc::now(),
                    });

                    last_completed_index = Some(index);
                    previous_output = output;
                    stack.push(CompensationEntry {
                        index,
                        operation,
                        last_output: previous_output.clone(),
                    });

                    if let Some(provider) = &self.persistence {
                        if self.options.persistence.persist_on_operation_complete {
                            let (foundry_key, workflow_key) = self.persistence_keys(foundry, workflow).await;
                            let snapshot = ExecutionSnapshot {
                                foundry_execution_id: foundry_key,
                                workflow_id: workflow_key,
                                workflow_name: workflow.name().to_string(),
                                next_operation_index: (index + 1) as i64,
                                properties: foundry.properties.snapshot().await,
                            };
                            if let Err(err) = provider.save(snapshot).await {
                                self.logger.warn(
                                    "persistence checkpoint failed",
                                    &[("ErrorMessage", &err.to_string())],
                                );
                            }
                        }
                    }
                }
                Err(WorkflowError::OperationCancelled { .. }) => {
                    return RunResult::Cancelled;
                }
                Err(err) => {
                    foundry.properties.set("Operation.LastFailedIndex", index as i64).await;
                    foundry
                        .properties
                        .set("Operation.LastFailedName", operation.name().to_string())
                        .await;
                    foundry
                        .properties
                        .set("Operation.LastFailedId", operation.id().0.to_string())
                        .await;
                    foundry.properties.set("Error.Type", err.variant_name()).await;
                    foundry.properties.set("Error.StackTrace", format!("{err:?}")).await;
                    foundry
                        .properties
                        .set("Error.Timestamp", chrono::Utc::now().to_rfc3339())
                        .await;

                    foundry.emit(FoundryEvent::OperationFailed {
                        execution_id: foundry.execution_id().await,
                        operation_index: index,
                        operation_name: operation.name().to_string(),
                        message: err.to_string(),
                        duration,
                        timestamp: chrono::Utc::now(),
                    });

                    if self.options.continue_on_error {
                        self.logger.warn(
                            "operation failed, continuing (ContinueOnError)",
                            &[("OperationStepIndex", &index.to_string())],
                        );
                        continue;
                    }

                    if let Some(provider) = &self.persistence {
                        if self.options.persistence.persist_on_failure {
                            let (foundry_key, workflow_key) = self.persistence_keys(foundry, workflow).await;
                            let snapshot = ExecutionSnapshot {
                                foundry_execution_id: foundry_key,
                                workflow_id: workflow_key,
                                workflow_name: workflow.name().to_string(),
                                next_operation_index: index as i64,
                                properties: foundry.properties.snapshot().await,
                            };
                            let _ = provider.save(snapshot).await;
                        }
                    }

                    return RunResult::Failed {
                        failed_index: index,
                        stack,
                        error: err,
                    };
                }
            }
        }

        RunResult::Completed { last_completed_index }
    }

    async fn compensate(
        &self,
        workflow: &Workflow,
        foundry: &Foundry,
        execution_id: ExecutionId,
        mut stack: Vec<CompensationEntry>,
        reason: String,
    ) -> CompensationSummary {
        self.logger.info("Compensation process started", &[("ExecutionId", &execution_id.0.to_string())]);
        foundry.emit(FoundryEvent::CompensationTriggered {
            execution_id,
            reason: reason.clone(),
            failed_operation_name: workflow.name().to_string(),
            timestamp: chrono::Utc::now(),
        });

        let compensation_start = chrono::Utc::now();
        let mut success_count = 0;
        let mut failure_count = 0;

        while let Some(entry) = stack.pop() {
            if !entry.operation.supports_restore() {
                foundry.emit(FoundryEvent::OperationSkipped {
                    execution_id,
                    operation_index: entry.index,
                    operation_name: entry.operation.name().to_string(),
                    timestamp: chrono::Utc::now(),
                });
                continue;
            }

            foundry.emit(FoundryEvent::OperationRestoreStarted {
                execution_id,
                operation_index: entry.index,
                operation_name: entry.operation.name().to_string(),
                timestamp: chrono::Utc::now(),
            });

            let restore_start = chrono::Utc::now();
            let result = entry
                .operation
                .restore(entry.last_output.clone(), foundry, CancellationToken::new())
                .await;
            let duration = chrono::Utc::now() - restore_start;

            match result {
                Ok(()) => {
                    success_count += 1;
                    foundry.emit(FoundryEvent::OperationRestoreCompleted {
                        execution_id,
                        operation_index: entry.index,
                        operation_name: entry.operation.name().to_string(),
                        duration,
                        timestamp: chrono::Utc::now(),
                    });
                }
                Err(err) => {
                    failure_count += 1;
                    foundry.emit(FoundryEvent::OperationRestoreFailed {
                        execution_id,
                        operation_index: entry.index,
                        operation_name: entry.operation.name().to_string(),
                        message: err.to_string(),
                        duration,
                        timestamp: chrono::Utc::now(),
                    });
                    self.logger.error(
                        "Compensation action failed",
                        &[("OperationStepIndex", &entry.index.to_string())],
                    );
                    if self.options.fail_fast_compensation {
                        break;
                    }
                }
            }
        }

        self.logger.info("Compensation process completed", &[("ExecutionId", &execution_id.0.to_string())]);
        foundry.emit(FoundryEvent::CompensationCompleted {
            execution_id,
            success_count,
            failure_count,
            duration: chrono::Utc::now() - compensation_start,
            timestamp: chrono::Utc::now(),
        });

        CompensationSummary { success_count, failure_count }
    }
}

enum RunResult {
    Completed { last_completed_index: Option<usize> },
    Cancelled,
    Failed {
        failed_index: usize,
        stack: Vec<CompensationEntry>,
        error: WorkflowError,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logging::NullLogger;
    use crate::testing::NoopOperation;
    use crate::workflow::WorkflowBuilder;

    fn smith() -> Smith {
        Smith::new(WorkflowForgeOptions::default(), Arc::new(NullLogger)).unwrap()
    }

    #[tokio::test]
    async fn linear_success_chains_outputs() {
        let double = Arc::new(NoopOperation::new("Double").transform(|v| {
            let n = v.and_then(|v| v.as_i64()).unwrap_or(0);
            Some(Value::from(n * 2))
        }));
        let add_ten = Arc::new(NoopOperation::new("AddTen").transform(|v| {
            let n = v.and_then(|v| v.as_i64()).unwrap_or(0);
            Some(Value::from(n + 10))
        }));

        let workflow = WorkflowBuilder::new("linear").operation(double).operation(add_ten).build();
        let smith = smith();
        let foundry = Foundry::new(smith.options().clone());

        let outcome = smith
            .forge_with_input(&workflow, Some(foundry), Some(Value::from(3)), CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(outcome.last_completed_index, Some(1));
    }

    #[tokio::test]
    async fn failure_triggers_compensation_in_lifo_order() {
        let restore_order = Arc::new(std::sync::Mutex::new(Vec::new()));

        let reserve = Arc::new(
            NoopOperation::new("Reserve")
                .with_restore(true)
                .on_restore(restore_order.clone()),
        );
        let charge = Arc::new(
            NoopOperation::new("Charge")
                .with_restore(true)
                .on_restore(restore_order.clone()),
        );
        let ship = Arc::new(NoopOperation::new("Ship").failing("carrier down"));

        let workflow = WorkflowBuilder::new("order")
            .operation(reserve)
            .operation(charge)
            .operation(ship)
            .build();

        let smith = smith();
        let foundry = Foundry::new(smith.options().clone());

        let result = smith.forge(&workflow, Some(foundry), CancellationToken::new()).await;
        assert!(result.is_err());

        let order = restore_order.lock().unwrap().clone();
        assert_eq!(order, vec!["Charge", "Reserve"]);
    }

    #[tokio::test]
    async fn empty_workflow_completes_immediately() {
        let workflow = WorkflowBuilder::new("empty").build();
        let smith = smith();
        let foundry = Foundry::new(smith.options().clone());

        let outcome = smith.forge(&workflow, Some(foundry), CancellationToken::new()).await.unwrap();
        assert_eq!(outcome.last_completed_index, None);
    }

    #[tokio::test]
    async fn invalid_concurrency_option_is_rejected_at_construction() {
        let mut options = WorkflowForgeOptions::default();
        options.max_concurrent_workflows = -1;
        let result = Smith::new(options, Arc::new(NullLogger));
        assert!(result.is_err());
        let message = result.unwrap_err().to_string();
        assert!(message.contains("Invalid WorkflowForge options"));
        assert!(message.contains("MaxConcurrentWorkflows"));
    }

    #[tokio::test]
    async fn failure_records_error_and_last_failed_properties() {
        let ship = Arc::new(NoopOperation::new("Ship").failing("carrier down"));
        let workflow = WorkflowBuilder::new("order").operation(ship).build();

        let smith = smith();
        let foundry = Foundry::new(smith.options().clone());
        let result = smith.forge(&workflow, Some(foundry), CancellationToken::new()).await;
        assert!(matches!(result, Err(WorkflowError::OperationFailed { .. })));
    }

    #[tokio::test]
    async fn restart_resumes_from_snapshot_via_derived_keys() {
        use crate::persistence::InMemoryPersistenceProvider;

        let calls = Arc::new(std::sync::Mutex::new(Vec::new()));
        let make = |name: &'static str, calls: Arc<std::sync::Mutex<Vec<&'static str>>>| {
            Arc::new(NoopOperation::new(name).transform(move |input| {
                calls.lock().unwrap().push(name);
                input
            }))
        };

        let mut options = WorkflowForgeOptions::default();
        options.persistence.enabled = true;
        options.persistence.instance_id = Some("node-1".to_string());
        options.persistence.workflow_key = Some("billing-flow".to_string());

        let provider = Arc::new(InMemoryPersistenceProvider::unbounded());
        let smith = Smith::new(options.clone(), Arc::new(NullLogger))
            .unwrap()
            .with_persistence(provider.clone());

        let first_run = WorkflowBuilder::new("billing-flow")
            .operation(make("Reserve", calls.clone()))
            .operation(make("Charge", calls.clone()))
            .operation(Arc::new(NoopOperation::new("Ship").failing("carrier down")))
            .build();

        let foundry = Foundry::new(smith.options().clone());
        let result = smith.forge(&first_run, Some(foundry), CancellationToken::new()).await;
        assert!(result.is_err());
        assert_eq!(calls.lock().unwrap().clone(), vec!["Reserve", "Charge"]);

        // Simulate a process restart: a fresh Smith and a fresh Foundry, neither carrying
        // any memory of the prior execution's random ids, reusing the same InstanceId /
        // WorkflowKey and the same persistence provider.
        let restarted_smith = Smith::new(options, Arc::new(NullLogger)).unwrap().with_persistence(provider);
        let second_run = WorkflowBuilder::new("billing-flow")
            .operation(make("Reserve", calls.clone()))
            .operation(make("Charge", calls.clone()))
            .operation(make("Ship", calls.clone()))
            .build();

        let foundry = Foundry::new(restarted_smith.options().clone());
        let outcome = restarted_smith
            .forge(&second_run, Some(foundry), CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(outcome.last_completed_index, Some(2));
        assert_eq!(calls.lock().unwrap().clone(), vec!["Reserve", "Charge", "Ship"]);
    }
}
