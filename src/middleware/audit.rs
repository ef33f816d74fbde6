use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use super::{Middleware, Next};
use crate::error::{Result, WorkflowError};
use crate::foundry::Foundry;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AuditEventType {
    Started,
    Completed,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntry {
    pub execution_id: String,
    pub workflow_name: String,
    pub operation_name: String,
    pub event_type: AuditEventType,
    pub status: String,
    pub initiator: Option<String>,
    pub metadata: Option<Value>,
    pub error_message: Option<String>,
    pub duration_ms: Option<i64>,
    pub timestamp: DateTime<Utc>,
}

/// Sink for audit entries. Implementations may write to a log, a database, an event bus —
/// the middleware only knows about the trait.
#[async_trait]
pub trait AuditProvider: Send + Sync {
    async fn record(&self, entry: AuditEntry) -> Result<()>;
}

/// Emits a [`AuditEntry`] before and after the wrapped operation. Audit sink failures are
/// logged and swallowed — they never interrupt the operation they're observing.
pub struct AuditMiddleware {
    provider: std::sync::Arc<dyn AuditProvider>,
    workflow_name: String,
}

impl AuditMiddleware {
    pub fn new(provider: std::sync::Arc<dyn AuditProvider>, workflow_name: impl Into<String>) -> Self {
        Self {
            provider,
            workflow_name: workflow_name.into(),
        }
    }

    async fn record_or_log(&self, foundry: &Foundry, entry: AuditEntry) {
        if let Err(err) = self.provider.record(entry).await {
            foundry.logger().error(
                "audit sink failed",
                &[("ErrorMessage", &err.to_string())],
            );
        }
    }
}

#[async_trait]
impl Middleware for AuditMiddleware {
    async fn execute<'a>(
        &'a self,
        operation_name: &'a str,
        foundry: &'a Foundry,
        input: Option<Value>,
        next: Next<'a>,
        cancel: CancellationToken,
    ) -> Result<Option<Value>> {
        let execution_id = foundry.execution_id().await.0.to_string();

        self.record_or_log(
            foundry,
            AuditEntry {
                execution_id: execution_id.clone(),
                workflow_name: self.workflow_name.clone(),
                operation_name: operation_name.to_string(),
                event_type: AuditEventType::Started,
                status: "started".to_string(),
                initiator: None,
                metadata: None,
                error_message: None,
                duration_ms: None,
                timestamp: Utc::now(),
            },
        )
        .await;

        let start = Utc::now();
        let result = next(input, cancel).await;
        let duration_ms = (Utc::now() - start).num_milliseconds();

        let (event_type, status, error_message) = match &result {
            Ok(_) => (AuditEventType::Completed, "completed".to_string(), None),
            Err(err) => (AuditEventType::Failed, "failed".to_string(), Some(err.to_string())),
        };

        self.record_or_log(
            foundry,
            AuditEntry {
                execution_id,
                workflow_name: self.workflow_name.clone(),
                operation_name: operation_name.to_string(),
                event_type,
                status,
                initiator: None,
                metadata: None,
                error_message,
                duration_ms: Some(duration_ms),
                timestamp: Utc::now(),
            },
        )
        .await;

        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::WorkflowForgeOptions;
    use crate::middleware::Pipeline;
    use crate::testing::NoopOperation;
    use std::sync::{Arc, Mutex};

    struct RecordingAuditProvider {
        entries: Arc<Mutex<Vec<AuditEntry>>>,
    }

    #[async_trait]
    impl AuditProvider for RecordingAuditProvider {
        async fn record(&self, entry: AuditEntry) -> Result<()> {
            self.entries.lock().unwrap().push(entry);
            Ok(())
        }
    }

    struct FailingAuditProvider;

    #[async_trait]
    impl AuditProvider for FailingAuditProvider {
        async fn record(&self, _entry: AuditEntry) -> Result<()> {
            Err(WorkflowError::AuditFailed {
                message: "sink unavailable".to_string(),
            })
        }
    }

    #[tokio::test]
    async fn records_started_and_completed_entries() {
        let entries = Arc::new(Mutex::new(Vec::new()));
        let provider = Arc::new(RecordingAuditProvider { entries: entries.clone() });
        let middlewares: Vec<Arc<dyn Middleware>> =
            vec![Arc::new(AuditMiddleware::new(provider, "demo"))];

        let operation = NoopOperation::new("op");
        let foundry = Foundry::new(Arc::new(WorkflowForgeOptions::default()));
        let pipeline = Pipeline::new(&middlewares);

        pipeline
            .invoke(&operation, &foundry, None, CancellationToken::new())
            .await
            .unwrap();

        let recorded = entries.lock().unwrap();
        assert_eq!(recorded.len(), 2);
        assert_eq!(recorded[0].event_type, AuditEventType::Started);
        assert_eq!(recorded[1].event_type, AuditEventType::Completed);
    }

    #[tokio::test]
    async fn audit_sink_failure_does_not_fail_the_operation() {
        let middlewares: Vec<Arc<dyn Middleware>> =
            vec![Arc::new(AuditMiddleware::new(Arc::new(FailingAuditProvider), "demo"))];

        let operation = NoopOperation::new("op").with_output(serde_json::json!(1));
        let foundry = Foundry::new(Arc::new(WorkflowForgeOptions::default()));
        let pipeline = Pipeline::new(&middlewares);

        let result = pipeline
            .invoke(&operation, &foundry, None, CancellationToken::new())
            .await;

        assert_eq!(result.unwrap(), Some(serde_json::json!(1)));
    }
}
