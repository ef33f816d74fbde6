//! Utilities for attaching rich context to an error before it leaves an operation or
//! middleware: correlation ids, arbitrary structured key/value context, and a cause chain.

use super::{ErrorCategory, ErrorMetadata, ErrorSeverity, WorkflowError};
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;

/// An error bundled with classification metadata and an optional cause chain.
#[derive(Debug)]
pub struct ErrorContext {
    pub error: WorkflowError,
    pub metadata: ErrorMetadata,
    pub chain: Vec<String>,
}

impl ErrorContext {
    pub fn new(error: WorkflowError) -> Self {
        let (category, severity, code) = categorize_error(&error);
        Self {
            error,
            metadata: ErrorMetadata::new(category, severity, code),
            chain: Vec::new(),
        }
    }

    pub fn with_context(mut self, key: impl Into<String>, value: impl Serialize) -> Self {
        if let Ok(json_value) = serde_json::to_value(value) {
            self.metadata.context.insert(key.into(), json_value);
        }
        self
    }

    pub fn with_correlation_id(mut self, id: impl Into<String>) -> Self {
        self.metadata.correlation_id = Some(id.into());
        self
    }

    pub fn with_cause(mut self, cause: impl Into<String>) -> Self {
        self.chain.push(cause.into());
        self
    }

    pub fn to_json(&self) -> Value {
        serde_json::json!({
            "error": self.error.to_string(),
            "category": self.metadata.category,
            "severity": self.metadata.severity,
            "code": self.metadata.error_code,
            "correlation_id": self.metadata.correlation_id,
            "context": self.metadata.context,
            "chain": self.chain,
            "timestamp": self.metadata.timestamp,
        })
    }
}

/// Extension trait for turning a bare [`WorkflowError`] into an [`ErrorContext`] inline.
pub trait ErrorContextExt: Sized {
    fn context(self, key: impl Into<String>, value: impl Serialize) -> ErrorContext;
    fn with_correlation_id(self, id: impl Into<String>) -> ErrorContext;
    fn with_contexts(self, contexts: HashMap<String, Value>) -> ErrorContext;
}

impl ErrorContextExt for WorkflowError {
    fn context(self, key: impl Into<String>, value: impl Serialize) -> ErrorContext {
        ErrorContext::new(self).with_context(key, value)
    }

    fn with_correlation_id(self, id: impl Into<String>) -> ErrorContext {
        ErrorContext::new(self).with_correlation_id(id)
    }

    fn with_contexts(self, contexts: HashMap<String, Value>) -> ErrorContext {
        let mut ctx = ErrorContext::new(self);
        for (key, value) in contexts {
            ctx.metadata.context.insert(key, value);
        }
        ctx
    }
}

/// Classify a [`WorkflowError`] into `(category, severity, code)` for logging and for
/// resilience strategies deciding whether a failure is worth retrying.
pub fn categorize_error(error: &WorkflowError) -> (ErrorCategory, ErrorSeverity, String) {
    match error {
        WorkflowError::OperationFailed { .. } => {
            (ErrorCategory::Business, ErrorSeverity::Error, "OP_001".to_string())
        }
        WorkflowError::OperationCancelled { .. } => {
            (ErrorCategory::User, ErrorSeverity::Warning, "OP_CANCEL_001".to_string())
        }
        WorkflowError::ValidationFailed { .. } => {
            (ErrorCategory::User, ErrorSeverity::Warning, "VAL_001".to_string())
        }
        WorkflowError::CompensationFailed { .. } => {
            (ErrorCategory::System, ErrorSeverity::Critical, "COMP_001".to_string())
        }
        WorkflowError::CircuitOpen { .. } => {
            (ErrorCategory::Transient, ErrorSeverity::Warning, "CB_OPEN_001".to_string())
        }
        WorkflowError::PersistenceFailed { .. } => {
            (ErrorCategory::Transient, ErrorSeverity::Error, "PERSIST_001".to_string())
        }
        WorkflowError::ConfigurationInvalid(_) => {
            (ErrorCategory::Permanent, ErrorSeverity::Critical, "CONFIG_001".to_string())
        }
        WorkflowError::AuditFailed { .. } => {
            (ErrorCategory::System, ErrorSeverity::Warning, "AUDIT_001".to_string())
        }
        WorkflowError::Internal(_) => {
            (ErrorCategory::System, ErrorSeverity::Error, "INTERNAL_001".to_string())
        }
    }
}

/// Generates correlation ids for properties and structured log fields.
pub struct CorrelationIdGenerator;

impl CorrelationIdGenerator {
    pub fn generate() -> String {
        format!("req-{}", uuid::Uuid::new_v4())
    }

    pub fn generate_with_prefix(prefix: &str) -> String {
        format!("{}-{}", prefix, uuid::Uuid::new_v4())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_context_carries_correlation_id_and_context() {
        let error = WorkflowError::operation_failed("Reserve", "timeout");
        let context = ErrorContext::new(error)
            .with_context("attempt", 2)
            .with_correlation_id("req-123")
            .with_cause("upstream timeout");

        assert_eq!(context.metadata.correlation_id.as_deref(), Some("req-123"));
        assert_eq!(context.chain.len(), 1);
        assert_eq!(context.metadata.context.get("attempt"), Some(&serde_json::json!(2)));
    }

    #[test]
    fn categorize_error_maps_configuration_invalid_to_permanent_critical() {
        let (category, severity, _) =
            categorize_error(&WorkflowError::ConfigurationInvalid("bad".to_string()));
        assert_eq!(category, ErrorCategory::Permanent);
        assert_eq!(severity, ErrorSeverity::Critical);
    }

    #[test]
    fn correlation_id_has_expected_prefix() {
        let id = CorrelationIdGenerator::generate();
        assert!(id.starts_with("req-"));
    }
}
